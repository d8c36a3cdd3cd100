//! Session loop: wake, capture, transcribe, ask, speak.
//!
//! One cycle handles one spoken command end to end. Expected disappointments
//! (nothing heard, no reply in time) are answered with a spoken fallback and
//! the loop keeps going; only a latched transport failure or shutdown ends
//! it. Cycle errors pause briefly before the next attempt so a broken
//! microphone cannot spin the loop hot.

use crate::audio::{CaptureConfig, TriggerOutcome, UtteranceSource};
use crate::cancel::CancelToken;
use crate::mqtt::{ChannelError, ReplyTransport};
use crate::stt::SpeechToText;
use crate::tts::SpeechOutput;
use anyhow::Result;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const FALLBACK_HEARD_NOTHING: &str = "I did not catch that.";
const FALLBACK_NO_REPLY: &str = "I did not get an answer.";
const FALLBACK_EMPTY_REPLY: &str = "I received an empty answer.";
const CYCLE_RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Where the session currently is; logged at each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    WaitingForWake,
    Capturing,
    Transcribing,
    AwaitingReply,
    Speaking,
    ShuttingDown,
}

impl SessionState {
    pub fn label(self) -> &'static str {
        match self {
            SessionState::WaitingForWake => "waiting_for_wake",
            SessionState::Capturing => "capturing",
            SessionState::Transcribing => "transcribing",
            SessionState::AwaitingReply => "awaiting_reply",
            SessionState::Speaking => "speaking",
            SessionState::ShuttingDown => "shutting_down",
        }
    }
}

/// Settings the loop needs beyond what its collaborators carry themselves.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub sample_rate: u32,
    pub min_utterance_ms: u64,
    pub lang: String,
    pub reply_timeout: Duration,
}

impl SessionConfig {
    pub fn from_capture(capture: &CaptureConfig, min_utterance_ms: u64, lang: &str, reply_timeout: Duration) -> Self {
        Self {
            sample_rate: capture.sample_rate,
            min_utterance_ms,
            lang: lang.to_string(),
            reply_timeout,
        }
    }
}

/// Drives the full voice pipeline over its four seams.
pub struct Orchestrator<S, T, O, C>
where
    S: UtteranceSource,
    T: SpeechToText,
    O: SpeechOutput,
    C: ReplyTransport,
{
    source: S,
    stt: T,
    speaker: O,
    channel: C,
    cfg: SessionConfig,
    cancel: CancelToken,
}

impl<S, T, O, C> Orchestrator<S, T, O, C>
where
    S: UtteranceSource,
    T: SpeechToText,
    O: SpeechOutput,
    C: ReplyTransport,
{
    pub fn new(
        source: S,
        stt: T,
        speaker: O,
        channel: C,
        cfg: SessionConfig,
        cancel: CancelToken,
    ) -> Self {
        Self {
            source,
            stt,
            speaker,
            channel,
            cfg,
            cancel,
        }
    }

    /// Run cycles until shutdown is requested or the transport dies for good.
    pub fn run(&mut self) -> Result<()> {
        loop {
            if self.cancel.is_cancelled() {
                info!(state = SessionState::ShuttingDown.label(), "session ended");
                return Ok(());
            }
            if let Some(err) = self.channel.fatal_error() {
                return Err(err.into());
            }
            if let Err(err) = self.run_cycle() {
                error!(error = %err, "cycle failed");
                std::thread::sleep(CYCLE_RETRY_PAUSE);
            }
        }
    }

    fn run_cycle(&mut self) -> Result<()> {
        let session = Instant::now();

        debug!(state = SessionState::WaitingForWake.label(), "cycle start");
        match self.source.await_trigger(&self.cancel)? {
            TriggerOutcome::Triggered => {}
            TriggerOutcome::Cancelled => return Ok(()),
        }

        debug!(state = SessionState::Capturing.label(), "trigger fired");
        let capture = self.source.capture_utterance()?;
        let duration_ms = capture.duration_ms(self.cfg.sample_rate);
        if duration_ms < self.cfg.min_utterance_ms {
            info!(
                duration_ms,
                min_ms = self.cfg.min_utterance_ms,
                "capture too short, discarded"
            );
            return Ok(());
        }

        debug!(state = SessionState::Transcribing.label(), duration_ms, "capture done");
        let transcript = self.stt.transcribe(&capture.audio)?;
        if transcript.trim().is_empty() {
            info!("empty transcript");
            self.speaker.speak(FALLBACK_HEARD_NOTHING)?;
            return Ok(());
        }
        info!(transcript = %transcript, "transcribed");

        debug!(state = SessionState::AwaitingReply.label(), "sending request");
        let spoken = match self
            .channel
            .request_reply(&transcript, &self.cfg.lang, self.cfg.reply_timeout)
        {
            Ok(Some(reply)) => match reply.reply_text() {
                Some(text) => text.to_string(),
                None => FALLBACK_EMPTY_REPLY.to_string(),
            },
            Ok(None) => FALLBACK_NO_REPLY.to_string(),
            Err(err @ (ChannelError::NotConnected | ChannelError::PublishFailed(_))) => {
                // Transient transport trouble; the worker is reconnecting.
                warn!(error = %err, "request not delivered");
                FALLBACK_NO_REPLY.to_string()
            }
            Err(err) => return Err(err.into()),
        };

        debug!(state = SessionState::Speaking.label(), "speaking reply");
        self.speaker.speak(&spoken)?;

        info!(
            session_ms = session.elapsed().as_millis() as u64,
            "cycle complete"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{CaptureMetrics, CaptureResult};
    use crate::mqtt::ReplyPayload;
    use std::sync::{Arc, Mutex};

    struct ScriptedSource {
        captures: Vec<CaptureResult>,
        cancel_after: usize,
        triggers: usize,
        cancel: CancelToken,
    }

    impl ScriptedSource {
        fn new(captures: Vec<CaptureResult>, cancel: CancelToken) -> Self {
            let cancel_after = captures.len();
            Self {
                captures,
                cancel_after,
                triggers: 0,
                cancel,
            }
        }
    }

    impl UtteranceSource for ScriptedSource {
        fn await_trigger(&mut self, cancel: &CancelToken) -> Result<TriggerOutcome> {
            if cancel.is_cancelled() {
                return Ok(TriggerOutcome::Cancelled);
            }
            if self.triggers >= self.cancel_after {
                // Script exhausted; end the session on the next loop check.
                self.cancel.cancel();
                return Ok(TriggerOutcome::Cancelled);
            }
            self.triggers += 1;
            Ok(TriggerOutcome::Triggered)
        }

        fn capture_utterance(&mut self) -> Result<CaptureResult> {
            Ok(self.captures.remove(0))
        }
    }

    struct FixedStt(String);

    impl SpeechToText for FixedStt {
        fn transcribe(&mut self, _samples: &[f32]) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSpeaker(Arc<Mutex<Vec<String>>>);

    impl RecordingSpeaker {
        fn spoken(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl SpeechOutput for RecordingSpeaker {
        fn speak(&mut self, text: &str) -> Result<()> {
            self.0.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    enum StubOutcome {
        Reply(&'static str),
        EmptyReply,
        Timeout,
        NotConnected,
    }

    struct StubChannel {
        outcome: StubOutcome,
        fatal: bool,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl StubChannel {
        fn new(outcome: StubOutcome) -> Self {
            Self {
                outcome,
                fatal: false,
                requests: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl ReplyTransport for StubChannel {
        fn request_reply(
            &self,
            text: &str,
            _lang: &str,
            _timeout: Duration,
        ) -> Result<Option<ReplyPayload>, ChannelError> {
            self.requests.lock().unwrap().push(text.to_string());
            match self.outcome {
                StubOutcome::Reply(reply) => Ok(Some(ReplyPayload {
                    corr_id: Some("abc".to_string()),
                    reply: Some(reply.to_string()),
                    text: None,
                })),
                StubOutcome::EmptyReply => Ok(Some(ReplyPayload::default())),
                StubOutcome::Timeout => Ok(None),
                StubOutcome::NotConnected => Err(ChannelError::NotConnected),
            }
        }

        fn fatal_error(&self) -> Option<ChannelError> {
            if self.fatal {
                Some(ChannelError::ReconnectExhausted { attempts: 5 })
            } else {
                None
            }
        }
    }

    fn capture_of_ms(ms: u64) -> CaptureResult {
        CaptureResult {
            audio: vec![0.1; (16 * ms) as usize],
            metrics: CaptureMetrics::default(),
        }
    }

    fn session_cfg() -> SessionConfig {
        SessionConfig {
            sample_rate: 16_000,
            min_utterance_ms: 200,
            lang: "sv".to_string(),
            reply_timeout: Duration::from_millis(10),
        }
    }

    fn run_one(
        capture_ms: u64,
        transcript: &str,
        outcome: StubOutcome,
    ) -> (Vec<String>, Vec<String>) {
        let cancel = CancelToken::new();
        let source = ScriptedSource::new(vec![capture_of_ms(capture_ms)], cancel.clone());
        let speaker = RecordingSpeaker::default();
        let channel = StubChannel::new(outcome);
        let requests = channel.requests.clone();
        let mut orchestrator = Orchestrator::new(
            source,
            FixedStt(transcript.to_string()),
            speaker.clone(),
            channel,
            session_cfg(),
            cancel,
        );
        orchestrator.run().unwrap();
        let sent = requests.lock().unwrap().clone();
        (speaker.spoken(), sent)
    }

    #[test]
    fn reply_text_is_spoken() {
        let (spoken, sent) = run_one(1_000, "tänd lampan", StubOutcome::Reply("lampan är tänd"));
        assert_eq!(sent, vec!["tänd lampan".to_string()]);
        assert_eq!(spoken, vec!["lampan är tänd".to_string()]);
    }

    #[test]
    fn short_capture_skips_transcription_and_request() {
        let (spoken, sent) = run_one(50, "should not be used", StubOutcome::Reply("nope"));
        assert!(sent.is_empty());
        assert!(spoken.is_empty());
    }

    #[test]
    fn empty_transcript_gets_the_heard_nothing_fallback() {
        let (spoken, sent) = run_one(1_000, "   ", StubOutcome::Reply("nope"));
        assert!(sent.is_empty());
        assert_eq!(spoken, vec![FALLBACK_HEARD_NOTHING.to_string()]);
    }

    #[test]
    fn reply_timeout_gets_the_no_reply_fallback() {
        let (spoken, sent) = run_one(1_000, "tänd lampan", StubOutcome::Timeout);
        assert_eq!(sent.len(), 1);
        assert_eq!(spoken, vec![FALLBACK_NO_REPLY.to_string()]);
    }

    #[test]
    fn contentless_reply_gets_the_empty_reply_fallback() {
        let (spoken, _sent) = run_one(1_000, "tänd lampan", StubOutcome::EmptyReply);
        assert_eq!(spoken, vec![FALLBACK_EMPTY_REPLY.to_string()]);
    }

    #[test]
    fn disconnected_transport_speaks_a_fallback_and_continues() {
        let (spoken, _sent) = run_one(1_000, "tänd lampan", StubOutcome::NotConnected);
        assert_eq!(spoken, vec![FALLBACK_NO_REPLY.to_string()]);
    }

    #[test]
    fn latched_transport_failure_ends_the_run_with_an_error() {
        let cancel = CancelToken::new();
        let source = ScriptedSource::new(Vec::new(), cancel.clone());
        let mut channel = StubChannel::new(StubOutcome::Timeout);
        channel.fatal = true;
        let mut orchestrator = Orchestrator::new(
            source,
            FixedStt(String::new()),
            RecordingSpeaker::default(),
            channel,
            session_cfg(),
            cancel,
        );
        assert!(orchestrator.run().is_err());
    }

    #[test]
    fn cancelled_token_ends_the_run_cleanly() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let source = ScriptedSource::new(Vec::new(), cancel.clone());
        let mut orchestrator = Orchestrator::new(
            source,
            FixedStt(String::new()),
            RecordingSpeaker::default(),
            StubChannel::new(StubOutcome::Timeout),
            session_cfg(),
            cancel,
        );
        assert!(orchestrator.run().is_ok());
    }
}
