//! Wake-then-capture session front end.
//!
//! One segmenter owns the microphone. `await_trigger` streams frames into
//! the wake trigger until it fires or the process is asked to shut down;
//! `capture_utterance` then records until the endpointing state machine
//! stops it. The stream handle is dropped on every exit path, so the device
//! is released between phases and on errors.

use super::capture::{CaptureConfig, CaptureMetrics, CaptureResult, CaptureState, StopReason};
use super::recorder::Recorder;
use super::resample::convert_frame;
use super::vad::{FrameLabel, SimpleThresholdVad, VadEngine, VadSmoother};
use super::wake::WakeTrigger;
use crate::cancel::CancelToken;
use crate::config::VadEngineKind;
use anyhow::{anyhow, Result};
use crossbeam_channel::RecvTimeoutError;
use std::time::Duration;
use tracing::debug;

/// How a trigger wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Triggered,
    Cancelled,
}

/// Producer of triggered utterances. The session loop depends on this seam
/// so tests can script audio without hardware.
pub trait UtteranceSource {
    /// Block until the wake trigger fires or shutdown is requested.
    fn await_trigger(&mut self, cancel: &CancelToken) -> Result<TriggerOutcome>;

    /// Record one utterance and return it with its capture metrics.
    fn capture_utterance(&mut self) -> Result<CaptureResult>;
}

/// Microphone-backed utterance source: wake trigger plus VAD endpointing.
pub struct UtteranceSegmenter {
    recorder: Recorder,
    cfg: CaptureConfig,
    wake: Box<dyn WakeTrigger + Send>,
    vad_kind: VadEngineKind,
}

impl UtteranceSegmenter {
    pub fn new(
        recorder: Recorder,
        cfg: CaptureConfig,
        wake: Box<dyn WakeTrigger + Send>,
        vad_kind: VadEngineKind,
    ) -> Self {
        Self {
            recorder,
            cfg,
            wake,
            vad_kind,
        }
    }

    fn build_vad(&self) -> Box<dyn VadEngine> {
        match self.vad_kind {
            #[cfg(feature = "vad_earshot")]
            VadEngineKind::Earshot => Box::new(crate::vad_earshot::EarshotVad::new(&self.cfg)),
            #[cfg(not(feature = "vad_earshot"))]
            VadEngineKind::Earshot => Box::new(SimpleThresholdVad::new(self.cfg.vad_threshold_db)),
            VadEngineKind::Simple => Box::new(SimpleThresholdVad::new(self.cfg.vad_threshold_db)),
        }
    }
}

impl UtteranceSource for UtteranceSegmenter {
    fn await_trigger(&mut self, cancel: &CancelToken) -> Result<TriggerOutcome> {
        let stream = self
            .recorder
            .open_frame_stream(self.cfg.frame_ms, self.cfg.channel_capacity)?;
        let device_rate = stream.device_rate();
        let frame_samples = self.cfg.frame_samples();
        let wait = Duration::from_millis(self.cfg.frame_ms);

        self.wake.reset();
        loop {
            if cancel.is_cancelled() {
                return Ok(TriggerOutcome::Cancelled);
            }
            match stream.recv_timeout(wait) {
                Ok(frame) => {
                    let frame =
                        convert_frame(frame, device_rate, self.cfg.sample_rate, frame_samples);
                    if self.wake.process_frame(&frame) {
                        debug!(trigger = self.wake.name(), "wake trigger fired");
                        return Ok(TriggerOutcome::Triggered);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(anyhow!("audio stream disconnected while waiting for wake"));
                }
            }
        }
    }

    fn capture_utterance(&mut self) -> Result<CaptureResult> {
        let stream = self
            .recorder
            .open_frame_stream(self.cfg.frame_ms, self.cfg.channel_capacity)?;
        let device_rate = stream.device_rate();
        let frame_samples = self.cfg.frame_samples();
        let wait = Duration::from_millis(self.cfg.frame_ms);

        // Fresh detector state per capture; leftover history from a previous
        // utterance must not bias the first frames of this one.
        let mut vad = self.build_vad();
        let mut smoother = VadSmoother::new(self.cfg.vad_smoothing_frames);
        let mut state = CaptureState::new(&self.cfg);
        let mut metrics = CaptureMetrics::default();
        let mut audio = Vec::with_capacity(self.cfg.frame_samples() * 16);
        let stop_reason;

        loop {
            match stream.recv_timeout(wait) {
                Ok(frame) => {
                    let frame =
                        convert_frame(frame, device_rate, self.cfg.sample_rate, frame_samples);
                    if frame.is_empty() {
                        continue;
                    }
                    let decision = vad.process_frame(&frame);
                    metrics.frames_processed += 1;
                    let label = smoother.smooth(FrameLabel::from(decision));
                    audio.extend_from_slice(&frame);
                    if let Some(reason) = state.on_frame(label) {
                        stop_reason = reason;
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(reason) = state.on_starved() {
                        stop_reason = reason;
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(anyhow!("audio stream disconnected during capture"));
                }
            }
        }

        metrics.capture_ms = state.total_ms();
        metrics.speech_ms = state.speech_ms();
        metrics.silence_tail_ms = state.silence_tail_ms();
        metrics.frames_dropped = stream.dropped_frames();
        metrics.stop_reason = stop_reason;

        if audio.is_empty() && !matches!(metrics.stop_reason, StopReason::StarvedTimeout) {
            return Err(anyhow!(
                "no samples captured; check microphone permissions and availability"
            ));
        }

        debug!(
            capture_ms = metrics.capture_ms,
            speech_ms = metrics.speech_ms,
            silence_tail_ms = metrics.silence_tail_ms,
            frames_dropped = metrics.frames_dropped,
            stop_reason = metrics.stop_reason.label(),
            "capture finished"
        );

        Ok(CaptureResult { audio, metrics })
    }
}
