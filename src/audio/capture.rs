//! Utterance endpointing state machine.
//!
//! Tracks elapsed time and the trailing silence streak, and decides when a
//! recording ends: a silence tail after speech has been heard, or the hard
//! duration cap. Every frame is kept, speech or not, so the transcriber sees
//! the utterance exactly as captured.

use super::vad::{FrameLabel, VadEngine, VadSmoother};

/// Settings for one capture: cadence, endpointing bounds, and VAD tuning.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub frame_ms: u64,
    pub silence_end_ms: u64,
    pub max_utterance_ms: u64,
    pub channel_capacity: usize,
    pub vad_threshold_db: f32,
    pub vad_smoothing_frames: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: super::TARGET_RATE,
            frame_ms: 30,
            silence_end_ms: 800,
            max_utterance_ms: 12_000,
            channel_capacity: 64,
            vad_threshold_db: -45.0,
            vad_smoothing_frames: 3,
        }
    }
}

impl CaptureConfig {
    pub(super) fn frame_samples(&self) -> usize {
        ((u64::from(self.sample_rate) * self.frame_ms) / 1000).max(1) as usize
    }
}

/// Why a capture stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    SilenceAfterSpeech { tail_ms: u64 },
    MaxDuration,
    StarvedTimeout,
}

impl StopReason {
    pub fn label(&self) -> &'static str {
        match self {
            StopReason::SilenceAfterSpeech { .. } => "silence_after_speech",
            StopReason::MaxDuration => "max_duration",
            StopReason::StarvedTimeout => "starved_timeout",
        }
    }
}

/// Counters collected during one capture, logged for observability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureMetrics {
    pub capture_ms: u64,
    pub speech_ms: u64,
    pub silence_tail_ms: u64,
    pub frames_processed: usize,
    pub frames_dropped: usize,
    pub stop_reason: StopReason,
}

impl Default for CaptureMetrics {
    fn default() -> Self {
        Self {
            capture_ms: 0,
            speech_ms: 0,
            silence_tail_ms: 0,
            frames_processed: 0,
            frames_dropped: 0,
            stop_reason: StopReason::MaxDuration,
        }
    }
}

/// Mono PCM plus the metrics that explain how it was captured.
#[derive(Debug, Clone)]
pub struct CaptureResult {
    pub audio: Vec<f32>,
    pub metrics: CaptureMetrics,
}

impl CaptureResult {
    /// Duration of the captured audio at the given rate.
    pub fn duration_ms(&self, sample_rate: u32) -> u64 {
        if sample_rate == 0 {
            return 0;
        }
        (self.audio.len() as u64 * 1000) / u64::from(sample_rate)
    }
}

/// Stop-decision machine for one recording.
///
/// Silence only ends the capture after at least one speech frame, so a quiet
/// room cannot cut the utterance short before the speaker starts. Without
/// any speech the hard duration cap is the only bound.
pub(super) struct CaptureState {
    frame_ms: u64,
    silence_end_ms: u64,
    max_utterance_ms: u64,
    speech_ms: u64,
    silence_streak_ms: u64,
    total_ms: u64,
}

impl CaptureState {
    pub(super) fn new(cfg: &CaptureConfig) -> Self {
        Self {
            frame_ms: cfg.frame_ms,
            silence_end_ms: cfg.silence_end_ms,
            max_utterance_ms: cfg.max_utterance_ms,
            speech_ms: 0,
            silence_streak_ms: 0,
            total_ms: 0,
        }
    }

    /// Account for one classified frame; `Some` means stop now.
    pub(super) fn on_frame(&mut self, label: FrameLabel) -> Option<StopReason> {
        match label {
            FrameLabel::Speech => {
                self.speech_ms = self.speech_ms.saturating_add(self.frame_ms);
                self.silence_streak_ms = 0;
            }
            FrameLabel::Silence => {
                self.silence_streak_ms = self.silence_streak_ms.saturating_add(self.frame_ms);
            }
            FrameLabel::Uncertain => {
                self.silence_streak_ms = 0;
            }
        }
        self.total_ms = self.total_ms.saturating_add(self.frame_ms);

        if self.total_ms >= self.max_utterance_ms {
            return Some(StopReason::MaxDuration);
        }
        if self.speech_ms > 0 && self.silence_streak_ms >= self.silence_end_ms {
            return Some(StopReason::SilenceAfterSpeech {
                tail_ms: self.silence_streak_ms,
            });
        }
        None
    }

    /// Account for a frame period in which no audio arrived. Keeps the
    /// duration cap honest when the device stalls.
    pub(super) fn on_starved(&mut self) -> Option<StopReason> {
        self.total_ms = self.total_ms.saturating_add(self.frame_ms);
        if self.total_ms >= self.max_utterance_ms {
            Some(StopReason::StarvedTimeout)
        } else {
            None
        }
    }

    pub(super) fn total_ms(&self) -> u64 {
        self.total_ms
    }

    pub(super) fn speech_ms(&self) -> u64 {
        self.speech_ms
    }

    pub(super) fn silence_tail_ms(&self) -> u64 {
        self.silence_streak_ms
    }
}

/// Run the endpointing state machine over prepared PCM, no hardware needed.
/// Backs the state-machine tests and offline tuning.
pub fn capture_from_pcm(
    samples: &[f32],
    cfg: &CaptureConfig,
    vad: &mut dyn VadEngine,
) -> CaptureResult {
    let frame_samples = cfg.frame_samples();
    let mut smoother = VadSmoother::new(cfg.vad_smoothing_frames);
    let mut state = CaptureState::new(cfg);
    let mut metrics = CaptureMetrics::default();
    let mut audio = Vec::new();
    let mut stop_reason = StopReason::MaxDuration;

    for chunk in samples.chunks(frame_samples) {
        let mut frame = chunk.to_vec();
        frame.resize(frame_samples, 0.0);
        let decision = vad.process_frame(&frame);
        metrics.frames_processed += 1;
        let label = smoother.smooth(FrameLabel::from(decision));
        audio.extend_from_slice(&frame);
        if let Some(reason) = state.on_frame(label) {
            stop_reason = reason;
            break;
        }
    }

    metrics.capture_ms = state.total_ms();
    metrics.speech_ms = state.speech_ms();
    metrics.silence_tail_ms = state.silence_tail_ms();
    metrics.stop_reason = stop_reason;

    CaptureResult { audio, metrics }
}
