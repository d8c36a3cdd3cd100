//! Audio capture, wake triggering, and voice activity detection.
//!
//! Frames come off the CPAL callback thread through a bounded channel,
//! get normalized to the pipeline rate (mono f32), and feed the wake and
//! endpointing state machines. Whisper consumes the resulting 16 kHz buffer
//! directly.

/// Sample rate Whisper expects; the pipeline default.
pub const TARGET_RATE: u32 = 16_000;

mod capture;
mod dispatch;
mod recorder;
mod resample;
mod segmenter;
#[cfg(test)]
mod tests;
mod vad;
mod wake;

pub use capture::{capture_from_pcm, CaptureConfig, CaptureMetrics, CaptureResult, StopReason};
pub use recorder::Recorder;
pub use segmenter::{TriggerOutcome, UtteranceSegmenter, UtteranceSource};
pub use vad::{SimpleThresholdVad, VadDecision, VadEngine};
pub use wake::{EnergySpikeTrigger, WakeConfig, WakeTrigger};
