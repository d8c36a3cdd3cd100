//! Voice activity detection: per-frame speech/silence classification plus
//! the smoothing that keeps brief noise spikes from flipping the capture
//! state machine.

use std::cmp::Ordering as CmpOrdering;
use std::collections::VecDeque;

/// Voice activity detection engine that processes audio frames.
///
/// # Frame size contract
/// Implementations may require specific frame sizes. Earshot, for example,
/// expects 10, 20, or 30 ms frames at 16 kHz. Frame size in samples is
/// `(sample_rate * frame_duration_ms) / 1000`; callers must slice frames to
/// the engine's expectation or decisions degrade.
pub trait VadEngine {
    fn process_frame(&mut self, samples: &[f32]) -> VadDecision;
    fn reset(&mut self);
    fn name(&self) -> &'static str {
        "unknown_vad"
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VadDecision {
    Speech,
    Silence,
    Uncertain,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(super) enum FrameLabel {
    Speech,
    Silence,
    Uncertain,
}

impl From<VadDecision> for FrameLabel {
    fn from(decision: VadDecision) -> Self {
        match decision {
            VadDecision::Speech => FrameLabel::Speech,
            VadDecision::Silence => FrameLabel::Silence,
            VadDecision::Uncertain => FrameLabel::Uncertain,
        }
    }
}

/// Majority vote over the last `window_size` frames.
pub(super) struct VadSmoother {
    window: VecDeque<FrameLabel>,
    window_size: usize,
}

impl VadSmoother {
    pub(super) fn new(window_size: usize) -> Self {
        Self {
            window: VecDeque::new(),
            window_size: window_size.max(1),
        }
    }

    pub(super) fn smooth(&mut self, label: FrameLabel) -> FrameLabel {
        if self.window_size <= 1 {
            return label;
        }
        self.window.push_back(label);
        if self.window.len() > self.window_size {
            self.window.pop_front();
        }

        let mut speech = 0usize;
        let mut silence = 0usize;
        for item in &self.window {
            match item {
                FrameLabel::Speech => speech += 1,
                FrameLabel::Silence => silence += 1,
                FrameLabel::Uncertain => {}
            }
        }
        match speech.cmp(&silence) {
            CmpOrdering::Greater => FrameLabel::Speech,
            CmpOrdering::Less => FrameLabel::Silence,
            CmpOrdering::Equal => label,
        }
    }
}

/// RMS level of a frame in decibels, floored at -120 dB for silence.
pub(crate) fn rms_db(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return -120.0;
    }
    let energy: f32 = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    let rms = energy.sqrt().max(1e-6);
    20.0 * rms.log10()
}

/// Energy-threshold VAD. The default when the earshot engine is disabled,
/// and the predictable choice for tests.
#[derive(Debug, Clone)]
pub struct SimpleThresholdVad {
    threshold_db: f32,
}

impl SimpleThresholdVad {
    pub fn new(threshold_db: f32) -> Self {
        Self { threshold_db }
    }
}

impl VadEngine for SimpleThresholdVad {
    fn process_frame(&mut self, samples: &[f32]) -> VadDecision {
        if samples.is_empty() {
            return VadDecision::Uncertain;
        }
        if rms_db(samples) >= self.threshold_db {
            VadDecision::Speech
        } else {
            VadDecision::Silence
        }
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "simple_threshold_vad"
    }
}
