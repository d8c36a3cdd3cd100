//! Earshot-powered voice activity detector adapter implementing `VadEngine`.

use crate::audio::{CaptureConfig, VadDecision, VadEngine};
use earshot::{VoiceActivityDetector, VoiceActivityProfile};

/// Thin wrapper that adapts `earshot` to the crate's `VadEngine` trait.
pub struct EarshotVad {
    detector: VoiceActivityDetector,
    frame_samples: usize,
    scratch: Vec<i16>,
}

impl EarshotVad {
    pub fn new(cfg: &CaptureConfig) -> Self {
        let profile = match cfg.vad_threshold_db {
            t if t <= -50.0 => VoiceActivityProfile::VERY_AGGRESSIVE,
            t if t <= -40.0 => VoiceActivityProfile::AGGRESSIVE,
            t if t <= -30.0 => VoiceActivityProfile::LBR,
            _ => VoiceActivityProfile::QUALITY,
        };
        // Earshot accepts 10, 20, or 30 ms frames at 16 kHz.
        let frame_ms = cfg.frame_ms.clamp(10, 30) as usize;
        let frame_samples = ((cfg.sample_rate as usize) * frame_ms) / 1000;
        Self {
            detector: VoiceActivityDetector::new(profile),
            frame_samples: frame_samples.max(160),
            scratch: Vec::new(),
        }
    }
}

impl VadEngine for EarshotVad {
    fn process_frame(&mut self, samples: &[f32]) -> VadDecision {
        if samples.is_empty() {
            return VadDecision::Uncertain;
        }
        self.scratch.clear();
        self.scratch.reserve(self.frame_samples);
        for sample in samples.iter().copied() {
            let clamped = sample.clamp(-1.0, 1.0);
            self.scratch.push((clamped * 32_768.0) as i16);
        }
        if self.scratch.len() < self.frame_samples {
            self.scratch.resize(self.frame_samples, 0);
        } else if self.scratch.len() > self.frame_samples {
            self.scratch.truncate(self.frame_samples);
        }
        match self.detector.predict_16khz(&self.scratch) {
            Ok(true) => VadDecision::Speech,
            Ok(false) => VadDecision::Silence,
            Err(_) => VadDecision::Uncertain,
        }
    }

    fn reset(&mut self) {
        self.detector.reset();
    }

    fn name(&self) -> &'static str {
        "earshot_vad"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loud_tone_reads_as_speech_or_silence_never_uncertain() {
        let mut vad = EarshotVad::new(&CaptureConfig::default());
        let frame: Vec<f32> = (0..480)
            .map(|i| (i as f32 * 2.0 * std::f32::consts::PI * 220.0 / 16_000.0).sin() * 0.6)
            .collect();
        let decision = vad.process_frame(&frame);
        assert_ne!(decision, VadDecision::Uncertain);
    }

    #[test]
    fn empty_frame_is_uncertain() {
        let mut vad = EarshotVad::new(&CaptureConfig::default());
        assert_eq!(vad.process_frame(&[]), VadDecision::Uncertain);
    }
}
