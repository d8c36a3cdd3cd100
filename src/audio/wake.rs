//! Wake trigger seam.
//!
//! The session loop only needs a per-frame yes/no, so the trigger is a trait
//! and keyword-spotting models plug in behind it. The shipped implementation
//! is an energy-spike heuristic: it fires when a frame's level jumps well
//! above the tracked ambient baseline. Good enough for bench setups and for
//! exercising the pipeline; not a substitute for a trained model.

use super::vad::rms_db;

/// Tuning for the energy-spike trigger.
#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// How far above the ambient RMS baseline a frame must jump.
    pub spike_ratio: f32,
    /// Frames quieter than this never fire, whatever the baseline.
    pub min_level_db: f32,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            spike_ratio: 3.0,
            min_level_db: -40.0,
        }
    }
}

/// Per-frame wake classifier. `process_frame` returns true when the trigger
/// phrase is considered complete at this frame.
pub trait WakeTrigger {
    fn process_frame(&mut self, samples: &[f32]) -> bool;
    fn reset(&mut self);
    fn name(&self) -> &'static str {
        "unknown_wake"
    }
}

/// Reference trigger: exponential-moving-average energy tracking with spike
/// detection against the baseline.
pub struct EnergySpikeTrigger {
    cfg: WakeConfig,
    baseline_rms: f32,
}

impl EnergySpikeTrigger {
    pub fn new(cfg: WakeConfig) -> Self {
        Self {
            cfg,
            baseline_rms: 0.0,
        }
    }

    fn frame_rms(samples: &[f32]) -> f32 {
        let energy: f32 = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
        energy.sqrt()
    }
}

impl WakeTrigger for EnergySpikeTrigger {
    fn process_frame(&mut self, samples: &[f32]) -> bool {
        if samples.is_empty() {
            return false;
        }
        let rms = Self::frame_rms(samples);
        let fired = self.baseline_rms > 1e-5
            && rms > self.baseline_rms * self.cfg.spike_ratio
            && rms_db(samples) >= self.cfg.min_level_db;
        // Track ambient level slowly so the spike comparison stays meaningful
        // through gradual background changes.
        self.baseline_rms = self.baseline_rms * 0.9 + rms * 0.1;
        if fired {
            self.reset();
        }
        fired
    }

    fn reset(&mut self) {
        self.baseline_rms = 0.0;
    }

    fn name(&self) -> &'static str {
        "energy_spike_trigger"
    }
}
