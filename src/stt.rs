//! Whisper speech-to-text integration.
//!
//! Wraps `whisper_rs` behind a small trait so the session loop can be tested
//! without a model on disk. The GGML model is loaded once at startup and
//! reused across captures to avoid repeated initialization overhead.

use anyhow::{Context, Result};
use std::os::raw::{c_char, c_uint, c_void};
use std::sync::Once;
use tracing::debug;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

/// Settings the transcriber needs, resolved and validated at startup.
#[derive(Debug, Clone)]
pub struct SttConfig {
    pub model_path: String,
    pub lang: String,
    pub beam_size: u32,
    pub temperature: f32,
}

/// Transcription seam between the session loop and the model backend.
pub trait SpeechToText {
    fn transcribe(&mut self, samples: &[f32]) -> Result<String>;
}

/// Whisper model context. Create once, reuse for every utterance.
pub struct Transcriber {
    ctx: WhisperContext,
    cfg: SttConfig,
}

impl Transcriber {
    /// Load the Whisper model from disk.
    pub fn new(cfg: SttConfig) -> Result<Self> {
        install_whisper_log_silencer();
        let ctx =
            WhisperContext::new_with_params(&cfg.model_path, WhisperContextParameters::default())
                .with_context(|| format!("failed to load whisper model '{}'", cfg.model_path))?;
        Ok(Self { ctx, cfg })
    }
}

impl SpeechToText for Transcriber {
    fn transcribe(&mut self, samples: &[f32]) -> Result<String> {
        let mut state = self
            .ctx
            .create_state()
            .context("failed to create whisper state")?;
        let mut params = if self.cfg.beam_size > 1 {
            FullParams::new(SamplingStrategy::BeamSearch {
                beam_size: self.cfg.beam_size as i32,
                patience: -1.0,
            })
        } else {
            FullParams::new(SamplingStrategy::Greedy { best_of: 1 })
        };
        if self.cfg.lang.eq_ignore_ascii_case("auto") {
            params.set_language(None);
            params.set_detect_language(true);
        } else {
            params.set_language(Some(&self.cfg.lang));
            params.set_detect_language(false);
        }
        params.set_temperature(self.cfg.temperature);
        // Limit CPU usage so small boards don't max out all cores.
        params.set_n_threads(num_cpus::get().min(8) as i32);
        params.set_print_progress(false);
        params.set_print_timestamps(false);
        params.set_print_special(false);
        params.set_print_realtime(false);
        params.set_translate(false);
        params.set_token_timestamps(false);

        state.full(params, samples)?;

        let mut transcript = String::new();
        let num_segments = match state.full_n_segments() {
            Ok(count) => count,
            Err(err) => {
                debug!(error = %err, "whisper failed to read segment count");
                return Ok(transcript);
            }
        };
        if num_segments < 0 {
            debug!("whisper returned a negative segment count");
            return Ok(transcript);
        }
        // Whisper splits output into small segments; stitch them together.
        for i in 0..num_segments {
            match state.full_get_segment_text_lossy(i) {
                Ok(text) => transcript.push_str(&text),
                Err(err) => debug!(segment = i, error = %err, "failed to read whisper segment"),
            }
        }

        Ok(normalize_transcript(&transcript))
    }
}

/// Strip Whisper's blank-audio marker and collapse whitespace.
fn normalize_transcript(raw: &str) -> String {
    let filtered = raw.replace("[BLANK_AUDIO]", "");
    filtered.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn install_whisper_log_silencer() {
    static INSTALL_LOG_CALLBACK: Once = Once::new();
    INSTALL_LOG_CALLBACK.call_once(|| unsafe {
        whisper_rs::set_log_callback(Some(whisper_log_callback), std::ptr::null_mut());
    });
}

unsafe extern "C" fn whisper_log_callback(
    _level: c_uint,
    _text: *const c_char,
    _user_data: *mut c_void,
) {
    // Silence the default whisper.cpp logger; tracing owns stderr.
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcriber_rejects_missing_model() {
        let result = Transcriber::new(SttConfig {
            model_path: "/no/such/model.bin".to_string(),
            lang: "sv".to_string(),
            beam_size: 0,
            temperature: 0.0,
        });
        assert!(result.is_err());
    }

    #[test]
    fn blank_audio_marker_is_stripped() {
        assert_eq!(normalize_transcript(" [BLANK_AUDIO] "), "");
        assert_eq!(
            normalize_transcript("  tänd   lampan [BLANK_AUDIO] "),
            "tänd lampan"
        );
    }
}
