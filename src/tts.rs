//! Piper text-to-speech playback.
//!
//! Synthesis shells out to the Piper binary with the text on stdin, writing
//! a WAV to a per-call temp file, then plays it with the configured player.
//! Playback problems are logged and swallowed; a dead speaker must not take
//! the whole session loop down with it.

use anyhow::{anyhow, Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{debug, warn};
use uuid::Uuid;

/// Settings for the speech output stage, resolved and validated at startup.
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub piper_bin: String,
    pub model_path: String,
    pub player_cmd: String,
    pub keep_wav: bool,
}

/// Speech output seam between the session loop and the synthesis backend.
pub trait SpeechOutput {
    fn speak(&mut self, text: &str) -> Result<()>;
}

/// Piper-subprocess speaker.
pub struct PiperSpeaker {
    cfg: TtsConfig,
}

impl PiperSpeaker {
    pub fn new(cfg: TtsConfig) -> Self {
        Self { cfg }
    }

    fn synthesize(&self, text: &str, wav_path: &PathBuf) -> Result<()> {
        let mut child = Command::new(&self.cfg.piper_bin)
            .arg("-m")
            .arg(&self.cfg.model_path)
            .arg("-f")
            .arg(wav_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to start piper '{}'", self.cfg.piper_bin))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .context("failed to write text to piper stdin")?;
        }

        let status = child.wait().context("failed to wait for piper")?;
        if !status.success() {
            return Err(anyhow!("piper exited with status {status}"));
        }
        if !wav_path.exists() {
            return Err(anyhow!("piper produced no output file"));
        }
        Ok(())
    }

    fn play(&self, wav_path: &PathBuf) -> Result<()> {
        let status = Command::new(&self.cfg.player_cmd)
            .arg(wav_path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| format!("failed to start player '{}'", self.cfg.player_cmd))?;
        if !status.success() {
            return Err(anyhow!("player exited with status {status}"));
        }
        Ok(())
    }
}

impl SpeechOutput for PiperSpeaker {
    fn speak(&mut self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let wav_path = std::env::temp_dir().join(format!(
            "voicebridge_tts_{}.wav",
            Uuid::new_v4().as_simple()
        ));

        let result = self
            .synthesize(text, &wav_path)
            .and_then(|()| self.play(&wav_path));

        if self.cfg.keep_wav {
            debug!(path = %wav_path.display(), "keeping synthesized wav");
        } else if let Err(err) = std::fs::remove_file(&wav_path) {
            // The file may not exist if synthesis failed before writing it.
            debug!(error = %err, path = %wav_path.display(), "could not remove wav");
        }

        if let Err(err) = result {
            warn!(error = %err, "speech output failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speaker(bin: &str) -> PiperSpeaker {
        PiperSpeaker::new(TtsConfig {
            piper_bin: bin.to_string(),
            model_path: "/no/such/voice.onnx".to_string(),
            player_cmd: "/no/such/player".to_string(),
            keep_wav: false,
        })
    }

    #[test]
    fn empty_text_is_a_no_op() {
        let mut speaker = speaker("/no/such/piper");
        assert!(speaker.speak("   ").is_ok());
    }

    #[test]
    fn failed_synthesis_does_not_error_the_caller() {
        let mut speaker = speaker("/no/such/piper");
        assert!(speaker.speak("hello").is_ok());
    }
}
