use super::{AppConfig, MAX_UTTERANCE_HARD_LIMIT_MS};
use crate::audio::{CaptureConfig, WakeConfig};
use crate::mqtt::MqttConfig;
use crate::stt::SttConfig;
use crate::tts::TtsConfig;
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::fs;
use std::path::Path;
use std::time::Duration;

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values, normalize topics and paths, fail fast on anything
    /// out of range. Diagnostic modes (`--list-input-devices`, `--doctor`)
    /// skip the checks that require a fully provisioned device.
    pub fn validate(&mut self) -> Result<()> {
        if !(8_000..=48_000).contains(&self.sample_rate) {
            bail!(
                "--sample-rate must be between 8000 and 48000 Hz, got {}",
                self.sample_rate
            );
        }
        if !(10..=120).contains(&self.frame_ms) {
            bail!("--frame-ms must be between 10 and 120, got {}", self.frame_ms);
        }
        if self.max_utterance_ms == 0 || self.max_utterance_ms > MAX_UTTERANCE_HARD_LIMIT_MS {
            bail!(
                "--max-utterance-ms must be between 1 and {MAX_UTTERANCE_HARD_LIMIT_MS}, got {}",
                self.max_utterance_ms
            );
        }
        if self.silence_end_ms < self.frame_ms || self.silence_end_ms > self.max_utterance_ms {
            bail!(
                "--silence-end-ms must be >= --frame-ms ({}) and <= --max-utterance-ms ({})",
                self.frame_ms,
                self.max_utterance_ms
            );
        }
        if self.min_utterance_ms >= self.max_utterance_ms {
            bail!(
                "--min-utterance-ms ({}) must be below --max-utterance-ms ({})",
                self.min_utterance_ms,
                self.max_utterance_ms
            );
        }
        if !(-120.0..=0.0).contains(&self.vad_threshold_db) {
            bail!(
                "--vad-threshold-db must be between -120.0 and 0.0 dB, got {}",
                self.vad_threshold_db
            );
        }
        if !(1..=10).contains(&self.vad_smoothing_frames) {
            bail!(
                "--vad-smoothing-frames must be between 1 and 10, got {}",
                self.vad_smoothing_frames
            );
        }
        if !(8..=1024).contains(&self.frame_channel_capacity) {
            bail!(
                "--frame-channel-capacity must be between 8 and 1024, got {}",
                self.frame_channel_capacity
            );
        }
        if !(1.0..=100.0).contains(&self.wake_spike_ratio) {
            bail!(
                "--wake-spike-ratio must be between 1.0 and 100.0, got {}",
                self.wake_spike_ratio
            );
        }
        if !(-120.0..=0.0).contains(&self.wake_min_level_db) {
            bail!(
                "--wake-min-level-db must be between -120.0 and 0.0 dB, got {}",
                self.wake_min_level_db
            );
        }

        #[cfg(not(feature = "vad_earshot"))]
        if matches!(self.vad_engine, super::VadEngineKind::Earshot) {
            bail!("--vad-engine earshot requires building with the 'vad_earshot' feature");
        }

        if self.whisper_beam_size > 10 {
            bail!(
                "--whisper-beam-size must be between 0 and 10, got {}",
                self.whisper_beam_size
            );
        }
        if !(0.0..=5.0).contains(&self.whisper_temperature) {
            bail!(
                "--whisper-temperature must be between 0.0 and 5.0, got {}",
                self.whisper_temperature
            );
        }
        validate_lang(&self.lang)?;

        if self.mqtt_qos > 2 {
            bail!("--mqtt-qos must be 0, 1, or 2, got {}", self.mqtt_qos);
        }
        if !(1..=600).contains(&self.reply_timeout_secs) {
            bail!(
                "--reply-timeout-secs must be between 1 and 600, got {}",
                self.reply_timeout_secs
            );
        }
        if !(5..=600).contains(&self.mqtt_keepalive_secs) {
            bail!(
                "--mqtt-keepalive-secs must be between 5 and 600, got {}",
                self.mqtt_keepalive_secs
            );
        }
        if !(1..=100).contains(&self.connect_attempts) {
            bail!(
                "--connect-attempts must be between 1 and 100, got {}",
                self.connect_attempts
            );
        }
        if !(1..=100).contains(&self.max_reconnect_attempts) {
            bail!(
                "--max-reconnect-attempts must be between 1 and 100, got {}",
                self.max_reconnect_attempts
            );
        }
        if !(10..=60_000).contains(&self.connect_retry_ms) {
            bail!(
                "--connect-retry-ms must be between 10 and 60000, got {}",
                self.connect_retry_ms
            );
        }
        if !(10..=60_000).contains(&self.reconnect_backoff_ms) {
            bail!(
                "--reconnect-backoff-ms must be between 10 and 60000, got {}",
                self.reconnect_backoff_ms
            );
        }
        if self.mqtt_client_id.trim().is_empty() {
            bail!("--mqtt-client-id must not be empty");
        }
        self.request_topic = validate_topic(&self.request_topic, "--request-topic")?;
        self.base_reply_topic = validate_topic(&self.base_reply_topic, "--base-reply-topic")?;

        if self.diagnostics_mode() {
            return Ok(());
        }

        let host = self
            .mqtt_host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| anyhow!("--mqtt-host (or VOICEBRIDGE_MQTT_HOST) is required"))?;
        self.mqtt_host = Some(host.to_string());

        if let Some(ca) = &self.mqtt_ca_file {
            if !ca.exists() {
                bail!("--mqtt-ca-file '{}' does not exist", ca.display());
            }
        }

        self.whisper_model_path = Some(canonical_existing_file(
            self.whisper_model_path.as_deref(),
            "--whisper-model-path (or VOICEBRIDGE_WHISPER_MODEL)",
        )?);
        self.piper_model = Some(canonical_existing_file(
            self.piper_model.as_deref(),
            "--piper-model (or VOICEBRIDGE_PIPER_MODEL)",
        )?);
        self.piper_bin = sanitize_binary(&self.piper_bin, "--piper-bin", &["piper"])?;
        self.player_cmd = sanitize_binary(&self.player_cmd, "--player-cmd", &["aplay", "paplay", "play"])?;

        Ok(())
    }

    /// True when the invocation only prints diagnostics and exits.
    pub fn diagnostics_mode(&self) -> bool {
        self.list_input_devices || self.doctor
    }

    /// Snapshot of the capture/VAD settings for the audio pipeline.
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.sample_rate,
            frame_ms: self.frame_ms,
            silence_end_ms: self.silence_end_ms,
            max_utterance_ms: self.max_utterance_ms,
            channel_capacity: self.frame_channel_capacity,
            vad_threshold_db: self.vad_threshold_db,
            vad_smoothing_frames: self.vad_smoothing_frames,
        }
    }

    pub fn wake_config(&self) -> WakeConfig {
        WakeConfig {
            spike_ratio: self.wake_spike_ratio,
            min_level_db: self.wake_min_level_db,
        }
    }

    pub fn stt_config(&self) -> Result<SttConfig> {
        Ok(SttConfig {
            model_path: self
                .whisper_model_path
                .clone()
                .ok_or_else(|| anyhow!("whisper model path missing; run validate() first"))?,
            lang: self.lang.clone(),
            beam_size: self.whisper_beam_size,
            temperature: self.whisper_temperature,
        })
    }

    pub fn tts_config(&self) -> Result<TtsConfig> {
        Ok(TtsConfig {
            piper_bin: self.piper_bin.clone(),
            model_path: self
                .piper_model
                .clone()
                .ok_or_else(|| anyhow!("piper model path missing; run validate() first"))?,
            player_cmd: self.player_cmd.clone(),
            keep_wav: self.keep_wav,
        })
    }

    /// Build the broker settings, reading the CA file if TLS is requested.
    pub fn mqtt_config(&self) -> Result<MqttConfig> {
        let host = self
            .mqtt_host
            .clone()
            .ok_or_else(|| anyhow!("mqtt host missing; run validate() first"))?;
        let ca = match &self.mqtt_ca_file {
            Some(path) => Some(
                fs::read(path)
                    .with_context(|| format!("failed to read CA file '{}'", path.display()))?,
            ),
            None => None,
        };
        Ok(MqttConfig {
            host,
            port: self.mqtt_port,
            client_id: self.mqtt_client_id.clone(),
            username: self.mqtt_username.clone(),
            password: self.mqtt_password.clone(),
            ca,
            keepalive: Duration::from_secs(self.mqtt_keepalive_secs),
            qos: self.mqtt_qos,
            request_topic: self.request_topic.clone(),
            base_reply_topic: self.base_reply_topic.clone(),
            connect_attempts: self.connect_attempts,
            connect_retry: Duration::from_millis(self.connect_retry_ms),
            max_reconnect_attempts: self.max_reconnect_attempts,
            reconnect_backoff: Duration::from_millis(self.reconnect_backoff_ms),
        })
    }
}

/// Language must be 'auto' or a locale-style tag such as `sv` or `en-US`.
fn validate_lang(lang: &str) -> Result<()> {
    if lang.trim().is_empty() {
        bail!("--lang must not be empty");
    }
    if lang.eq_ignore_ascii_case("auto") {
        return Ok(());
    }
    if !lang
        .chars()
        .all(|ch| ch.is_ascii_alphabetic() || ch == '-' || ch == '_')
    {
        bail!("--lang must contain only alphabetic characters or '-'/'_' separators");
    }
    let primary = lang.split(['-', '_']).next().unwrap_or("");
    if !(2..=3).contains(&primary.len()) {
        bail!("--lang must start with a 2- or 3-letter language code, got '{lang}'");
    }
    Ok(())
}

/// Topics must be plain paths; wildcards belong to the subscription the
/// channel derives itself. Trailing slashes are stripped so reply-topic
/// derivation stays deterministic.
fn validate_topic(topic: &str, flag: &str) -> Result<String> {
    let trimmed = topic.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        bail!("{flag} must not be empty");
    }
    if trimmed.contains(['+', '#']) {
        bail!("{flag} must not contain MQTT wildcards, got '{topic}'");
    }
    if trimmed.chars().any(char::is_whitespace) {
        bail!("{flag} must not contain whitespace, got '{topic}'");
    }
    Ok(trimmed.to_string())
}

fn canonical_existing_file(value: Option<&str>, flag: &str) -> Result<String> {
    let raw = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow!("{flag} is required"))?;
    let path = Path::new(raw);
    if !path.exists() {
        bail!("{flag} '{raw}' does not exist");
    }
    let canonical = path
        .canonicalize()
        .with_context(|| format!("failed to canonicalize {flag} '{raw}'"))?;
    if !canonical.is_file() {
        bail!("{flag} '{}' is not a file", canonical.display());
    }
    canonical
        .to_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("{flag} must be valid UTF-8"))
}

/// Allow either a known binary name (resolved via PATH) or an existing
/// executable path.
fn sanitize_binary(value: &str, flag: &str, allowlist: &[&str]) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("{flag} cannot be empty");
    }
    if let Some(allowed) = allowlist
        .iter()
        .find(|candidate| candidate.eq_ignore_ascii_case(trimmed))
    {
        return Ok((*allowed).to_string());
    }

    let path = Path::new(trimmed);
    if path.is_absolute() || trimmed.contains(std::path::MAIN_SEPARATOR) {
        let canonical = path
            .canonicalize()
            .with_context(|| format!("failed to canonicalize {flag} '{trimmed}'"))?;
        let metadata = fs::metadata(&canonical)
            .with_context(|| format!("failed to inspect {flag} '{}'", canonical.display()))?;
        if !metadata.is_file() {
            bail!("{flag} '{}' is not a file", canonical.display());
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = metadata.permissions().mode();
            if mode & 0o111 == 0 {
                bail!(
                    "{flag} '{}' exists but is not executable (mode {:o})",
                    canonical.display(),
                    mode
                );
            }
        }
        return canonical
            .to_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("{flag} must be valid UTF-8"));
    }

    bail!("{flag} must be one of {allowlist:?} or an existing binary path");
}
