//! Command-line parsing and validation helpers.
//!
//! Every tunable lives on one clap-derived struct, validated once at startup
//! so the rest of the pipeline can assume in-range values and present paths.

mod defaults;
#[cfg(test)]
mod tests;
mod validation;

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

pub use defaults::{
    default_vad_engine, DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_RETRY_MS, DEFAULT_FRAME_CHANNEL_CAPACITY,
    DEFAULT_FRAME_MS, DEFAULT_MAX_UTTERANCE_MS, DEFAULT_MIN_UTTERANCE_MS, DEFAULT_MQTT_KEEPALIVE_SECS,
    DEFAULT_MQTT_PORT, DEFAULT_MQTT_QOS, DEFAULT_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_BACKOFF_MS,
    DEFAULT_REPLY_TIMEOUT_SECS, DEFAULT_SAMPLE_RATE, DEFAULT_SILENCE_END_MS, DEFAULT_VAD_SMOOTHING_FRAMES,
    DEFAULT_VAD_THRESHOLD_DB, DEFAULT_WAKE_MIN_LEVEL_DB, DEFAULT_WAKE_SPIKE_RATIO,
    MAX_UTTERANCE_HARD_LIMIT_MS, REQUEST_SOURCE_TAG,
};

/// CLI options for the voicebridge daemon. Validated values keep the audio
/// loops, subprocesses, and broker client within safe bounds.
#[derive(Debug, Parser, Clone)]
#[command(name = "voicebridge", about = "voicebridge: spoken commands in, workflow replies out", version)]
pub struct AppConfig {
    /// Preferred audio input device name
    #[arg(long = "input-device")]
    pub input_device: Option<String>,

    /// Pipeline sample rate (Hz); Whisper expects 16000
    #[arg(long = "sample-rate", default_value_t = DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,

    /// Audio frame duration (milliseconds)
    #[arg(long = "frame-ms", default_value_t = DEFAULT_FRAME_MS)]
    pub frame_ms: u64,

    /// Trailing silence that ends an utterance (milliseconds)
    #[arg(long = "silence-end-ms", default_value_t = DEFAULT_SILENCE_END_MS)]
    pub silence_end_ms: u64,

    /// Hard cap on one utterance (milliseconds)
    #[arg(long = "max-utterance-ms", default_value_t = DEFAULT_MAX_UTTERANCE_MS)]
    pub max_utterance_ms: u64,

    /// Captures shorter than this are discarded without transcription (milliseconds)
    #[arg(long = "min-utterance-ms", default_value_t = DEFAULT_MIN_UTTERANCE_MS)]
    pub min_utterance_ms: u64,

    /// Voice activity threshold for the simple VAD (decibels)
    #[arg(long = "vad-threshold-db", default_value_t = DEFAULT_VAD_THRESHOLD_DB)]
    pub vad_threshold_db: f32,

    /// VAD smoothing window (frames)
    #[arg(long = "vad-smoothing-frames", default_value_t = DEFAULT_VAD_SMOOTHING_FRAMES)]
    pub vad_smoothing_frames: usize,

    /// Voice activity detector implementation to use
    #[arg(long = "vad-engine", value_enum, default_value_t = default_vad_engine())]
    pub vad_engine: VadEngineKind,

    /// Frame channel capacity between the audio callback and the session thread
    #[arg(long = "frame-channel-capacity", default_value_t = DEFAULT_FRAME_CHANNEL_CAPACITY)]
    pub frame_channel_capacity: usize,

    /// Energy ratio over the ambient baseline that fires the wake trigger
    #[arg(long = "wake-spike-ratio", default_value_t = DEFAULT_WAKE_SPIKE_RATIO)]
    pub wake_spike_ratio: f32,

    /// Minimum frame level for the wake trigger to fire (decibels)
    #[arg(long = "wake-min-level-db", default_value_t = DEFAULT_WAKE_MIN_LEVEL_DB)]
    pub wake_min_level_db: f32,

    /// Path to the Whisper GGML model
    #[arg(long = "whisper-model-path", env = "VOICEBRIDGE_WHISPER_MODEL")]
    pub whisper_model_path: Option<String>,

    /// Whisper beam size (>1 enables beam search)
    #[arg(long = "whisper-beam-size", default_value_t = 0)]
    pub whisper_beam_size: u32,

    /// Whisper temperature
    #[arg(long = "whisper-temperature", default_value_t = 0.0)]
    pub whisper_temperature: f32,

    /// Language tag passed to Whisper and stamped into requests
    #[arg(long, default_value = "sv")]
    pub lang: String,

    /// Piper TTS binary
    #[arg(long = "piper-bin", default_value = "piper")]
    pub piper_bin: String,

    /// Path to the Piper voice model
    #[arg(long = "piper-model", env = "VOICEBRIDGE_PIPER_MODEL")]
    pub piper_model: Option<String>,

    /// Audio player used for synthesized WAV output
    #[arg(long = "player-cmd", default_value = "aplay")]
    pub player_cmd: String,

    /// Keep synthesized WAV files instead of deleting them after playback
    #[arg(long = "keep-wav", default_value_t = false)]
    pub keep_wav: bool,

    /// MQTT broker hostname
    #[arg(long = "mqtt-host", env = "VOICEBRIDGE_MQTT_HOST")]
    pub mqtt_host: Option<String>,

    /// MQTT broker port
    #[arg(long = "mqtt-port", default_value_t = DEFAULT_MQTT_PORT)]
    pub mqtt_port: u16,

    /// MQTT client identifier
    #[arg(long = "mqtt-client-id", default_value = "voicebridge")]
    pub mqtt_client_id: String,

    /// Broker username
    #[arg(long = "mqtt-username", env = "MQTT_USERNAME")]
    pub mqtt_username: Option<String>,

    /// Broker password
    #[arg(long = "mqtt-password", env = "MQTT_PASSWORD", hide_env_values = true)]
    pub mqtt_password: Option<String>,

    /// CA certificate (PEM); enables TLS when set
    #[arg(long = "mqtt-ca-file")]
    pub mqtt_ca_file: Option<PathBuf>,

    /// MQTT keepalive interval (seconds)
    #[arg(long = "mqtt-keepalive-secs", default_value_t = DEFAULT_MQTT_KEEPALIVE_SECS)]
    pub mqtt_keepalive_secs: u64,

    /// Quality-of-service level for publish and subscribe (0, 1, or 2)
    #[arg(long = "mqtt-qos", default_value_t = DEFAULT_MQTT_QOS)]
    pub mqtt_qos: u8,

    /// Topic requests are published to
    #[arg(long = "request-topic", default_value = "voice/requests")]
    pub request_topic: String,

    /// Base topic under which per-request reply topics are derived
    #[arg(long = "base-reply-topic", default_value = "voice/replies")]
    pub base_reply_topic: String,

    /// How long to wait for a correlated reply (seconds)
    #[arg(long = "reply-timeout-secs", default_value_t = DEFAULT_REPLY_TIMEOUT_SECS)]
    pub reply_timeout_secs: u64,

    /// Initial connection attempts before giving up
    #[arg(long = "connect-attempts", default_value_t = DEFAULT_CONNECT_ATTEMPTS)]
    pub connect_attempts: u32,

    /// Delay between initial connection attempts (milliseconds)
    #[arg(long = "connect-retry-ms", default_value_t = DEFAULT_CONNECT_RETRY_MS)]
    pub connect_retry_ms: u64,

    /// Reconnect attempts after an unexpected disconnect before the process exits
    #[arg(long = "max-reconnect-attempts", default_value_t = DEFAULT_RECONNECT_ATTEMPTS)]
    pub max_reconnect_attempts: u32,

    /// Base reconnect backoff, doubled per attempt (milliseconds)
    #[arg(long = "reconnect-backoff-ms", default_value_t = DEFAULT_RECONNECT_BACKOFF_MS)]
    pub reconnect_backoff_ms: u64,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Print environment diagnostics and exit
    #[arg(long = "doctor", default_value_t = false)]
    pub doctor: bool,

    /// Emit JSON log lines instead of human-readable ones
    #[arg(long = "log-json", default_value_t = false)]
    pub log_json: bool,
}

/// Available runtime-selectable VAD implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VadEngineKind {
    Earshot,
    Simple,
}

impl VadEngineKind {
    pub fn label(self) -> &'static str {
        match self {
            VadEngineKind::Earshot => "earshot",
            VadEngineKind::Simple => "simple",
        }
    }
}
