//! Named defaults for the CLI surface so validation and tests share one
//! source of truth.

use super::VadEngineKind;

pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;
pub const DEFAULT_FRAME_MS: u64 = 30;
pub const DEFAULT_SILENCE_END_MS: u64 = 800;
pub const DEFAULT_MAX_UTTERANCE_MS: u64 = 12_000;
pub const DEFAULT_MIN_UTTERANCE_MS: u64 = 200;
pub const DEFAULT_VAD_THRESHOLD_DB: f32 = -45.0;
pub const DEFAULT_VAD_SMOOTHING_FRAMES: usize = 3;
pub const DEFAULT_FRAME_CHANNEL_CAPACITY: usize = 64;
pub const MAX_UTTERANCE_HARD_LIMIT_MS: u64 = 60_000;

pub const DEFAULT_WAKE_SPIKE_RATIO: f32 = 3.0;
pub const DEFAULT_WAKE_MIN_LEVEL_DB: f32 = -40.0;

pub const DEFAULT_MQTT_PORT: u16 = 8883;
pub const DEFAULT_MQTT_KEEPALIVE_SECS: u64 = 60;
pub const DEFAULT_MQTT_QOS: u8 = 1;
pub const DEFAULT_REPLY_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_CONNECT_RETRY_MS: u64 = 2_000;
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 1_000;

/// Fixed identifying string stamped into every published request.
pub const REQUEST_SOURCE_TAG: &str = "voicebridge";

pub fn default_vad_engine() -> VadEngineKind {
    #[cfg(feature = "vad_earshot")]
    {
        VadEngineKind::Earshot
    }
    #[cfg(not(feature = "vad_earshot"))]
    {
        VadEngineKind::Simple
    }
}
