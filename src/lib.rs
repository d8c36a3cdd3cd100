//! Voice front end for a remote workflow engine.
//!
//! The pipeline is: wait for a wake trigger, record the following utterance
//! with voice-activity endpointing, transcribe it locally with Whisper,
//! publish the text as a correlated MQTT request, wait for the matching
//! reply, and speak the reply back through Piper. The session loop is
//! strictly sequential; only the broker event loop runs on its own thread.

pub mod audio;
pub mod cancel;
pub mod config;
pub mod mqtt;
pub mod orchestrator;
pub mod stt;
pub mod telemetry;
pub mod tts;
#[cfg(feature = "vad_earshot")]
pub mod vad_earshot;

pub use cancel::CancelToken;
pub use orchestrator::{Orchestrator, SessionState};
