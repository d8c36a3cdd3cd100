use anyhow::Result;
use std::time::Duration;
use tracing::info;
use voicebridge::audio::{EnergySpikeTrigger, Recorder, UtteranceSegmenter};
use voicebridge::config::AppConfig;
use voicebridge::mqtt::RequestReplyChannel;
use voicebridge::orchestrator::{Orchestrator, SessionConfig};
use voicebridge::stt::Transcriber;
use voicebridge::telemetry::init_tracing;
use voicebridge::tts::PiperSpeaker;
use voicebridge::CancelToken;

fn main() {
    if let Err(err) = run() {
        eprintln!("voicebridge: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = AppConfig::parse_args()?;
    init_tracing(config.log_json);

    if config.list_input_devices {
        return list_input_devices();
    }
    if config.doctor {
        return doctor(&config);
    }

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.cancel())?;
    }

    let recorder = Recorder::new(config.input_device.as_deref())?;
    info!(device = %recorder.device_name(), "using input device");

    let transcriber = Transcriber::new(config.stt_config()?)?;
    let speaker = PiperSpeaker::new(config.tts_config()?);
    let channel = RequestReplyChannel::connect(config.mqtt_config()?)?;

    let capture_cfg = config.capture_config();
    let session_cfg = SessionConfig::from_capture(
        &capture_cfg,
        config.min_utterance_ms,
        &config.lang,
        Duration::from_secs(config.reply_timeout_secs),
    );
    let segmenter = UtteranceSegmenter::new(
        recorder,
        capture_cfg,
        Box::new(EnergySpikeTrigger::new(config.wake_config())),
        config.vad_engine,
    );

    let mut orchestrator = Orchestrator::new(
        segmenter,
        transcriber,
        speaker,
        &channel,
        session_cfg,
        cancel,
    );
    let outcome = orchestrator.run();
    drop(orchestrator);

    channel.shutdown();
    outcome
}

fn list_input_devices() -> Result<()> {
    let devices = Recorder::list_devices()?;
    if devices.is_empty() {
        println!("No audio input devices detected.");
        return Ok(());
    }
    println!("Audio input devices:");
    for name in devices {
        println!("  {name}");
    }
    Ok(())
}

/// Print a quick environment report without touching the microphone loop or
/// the broker.
fn doctor(config: &AppConfig) -> Result<()> {
    println!("voicebridge doctor");

    match Recorder::list_devices() {
        Ok(devices) if devices.is_empty() => println!("  audio: no input devices detected"),
        Ok(devices) => println!("  audio: {} input device(s) detected", devices.len()),
        Err(err) => println!("  audio: enumeration failed ({err})"),
    }

    report_path("whisper model", config.whisper_model_path.as_deref());
    report_path("piper model", config.piper_model.as_deref());
    println!("  piper binary: {}", config.piper_bin);
    println!("  player: {}", config.player_cmd);
    println!(
        "  vad engine: {} (threshold {} dB)",
        config.vad_engine.label(),
        config.vad_threshold_db
    );

    match &config.mqtt_host {
        Some(host) => println!(
            "  broker: {}:{} (tls: {})",
            host,
            config.mqtt_port,
            if config.mqtt_ca_file.is_some() { "on" } else { "off" }
        ),
        None => println!("  broker: not configured (set --mqtt-host or VOICEBRIDGE_MQTT_HOST)"),
    }
    println!(
        "  credentials: username {}, password {}",
        presence(config.mqtt_username.is_some()),
        presence(config.mqtt_password.is_some())
    );
    println!(
        "  topics: requests '{}', replies '{}/<corr_id>'",
        config.request_topic, config.base_reply_topic
    );
    Ok(())
}

fn report_path(label: &str, path: Option<&str>) {
    match path {
        Some(path) if std::path::Path::new(path).is_file() => {
            println!("  {label}: {path}");
        }
        Some(path) => println!("  {label}: {path} (missing)"),
        None => println!("  {label}: not set"),
    }
}

fn presence(set: bool) -> &'static str {
    if set {
        "set"
    } else {
        "not set"
    }
}
