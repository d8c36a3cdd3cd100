use super::AppConfig;
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};

static STUB_SEQ: AtomicUsize = AtomicUsize::new(0);

fn touch(name: &str) -> PathBuf {
    let seq = STUB_SEQ.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!(
        "voicebridge_cfg_{}_{seq}_{name}",
        process::id()
    ));
    fs::write(&path, b"stub").expect("write stub file");
    path
}

fn diag_config(extra: &[&str]) -> AppConfig {
    let mut args = vec!["voicebridge", "--list-input-devices"];
    args.extend_from_slice(extra);
    AppConfig::parse_from(args)
}

/// Full config pointing at stub model files so the non-diagnostic path
/// validates end to end.
fn full_config(extra: &[&str]) -> (AppConfig, PathBuf, PathBuf) {
    let whisper = touch("whisper.bin");
    let piper = touch("piper.onnx");
    let whisper_arg = whisper.to_str().expect("utf8 path").to_string();
    let piper_arg = piper.to_str().expect("utf8 path").to_string();
    let mut args = vec![
        "voicebridge",
        "--mqtt-host",
        "broker.local",
        "--whisper-model-path",
        &whisper_arg,
        "--piper-model",
        &piper_arg,
    ];
    args.extend_from_slice(extra);
    let config = AppConfig::parse_from(args);
    (config, whisper, piper)
}

#[test]
fn defaults_validate_in_diagnostics_mode() {
    let mut config = diag_config(&[]);
    config.validate().expect("diagnostic defaults should validate");
}

#[test]
fn missing_host_is_rejected() {
    let mut config = AppConfig::parse_from(["voicebridge"]);
    let err = config.validate().expect_err("host is required");
    assert!(err.to_string().contains("--mqtt-host"), "got: {err}");
}

#[test]
fn full_config_validates_and_normalizes_topics() {
    let (mut config, whisper, piper) = full_config(&["--base-reply-topic", "voice/replies/"]);
    config.validate().expect("full config should validate");
    assert_eq!(config.base_reply_topic, "voice/replies");
    fs::remove_file(whisper).ok();
    fs::remove_file(piper).ok();
}

#[test]
fn wildcard_topics_are_rejected() {
    let mut config = diag_config(&["--request-topic", "voice/#"]);
    let err = config.validate().expect_err("wildcard should fail");
    assert!(err.to_string().contains("wildcards"), "got: {err}");
}

#[test]
fn qos_above_two_is_rejected() {
    let mut config = diag_config(&["--mqtt-qos", "3"]);
    assert!(config.validate().is_err());
}

#[test]
fn silence_end_must_cover_at_least_one_frame() {
    let mut config = diag_config(&["--frame-ms", "30", "--silence-end-ms", "20"]);
    assert!(config.validate().is_err());
}

#[test]
fn min_utterance_must_stay_below_max() {
    let mut config = diag_config(&["--min-utterance-ms", "12000", "--max-utterance-ms", "12000"]);
    assert!(config.validate().is_err());
}

#[test]
fn sample_rate_bounds_are_enforced() {
    let mut config = diag_config(&["--sample-rate", "4000"]);
    assert!(config.validate().is_err());
    let mut config = diag_config(&["--sample-rate", "96000"]);
    assert!(config.validate().is_err());
}

#[test]
fn lang_accepts_locale_tags_and_auto() {
    for lang in ["sv", "en-US", "auto", "nb_NO"] {
        let mut config = diag_config(&["--lang", lang]);
        assert!(config.validate().is_ok(), "lang '{lang}' should validate");
    }
    for lang in ["", "x", "sv!se", "1234"] {
        let mut config = diag_config(&["--lang", lang]);
        assert!(config.validate().is_err(), "lang '{lang}' should fail");
    }
}

#[test]
fn unknown_bare_player_is_rejected() {
    let (mut config, whisper, piper) = full_config(&["--player-cmd", "mystery-player"]);
    let err = config.validate().expect_err("unlisted binary should fail");
    assert!(err.to_string().contains("--player-cmd"), "got: {err}");
    fs::remove_file(whisper).ok();
    fs::remove_file(piper).ok();
}

#[test]
fn missing_whisper_model_is_rejected() {
    let mut config = AppConfig::parse_from([
        "voicebridge",
        "--mqtt-host",
        "broker.local",
        "--whisper-model-path",
        "/no/such/model.bin",
    ]);
    assert!(config.validate().is_err());
}

#[test]
fn capture_config_snapshot_copies_settings() {
    let mut config = diag_config(&["--frame-ms", "20", "--silence-end-ms", "600"]);
    config.validate().expect("valid");
    let capture = config.capture_config();
    assert_eq!(capture.frame_ms, 20);
    assert_eq!(capture.silence_end_ms, 600);
    assert_eq!(capture.sample_rate, config.sample_rate);
    assert_eq!(capture.max_utterance_ms, config.max_utterance_ms);
}

#[test]
fn mqtt_config_snapshot_carries_broker_settings() {
    let (mut config, whisper, piper) = full_config(&["--mqtt-port", "1883", "--mqtt-qos", "2"]);
    config.validate().expect("valid");
    let mqtt = config.mqtt_config().expect("mqtt config");
    assert_eq!(mqtt.host, "broker.local");
    assert_eq!(mqtt.port, 1883);
    assert_eq!(mqtt.qos, 2);
    assert!(mqtt.ca.is_none());
    fs::remove_file(whisper).ok();
    fs::remove_file(piper).ok();
}
