use std::process::Command;

fn combined_output(output: &std::process::Output) -> String {
    let mut combined = String::new();
    combined.push_str(&String::from_utf8_lossy(&output.stdout));
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}

fn voicebridge_bin() -> &'static str {
    option_env!("CARGO_BIN_EXE_voicebridge").expect("voicebridge test binary not built")
}

#[test]
fn help_mentions_name() {
    let output = Command::new(voicebridge_bin())
        .arg("--help")
        .output()
        .expect("run voicebridge --help");
    assert!(output.status.success());
    let combined = combined_output(&output);
    assert!(combined.contains("voicebridge"));
}

#[test]
fn list_input_devices_prints_message() {
    let output = Command::new(voicebridge_bin())
        .arg("--list-input-devices")
        .output()
        .expect("run voicebridge --list-input-devices");
    assert!(output.status.success());
    let combined = combined_output(&output);
    assert!(
        combined.contains("input devices") || combined.contains("No audio input devices")
    );
}

#[test]
fn doctor_reports_broker_configuration() {
    let output = Command::new(voicebridge_bin())
        .arg("--doctor")
        .env_remove("VOICEBRIDGE_MQTT_HOST")
        .env_remove("MQTT_USERNAME")
        .env_remove("MQTT_PASSWORD")
        .output()
        .expect("run voicebridge --doctor");
    assert!(output.status.success());
    let combined = combined_output(&output);
    assert!(combined.contains("voicebridge doctor"));
    assert!(combined.contains("broker: not configured"));
}

#[test]
fn rejects_out_of_range_frame_duration() {
    let output = Command::new(voicebridge_bin())
        .args(["--doctor", "--frame-ms", "500"])
        .output()
        .expect("run voicebridge with bad frame duration");
    assert!(!output.status.success());
    let combined = combined_output(&output);
    assert!(combined.contains("--frame-ms"));
}
