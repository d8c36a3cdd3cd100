use super::capture::{capture_from_pcm, CaptureConfig, CaptureState, StopReason};
use super::dispatch::{downmix_into, FrameDispatcher};
use super::resample::{adjust_frame_length, resample_linear, resample_to_rate};
use super::vad::{rms_db, FrameLabel, SimpleThresholdVad, VadDecision, VadEngine, VadSmoother};
use super::wake::{EnergySpikeTrigger, WakeConfig, WakeTrigger};
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn test_cfg() -> CaptureConfig {
    CaptureConfig {
        sample_rate: 16_000,
        frame_ms: 30,
        silence_end_ms: 300,
        max_utterance_ms: 1_200,
        channel_capacity: 64,
        vad_threshold_db: -45.0,
        vad_smoothing_frames: 1,
    }
}

fn pcm(level: f32, ms: u64, sample_rate: u32) -> Vec<f32> {
    let samples = ((u64::from(sample_rate) * ms) / 1000) as usize;
    vec![level; samples]
}

#[test]
fn silence_only_runs_to_max_duration() {
    let cfg = test_cfg();
    let mut vad = SimpleThresholdVad::new(cfg.vad_threshold_db);
    let samples = pcm(0.0, 5_000, cfg.sample_rate);

    let result = capture_from_pcm(&samples, &cfg, &mut vad);

    assert_eq!(result.metrics.stop_reason, StopReason::MaxDuration);
    assert!(result.metrics.capture_ms >= cfg.max_utterance_ms);
    assert!(result.metrics.capture_ms < cfg.max_utterance_ms + cfg.frame_ms);
    assert_eq!(result.metrics.speech_ms, 0);
}

#[test]
fn silence_tail_after_speech_ends_capture() {
    let cfg = test_cfg();
    let mut vad = SimpleThresholdVad::new(cfg.vad_threshold_db);
    let mut samples = pcm(0.5, 300, cfg.sample_rate);
    samples.extend(pcm(0.0, 2_000, cfg.sample_rate));

    let result = capture_from_pcm(&samples, &cfg, &mut vad);

    match result.metrics.stop_reason {
        StopReason::SilenceAfterSpeech { tail_ms } => {
            assert!(tail_ms >= cfg.silence_end_ms);
        }
        other => panic!("unexpected stop reason: {other:?}"),
    }
    // Last speech frame ends at 300 ms; the capture must stop within one
    // frame of the silence tail completing, and never later than the
    // duration-cap bound.
    assert!(result.metrics.capture_ms >= 300 + cfg.silence_end_ms);
    assert!(result.metrics.capture_ms <= 300 + cfg.silence_end_ms + cfg.frame_ms);
    assert!(
        result.metrics.capture_ms
            <= cfg.max_utterance_ms.max(300 + cfg.silence_end_ms) + cfg.frame_ms
    );
    assert!(result.metrics.speech_ms >= 270);
}

#[test]
fn continuous_speech_stops_at_the_duration_cap() {
    let cfg = test_cfg();
    let mut vad = SimpleThresholdVad::new(cfg.vad_threshold_db);
    let samples = pcm(0.5, 5_000, cfg.sample_rate);

    let result = capture_from_pcm(&samples, &cfg, &mut vad);

    assert_eq!(result.metrics.stop_reason, StopReason::MaxDuration);
    assert!(result.metrics.capture_ms >= cfg.max_utterance_ms);
    assert!(result.metrics.capture_ms <= cfg.max_utterance_ms + cfg.frame_ms);
}

#[test]
fn all_frames_are_kept_including_silence() {
    let cfg = test_cfg();
    let mut vad = SimpleThresholdVad::new(cfg.vad_threshold_db);
    let mut samples = pcm(0.5, 120, cfg.sample_rate);
    samples.extend(pcm(0.0, 2_000, cfg.sample_rate));

    let result = capture_from_pcm(&samples, &cfg, &mut vad);

    // Captured duration matches elapsed capture time, not just speech time.
    let audio_ms = result.duration_ms(cfg.sample_rate);
    assert_eq!(audio_ms, result.metrics.capture_ms);
}

#[test]
fn speech_resets_silence_streak() {
    let cfg = test_cfg();
    let mut state = CaptureState::new(&cfg);

    assert!(state.on_frame(FrameLabel::Speech).is_none());
    for _ in 0..9 {
        assert!(state.on_frame(FrameLabel::Silence).is_none());
    }
    // Streak was 270 ms; one speech frame zeroes it.
    assert!(state.on_frame(FrameLabel::Speech).is_none());
    assert_eq!(state.silence_tail_ms(), 0);
}

#[test]
fn uncertain_frames_do_not_extend_the_silence_tail() {
    let cfg = test_cfg();
    let mut state = CaptureState::new(&cfg);

    state.on_frame(FrameLabel::Speech);
    state.on_frame(FrameLabel::Silence);
    state.on_frame(FrameLabel::Uncertain);
    assert_eq!(state.silence_tail_ms(), 0);
}

#[test]
fn starved_stream_still_hits_the_duration_cap() {
    let cfg = test_cfg();
    let mut state = CaptureState::new(&cfg);

    let mut stopped = None;
    for _ in 0..1_000 {
        if let Some(reason) = state.on_starved() {
            stopped = Some(reason);
            break;
        }
    }
    assert_eq!(stopped, Some(StopReason::StarvedTimeout));
    assert!(state.total_ms() >= cfg.max_utterance_ms);
}

#[test]
fn smoother_majority_vote_overrides_single_outlier() {
    let mut smoother = VadSmoother::new(3);
    assert_eq!(
        smoother.smooth(FrameLabel::Speech),
        FrameLabel::Speech
    );
    assert_eq!(
        smoother.smooth(FrameLabel::Speech),
        FrameLabel::Speech
    );
    // One silence frame among two speech frames stays speech.
    assert_eq!(
        smoother.smooth(FrameLabel::Silence),
        FrameLabel::Speech
    );
}

#[test]
fn smoother_window_of_one_passes_labels_through() {
    let mut smoother = VadSmoother::new(1);
    assert_eq!(
        smoother.smooth(FrameLabel::Silence),
        FrameLabel::Silence
    );
    assert_eq!(
        smoother.smooth(FrameLabel::Speech),
        FrameLabel::Speech
    );
}

#[test]
fn simple_vad_splits_on_threshold() {
    let mut vad = SimpleThresholdVad::new(-45.0);
    assert_eq!(vad.process_frame(&[0.5; 480]), VadDecision::Speech);
    assert_eq!(vad.process_frame(&[0.0001; 480]), VadDecision::Silence);
    assert_eq!(vad.process_frame(&[]), VadDecision::Uncertain);
}

#[test]
fn rms_db_floors_at_silence() {
    assert_eq!(rms_db(&[]), -120.0);
    assert!(rms_db(&[0.0; 480]) <= -119.0);
    assert!(rms_db(&[1.0; 480]) > -1.0);
}

#[test]
fn downmix_averages_stereo_pairs() {
    let mut buf = Vec::new();
    downmix_into(&mut buf, &[0.2f32, 0.4, 0.6, 0.8], 2, |s| s);
    assert_eq!(buf.len(), 2);
    assert!((buf[0] - 0.3).abs() < 1e-6);
    assert!((buf[1] - 0.7).abs() < 1e-6);
}

#[test]
fn dispatcher_slices_input_into_frames() {
    let (sender, receiver) = bounded(8);
    let dropped = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = FrameDispatcher::new(4, sender, dropped.clone());

    dispatcher.push(&[0.1f32; 10], 1, |s| s);
    assert_eq!(receiver.len(), 2);
    assert_eq!(receiver.recv().map(|f| f.len()), Ok(4));
    assert_eq!(dropped.load(Ordering::Relaxed), 0);
}

#[test]
fn dispatcher_counts_drops_when_channel_is_full() {
    let (sender, receiver) = bounded(1);
    let dropped = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = FrameDispatcher::new(4, sender, dropped.clone());

    dispatcher.push(&[0.1f32; 12], 1, |s| s);
    assert_eq!(receiver.len(), 1);
    assert_eq!(dropped.load(Ordering::Relaxed), 2);
}

#[test]
fn adjust_frame_length_pads_and_trims() {
    assert_eq!(adjust_frame_length(vec![1.0, 2.0], 4), vec![1.0, 2.0, 2.0, 2.0]);
    assert_eq!(adjust_frame_length(vec![1.0, 2.0, 3.0], 2), vec![1.0, 2.0]);
    assert_eq!(adjust_frame_length(Vec::new(), 2), vec![0.0, 0.0]);
}

#[test]
fn linear_resampler_scales_length_by_ratio() {
    let input = vec![0.0f32; 480];
    assert_eq!(resample_linear(&input, 0.5).len(), 240);
    assert_eq!(resample_linear(&input, 2.0).len(), 960);
}

#[test]
fn resample_passthrough_at_matching_rate() {
    let input = vec![0.25f32; 320];
    assert_eq!(resample_to_rate(&input, 16_000, 16_000), input);
}

#[test]
fn downsampling_48k_to_16k_thirds_the_length() {
    let input: Vec<f32> = (0..1440).map(|i| (i as f32 * 0.01).sin()).collect();
    let output = resample_to_rate(&input, 48_000, 16_000);
    assert_eq!(output.len(), 480);
}

#[test]
fn wake_trigger_fires_on_a_spike_over_quiet_baseline() {
    let mut trigger = EnergySpikeTrigger::new(WakeConfig {
        spike_ratio: 3.0,
        min_level_db: -40.0,
    });

    let mut fired = false;
    for _ in 0..20 {
        fired |= trigger.process_frame(&[0.005; 480]);
    }
    assert!(!fired, "baseline frames must not fire");
    assert!(trigger.process_frame(&[0.5; 480]));
}

#[test]
fn wake_trigger_ignores_quiet_spikes_below_the_level_gate() {
    let mut trigger = EnergySpikeTrigger::new(WakeConfig {
        spike_ratio: 3.0,
        min_level_db: -20.0,
    });

    for _ in 0..20 {
        trigger.process_frame(&[0.0005; 480]);
    }
    // Ten-fold spike, but still far below the -20 dB floor.
    assert!(!trigger.process_frame(&[0.005; 480]));
}

#[test]
fn wake_trigger_stays_silent_on_silence() {
    let mut trigger = EnergySpikeTrigger::new(WakeConfig::default());
    for _ in 0..50 {
        assert!(!trigger.process_frame(&[0.0; 480]));
    }
}
