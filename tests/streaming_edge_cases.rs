mod common;

use std::sync::Arc;

use beatshift::{BeatshiftError, ProcessorState, Quality, StreamProcessor, StretchControl, VocoderParams};
use common::gen_sine;

const SR: u32 = 44_100;

fn started(params: VocoderParams) -> StreamProcessor {
    let mut processor = StreamProcessor::new();
    processor.start(params).expect("valid params");
    processor
}

#[test]
fn idle_processor_is_silent_and_cheap() {
    let mut processor = StreamProcessor::new();
    assert_eq!(processor.state(), ProcessorState::Idle);
    assert!(processor.params().is_none());

    let mut out = vec![0.3f32; 256];
    let report = processor.process(&[0.9; 256], &mut out);
    assert_eq!(report.produced, 0);
    assert_eq!(report.underrun, 0);
    assert!(out.iter().all(|&s| s == 0.0));
    assert_eq!(processor.flush(), 0);
}

#[test]
fn every_block_is_fully_written() {
    let input = gen_sine(440.0, SR, SR as usize, |_| 0.5);
    let mut processor = started(VocoderParams::new(0.8).with_max_block_size(512));
    let mut out = vec![0.0f32; 512];
    let mut produced = 0;
    for chunk in input.chunks(512) {
        let report = processor.process(chunk, &mut out[..chunk.len()]);
        assert_eq!(report.produced + report.underrun, chunk.len());
        assert_eq!(report.overrun, 0);
        produced += report.produced;
    }
    assert!(produced > 0);
}

#[test]
fn compressing_ratio_underruns_and_expanding_ratio_accumulates() {
    let input = gen_sine(440.0, SR, SR as usize, |_| 0.5);

    let mut fast = started(VocoderParams::new(0.5).with_max_block_size(512));
    let mut slow = started(VocoderParams::new(2.0).with_max_block_size(512));
    let mut out = vec![0.0f32; 512];
    let mut fast_underrun = 0;
    let mut slow_underrun = 0;
    for chunk in input.chunks(512) {
        fast_underrun += fast.process(chunk, &mut out).underrun;
        slow_underrun += slow.process(chunk, &mut out).underrun;
    }
    // At half duration only half of every block can be filled
    assert!(fast_underrun > input.len() / 3);
    // Only the lead-in blocks come up short
    assert!(slow_underrun <= 4 * 512);
    assert!(slow.available_output() > 8192);
}

#[test]
fn input_needed_is_sufficient() {
    let mut processor = started(VocoderParams::new(1.5).with_quality(Quality::Low));
    for _ in 0..8 {
        let need = processor.input_needed(700);
        let input = gen_sine(300.0, SR, need, |_| 0.5);
        processor.push_input(&input);
        assert!(processor.available_output() >= 700, "fed {} samples", need);

        let mut out = vec![0.0f32; 700];
        let report = processor.drain_output(&mut out);
        assert_eq!(report.underrun, 0);
    }
}

#[test]
fn ratio_change_applies_from_next_block() {
    let control = Arc::new(StretchControl::default());
    let mut processor = StreamProcessor::with_control(Arc::clone(&control));
    processor.start(VocoderParams::new(1.0).with_max_block_size(2048)).unwrap();

    let block = gen_sine(440.0, SR, 2048, |_| 0.5);
    // Prime past the lead-in
    processor.push_input(&block);
    let mut drain = vec![0.0f32; 8192];
    let ready = processor.available_output();
    processor.drain_output(&mut drain[..ready]);

    processor.push_input(&block);
    let at_unity = processor.available_output();
    processor.drain_output(&mut drain[..at_unity]);

    control.set_stretch_ratio(2.0);
    processor.push_input(&block);
    let at_double = processor.available_output();
    assert_eq!(at_unity, 2048);
    assert_eq!(at_double, 4096);
}

#[test]
fn start_overwrites_control_ratios() {
    let control = Arc::new(StretchControl::new(3.0, 0.5));
    let mut processor = StreamProcessor::with_control(Arc::clone(&control));
    processor
        .start(VocoderParams::new(1.2).with_pitch_semitones(2.0))
        .unwrap();
    let snapshot = control.snapshot();
    assert!((snapshot.stretch_ratio - 1.2).abs() < 1e-6);
    assert!((snapshot.pitch_ratio - 2f64.powf(2.0 / 12.0)).abs() < 1e-6);
}

#[test]
fn control_clamps_out_of_range_requests() {
    let processor = started(VocoderParams::default());
    let control = processor.control();
    assert_eq!(control.set_stretch_ratio(8.0), 4.0);
    assert_eq!(control.set_pitch_ratio(0.01), 0.25);
    assert_eq!(control.set_stretch_ratio(f64::INFINITY), 4.0);
}

#[test]
fn stop_request_from_another_thread() {
    let mut processor = started(VocoderParams::default().with_max_block_size(256));
    let control = processor.control();
    std::thread::spawn(move || control.request_stop())
        .join()
        .unwrap();

    let mut out = vec![1.0f32; 256];
    let report = processor.process(&[0.2; 256], &mut out);
    assert_eq!(report.state, ProcessorState::Idle);
    assert!(out.iter().all(|&s| s == 0.0));

    // A fresh start clears the request
    processor.start(VocoderParams::default()).unwrap();
    let report = processor.process(&[0.2; 256], &mut out);
    assert_eq!(report.state, ProcessorState::Streaming);
}

#[test]
fn non_finite_input_is_reported_and_silenced() {
    common::init_logging();
    let mut processor = started(VocoderParams::default().with_max_block_size(1024));
    let mut out = vec![0.0f32; 1024];
    let clean = gen_sine(440.0, SR, 1024, |_| 0.5);
    for _ in 0..4 {
        assert_eq!(processor.process(&clean, &mut out).anomalies, 0);
    }

    let mut bad = clean.clone();
    bad[10] = f32::INFINITY;
    bad[11] = f32::NAN;
    let report = processor.process(&bad, &mut out);
    assert_eq!(report.anomalies, 1);
    assert!(matches!(report.into_result(), Err(BeatshiftError::NumericAnomaly(_))));

    for _ in 0..4 {
        let report = processor.process(&clean, &mut out);
        assert_eq!(report.anomalies, 0);
        assert!(out.iter().all(|s| s.is_finite()));
    }
}

#[test]
fn flush_emits_the_tail() {
    let input = gen_sine(440.0, SR, 10_000, |_| 0.5);
    let mut processor = started(VocoderParams::default());
    for chunk in input.chunks(4096) {
        processor.push_input(chunk);
    }
    let latency = processor.latency_samples();
    let ready = processor.flush();
    assert!(ready >= input.len() + latency);

    let mut out = vec![0.0f32; ready];
    let report = processor.drain_output(&mut out);
    assert_eq!(report.produced, ready);
    // Last fed samples are present, not cut off
    let tail_rms = common::windowed_rms(&out, latency + input.len() - 512, 512);
    assert!(tail_rms > 0.3, "tail rms {}", tail_rms);
}
