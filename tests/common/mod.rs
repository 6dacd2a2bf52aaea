#![allow(dead_code)]

use std::f32::consts::PI;

use beatshift::{BeatshiftError, StreamProcessor, VocoderParams};
use rustfft::{num_complex::Complex, FftPlanner};

/// Routes `log` output to the test harness; set `RUST_LOG=debug` to see it.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn gen_sine<F>(freq_hz: f32, sr: u32, n: usize, amp_fn: F) -> Vec<f32>
where
    F: Fn(usize) -> f32,
{
    (0..n)
        .map(|i| {
            let phase = 2.0 * PI * freq_hz * i as f32 / sr as f32;
            amp_fn(i) * phase.sin()
        })
        .collect()
}

/// Sum of equal-amplitude sines, scaled to stay inside [-1, 1].
pub fn gen_chord(freqs: &[f32], sr: u32, n: usize) -> Vec<f32> {
    let amp = 0.8 / freqs.len().max(1) as f32;
    let mut out = vec![0.0f32; n];
    for &f in freqs {
        for (o, s) in out.iter_mut().zip(gen_sine(f, sr, n, |_| amp)) {
            *o += s;
        }
    }
    out
}

/// Decaying 15 ms bursts of a 2 kHz tone, one per beat, starting at sample 0.
pub fn gen_click_track(bpm: f64, sr: u32, secs: f64) -> Vec<f32> {
    let n = (secs * sr as f64) as usize;
    let interval = 60.0 * sr as f64 / bpm;
    let burst_len = (0.015 * sr as f64) as usize;
    let mut out = vec![0.0f32; n];
    let mut beat = 0usize;
    loop {
        let start = (beat as f64 * interval).round() as usize;
        if start >= n {
            break;
        }
        for j in 0..burst_len.min(n - start) {
            let t = j as f32 / sr as f32;
            let decay = (-(j as f32) / (burst_len as f32 / 4.0)).exp();
            out[start + j] = 0.9 * decay * (2.0 * PI * 2000.0 * t).sin();
        }
        beat += 1;
    }
    out
}

pub fn windowed_rms(signal: &[f32], start: usize, len: usize) -> f64 {
    if signal.is_empty() || len == 0 {
        return 0.0;
    }
    let start = start.min(signal.len());
    let end = (start + len).min(signal.len());
    if end <= start {
        return 0.0;
    }
    let sum_sq: f64 = signal[start..end]
        .iter()
        .map(|&s| {
            let v = s as f64;
            v * v
        })
        .sum();
    (sum_sq / (end - start) as f64).sqrt()
}

pub fn rmse(reference: &[f32], test: &[f32], start: usize, end: usize) -> f64 {
    let end = end.min(reference.len()).min(test.len());
    if end <= start {
        return f64::INFINITY;
    }
    let sum_sq: f64 = reference[start..end]
        .iter()
        .zip(&test[start..end])
        .map(|(&r, &t)| {
            let d = r as f64 - t as f64;
            d * d
        })
        .sum();
    (sum_sq / (end - start) as f64).sqrt()
}

/// Frequency of the strongest FFT bin over `len` samples starting at `start`.
pub fn peak_frequency(signal: &[f32], sr: u32, start: usize, len: usize) -> f64 {
    let end = (start + len).min(signal.len());
    if end <= start {
        return 0.0;
    }
    let n = end - start;
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);
    let mut buf: Vec<Complex<f32>> = signal[start..end]
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            let w = 0.5 - 0.5 * (2.0 * PI * i as f32 / n as f32).cos();
            Complex::new(s * w, 0.0)
        })
        .collect();
    fft.process(&mut buf);
    let peak = (1..n / 2)
        .max_by(|&a, &b| buf[a].norm().total_cmp(&buf[b].norm()))
        .unwrap_or(0);
    peak as f64 * sr as f64 / n as f64
}

/// Feeds `input` through a streaming session in fixed blocks and returns
/// everything the processor produced, including the flushed tail.
pub fn run_streaming(
    input: &[f32],
    params: VocoderParams,
    block: usize,
) -> Result<Vec<f32>, BeatshiftError> {
    let mut processor = StreamProcessor::new();
    processor.start(params)?;
    let mut output = Vec::new();
    let mut scratch = vec![0.0f32; block];
    for chunk in input.chunks(block.max(1)) {
        processor.push_input(chunk);
        while processor.available_output() > 0 {
            let ready = processor.available_output().min(scratch.len());
            let report = processor.drain_output(&mut scratch[..ready]);
            output.extend_from_slice(&scratch[..report.produced]);
        }
    }
    processor.flush();
    while processor.available_output() > 0 {
        let ready = processor.available_output().min(scratch.len());
        let report = processor.drain_output(&mut scratch[..ready]);
        output.extend_from_slice(&scratch[..report.produced]);
    }
    Ok(output)
}
