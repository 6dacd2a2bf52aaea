//! Per-frame phase vocoder core: analysis, bin shift, phase integration and
//! windowed resynthesis.
//!
//! The streaming engine drives one [`PhaseVocoder`] per session. Every buffer
//! and FFT plan is created in [`PhaseVocoder::new`]; [`PhaseVocoder::process_frame`]
//! never allocates.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

use crate::core::fft::{num_bins, COMPLEX_ZERO};
use crate::core::window::{generate_window, WindowType};

const TWO_PI: f32 = 2.0 * PI;

/// Wraps a phase into `(-PI, PI]`.
#[inline]
pub fn wrap_phase(phase: f32) -> f32 {
    PI - (PI - phase).rem_euclid(TWO_PI)
}

/// Result of synthesizing one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The windowed output frame is ready.
    Synthesized,
    /// The frame contained non-finite values; it was zeroed and the phase
    /// state reset.
    Reset,
}

/// Phase vocoder state for one stream.
pub struct PhaseVocoder {
    frame_size: usize,
    hop_analysis: usize,
    num_bins: usize,
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    /// Shared scratch for both transforms.
    scratch: Vec<Complex<f32>>,
    spectrum: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
    /// Analysis phase of the current frame.
    phases: Vec<f32>,
    /// Analysis phase of the previous frame.
    prev_phase: Vec<f32>,
    /// Instantaneous frequency per bin in radians per sample.
    frequencies: Vec<f32>,
    shifted_magnitudes: Vec<f32>,
    shifted_frequencies: Vec<f32>,
    /// Output phase accumulator, kept wrapped.
    phase_accum: Vec<f32>,
    /// Nominal bin frequency in radians per sample.
    bin_omega: Vec<f32>,
    /// Windowed time-domain output of the last frame.
    output: Vec<f32>,
    first_frame: bool,
}

impl PhaseVocoder {
    /// Creates a vocoder for frames of `frame_size` taken every `hop_analysis` samples.
    pub fn new(frame_size: usize, hop_analysis: usize) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(frame_size);
        let inverse = planner.plan_fft_inverse(frame_size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        let bins = num_bins(frame_size);

        let bin_omega: Vec<f32> = (0..bins)
            .map(|bin| TWO_PI * bin as f32 / frame_size as f32)
            .collect();

        Self {
            frame_size,
            hop_analysis,
            num_bins: bins,
            window: generate_window(WindowType::PeriodicHann, frame_size),
            forward,
            inverse,
            scratch: vec![COMPLEX_ZERO; scratch_len],
            spectrum: vec![COMPLEX_ZERO; frame_size],
            magnitudes: vec![0.0; bins],
            phases: vec![0.0; bins],
            prev_phase: vec![0.0; bins],
            frequencies: vec![0.0; bins],
            shifted_magnitudes: vec![0.0; bins],
            shifted_frequencies: vec![0.0; bins],
            phase_accum: vec![0.0; bins],
            bin_omega,
            output: vec![0.0; frame_size],
            first_frame: true,
        }
    }

    #[inline]
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    #[inline]
    pub fn hop_analysis(&self) -> usize {
        self.hop_analysis
    }

    /// Analysis/synthesis window.
    #[inline]
    pub fn window(&self) -> &[f32] {
        &self.window
    }

    /// Windowed output of the most recent frame.
    #[inline]
    pub fn output(&self) -> &[f32] {
        &self.output
    }

    /// Forgets all phase history; the next frame re-seeds the accumulators.
    pub fn reset(&mut self) {
        self.prev_phase.iter_mut().for_each(|p| *p = 0.0);
        self.phase_accum.iter_mut().for_each(|p| *p = 0.0);
        self.first_frame = true;
    }

    /// Processes one analysis frame of `frame_size` samples.
    ///
    /// `synthesis_hop` is the distance in samples between this frame's output
    /// and the previous one's; `pitch_ratio` scales every bin's frequency.
    /// The windowed result is available from [`PhaseVocoder::output`].
    pub fn process_frame(&mut self, frame: &[f32], synthesis_hop: usize, pitch_ratio: f32) -> FrameOutcome {
        self.analyze(frame);
        self.shift_bins(pitch_ratio);
        self.advance_phases(synthesis_hop);
        self.synthesize()
    }

    /// Windowed forward transform, magnitude/phase split and instantaneous
    /// frequency estimate.
    fn analyze(&mut self, frame: &[f32]) {
        for (i, slot) in self.spectrum.iter_mut().enumerate() {
            let sample = frame.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * self.window[i], 0.0);
        }
        self.forward
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        let hop = self.hop_analysis as f32;
        for bin in 0..self.num_bins {
            let c = self.spectrum[bin];
            let phase = c.arg();
            self.magnitudes[bin] = c.norm();
            self.phases[bin] = phase;

            let omega = self.bin_omega[bin];
            self.frequencies[bin] = if self.first_frame {
                omega
            } else {
                let deviation = wrap_phase(phase - self.prev_phase[bin] - omega * hop);
                omega + deviation / hop
            };
            self.prev_phase[bin] = phase;
        }
    }

    /// Moves each bin `k` to `round(k * pitch_ratio)`, summing magnitudes
    /// that land together. Bins mapped past Nyquist are dropped.
    fn shift_bins(&mut self, pitch_ratio: f32) {
        if pitch_ratio == 1.0 {
            self.shifted_magnitudes.copy_from_slice(&self.magnitudes);
            self.shifted_frequencies.copy_from_slice(&self.frequencies);
            return;
        }
        self.shifted_magnitudes.iter_mut().for_each(|m| *m = 0.0);
        self.shifted_frequencies.iter_mut().for_each(|f| *f = 0.0);
        for bin in 0..self.num_bins {
            let target = (bin as f32 * pitch_ratio).round() as usize;
            if target >= self.num_bins {
                break;
            }
            self.shifted_magnitudes[target] += self.magnitudes[bin];
            self.shifted_frequencies[target] = self.frequencies[bin] * pitch_ratio;
        }
    }

    /// Integrates instantaneous frequency over the synthesis hop.
    fn advance_phases(&mut self, synthesis_hop: usize) {
        if self.first_frame {
            self.phase_accum.copy_from_slice(&self.phases);
            return;
        }
        let hop = synthesis_hop as f32;
        for (acc, &freq) in self.phase_accum.iter_mut().zip(self.shifted_frequencies.iter()) {
            *acc = wrap_phase(*acc + freq * hop);
        }
    }

    /// Inverse transform and synthesis window.
    fn synthesize(&mut self) -> FrameOutcome {
        for bin in 0..self.num_bins {
            self.spectrum[bin] = Complex::from_polar(self.shifted_magnitudes[bin], self.phase_accum[bin]);
        }
        for bin in 1..self.num_bins - 1 {
            self.spectrum[self.frame_size - bin] = self.spectrum[bin].conj();
        }
        self.inverse
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        let norm = 1.0 / self.frame_size as f32;
        let mut finite = true;
        for ((out, c), &w) in self.output.iter_mut().zip(self.spectrum.iter()).zip(self.window.iter()) {
            *out = c.re * norm * w;
            finite &= out.is_finite();
        }

        if !finite {
            self.output.iter_mut().for_each(|s| *s = 0.0);
            self.reset();
            return FrameOutcome::Reset;
        }
        self.first_frame = false;
        FrameOutcome::Synthesized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (TWO_PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    fn peak_bin(frame: &[f32]) -> usize {
        let n = frame.len();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(n);
        let mut buf: Vec<Complex<f32>> = frame.iter().map(|&s| Complex::new(s, 0.0)).collect();
        fft.process(&mut buf);
        (0..n / 2)
            .max_by(|&a, &b| buf[a].norm().total_cmp(&buf[b].norm()))
            .unwrap()
    }

    #[test]
    fn test_wrap_phase_half_open_range() {
        assert!((wrap_phase(0.0)).abs() < 1e-6);
        assert!((wrap_phase(PI) - PI).abs() < 1e-6);
        assert!((wrap_phase(-PI) - PI).abs() < 1e-6);
        assert!((wrap_phase(PI + 0.1) - (-PI + 0.1)).abs() < 1e-5);
        assert!((wrap_phase(-PI - 0.1) - (PI - 0.1)).abs() < 1e-5);
        assert!((wrap_phase(10.0 * PI + 0.5) - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_first_frame_reproduces_windowed_input() {
        let n = 1024;
        let input = sine(440.0, 44100.0, n);
        let mut pv = PhaseVocoder::new(n, n / 4);
        assert_eq!(pv.process_frame(&input, n / 4, 1.0), FrameOutcome::Synthesized);
        // Analysis and synthesis windows both applied
        for i in 0..n {
            let expected = input[i] * pv.window()[i] * pv.window()[i];
            assert!((pv.output()[i] - expected).abs() < 1e-4, "sample {}", i);
        }
    }

    #[test]
    fn test_pitch_shift_moves_peak() {
        let n = 2048;
        let sr = 44100.0;
        // Exactly on bin 40
        let freq = 40.0 * sr / n as f32;
        let input = sine(freq, sr, n * 4);
        let mut pv = PhaseVocoder::new(n, n / 4);
        let mut last = vec![0.0; n];
        for f in 0..12 {
            let start = f * n / 4;
            if start + n > input.len() {
                break;
            }
            pv.process_frame(&input[start..start + n], n / 4, 1.5);
            last.copy_from_slice(pv.output());
        }
        assert_eq!(peak_bin(&last), 60);
    }

    #[test]
    fn test_non_finite_frame_resets() {
        let n = 512;
        let mut pv = PhaseVocoder::new(n, n / 4);
        let mut frame = vec![0.1f32; n];
        frame[7] = f32::INFINITY;
        assert_eq!(pv.process_frame(&frame, n / 4, 1.0), FrameOutcome::Reset);
        assert!(pv.output().iter().all(|&s| s == 0.0));

        let clean = sine(1000.0, 44100.0, n);
        assert_eq!(pv.process_frame(&clean, n / 4, 1.0), FrameOutcome::Synthesized);
    }

    #[test]
    fn test_phase_accumulators_stay_wrapped() {
        let n = 512;
        let input = sine(3000.0, 44100.0, n * 40);
        let mut pv = PhaseVocoder::new(n, n / 4);
        for f in 0..150 {
            let start = f * n / 4;
            pv.process_frame(&input[start..start + n], n / 2, 1.0);
        }
        assert!(pv.phase_accum.iter().all(|p| p.abs() <= PI + 1e-6));
    }
}
