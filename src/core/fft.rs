//! FFT-related constants and utilities shared across the crate.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use crate::core::window::{generate_window, WindowType};

/// Zero-valued complex number, used for FFT buffer initialization.
pub const COMPLEX_ZERO: Complex<f32> = Complex::new(0.0, 0.0);

/// Minimum window sum (as a fraction of the steady-state overlap gain) to
/// prevent amplification in low-overlap regions during overlap-add normalization.
pub const WINDOW_SUM_FLOOR_RATIO: f32 = 0.1;

/// Absolute floor for window sum normalization to prevent division by zero.
pub const WINDOW_SUM_EPSILON: f32 = 1e-6;

/// Number of non-redundant bins of a real-input transform.
#[inline]
pub fn num_bins(fft_size: usize) -> usize {
    fft_size / 2 + 1
}

/// Center frequency in Hz of `bin` for a transform of `fft_size` points.
#[inline]
pub fn bin_frequency(bin: usize, fft_size: usize, sample_rate: u32) -> f64 {
    bin as f64 * sample_rate as f64 / fft_size as f64
}

/// Windowed magnitude spectrum with cached plan and buffers.
///
/// Reuses its buffers across calls, so repeated frames do not allocate.
pub struct MagnitudeSpectrum {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
}

impl MagnitudeSpectrum {
    /// Creates a spectrum analyzer for frames of `fft_size` samples.
    pub fn new(fft_size: usize, window_type: WindowType) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch_len = fft.get_inplace_scratch_len();
        Self {
            fft,
            window: generate_window(window_type, fft_size),
            buffer: vec![COMPLEX_ZERO; fft_size],
            scratch: vec![COMPLEX_ZERO; scratch_len],
            magnitudes: vec![0.0; num_bins(fft_size)],
        }
    }

    /// Transform size.
    #[inline]
    pub fn fft_size(&self) -> usize {
        self.buffer.len()
    }

    /// Windows `frame`, transforms it and returns `fft_size/2 + 1` magnitudes.
    ///
    /// Frames shorter than the transform are zero-padded.
    pub fn compute(&mut self, frame: &[f32]) -> &[f32] {
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = frame.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);
        for (mag, c) in self.magnitudes.iter_mut().zip(self.buffer.iter()) {
            *mag = c.norm();
        }
        &self.magnitudes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_bin_helpers() {
        assert_eq!(num_bins(4096), 2049);
        assert!((bin_frequency(1, 4096, 44100) - 10.7666).abs() < 1e-3);
    }

    #[test]
    fn test_magnitude_peak_at_sine_bin() {
        let n = 1024;
        let sr = 44100u32;
        // Exactly on bin 40
        let freq = 40.0 * sr as f32 / n as f32;
        let frame: Vec<f32> = (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / sr as f32).sin())
            .collect();
        let mut spec = MagnitudeSpectrum::new(n, WindowType::Hann);
        let mags = spec.compute(&frame);
        let peak = mags
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 40);
    }

    #[test]
    fn test_short_frame_zero_padded() {
        let mut spec = MagnitudeSpectrum::new(256, WindowType::Hann);
        let mags = spec.compute(&[0.0; 10]);
        assert_eq!(mags.len(), 129);
        assert!(mags.iter().all(|&m| m == 0.0));
    }
}
