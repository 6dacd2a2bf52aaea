//! Window functions for spectral analysis and resynthesis.
//!
//! The chromagram uses a symmetric Hann window. The phase vocoder uses the
//! periodic variant, whose squared overlap sums to a constant at hop = size/4.

use std::f64::consts::PI;

/// Window function types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowType {
    /// Symmetric Hann (endpoints both zero).
    Hann,
    /// Periodic Hann (DFT-even), used for analysis/resynthesis pairs.
    PeriodicHann,
}

/// Generates a window function of the specified type and size.
pub fn generate_window(window_type: WindowType, size: usize) -> Vec<f32> {
    match window_type {
        WindowType::Hann => hann_window(size, size.saturating_sub(1)),
        WindowType::PeriodicHann => hann_window(size, size),
    }
}

/// Returns `Some(trivial_window)` for degenerate sizes (0 or 1), or `None`
/// to indicate the caller should compute the full window.
#[inline]
fn trivial_window(size: usize) -> Option<Vec<f32>> {
    match size {
        0 => Some(vec![]),
        1 => Some(vec![1.0]),
        _ => None,
    }
}

/// Generates a Hann window with the given period denominator.
#[inline]
fn hann_window(size: usize, period: usize) -> Vec<f32> {
    if let Some(w) = trivial_window(size) {
        return w;
    }
    let n = period as f64;
    (0..size)
        .map(|i| {
            let x = (2.0 * PI * i as f64) / n;
            (0.5 * (1.0 - x.cos())) as f32
        })
        .collect()
}

/// Sum of squared window coefficients.
#[inline]
pub fn window_energy(window: &[f32]) -> f32 {
    window.iter().map(|&w| w * w).sum()
}
