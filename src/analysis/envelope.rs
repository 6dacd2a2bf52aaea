//! Short-term RMS energy envelope.

use crate::config::EnvelopeConfig;

/// RMS energy per analysis window, one value per hop.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyEnvelope {
    /// Non-negative RMS values in time order.
    pub values: Vec<f32>,
    /// Window length in samples.
    pub window_samples: usize,
    /// Distance between consecutive windows in samples.
    pub hop_samples: usize,
    /// Sample rate of the source signal.
    pub sample_rate: u32,
}

impl EnergyEnvelope {
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sample position where envelope window `index` starts.
    #[inline]
    pub fn window_start(&self, index: usize) -> usize {
        index * self.hop_samples
    }

    /// Hop duration in milliseconds.
    #[inline]
    pub fn hop_ms(&self) -> f64 {
        self.hop_samples as f64 * 1000.0 / self.sample_rate as f64
    }

    /// Mean and population standard deviation of the envelope.
    pub fn mean_std(&self) -> (f32, f32) {
        if self.values.is_empty() {
            return (0.0, 0.0);
        }
        let n = self.values.len() as f64;
        let mean = self.values.iter().map(|&v| v as f64).sum::<f64>() / n;
        let var = self
            .values
            .iter()
            .map(|&v| {
                let d = v as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        (mean as f32, var.sqrt() as f32)
    }
}

/// Window and hop lengths in samples for the given configuration.
#[inline]
pub fn envelope_geometry(sample_rate: u32, config: &EnvelopeConfig) -> (usize, usize) {
    let window = ((sample_rate as f64 * config.window_ms as f64) / 1000.0).floor() as usize;
    let window = window.max(1);
    let hop = ((window as f64 * config.hop_fraction as f64).floor() as usize).max(1);
    (window, hop)
}

/// Builds the RMS energy envelope of a mono signal.
///
/// Window `i` covers samples `[i * hop, i * hop + window)`; only complete
/// windows are produced, so signals shorter than one window yield an empty
/// envelope.
pub fn build_envelope(samples: &[f32], sample_rate: u32, config: &EnvelopeConfig) -> EnergyEnvelope {
    let (window, hop) = envelope_geometry(sample_rate, config);

    let num_windows = if samples.len() >= window {
        (samples.len() - window) / hop + 1
    } else {
        0
    };

    let values: Vec<f32> = (0..num_windows)
        .map(|i| {
            let start = i * hop;
            let sum_sq: f64 = samples[start..start + window]
                .iter()
                .map(|&s| (s as f64) * (s as f64))
                .sum();
            (sum_sq / window as f64).sqrt() as f32
        })
        .collect();

    log::debug!(
        "Energy envelope: {} windows of {} samples (hop {})",
        values.len(),
        window,
        hop
    );

    EnergyEnvelope {
        values,
        window_samples: window,
        hop_samples: hop,
        sample_rate,
    }
}
