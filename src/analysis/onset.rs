//! Onset detection on the energy envelope.
//!
//! Peaks of the envelope above an adaptive `mean + k * std` threshold become
//! onsets; a minimum spacing suppresses double triggers on one transient.

use crate::analysis::envelope::{build_envelope, EnergyEnvelope};
use crate::config::{AnalysisConfig, OnsetConfig};

/// Detected transient positions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OnsetSet {
    /// Strictly increasing sample positions.
    pub positions: Vec<usize>,
    /// Sample rate the positions refer to.
    pub sample_rate: u32,
}

impl OnsetSet {
    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Onset times in seconds.
    pub fn times_secs(&self) -> Vec<f64> {
        self.positions
            .iter()
            .map(|&p| p as f64 / self.sample_rate as f64)
            .collect()
    }

    /// Consecutive differences in samples.
    pub fn intervals(&self) -> Vec<usize> {
        self.positions.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

/// Minimum onset spacing in samples.
#[inline]
fn min_spacing_samples(sample_rate: u32, config: &OnsetConfig) -> usize {
    (sample_rate as f64 * config.min_spacing_ms as f64 / 1000.0).round() as usize
}

/// Returns true if `values[i]` is a peak: above its left neighbour, and above
/// the first differing value to its right (so a flat top counts once, at its
/// leading edge).
#[inline]
fn is_peak(values: &[f32], i: usize) -> bool {
    if i == 0 || i + 1 >= values.len() || values[i] <= values[i - 1] {
        return false;
    }
    let mut j = i + 1;
    while j < values.len() && values[j] == values[i] {
        j += 1;
    }
    j < values.len() && values[j] < values[i]
}

/// Picks onsets from an energy envelope.
///
/// Each onset is placed at the center of its envelope window. Candidates
/// closer than `min_spacing_ms` to the previously accepted onset are dropped.
pub fn detect_onsets(envelope: &EnergyEnvelope, config: &OnsetConfig) -> OnsetSet {
    let mut onsets = OnsetSet {
        positions: Vec::new(),
        sample_rate: envelope.sample_rate,
    };
    if envelope.len() < 3 {
        return onsets;
    }

    let peak = envelope.values.iter().copied().fold(0.0f32, f32::max);
    if peak < config.silence_floor {
        log::debug!("Envelope peak {:.2e} below silence floor, no onsets", peak);
        return onsets;
    }

    let (mean, std) = envelope.mean_std();
    let threshold = mean + config.threshold_std * std;
    let spacing = min_spacing_samples(envelope.sample_rate, config);
    let half_window = envelope.window_samples / 2;

    let mut last: Option<usize> = None;
    for i in 1..envelope.len() - 1 {
        if envelope.values[i] <= threshold || !is_peak(&envelope.values, i) {
            continue;
        }
        let pos = envelope.window_start(i) + half_window;
        if let Some(prev) = last {
            if pos - prev < spacing {
                continue;
            }
        }
        onsets.positions.push(pos);
        last = Some(pos);
    }

    log::debug!(
        "Detected {} onsets (threshold {:.5}, spacing {} samples)",
        onsets.len(),
        threshold,
        spacing
    );
    onsets
}

/// Moves each onset to the loudest sample of the envelope window it came from.
///
/// Envelope windows overlap, so the window index alone is only accurate to a
/// hop; refinement makes inter-onset intervals sample-accurate for sharp
/// transients. Onsets that end up violating ordering or spacing are dropped.
pub fn refine_onsets(
    onsets: &mut OnsetSet,
    envelope: &EnergyEnvelope,
    samples: &[f32],
    config: &OnsetConfig,
) {
    let half_window = envelope.window_samples / 2;
    let spacing = min_spacing_samples(onsets.sample_rate, config);

    let mut refined: Vec<usize> = Vec::with_capacity(onsets.len());
    for &pos in &onsets.positions {
        let start = pos.saturating_sub(half_window);
        let end = (start + envelope.window_samples).min(samples.len());
        if start >= end {
            continue;
        }
        let loudest = samples[start..end]
            .iter()
            .enumerate()
            .fold((0usize, -1.0f32), |best, (i, &s)| {
                if s.abs() > best.1 {
                    (i, s.abs())
                } else {
                    best
                }
            })
            .0;
        let candidate = start + loudest;
        match refined.last() {
            Some(&prev) if candidate <= prev || candidate - prev < spacing => {}
            _ => refined.push(candidate),
        }
    }
    onsets.positions = refined;
}

/// Runs envelope construction, onset picking and (optionally) refinement.
pub fn onsets_from_signal(samples: &[f32], sample_rate: u32, config: &AnalysisConfig) -> (EnergyEnvelope, OnsetSet) {
    let envelope = build_envelope(samples, sample_rate, &config.envelope);
    let mut onsets = detect_onsets(&envelope, &config.onset);
    if config.onset.refine {
        refine_onsets(&mut onsets, &envelope, samples, &config.onset);
    }
    (envelope, onsets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(values: Vec<f32>, hop: usize, sample_rate: u32) -> EnergyEnvelope {
        EnergyEnvelope {
            values,
            window_samples: hop * 4,
            hop_samples: hop,
            sample_rate,
        }
    }

    /// Decaying 15 ms bursts of a 2 kHz tone every `interval` samples.
    fn burst_track(interval: usize, sample_rate: u32, num_samples: usize) -> Vec<f32> {
        let burst_len = (0.015 * sample_rate as f64) as usize;
        let mut out = vec![0.0f32; num_samples];
        for start in (interval / 2..num_samples).step_by(interval) {
            for j in 0..burst_len.min(num_samples - start) {
                let t = j as f32 / sample_rate as f32;
                let decay = (-(j as f32) / (burst_len as f32 / 4.0)).exp();
                out[start + j] = 0.9 * decay * (2.0 * std::f32::consts::PI * 2000.0 * t).sin();
            }
        }
        out
    }

    #[test]
    fn test_is_peak_strict_and_plateau() {
        let v = [0.0, 1.0, 0.5, 2.0, 2.0, 1.0, 3.0, 3.0, 4.0];
        assert!(is_peak(&v, 1));
        assert!(!is_peak(&v, 2));
        // Plateau that falls afterwards counts at its leading edge
        assert!(is_peak(&v, 3));
        assert!(!is_peak(&v, 4));
        // Shelf that keeps rising is not a peak
        assert!(!is_peak(&v, 6));
        // Edges never count
        assert!(!is_peak(&v, 0));
        assert!(!is_peak(&v, 8));
    }

    #[test]
    fn test_min_spacing_discards_close_peaks() {
        // hop = 441 samples = 10 ms at 44.1 kHz; peaks at 1, 11 (100 ms apart), 41 (400 ms)
        let mut values = vec![0.0f32; 60];
        values[1] = 1.0;
        values[11] = 0.9;
        values[41] = 1.0;
        let onsets = detect_onsets(&envelope(values, 441, 44100), &OnsetConfig::default());
        assert_eq!(onsets.len(), 2);
        assert!(onsets.positions[1] - onsets.positions[0] >= 13230);
    }

    #[test]
    fn test_below_threshold_ignored() {
        let mut values = vec![0.5f32; 40];
        values[10] = 0.5001;
        values[30] = 2.0;
        let onsets = detect_onsets(&envelope(values, 441, 44100), &OnsetConfig::default());
        assert_eq!(onsets.len(), 1);
    }

    #[test]
    fn test_silence_yields_no_onsets() {
        let onsets = detect_onsets(&envelope(vec![0.0; 100], 441, 44100), &OnsetConfig::default());
        assert!(onsets.is_empty());
    }

    #[test]
    fn test_tiny_envelope_yields_no_onsets() {
        let onsets = detect_onsets(&envelope(vec![1.0, 2.0], 441, 44100), &OnsetConfig::default());
        assert!(onsets.is_empty());
    }

    #[test]
    fn test_burst_track_onsets_sample_accurate() {
        let sr = 44100u32;
        let interval = 22050; // 500 ms
        let samples = burst_track(interval, sr, sr as usize * 8);
        let (_, onsets) = onsets_from_signal(&samples, sr, &AnalysisConfig::default());

        assert!(onsets.len() >= 14, "expected ~16 onsets, got {}", onsets.len());
        for w in onsets.positions.windows(2) {
            assert!(w[1] > w[0]);
        }
        for iv in onsets.intervals() {
            let err = (iv as i64 - interval as i64).abs();
            assert!(err < 50, "interval {} too far from {}", iv, interval);
        }
    }

    #[test]
    fn test_times_secs() {
        let onsets = OnsetSet {
            positions: vec![0, 22050, 44100],
            sample_rate: 44100,
        };
        assert_eq!(onsets.times_secs(), vec![0.0, 0.5, 1.0]);
        assert_eq!(onsets.intervals(), vec![22050, 22050]);
    }
}
