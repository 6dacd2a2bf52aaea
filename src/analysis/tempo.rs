//! Tempo estimation with octave correction.
//!
//! Two methods are provided: the mode of the inter-onset-interval BPM
//! histogram ([`estimate_tempo`]), and the peak of the onset-strength
//! autocorrelation ([`estimate_tempo_from_envelope`]). Both fold the raw
//! estimate into the configured plausible range by doubling or halving.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::analysis::envelope::EnergyEnvelope;
use crate::analysis::onset::{onsets_from_signal, OnsetSet};
use crate::config::{AnalysisConfig, TempoConfig, TempoMethod};
use crate::core::types::TempoEstimate;
use crate::error::BeatshiftError;

/// Minimum number of onsets needed to form one interval.
const MIN_ONSETS: usize = 2;
/// Histogram support below which alternate candidates are dropped.
const CANDIDATE_MIN_SUPPORT: f32 = 0.05;
/// Relative tempo multiples offered as candidates, with their weights.
const CANDIDATE_MULTIPLES: [(f64, f32); 4] = [(0.5, 0.6), (1.0, 1.0), (1.5, 0.4), (2.0, 0.8)];
/// Support weight of the double-time candidate offered for fast raw tempos.
const DOUBLE_TIME_WEIGHT: f32 = 0.9;
/// Confidence of that candidate when no interval supports it.
const DOUBLE_TIME_FLOOR: f32 = 0.4;
/// Triangular kernel applied to the onset-strength curve before correlation.
const STRENGTH_KERNEL: [f64; 5] = [1.0, 2.0, 3.0, 2.0, 1.0];
/// A shorter lag wins if its correlation reaches this fraction of the maximum.
const SHORT_LAG_PREFERENCE: f64 = 0.8;

/// One ranked tempo hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoCandidate {
    pub bpm: f64,
    pub confidence: f32,
}

/// Tempo at the start and end of a track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoDrift {
    pub start_bpm: f64,
    pub end_bpm: f64,
    /// `end_bpm - start_bpm`, rounded to 0.01 BPM.
    pub drift: f64,
    /// Lower of the two end estimates' confidences; 0.0 when unknown.
    pub confidence: f32,
}

impl TempoDrift {
    /// Drift of a track whose tempo could not be estimated.
    pub fn unknown() -> Self {
        Self {
            start_bpm: TempoEstimate::FALLBACK_BPM,
            end_bpm: TempoEstimate::FALLBACK_BPM,
            drift: 0.0,
            confidence: 0.0,
        }
    }

    #[inline]
    pub fn is_unknown(&self) -> bool {
        self.confidence <= 0.0
    }

    /// Signed drift to two decimals, or `--` when unknown.
    pub fn display(&self) -> String {
        if self.is_unknown() {
            "--".to_string()
        } else {
            format!("{:+.2}", self.drift)
        }
    }
}

/// BPM implied by each inter-onset interval.
fn implied_bpms(onsets: &OnsetSet) -> Vec<f64> {
    let sr = onsets.sample_rate as f64;
    onsets
        .positions
        .windows(2)
        .filter(|w| w[1] > w[0])
        .map(|w| 60.0 * sr / (w[1] - w[0]) as f64)
        .collect()
}

/// Fraction of `bpms` within `tolerance` of `candidate`.
#[inline]
fn support(bpms: &[f64], candidate: f64, tolerance: f64) -> f32 {
    if bpms.is_empty() {
        return 0.0;
    }
    let hits = bpms
        .iter()
        .filter(|&&b| (b - candidate).abs() <= tolerance)
        .count();
    hits as f32 / bpms.len() as f32
}

/// Picks the most populated histogram bin and refines it to the mean of the
/// values supporting it.
///
/// Bins are `tolerance` wide. Ties go to the bin with more support in its
/// immediate neighbours, then to the slower tempo.
fn histogram_mode(bpms: &[f64], tolerance: f64) -> Option<f64> {
    if bpms.is_empty() || tolerance <= 0.0 {
        return None;
    }
    let mut bins: BTreeMap<i64, usize> = BTreeMap::new();
    for &b in bpms {
        *bins.entry((b / tolerance).round() as i64).or_insert(0) += 1;
    }

    let neighbours = |bin: i64| -> usize {
        bins.get(&(bin - 1)).copied().unwrap_or(0) + bins.get(&(bin + 1)).copied().unwrap_or(0)
    };

    let mut best: Option<(i64, usize, usize)> = None;
    for (&bin, &count) in &bins {
        let around = neighbours(bin);
        let better = match best {
            None => true,
            Some((_, c, n)) => count > c || (count == c && around > n),
        };
        if better {
            best = Some((bin, count, around));
        }
    }

    let (bin, _, _) = best?;
    let center = bin as f64 * tolerance;
    let supporting: Vec<f64> = bpms
        .iter()
        .copied()
        .filter(|b| (b - center).abs() <= tolerance)
        .collect();
    if supporting.is_empty() {
        return Some(center);
    }
    Some(supporting.iter().sum::<f64>() / supporting.len() as f64)
}

/// Doubles or halves `bpm` until it lies in `[min_bpm, max_bpm]`.
///
/// Returns the folded BPM and the number of corrections, or `None` if the
/// value cannot be brought into range within `max_octave_corrections` steps.
pub fn fold_into_range(bpm: f64, config: &TempoConfig) -> Option<(f64, u8)> {
    if !bpm.is_finite() || bpm <= 0.0 {
        return None;
    }
    let mut value = bpm;
    let mut corrections = 0u8;
    while value < config.min_bpm || value > config.max_bpm {
        if corrections >= config.max_octave_corrections {
            return None;
        }
        if value < config.min_bpm {
            value *= 2.0;
        } else {
            value /= 2.0;
        }
        corrections += 1;
    }
    Some((value, corrections))
}

/// Applies octave folding and its confidence penalty to a raw estimate.
fn finalize(raw_bpm: f64, raw_confidence: f32, config: &TempoConfig) -> TempoEstimate {
    match fold_into_range(raw_bpm, config) {
        Some((bpm, corrections)) => {
            let confidence =
                raw_confidence * config.octave_penalty.powi(corrections as i32);
            TempoEstimate {
                bpm,
                confidence: confidence.clamp(0.0, 1.0),
                octave_corrections: corrections,
            }
        }
        None => {
            log::debug!(
                "Raw tempo {:.2} BPM cannot be folded into [{}, {}]",
                raw_bpm,
                config.min_bpm,
                config.max_bpm
            );
            TempoEstimate::fallback()
        }
    }
}

/// Estimates tempo from onset positions via the inter-onset-interval histogram.
///
/// Confidence is the fraction of intervals that agree with the winning
/// candidate, discounted by `octave_penalty` per octave correction. Fewer
/// than two onsets yield [`TempoEstimate::fallback`].
pub fn estimate_tempo(onsets: &OnsetSet, config: &TempoConfig) -> TempoEstimate {
    if onsets.len() < MIN_ONSETS || onsets.sample_rate == 0 {
        log::warn!(
            "Tempo unknown, falling back to {} BPM: {}",
            TempoEstimate::FALLBACK_BPM,
            BeatshiftError::InsufficientData {
                needed: MIN_ONSETS,
                found: onsets.len(),
            }
        );
        return TempoEstimate::fallback();
    }

    let bpms = implied_bpms(onsets);
    let Some(raw) = histogram_mode(&bpms, config.tolerance_bpm) else {
        return TempoEstimate::fallback();
    };
    let raw_confidence = support(&bpms, raw, config.tolerance_bpm);

    let estimate = finalize(raw, raw_confidence, config);
    log::debug!(
        "Tempo from {} intervals: raw {:.2} -> {:.2} BPM (confidence {:.2}, {} corrections)",
        bpms.len(),
        raw,
        estimate.bpm,
        estimate.confidence,
        estimate.octave_corrections
    );
    estimate
}

/// Half-wave rectified first difference of the envelope, smoothed so that
/// periods falling between envelope frames still correlate.
fn onset_strength(envelope: &EnergyEnvelope) -> Vec<f64> {
    let raw: Vec<f64> = envelope
        .values
        .windows(2)
        .map(|w| (w[1] as f64 - w[0] as f64).max(0.0))
        .collect();
    let half = STRENGTH_KERNEL.len() / 2;
    let norm: f64 = STRENGTH_KERNEL.iter().sum();
    (0..raw.len())
        .map(|i| {
            STRENGTH_KERNEL
                .iter()
                .enumerate()
                .filter_map(|(k, &w)| (i + k).checked_sub(half).and_then(|j| raw.get(j)).map(|v| v * w))
                .sum::<f64>()
                / norm
        })
        .collect()
}

/// Estimates tempo from the autocorrelation of the envelope's onset strength.
///
/// Among local maxima of the normalized autocorrelation inside the BPM range,
/// the shortest lag reaching `SHORT_LAG_PREFERENCE` of the global maximum is
/// chosen, then refined by parabolic interpolation. Its correlation is the
/// confidence.
pub fn estimate_tempo_from_envelope(envelope: &EnergyEnvelope, config: &TempoConfig) -> TempoEstimate {
    if envelope.len() < 3 || envelope.hop_samples == 0 {
        return TempoEstimate::fallback();
    }

    let strength = onset_strength(envelope);
    let energy: f64 = strength.iter().map(|v| v * v).sum();
    if energy <= f64::EPSILON {
        return TempoEstimate::fallback();
    }

    let frames_per_minute = 60.0 * envelope.sample_rate as f64 / envelope.hop_samples as f64;
    let lag_min = ((frames_per_minute / config.max_bpm).floor() as usize).max(1);
    let lag_max = ((frames_per_minute / config.min_bpm).ceil() as usize).min(strength.len() - 1);
    if lag_min + 2 > lag_max {
        return TempoEstimate::fallback();
    }

    let corr = |lag: usize| -> f64 {
        strength
            .iter()
            .zip(strength.iter().skip(lag))
            .map(|(a, b)| a * b)
            .sum::<f64>()
            / energy
    };

    // values[i] holds lag lo + i; one extra lag each side for interpolation
    let lo = lag_min - 1;
    let hi = (lag_max + 1).min(strength.len() - 1);
    let values: Vec<f64> = (lo..=hi).map(|lag| if lag == 0 { 0.0 } else { corr(lag) }).collect();
    let first = lag_min - lo;
    let last = (lag_max - lo).min(values.len() - 1);

    let global = values[first..=last].iter().copied().fold(f64::MIN, f64::max);
    if global <= 0.0 {
        return TempoEstimate::fallback();
    }
    let is_local_max = |i: usize| {
        values[i] >= values[i - 1] && (i + 1 >= values.len() || values[i] >= values[i + 1])
    };
    let best = (first..=last)
        .find(|&i| is_local_max(i) && values[i] >= SHORT_LAG_PREFERENCE * global)
        .unwrap_or(first);

    let mut lag = (best + lo) as f64;
    if best + 1 < values.len() {
        let (a, b, c) = (values[best - 1], values[best], values[best + 1]);
        let denom = a - 2.0 * b + c;
        if denom.abs() > f64::EPSILON {
            lag += (0.5 * (a - c) / denom).clamp(-0.5, 0.5);
        }
    }

    let raw = frames_per_minute / lag;
    let confidence = values[best].clamp(0.0, 1.0) as f32;
    log::debug!(
        "Autocorrelation tempo: lag {:.2} frames -> {:.2} BPM (r = {:.3})",
        lag,
        raw,
        confidence
    );
    finalize(raw, confidence, config)
}

/// Runs the configured tempo pipeline on a mono signal.
pub fn estimate_tempo_for_signal(samples: &[f32], sample_rate: u32, config: &AnalysisConfig) -> TempoEstimate {
    let (envelope, onsets) = onsets_from_signal(samples, sample_rate, config);
    match config.tempo.method {
        TempoMethod::IntervalHistogram => estimate_tempo(&onsets, &config.tempo),
        TempoMethod::EnvelopeAutocorrelation => estimate_tempo_from_envelope(&envelope, &config.tempo),
    }
}

/// Adds a candidate, merging with one that rounds to the same BPM.
fn push_candidate(candidates: &mut Vec<TempoCandidate>, bpm: f64, confidence: f32) {
    match candidates.iter().position(|c| c.bpm.round() == bpm.round()) {
        Some(i) => candidates[i].confidence = candidates[i].confidence.max(confidence),
        None => candidates.push(TempoCandidate { bpm, confidence }),
    }
}

/// Ranks half-time, primary, 1.5x and double-time hypotheses.
///
/// Each multiple of the primary estimate is scored by the fraction of raw
/// intervals supporting it, times a fixed weight. When the unfolded raw tempo
/// exceeds `double_time_raw_min`, twice the raw tempo is offered as well.
/// Candidates outside the BPM range, with negligible support or below
/// `candidate_prune_threshold` are dropped; if nothing survives, the primary
/// estimate is returned alone.
pub fn tempo_candidates(onsets: &OnsetSet, config: &TempoConfig) -> Vec<TempoCandidate> {
    let primary = estimate_tempo(onsets, config);
    if primary.is_unknown() {
        return vec![TempoCandidate {
            bpm: primary.bpm,
            confidence: 0.0,
        }];
    }

    let bpms = implied_bpms(onsets);
    let mut candidates: Vec<TempoCandidate> = Vec::new();
    for &(multiple, weight) in &CANDIDATE_MULTIPLES {
        let bpm = primary.bpm * multiple;
        if bpm < config.min_bpm || bpm > config.max_bpm {
            continue;
        }
        let confidence = if multiple == 1.0 {
            primary.confidence
        } else {
            support(&bpms, bpm, config.tolerance_bpm) * weight
        };
        if confidence <= CANDIDATE_MIN_SUPPORT {
            continue;
        }
        push_candidate(&mut candidates, bpm, confidence);
    }

    let raw = histogram_mode(&bpms, config.tolerance_bpm);
    if let (Some(raw), Some(raw_min)) = (raw, config.double_time_raw_min) {
        let bpm = raw * 2.0;
        if raw > raw_min && bpm >= config.min_bpm && bpm <= config.max_bpm {
            let supported = support(&bpms, bpm, config.tolerance_bpm) * DOUBLE_TIME_WEIGHT;
            let confidence = if supported > 0.0 { supported } else { DOUBLE_TIME_FLOOR };
            push_candidate(&mut candidates, bpm, confidence);
        }
    }

    if config.candidate_prune_threshold > 0.0 {
        candidates.retain(|c| c.confidence >= config.candidate_prune_threshold);
    }
    if candidates.is_empty() {
        candidates.push(TempoCandidate {
            bpm: primary.bpm,
            confidence: primary.confidence,
        });
    }
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    candidates
}

/// Compares the tempo of the first and last `drift_window_secs` of a track.
///
/// An end without a usable estimate falls back to the whole-track tempo. If
/// that is unknown too, the result is [`TempoDrift::unknown`].
pub fn detect_tempo_drift(samples: &[f32], sample_rate: u32, config: &AnalysisConfig) -> TempoDrift {
    let overall = estimate_tempo_for_signal(samples, sample_rate, config);
    let window = ((config.tempo.drift_window_secs * sample_rate as f64) as usize).min(samples.len());

    let head = estimate_tempo_for_signal(&samples[..window], sample_rate, config);
    let tail = estimate_tempo_for_signal(&samples[samples.len() - window..], sample_rate, config);

    let pick = |part: TempoEstimate| if part.is_unknown() { overall } else { part };
    let (start, end) = (pick(head), pick(tail));
    if start.is_unknown() || end.is_unknown() {
        log::debug!("Tempo drift unknown: no usable estimate at either end");
        return TempoDrift::unknown();
    }
    TempoDrift {
        start_bpm: start.bpm,
        end_bpm: end.bpm,
        drift: ((end.bpm - start.bpm) * 100.0).round() / 100.0,
        confidence: start.confidence.min(end.confidence),
    }
}
