//! Key estimation by template matching.
//!
//! The pitch-class profile is correlated against the Krumhansl-Kessler major
//! and minor profiles rotated to each of the 12 tonics.
//!
//! # Reference
//!
//! Krumhansl, C. L., & Kessler, E. J. (1982). Tracing the Dynamic Changes in Perceived
//! Tonal Organization in a Spatial Representation of Musical Keys. *Psychological Review*,
//! 89(4), 334-368.

use serde::{Deserialize, Serialize};

use crate::analysis::chroma::{Chromagram, PitchClassProfile};
use crate::config::KeyConfig;
use crate::core::types::{KeyEstimate, Mode, PitchClass};

/// Krumhansl-Kessler major profile, tonic first.
pub const KK_MAJOR: [f32; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];

/// Krumhansl-Kessler minor profile, tonic first.
pub const KK_MINOR: [f32; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

/// Largest upward transposition tried by the capo check.
const CAPO_MAX_SHIFT: usize = 2;

/// Correlation of one tonic/mode template with a profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyScore {
    pub tonic: PitchClass,
    pub mode: Mode,
    /// Pearson correlation in [-1, 1].
    pub score: f32,
}

impl KeyScore {
    fn to_estimate(self) -> KeyEstimate {
        KeyEstimate {
            tonic: self.tonic,
            mode: self.mode,
            confidence: self.score.clamp(0.0, 1.0),
        }
    }
}

/// Pearson correlation of `profile` with `template` rotated to `tonic`.
///
/// Returns `None` when either side has zero variance.
fn pearson_rotated(profile: &[f32; 12], template: &[f32; 12], tonic: usize) -> Option<f32> {
    let rotated = |pc: usize| template[(pc + 12 - tonic) % 12] as f64;
    let mean_x = profile.iter().map(|&v| v as f64).sum::<f64>() / 12.0;
    let mean_y = template.iter().map(|&v| v as f64).sum::<f64>() / 12.0;

    let (mut cov, mut var_x, mut var_y) = (0.0f64, 0.0f64, 0.0f64);
    for (pc, &x) in profile.iter().enumerate() {
        let dx = x as f64 - mean_x;
        let dy = rotated(pc) - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    let denom = (var_x * var_y).sqrt();
    if denom <= f64::EPSILON {
        return None;
    }
    Some((cov / denom) as f32)
}

/// Scores all 24 keys, in canonical order: C..B major, then C..B minor.
fn raw_scores(profile: &PitchClassProfile) -> Option<Vec<KeyScore>> {
    let mut scores = Vec::with_capacity(24);
    for (mode, template) in [(Mode::Major, &KK_MAJOR), (Mode::Minor, &KK_MINOR)] {
        for tonic in PitchClass::ALL {
            let score = pearson_rotated(profile.values(), template, tonic.index())?;
            scores.push(KeyScore { tonic, mode, score });
        }
    }
    Some(scores)
}

/// Index of the best score; earlier entries win ties within `epsilon`.
fn best_index(scores: &[KeyScore], epsilon: f32) -> usize {
    let mut best = 0;
    for (i, s) in scores.iter().enumerate().skip(1) {
        if s.score > scores[best].score + epsilon {
            best = i;
        }
    }
    best
}

/// Ranks all 24 keys by correlation with `profile`, best first.
///
/// Scores within `epsilon` of each other rank major before minor, then by
/// ascending pitch class. A flat profile yields an empty list.
pub fn key_scores(profile: &PitchClassProfile, epsilon: f32) -> Vec<KeyScore> {
    let Some(mut remaining) = raw_scores(profile) else {
        return Vec::new();
    };
    let mut ranked = Vec::with_capacity(remaining.len());
    while !remaining.is_empty() {
        let i = best_index(&remaining, epsilon);
        ranked.push(remaining.remove(i));
    }
    ranked
}

/// Ranks the profile as-is and transposed up by one and two semitones,
/// keeping whichever ranking has the clearly best top score, with tonics
/// named in the untransposed key.
fn capo_checked_scores(profile: &PitchClassProfile, epsilon: f32) -> Vec<KeyScore> {
    let mut best = key_scores(profile, epsilon);
    for shift in 1..=CAPO_MAX_SHIFT {
        let shifted = key_scores(&profile.transposed(shift), epsilon);
        let (Some(top), Some(current)) = (shifted.first(), best.first()) else {
            continue;
        };
        if top.score > current.score + epsilon {
            best = shifted
                .into_iter()
                .map(|s| KeyScore {
                    tonic: PitchClass::from_index(s.tonic.index() + 12 - shift),
                    ..s
                })
                .collect();
        }
    }
    best
}

/// Estimates the key of a chromagram.
///
/// An empty chromagram or a flat profile yields [`KeyEstimate::fallback`].
pub fn estimate_key(chroma: &Chromagram, config: &KeyConfig) -> KeyEstimate {
    key_candidates(chroma, config, 1)
        .into_iter()
        .next()
        .unwrap_or_else(KeyEstimate::fallback)
}

/// The `n` most likely keys, best first.
///
/// The summed profile is smoothed by `chroma_smooth_window` and, with
/// `capo_transposition_check`, also matched transposed.
pub fn key_candidates(chroma: &Chromagram, config: &KeyConfig, n: usize) -> Vec<KeyEstimate> {
    if chroma.is_empty() {
        log::warn!("No chroma frames above the energy floor, key unknown");
        return vec![KeyEstimate::fallback()];
    }
    let profile = chroma.profile().smoothed(config.chroma_smooth_window);
    let ranked = if config.capo_transposition_check {
        capo_checked_scores(&profile, config.tie_epsilon)
    } else {
        key_scores(&profile, config.tie_epsilon)
    };
    if ranked.is_empty() {
        log::warn!("Flat pitch-class profile, key unknown");
        return vec![KeyEstimate::fallback()];
    }

    let best = ranked[0];
    log::debug!(
        "Key estimate {}{} (r = {:.3}, runner-up r = {:.3})",
        best.tonic,
        if best.mode == Mode::Minor { "m" } else { "" },
        best.score,
        ranked.get(1).map(|s| s.score).unwrap_or(0.0)
    );
    ranked.into_iter().take(n.max(1)).map(KeyScore::to_estimate).collect()
}
