//! Configuration parameters for track analysis.
//!
//! Every struct implements `Default` with the canonical values and derives
//! serde with `#[serde(default)]`, so hosts can load partial settings from JSON:
//!
//! ```
//! let config = beatshift::AnalysisConfig::from_json(r#"{ "tempo": { "max_bpm": 180.0 } }"#)?;
//! assert_eq!(config.tempo.max_bpm, 180.0);
//! assert_eq!(config.tempo.min_bpm, 60.0);
//! # Ok::<(), beatshift::BeatshiftError>(())
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::BeatshiftError;

/// Energy envelope parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// RMS window length in milliseconds (default: 46.0).
    pub window_ms: f32,
    /// Hop as a fraction of the window (default: 0.25).
    pub hop_fraction: f32,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            window_ms: 46.0,
            hop_fraction: 0.25,
        }
    }
}

/// Onset picking parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnsetConfig {
    /// Threshold = mean + `threshold_std` standard deviations (default: 1.0).
    pub threshold_std: f32,
    /// Minimum spacing between accepted onsets in ms (default: 300.0).
    pub min_spacing_ms: f32,
    /// Envelopes whose peak RMS is below this are treated as silence (default: 1e-4).
    pub silence_floor: f32,
    /// Move onsets to the loudest sample within their window (default: true).
    pub refine: bool,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            threshold_std: 1.0,
            min_spacing_ms: 300.0,
            silence_floor: 1e-4,
            refine: true,
        }
    }
}

/// Tempo estimation algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TempoMethod {
    /// Mode of the inter-onset-interval BPM histogram.
    IntervalHistogram,
    /// Peak of the onset-strength autocorrelation.
    EnvelopeAutocorrelation,
}

/// Tempo estimation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    pub method: TempoMethod,
    /// Lowest plausible BPM (default: 60.0).
    pub min_bpm: f64,
    /// Highest plausible BPM (default: 200.0).
    pub max_bpm: f64,
    /// Histogram bin width and support tolerance in BPM (default: 2.0).
    pub tolerance_bpm: f64,
    /// Confidence multiplier per octave correction (default: 0.9).
    pub octave_penalty: f32,
    /// Doubling/halving attempts before giving up (default: 4).
    pub max_octave_corrections: u8,
    /// Length of the start/end windows for drift detection (default: 30.0).
    pub drift_window_secs: f64,
    /// Tempo candidates below this confidence are dropped; 0 keeps all (default: 0.6).
    pub candidate_prune_threshold: f32,
    /// Raw tempo above which twice the raw tempo is offered as a candidate;
    /// `None` disables it (default: 150.0).
    pub double_time_raw_min: Option<f64>,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            method: TempoMethod::IntervalHistogram,
            min_bpm: 60.0,
            max_bpm: 200.0,
            tolerance_bpm: 2.0,
            octave_penalty: 0.9,
            max_octave_corrections: 4,
            drift_window_secs: 30.0,
            candidate_prune_threshold: 0.6,
            double_time_raw_min: Some(150.0),
        }
    }
}

/// Chromagram parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromaConfig {
    /// FFT frame size (default: 4096).
    pub frame_size: usize,
    /// Hop between frames (default: 2048).
    pub hop_size: usize,
    /// Lowest folded frequency in Hz (default: 32.0).
    pub min_freq: f32,
    /// Highest folded frequency in Hz (default: 4200.0).
    pub max_freq: f32,
    /// Reference frequency of C0 in Hz.
    pub reference_c0: f64,
    /// Frames with RMS below this are skipped (default: 1e-4).
    pub energy_floor: f32,
}

impl Default for ChromaConfig {
    fn default() -> Self {
        Self {
            frame_size: 4096,
            hop_size: 2048,
            min_freq: 32.0,
            max_freq: 4200.0,
            reference_c0: 16.351_597_831_287_414,
            energy_floor: 1e-4,
        }
    }
}

/// Key estimation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Scores closer than this are tied; ties prefer major (default: 1e-6).
    pub tie_epsilon: f32,
    /// Width of the circular moving average applied across the pitch-class
    /// profile before matching; 1 disables it (default: 1).
    pub chroma_smooth_window: usize,
    /// Also match the profile transposed up one and two semitones and keep
    /// the best result, named in the original key (default: true).
    pub capo_transposition_check: bool,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            tie_epsilon: 1e-6,
            chroma_smooth_window: 1,
            capo_transposition_check: true,
        }
    }
}

/// Adjustments applied on top of the base configuration for one genre.
///
/// Unset fields leave the base value alone.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenreOverride {
    pub min_bpm: Option<f64>,
    pub max_bpm: Option<f64>,
    pub tolerance_bpm: Option<f64>,
    pub candidate_prune_threshold: Option<f32>,
    pub double_time_raw_min: Option<f64>,
    pub chroma_smooth_window: Option<usize>,
    pub capo_transposition_check: Option<bool>,
}

impl GenreOverride {
    fn apply(&self, config: &mut AnalysisConfig) {
        let tempo = &mut config.tempo;
        if let Some(v) = self.min_bpm {
            tempo.min_bpm = v;
        }
        if let Some(v) = self.max_bpm {
            tempo.max_bpm = v;
        }
        if let Some(v) = self.tolerance_bpm {
            tempo.tolerance_bpm = v;
        }
        if let Some(v) = self.candidate_prune_threshold {
            tempo.candidate_prune_threshold = v;
        }
        if self.double_time_raw_min.is_some() {
            tempo.double_time_raw_min = self.double_time_raw_min;
        }
        if let Some(v) = self.chroma_smooth_window {
            config.key.chroma_smooth_window = v;
        }
        if let Some(v) = self.capo_transposition_check {
            config.key.capo_transposition_check = v;
        }
    }
}

fn default_genre_overrides() -> BTreeMap<String, GenreOverride> {
    let rap = GenreOverride {
        double_time_raw_min: Some(170.0),
        ..GenreOverride::default()
    };
    BTreeMap::from([
        ("Club Rap".to_string(), rap.clone()),
        ("Pop Rap".to_string(), rap),
    ])
}

/// Full analysis configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub envelope: EnvelopeConfig,
    pub onset: OnsetConfig,
    pub tempo: TempoConfig,
    pub chroma: ChromaConfig,
    pub key: KeyConfig,
    /// Per-genre overrides, keyed by genre name.
    pub overrides: BTreeMap<String, GenreOverride>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            envelope: EnvelopeConfig::default(),
            onset: OnsetConfig::default(),
            tempo: TempoConfig::default(),
            chroma: ChromaConfig::default(),
            key: KeyConfig::default(),
            overrides: default_genre_overrides(),
        }
    }
}

impl AnalysisConfig {
    /// Configuration for tracks of `genre`.
    ///
    /// Overrides whose name appears inside `genre` (a category such as
    /// "Rap" for "Club Rap") apply first, in name order; an override named
    /// exactly `genre` applies last. Names compare case-insensitively. An
    /// empty genre returns the base configuration.
    pub fn for_genre(&self, genre: &str) -> Result<AnalysisConfig, BeatshiftError> {
        let mut config = self.clone();
        let wanted = genre.trim().to_lowercase();
        if wanted.is_empty() {
            return Ok(config);
        }

        let mut exact = None;
        for (name, adjust) in &self.overrides {
            let name = name.to_lowercase();
            if name == wanted {
                exact = Some(adjust);
            } else if !name.is_empty() && wanted.contains(&name) {
                adjust.apply(&mut config);
            }
        }
        if let Some(adjust) = exact {
            adjust.apply(&mut config);
        }

        config.validate()?;
        log::debug!("Resolved analysis configuration for genre '{}'", genre);
        Ok(config)
    }

    /// Parses a (possibly partial) JSON document and validates the result.
    pub fn from_json(json: &str) -> Result<Self, BeatshiftError> {
        let config: AnalysisConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration as pretty JSON.
    pub fn to_json(&self) -> Result<String, BeatshiftError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks that every parameter lies in its supported range.
    pub fn validate(&self) -> Result<(), BeatshiftError> {
        let invalid = |msg: String| Err(BeatshiftError::InvalidConfig(msg));

        if !(self.envelope.window_ms > 0.0 && self.envelope.window_ms.is_finite()) {
            return invalid(format!(
                "envelope window must be positive, got {} ms",
                self.envelope.window_ms
            ));
        }
        if !(self.envelope.hop_fraction > 0.0 && self.envelope.hop_fraction <= 1.0) {
            return invalid(format!(
                "envelope hop fraction must be in (0, 1], got {}",
                self.envelope.hop_fraction
            ));
        }
        if !(self.onset.min_spacing_ms >= 0.0) || !(self.onset.threshold_std >= 0.0) {
            return invalid("onset spacing and threshold must be non-negative".to_string());
        }
        let t = &self.tempo;
        if !(t.min_bpm > 0.0 && t.max_bpm >= 2.0 * t.min_bpm) {
            return invalid(format!(
                "BPM range [{}, {}] must be positive and span at least one octave",
                t.min_bpm, t.max_bpm
            ));
        }
        if !(t.tolerance_bpm > 0.0) {
            return invalid(format!("BPM tolerance must be positive, got {}", t.tolerance_bpm));
        }
        if !(t.octave_penalty > 0.0 && t.octave_penalty <= 1.0) {
            return invalid(format!(
                "octave penalty must be in (0, 1], got {}",
                t.octave_penalty
            ));
        }
        if !(0.0..=1.0).contains(&t.candidate_prune_threshold) {
            return invalid(format!(
                "candidate prune threshold must be in [0, 1], got {}",
                t.candidate_prune_threshold
            ));
        }
        if let Some(raw_min) = t.double_time_raw_min {
            if !(raw_min > 0.0 && raw_min.is_finite()) {
                return invalid(format!("double-time raw tempo must be positive, got {}", raw_min));
            }
        }
        let c = &self.chroma;
        if c.frame_size < 16 || c.hop_size == 0 || c.hop_size > c.frame_size {
            return invalid(format!(
                "chroma frame {} / hop {} are not usable",
                c.frame_size, c.hop_size
            ));
        }
        if !(c.min_freq > 0.0 && c.max_freq > c.min_freq) || !(c.reference_c0 > 0.0) {
            return invalid(format!(
                "chroma band [{}, {}] Hz is not valid",
                c.min_freq, c.max_freq
            ));
        }
        if !(self.key.tie_epsilon >= 0.0) {
            return invalid("key tie epsilon must be non-negative".to_string());
        }
        Ok(())
    }
}
