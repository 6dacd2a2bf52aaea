//! Offline track analysis: tempo (envelope, onsets, tempo) and key
//! (chromagram, key) pipelines, plus caching and batch analysis.

pub mod cache;
pub mod chroma;
pub mod envelope;
pub mod key;
pub mod onset;
pub mod tempo;
pub mod track;

pub use cache::{fingerprint_signal, AnalysisCache, MemoryCache, TrackKey};
pub use chroma::{build_chromagram, Chromagram, PitchClassProfile};
pub use envelope::{build_envelope, EnergyEnvelope};
pub use key::{estimate_key, key_candidates, key_scores, KeyScore};
pub use onset::{detect_onsets, onsets_from_signal, refine_onsets, OnsetSet};
pub use tempo::{
    detect_tempo_drift, estimate_tempo, estimate_tempo_for_signal, estimate_tempo_from_envelope,
    tempo_candidates, TempoCandidate, TempoDrift,
};
pub use track::{analyze_signal, TrackAnalysis, TrackAnalyzer};
