//! Per-track analysis: tempo and key pipelines behind an injected cache.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::analysis::cache::{AnalysisCache, MemoryCache, TrackKey};
use crate::analysis::chroma::build_chromagram;
use crate::analysis::key::estimate_key;
use crate::analysis::tempo::estimate_tempo_for_signal;
use crate::config::AnalysisConfig;
use crate::core::types::{KeyEstimate, PcmSignal, TempoEstimate};
use crate::error::BeatshiftError;

/// Combined analysis result for one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackAnalysis {
    pub tempo: TempoEstimate,
    pub key: KeyEstimate,
    pub duration_secs: f64,
}

/// Runs both pipelines on a signal without caching.
pub fn analyze_signal(signal: &PcmSignal, config: &AnalysisConfig) -> TrackAnalysis {
    let mono = signal.mono();
    let tempo = estimate_tempo_for_signal(&mono, signal.sample_rate(), config);
    let chroma = build_chromagram(&mono, signal.sample_rate(), &config.chroma);
    let key = estimate_key(&chroma, &config.key);
    TrackAnalysis {
        tempo,
        key,
        duration_secs: signal.duration_secs(),
    }
}

/// Track analyzer with memoized results.
///
/// The cache is injected so hosts can share one store between analyzers or
/// back it with their own persistence.
pub struct TrackAnalyzer {
    config: AnalysisConfig,
    cache: Arc<dyn AnalysisCache>,
}

impl TrackAnalyzer {
    /// Creates an analyzer, validating `config`.
    pub fn new(config: AnalysisConfig, cache: Arc<dyn AnalysisCache>) -> Result<Self, BeatshiftError> {
        config.validate()?;
        Ok(Self { config, cache })
    }

    /// Analyzer with default configuration and a fresh [`MemoryCache`].
    pub fn with_memory_cache() -> Self {
        Self {
            config: AnalysisConfig::default(),
            cache: Arc::new(MemoryCache::new()),
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<dyn AnalysisCache> {
        &self.cache
    }

    /// Analyzes one track, returning the cached result when the content is unchanged.
    pub fn analyze(&self, id: &str, signal: &PcmSignal) -> TrackAnalysis {
        let key = TrackKey::new(id, signal);
        if let Some(hit) = self.cache.get(&key) {
            log::debug!("Cache hit for '{}'", id);
            return hit;
        }

        log::debug!(
            "Analyzing '{}' ({:.1}s, {} Hz, {} ch)",
            id,
            signal.duration_secs(),
            signal.sample_rate(),
            signal.channels()
        );
        let analysis = analyze_signal(signal, &self.config);
        self.cache.insert(key, analysis.clone());
        analysis
    }

    /// Analyzes tracks in parallel. Results are in input order.
    pub fn analyze_batch(&self, tracks: &[(&str, &PcmSignal)]) -> Vec<TrackAnalysis> {
        tracks
            .par_iter()
            .map(|(id, signal)| self.analyze(id, signal))
            .collect()
    }
}
