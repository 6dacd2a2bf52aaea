mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use beatshift::analysis::analyze_signal;
use beatshift::{
    AnalysisCache, AnalysisConfig, BeatshiftError, KeyEstimate, MemoryCache, PcmSignal, TempoEstimate,
    TrackAnalysis, TrackAnalyzer, TrackKey,
};
use common::{gen_chord, gen_click_track};

const SR: u32 = 44_100;

/// Memory cache that counts lookups and stores.
#[derive(Default)]
struct CountingCache {
    inner: MemoryCache,
    gets: AtomicUsize,
    inserts: AtomicUsize,
}

impl AnalysisCache for CountingCache {
    fn get(&self, key: &TrackKey) -> Option<TrackAnalysis> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key)
    }

    fn insert(&self, key: TrackKey, analysis: TrackAnalysis) {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(key, analysis);
    }

    fn invalidate(&self, id: &str) -> bool {
        self.inner.invalidate(id)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

fn music(bpm: f64, secs: f64) -> PcmSignal {
    let mut samples = gen_click_track(bpm, SR, secs);
    let pad = gen_chord(&[880.0, 1046.50, 1318.51], SR, samples.len());
    for (s, p) in samples.iter_mut().zip(pad) {
        *s = 0.6 * *s + 0.3 * p;
    }
    PcmSignal::mono_from(samples, SR).unwrap()
}

#[test]
fn second_analysis_is_served_from_cache() {
    common::init_logging();
    let cache = Arc::new(CountingCache::default());
    let analyzer = TrackAnalyzer::new(AnalysisConfig::default(), cache.clone()).unwrap();
    let track = music(126.0, 15.0);

    let first = analyzer.analyze("tracks/opener.wav", &track);
    let second = analyzer.analyze("tracks/opener.wav", &track);
    assert_eq!(first, second);
    assert_eq!(cache.gets.load(Ordering::SeqCst), 2);
    assert_eq!(cache.inserts.load(Ordering::SeqCst), 1);
    assert!((first.tempo.bpm - 126.0).abs() < 2.0);
    assert!((first.duration_secs - 15.0).abs() < 1e-6);
}

#[test]
fn changed_content_misses() {
    let cache = Arc::new(CountingCache::default());
    let analyzer = TrackAnalyzer::new(AnalysisConfig::default(), cache.clone()).unwrap();

    let original = music(120.0, 10.0);
    let mut edited: Vec<f32> = original.samples().to_vec();
    edited[1000] += 0.01;
    let edited = PcmSignal::mono_from(edited, SR).unwrap();
    assert_ne!(TrackKey::new("a", &original), TrackKey::new("a", &edited));

    analyzer.analyze("a", &original);
    analyzer.analyze("a", &edited);
    assert_eq!(cache.inserts.load(Ordering::SeqCst), 2);
    // Same id: the newer result replaced the old one
    assert_eq!(cache.len(), 1);
}

#[test]
fn invalidate_forces_reanalysis() {
    let cache = Arc::new(CountingCache::default());
    let analyzer = TrackAnalyzer::new(AnalysisConfig::default(), cache.clone()).unwrap();
    let track = music(128.0, 8.0);
    analyzer.analyze("x", &track);
    assert!(analyzer.cache().invalidate("x"));
    assert!(!analyzer.cache().invalidate("x"));
    analyzer.analyze("x", &track);
    assert_eq!(cache.inserts.load(Ordering::SeqCst), 2);
}

#[test]
fn batch_matches_sequential() {
    common::init_logging();
    let tracks: Vec<(String, PcmSignal)> = [100.0, 120.0, 128.0, 140.0, 174.0]
        .iter()
        .map(|&bpm| (format!("track-{}", bpm), music(bpm, 10.0)))
        .collect();
    let refs: Vec<(&str, &PcmSignal)> = tracks.iter().map(|(id, s)| (id.as_str(), s)).collect();

    let analyzer = TrackAnalyzer::with_memory_cache();
    let batch = analyzer.analyze_batch(&refs);
    assert_eq!(batch.len(), tracks.len());
    assert_eq!(analyzer.cache().len(), tracks.len());

    for ((_, signal), result) in tracks.iter().zip(&batch) {
        assert_eq!(*result, analyze_signal(signal, analyzer.config()));
    }
}

#[test]
fn empty_track_gives_defaults() {
    let analyzer = TrackAnalyzer::with_memory_cache();
    let empty = PcmSignal::new(Vec::new(), SR, 2).unwrap();
    let result = analyzer.analyze("empty", &empty);
    assert_eq!(result.tempo, TempoEstimate::fallback());
    assert_eq!(result.key, KeyEstimate::fallback());
    assert_eq!(result.duration_secs, 0.0);
}

#[test]
fn invalid_signals_rejected() {
    assert!(matches!(
        PcmSignal::new(vec![0.0, f32::NAN], SR, 1),
        Err(BeatshiftError::InvalidInput(_))
    ));
    assert!(matches!(
        PcmSignal::new(vec![0.0; 3], SR, 2),
        Err(BeatshiftError::InvalidInput(_))
    ));
    assert!(PcmSignal::new(vec![0.0; 4], 0, 2).is_err());
    assert!(PcmSignal::new(vec![0.0; 4], SR, 0).is_err());
}

#[test]
fn config_from_json_drives_analysis() {
    let config = AnalysisConfig::from_json(
        r#"{ "tempo": { "min_bpm": 70.0, "max_bpm": 180.0 }, "chroma": { "frame_size": 8192 } }"#,
    )
    .unwrap();
    assert_eq!(config.tempo.min_bpm, 70.0);
    assert_eq!(config.chroma.frame_size, 8192);
    assert_eq!(config.chroma.hop_size, 2048);

    let round_trip = AnalysisConfig::from_json(&config.to_json().unwrap()).unwrap();
    assert_eq!(round_trip, config);

    let bad = AnalysisConfig::from_json(r#"{ "tempo": { "min_bpm": 150.0 } }"#);
    assert!(matches!(bad, Err(BeatshiftError::InvalidConfig(_))));
    assert!(AnalysisConfig::from_json("{ not json").is_err());

    let analyzer = TrackAnalyzer::new(config, Arc::new(MemoryCache::new())).unwrap();
    let result = analyzer.analyze("t", &music(120.0, 10.0));
    assert!(result.tempo.bpm >= 70.0 && result.tempo.bpm <= 180.0);
}

#[test]
fn analysis_serializes() {
    let result = analyze_signal(&music(124.0, 8.0), &AnalysisConfig::default());
    let json = serde_json::to_string(&result).unwrap();
    let back: TrackAnalysis = serde_json::from_str(&json).unwrap();
    assert_eq!(back, result);
}
