#![forbid(unsafe_code)]
//! Track analysis and real-time time manipulation for DJ beat-matching.
//!
//! `beatshift` estimates the tempo (BPM) and musical key of decoded PCM, and
//! provides a streaming phase vocoder that changes playback duration and
//! pitch independently.
//!
//! # Analysis
//!
//! ```
//! use beatshift::{AnalysisConfig, PcmSignal};
//!
//! // Half a second of silence: too short for an estimate
//! let signal = PcmSignal::mono_from(vec![0.0; 22050], 44100)?;
//! let tempo = beatshift::analyze_tempo(&signal, &AnalysisConfig::default());
//! assert!(tempo.is_unknown());
//! assert_eq!(tempo.display(), "--");
//! # Ok::<(), beatshift::BeatshiftError>(())
//! ```
//!
//! For whole libraries, [`TrackAnalyzer`] adds caching and parallel batch
//! analysis.
//!
//! # Streaming
//!
//! ```
//! use beatshift::{Quality, StreamProcessor, VocoderParams};
//!
//! let mut processor = StreamProcessor::new();
//! processor.start(
//!     VocoderParams::new(1.0)
//!         .with_quality(Quality::Medium)
//!         .with_max_block_size(512),
//! )?;
//!
//! // From the UI thread: play 128 BPM material at 124 BPM
//! let control = processor.control();
//! let ratio = beatshift::stretch_ratio_for_bpm(128.0, 124.0)?;
//! control.set_stretch_ratio(ratio);
//!
//! let input = vec![0.0f32; 512];
//! let mut output = vec![0.0f32; 512];
//! let report = processor.process(&input, &mut output);
//! assert_eq!(report.produced + report.underrun, 512);
//! # Ok::<(), beatshift::BeatshiftError>(())
//! ```

pub mod analysis;
pub mod config;
pub mod core;
pub mod error;
pub mod stream;
pub mod stretch;

pub use analysis::{
    AnalysisCache, Chromagram, MemoryCache, OnsetSet, PitchClassProfile, TempoCandidate,
    TempoDrift, TrackAnalysis, TrackAnalyzer, TrackKey,
};
pub use config::{
    AnalysisConfig, ChromaConfig, EnvelopeConfig, GenreOverride, KeyConfig, OnsetConfig, TempoConfig,
    TempoMethod,
};
pub use core::types::{KeyEstimate, Mode, PcmSignal, PitchClass, Sample, TempoEstimate};
pub use error::BeatshiftError;
pub use stream::{BlockReport, ProcessorState, StreamProcessor};
pub use stretch::params::semitones_to_ratio;
pub use stretch::{Quality, RatioSnapshot, StretchControl, VocoderParams};

/// Estimates the tempo of a signal (down-mixed to mono).
pub fn analyze_tempo(signal: &PcmSignal, config: &AnalysisConfig) -> TempoEstimate {
    analysis::tempo::estimate_tempo_for_signal(&signal.mono(), signal.sample_rate(), config)
}

/// Estimates the key of a signal (down-mixed to mono).
pub fn analyze_key(signal: &PcmSignal, config: &AnalysisConfig) -> KeyEstimate {
    let chroma = analysis::chroma::build_chromagram(&signal.mono(), signal.sample_rate(), &config.chroma);
    analysis::key::estimate_key(&chroma, &config.key)
}

/// Validates that a BPM value is positive and finite.
#[inline]
fn validate_bpm(bpm: f64, label: &str) -> Result<(), BeatshiftError> {
    if !bpm.is_finite() || bpm <= 0.0 {
        return Err(BeatshiftError::InvalidInput(format!(
            "{} BPM must be positive, got {}",
            label, bpm
        )));
    }
    Ok(())
}

/// Playback speed factor that takes `detected_bpm` material to `target_bpm`.
///
/// # Example
///
/// ```
/// assert_eq!(beatshift::tempo_ratio(120.0, 126.0).unwrap(), 1.05);
/// ```
pub fn tempo_ratio(detected_bpm: f64, target_bpm: f64) -> Result<f64, BeatshiftError> {
    validate_bpm(detected_bpm, "detected")?;
    validate_bpm(target_bpm, "target")?;
    Ok(target_bpm / detected_bpm)
}

/// Duration factor for [`VocoderParams::stretch_ratio`] that takes
/// `detected_bpm` material to `target_bpm`: the inverse of [`tempo_ratio`].
pub fn stretch_ratio_for_bpm(detected_bpm: f64, target_bpm: f64) -> Result<f64, BeatshiftError> {
    validate_bpm(detected_bpm, "detected")?;
    validate_bpm(target_bpm, "target")?;
    Ok(detected_bpm / target_bpm)
}

/// Runs a whole buffer through a streaming session and trims the latency.
///
/// The output holds about `input.len() * stretch_ratio` samples, aligned so
/// that output sample `i * stretch_ratio` corresponds to input sample `i`.
pub fn stretch(input: &[f32], params: &VocoderParams) -> Result<Vec<f32>, BeatshiftError> {
    let mut processor = StreamProcessor::new();
    processor.start(params.clone())?;

    let ratio = params.stretch_ratio;
    let expected = (input.len() as f64 * ratio).round() as usize;
    let lead_in = (processor.latency_samples() as f64 * ratio).round() as usize;
    let mut output = Vec::with_capacity(expected + lead_in + params.frame_size);

    fn drain(processor: &mut StreamProcessor, output: &mut Vec<f32>) {
        let start = output.len();
        output.resize(start + processor.available_output(), 0.0);
        processor.drain_output(&mut output[start..]);
    }

    let mut anomalies = 0;
    for chunk in input.chunks(params.max_block_size) {
        anomalies += processor.push_input(chunk).anomalies;
        drain(&mut processor, &mut output);
    }
    processor.flush();
    drain(&mut processor, &mut output);
    processor.stop();

    if anomalies > 0 {
        log::warn!("{} input block(s) contained non-finite samples", anomalies);
    }

    let mut output = output.split_off(lead_in.min(output.len()));
    output.truncate(expected);
    Ok(output)
}
