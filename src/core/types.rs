use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::BeatshiftError;

/// A single audio sample (32-bit float, range -1.0 to 1.0).
pub type Sample = f32;

/// Decoded PCM audio in interleaved format.
///
/// For mono audio, samples are stored sequentially: `[s0, s1, s2, ...]`
/// For stereo audio, samples are interleaved: `[L0, R0, L1, R1, ...]`
///
/// Analysis always operates on [`PcmSignal::mono`], the per-frame average of
/// all channels.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmSignal {
    samples: Vec<Sample>,
    sample_rate: u32,
    channels: u16,
}

impl PcmSignal {
    /// Creates a signal, validating its layout and contents.
    ///
    /// An empty sample vector is accepted; analysis of an empty signal yields
    /// low-confidence defaults.
    ///
    /// # Errors
    /// Returns [`BeatshiftError::InvalidInput`] if `channels` or `sample_rate`
    /// is zero, the sample count is not a multiple of `channels`, or any sample
    /// is NaN/Inf.
    pub fn new(samples: Vec<Sample>, sample_rate: u32, channels: u16) -> Result<Self, BeatshiftError> {
        if channels == 0 {
            return Err(BeatshiftError::InvalidInput(
                "channel count must be at least 1".to_string(),
            ));
        }
        if sample_rate == 0 {
            return Err(BeatshiftError::InvalidInput(
                "sample rate must be positive".to_string(),
            ));
        }
        if samples.len() % channels as usize != 0 {
            return Err(BeatshiftError::InvalidInput(format!(
                "{} samples is not a whole number of {}-channel frames",
                samples.len(),
                channels
            )));
        }
        if let Some(pos) = samples.iter().position(|s| !s.is_finite()) {
            return Err(BeatshiftError::InvalidInput(format!(
                "non-finite sample at index {}",
                pos
            )));
        }
        Ok(Self {
            samples,
            sample_rate,
            channels,
        })
    }

    /// Creates a mono signal.
    pub fn mono_from(samples: Vec<Sample>, sample_rate: u32) -> Result<Self, BeatshiftError> {
        Self::new(samples, sample_rate, 1)
    }

    /// Raw interleaved samples.
    #[inline]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Sample rate in Hz.
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of interleaved channels.
    #[inline]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames (total samples / channels).
    #[inline]
    pub fn num_frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.num_frames() as f64 / self.sample_rate as f64
    }

    /// Returns true if the signal contains no samples.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Down-mixes to mono by averaging channels.
    pub fn mono(&self) -> Vec<Sample> {
        let nc = self.channels as usize;
        if nc == 1 {
            return self.samples.clone();
        }
        let scale = 1.0 / nc as f32;
        self.samples
            .chunks_exact(nc)
            .map(|frame| frame.iter().sum::<f32>() * scale)
            .collect()
    }
}

/// One of the twelve equal-tempered pitch classes, C = 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl PitchClass {
    /// All pitch classes in ascending order from C.
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    /// Pitch class for a semitone index; wraps modulo 12.
    #[inline]
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % 12]
    }

    /// Semitone index above C (0..12).
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Note name using sharps.
    pub fn name(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::CSharp => "C#",
            PitchClass::D => "D",
            PitchClass::DSharp => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::FSharp => "F#",
            PitchClass::G => "G",
            PitchClass::GSharp => "G#",
            PitchClass::A => "A",
            PitchClass::ASharp => "A#",
            PitchClass::B => "B",
        }
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Major or minor mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    Major,
    Minor,
}

/// Estimated tempo of a track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoEstimate {
    /// Beats per minute, inside the configured plausible range when known.
    pub bpm: f64,
    /// Confidence in [0.0, 1.0]. Zero marks an unknown tempo.
    pub confidence: f32,
    /// Number of octave (double/halve) corrections applied.
    pub octave_corrections: u8,
}

impl TempoEstimate {
    /// BPM reported when no tempo could be estimated.
    pub const FALLBACK_BPM: f64 = 120.0;

    /// Low-confidence default returned when data is insufficient.
    pub fn fallback() -> Self {
        Self {
            bpm: Self::FALLBACK_BPM,
            confidence: 0.0,
            octave_corrections: 0,
        }
    }

    /// Returns true if this estimate carries no information.
    #[inline]
    pub fn is_unknown(&self) -> bool {
        self.confidence <= 0.0
    }

    /// Returns true when confidence passes the provided threshold.
    #[inline]
    pub fn is_confident(&self, threshold: f32) -> bool {
        self.confidence >= threshold.clamp(0.0, 1.0)
    }

    /// Display string: BPM to one decimal, or `--` when unknown.
    pub fn display(&self) -> String {
        if self.is_unknown() {
            "--".to_string()
        } else {
            format!("{:.1}", self.bpm)
        }
    }
}

/// Estimated musical key of a track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyEstimate {
    pub tonic: PitchClass,
    pub mode: Mode,
    /// Correlation of the winning template, clamped into [0.0, 1.0].
    pub confidence: f32,
}

impl KeyEstimate {
    /// Low-confidence default returned when no key could be estimated.
    pub fn fallback() -> Self {
        Self {
            tonic: PitchClass::C,
            mode: Mode::Major,
            confidence: 0.0,
        }
    }

    /// Returns true if this estimate carries no information.
    #[inline]
    pub fn is_unknown(&self) -> bool {
        self.confidence <= 0.0
    }

    /// Key name, e.g. `A` for A major or `F#m` for F# minor.
    pub fn name(&self) -> String {
        match self.mode {
            Mode::Major => self.tonic.name().to_string(),
            Mode::Minor => format!("{}m", self.tonic.name()),
        }
    }

    /// Camelot wheel code, e.g. `8B` for C major and `8A` for A minor.
    pub fn camelot(&self) -> String {
        // Relative major shares the wheel number with its minor.
        let (major_root, letter) = match self.mode {
            Mode::Major => (self.tonic.index(), 'B'),
            Mode::Minor => ((self.tonic.index() + 3) % 12, 'A'),
        };
        let number = ((major_root * 7) % 12 + 7) % 12 + 1;
        format!("{}{}", number, letter)
    }

    /// Display string: key name, or `--` when unknown.
    pub fn display(&self) -> String {
        if self.is_unknown() {
            "--".to_string()
        } else {
            self.name()
        }
    }
}
