//! Phase-vocoder session parameters.

use crate::error::BeatshiftError;

/// Smallest accepted stretch or pitch ratio.
pub const RATIO_MIN: f64 = 0.25;
/// Largest accepted stretch or pitch ratio.
pub const RATIO_MAX: f64 = 4.0;
/// Supported analysis frame sizes.
pub const VALID_FRAME_SIZES: [usize; 5] = [512, 1024, 2048, 4096, 8192];

/// Clamps a ratio into `[RATIO_MIN, RATIO_MAX]`.
#[inline]
pub fn clamp_ratio(ratio: f64) -> f64 {
    ratio.clamp(RATIO_MIN, RATIO_MAX)
}

/// Frequency ratio for a shift of `semitones` (12 per octave).
#[inline]
pub fn semitones_to_ratio(semitones: f64) -> f64 {
    2.0f64.powf(semitones / 12.0)
}

/// Frame/hop presets trading latency for frequency resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    /// 1024 / 256: lowest latency, smeared bass.
    Low,
    /// 2048 / 512: default for live mixing.
    Medium,
    /// 4096 / 1024.
    High,
    /// 8192 / 2048: best tonal resolution, ~140 ms latency at 44.1 kHz.
    Ultra,
}

impl Quality {
    pub fn frame_size(self) -> usize {
        match self {
            Quality::Low => 1024,
            Quality::Medium => 2048,
            Quality::High => 4096,
            Quality::Ultra => 8192,
        }
    }

    /// Analysis hop: a quarter frame.
    pub fn hop_size(self) -> usize {
        self.frame_size() / 4
    }
}

/// Parameters for one streaming session.
///
/// Ratios are duration and frequency factors: `stretch_ratio = 2.0` plays
/// twice as long, `pitch_ratio = 2.0` sounds an octave higher.
#[derive(Debug, Clone, PartialEq)]
pub struct VocoderParams {
    /// Analysis frame size; one of [`VALID_FRAME_SIZES`] (default: 2048).
    pub frame_size: usize,
    /// Analysis hop, at most `frame_size / 4` (default: 512).
    pub hop_size: usize,
    /// Output duration / input duration (default: 1.0).
    pub stretch_ratio: f64,
    /// Output frequency / input frequency (default: 1.0).
    pub pitch_ratio: f64,
    /// Largest input block passed to a single `process` call (default: 4096).
    pub max_block_size: usize,
    /// Sample rate in Hz, used to express latency in seconds (default: 44100).
    pub sample_rate: u32,
}

impl Default for VocoderParams {
    fn default() -> Self {
        Self {
            frame_size: Quality::Medium.frame_size(),
            hop_size: Quality::Medium.hop_size(),
            stretch_ratio: 1.0,
            pitch_ratio: 1.0,
            max_block_size: 4096,
            sample_rate: 44100,
        }
    }
}

impl VocoderParams {
    /// Parameters with the given stretch ratio and defaults otherwise.
    ///
    /// Nothing is checked until [`VocoderParams::validate`] (called by
    /// session start).
    pub fn new(stretch_ratio: f64) -> Self {
        Self {
            stretch_ratio,
            ..Self::default()
        }
    }

    /// Set frame and hop from a preset.
    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.frame_size = quality.frame_size();
        self.hop_size = quality.hop_size();
        self
    }

    /// Set the frame size; the hop becomes a quarter frame.
    pub fn with_frame_size(mut self, frame_size: usize) -> Self {
        self.frame_size = frame_size;
        self.hop_size = frame_size / 4;
        self
    }

    pub fn with_hop_size(mut self, hop_size: usize) -> Self {
        self.hop_size = hop_size;
        self
    }

    pub fn with_pitch_ratio(mut self, pitch_ratio: f64) -> Self {
        self.pitch_ratio = pitch_ratio;
        self
    }

    /// Set the pitch shift in semitones.
    pub fn with_pitch_semitones(mut self, semitones: f64) -> Self {
        self.pitch_ratio = semitones_to_ratio(semitones);
        self
    }

    pub fn with_max_block_size(mut self, max_block_size: usize) -> Self {
        self.max_block_size = max_block_size;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Algorithmic latency in samples: the zero lead-in before the first frame.
    #[inline]
    pub fn latency_samples(&self) -> usize {
        self.frame_size - self.hop_size
    }

    /// Algorithmic latency in seconds at `sample_rate`.
    #[inline]
    pub fn latency_secs(&self) -> f64 {
        self.latency_samples() as f64 / self.sample_rate.max(1) as f64
    }

    /// Checks every parameter; called at session start.
    pub fn validate(&self) -> Result<(), BeatshiftError> {
        if !VALID_FRAME_SIZES.contains(&self.frame_size) {
            return Err(BeatshiftError::InvalidConfig(format!(
                "frame size {} is not one of {:?}",
                self.frame_size, VALID_FRAME_SIZES
            )));
        }
        if self.hop_size == 0 || self.hop_size > self.frame_size / 4 {
            return Err(BeatshiftError::InvalidConfig(format!(
                "hop size {} must be in 1..={} for frame size {}",
                self.hop_size,
                self.frame_size / 4,
                self.frame_size
            )));
        }
        for (name, ratio) in [("stretch", self.stretch_ratio), ("pitch", self.pitch_ratio)] {
            if !ratio.is_finite() || !(RATIO_MIN..=RATIO_MAX).contains(&ratio) {
                return Err(BeatshiftError::InvalidConfig(format!(
                    "{} ratio {} outside [{}, {}]",
                    name, ratio, RATIO_MIN, RATIO_MAX
                )));
            }
        }
        if self.max_block_size == 0 {
            return Err(BeatshiftError::InvalidConfig(
                "max block size must be positive".to_string(),
            ));
        }
        if self.sample_rate == 0 {
            return Err(BeatshiftError::InvalidConfig(
                "sample rate must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
