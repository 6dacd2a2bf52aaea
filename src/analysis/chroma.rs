//! Chromagram: per-frame spectral energy folded into 12 pitch classes.

use crate::config::ChromaConfig;
use crate::core::fft::{bin_frequency, num_bins, MagnitudeSpectrum};
use crate::core::types::PitchClass;
use crate::core::window::WindowType;

/// Sequence of 12-element pitch-class energy frames.
#[derive(Debug, Clone, PartialEq)]
pub struct Chromagram {
    /// One entry per analysed frame, indexed by pitch class (C = 0).
    pub frames: Vec<[f32; 12]>,
    pub frame_size: usize,
    pub hop_size: usize,
    pub sample_rate: u32,
}

impl Chromagram {
    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Sums all frames and scales the result so its maximum is 1.0.
    pub fn profile(&self) -> PitchClassProfile {
        let mut sums = [0.0f64; 12];
        for frame in &self.frames {
            for (acc, &v) in sums.iter_mut().zip(frame.iter()) {
                *acc += v as f64;
            }
        }
        PitchClassProfile::from_sums(&sums)
    }
}

/// Frame-summed, max-normalized pitch-class energy.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PitchClassProfile(pub [f32; 12]);

impl PitchClassProfile {
    fn from_sums(sums: &[f64; 12]) -> Self {
        let max = sums.iter().copied().fold(0.0f64, f64::max);
        let mut out = [0.0f32; 12];
        if max > 0.0 {
            for (o, &s) in out.iter_mut().zip(sums.iter()) {
                *o = (s / max) as f32;
            }
        }
        Self(out)
    }

    #[inline]
    pub fn values(&self) -> &[f32; 12] {
        &self.0
    }

    /// Circular moving average over `window` neighbouring pitch classes
    /// (rounded down to an odd width), renormalized to a maximum of 1.0.
    ///
    /// A window of 0 or 1 returns the profile unchanged.
    pub fn smoothed(&self, window: usize) -> Self {
        if window <= 1 {
            return *self;
        }
        let half = (window / 2).min(6) as isize;
        let taps = (2 * half + 1) as f64;
        let mut sums = [0.0f64; 12];
        for (i, out) in sums.iter_mut().enumerate() {
            let total: f64 = (-half..=half)
                .map(|j| self.0[(i as isize + j).rem_euclid(12) as usize] as f64)
                .sum();
            *out = total / taps;
        }
        Self::from_sums(&sums)
    }

    /// The profile moved up `semitones` pitch classes.
    pub fn transposed(&self, semitones: usize) -> Self {
        let mut out = [0.0f32; 12];
        for (i, &v) in self.0.iter().enumerate() {
            out[(i + semitones) % 12] = v;
        }
        Self(out)
    }

    /// Returns true if all twelve values are equal (including all zero).
    pub fn is_flat(&self) -> bool {
        let first = self.0[0];
        self.0.iter().all(|&v| (v - first).abs() <= f32::EPSILON)
    }

    /// Pitch class with the most energy, or `None` for a flat profile.
    pub fn dominant(&self) -> Option<PitchClass> {
        if self.is_flat() {
            return None;
        }
        let mut best = 0;
        for i in 1..12 {
            if self.0[i] > self.0[best] {
                best = i;
            }
        }
        Some(PitchClass::from_index(best))
    }
}

/// Pitch class of a frequency relative to C0.
#[inline]
pub fn pitch_class_of(freq: f64, reference_c0: f64) -> usize {
    let semitones = (12.0 * (freq / reference_c0).log2()).round() as i64;
    semitones.rem_euclid(12) as usize
}

/// Maps each FFT bin to its pitch class, or `None` outside the band.
fn bin_pitch_classes(config: &ChromaConfig, sample_rate: u32) -> Vec<Option<u8>> {
    (0..num_bins(config.frame_size))
        .map(|bin| {
            let freq = bin_frequency(bin, config.frame_size, sample_rate);
            if freq < config.min_freq as f64 || freq > config.max_freq as f64 {
                None
            } else {
                Some(pitch_class_of(freq, config.reference_c0) as u8)
            }
        })
        .collect()
}

#[inline]
fn frame_rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / frame.len() as f64).sqrt() as f32
}

/// Builds the chromagram of a mono signal.
///
/// Frames start every `hop_size` samples; only complete frames are analysed,
/// and frames whose RMS is below `energy_floor` are skipped. The result is a
/// pure function of its inputs.
pub fn build_chromagram(samples: &[f32], sample_rate: u32, config: &ChromaConfig) -> Chromagram {
    let mut chroma = Chromagram {
        frames: Vec::new(),
        frame_size: config.frame_size,
        hop_size: config.hop_size,
        sample_rate,
    };
    if sample_rate == 0 || config.hop_size == 0 || samples.len() < config.frame_size {
        log::debug!(
            "Signal of {} samples is shorter than one chroma frame ({})",
            samples.len(),
            config.frame_size
        );
        return chroma;
    }

    let classes = bin_pitch_classes(config, sample_rate);
    let mut spectrum = MagnitudeSpectrum::new(config.frame_size, WindowType::Hann);
    let num_frames = (samples.len() - config.frame_size) / config.hop_size + 1;
    let mut skipped = 0usize;

    for f in 0..num_frames {
        let start = f * config.hop_size;
        let frame = &samples[start..start + config.frame_size];
        if frame_rms(frame) < config.energy_floor {
            skipped += 1;
            continue;
        }
        let mags = spectrum.compute(frame);
        let mut bins = [0.0f32; 12];
        for (mag, class) in mags.iter().zip(classes.iter()) {
            if let Some(pc) = class {
                bins[*pc as usize] += *mag;
            }
        }
        chroma.frames.push(bins);
    }

    log::debug!(
        "Chromagram: {} frames kept, {} below energy floor",
        chroma.frames.len(),
        skipped
    );
    chroma
}
