//! Lock-free ratio controls shared between a UI thread and the audio thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::stretch::params::{clamp_ratio, semitones_to_ratio, RATIO_MAX, RATIO_MIN};

/// Both ratios as read at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatioSnapshot {
    pub stretch_ratio: f64,
    pub pitch_ratio: f64,
}

/// Packs two f32 ratios into one word so a reader never sees a torn pair.
#[inline]
fn pack(stretch: f32, pitch: f32) -> u64 {
    ((stretch.to_bits() as u64) << 32) | pitch.to_bits() as u64
}

#[inline]
fn unpack(word: u64) -> (f32, f32) {
    (f32::from_bits((word >> 32) as u32), f32::from_bits(word as u32))
}

/// Runtime controls for a [`StreamProcessor`](crate::StreamProcessor).
///
/// Setters may be called from any thread. The engine reads one
/// [`RatioSnapshot`] at the start of each block, so a change never takes
/// effect mid-block.
#[derive(Debug)]
pub struct StretchControl {
    ratios: AtomicU64,
    stop_requested: AtomicBool,
}

impl Default for StretchControl {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

impl StretchControl {
    /// Creates controls with the given ratios, clamped into range.
    pub fn new(stretch_ratio: f64, pitch_ratio: f64) -> Self {
        Self {
            ratios: AtomicU64::new(pack(
                sanitize(stretch_ratio, 1.0) as f32,
                sanitize(pitch_ratio, 1.0) as f32,
            )),
            stop_requested: AtomicBool::new(false),
        }
    }

    /// Reads both ratios atomically.
    #[inline]
    pub fn snapshot(&self) -> RatioSnapshot {
        let (stretch, pitch) = unpack(self.ratios.load(Ordering::Acquire));
        RatioSnapshot {
            stretch_ratio: stretch as f64,
            pitch_ratio: pitch as f64,
        }
    }

    pub fn stretch_ratio(&self) -> f64 {
        self.snapshot().stretch_ratio
    }

    pub fn pitch_ratio(&self) -> f64 {
        self.snapshot().pitch_ratio
    }

    /// Sets the stretch ratio, clamped into `[RATIO_MIN, RATIO_MAX]`.
    ///
    /// Returns the value actually applied. A non-finite request leaves the
    /// ratio unchanged.
    pub fn set_stretch_ratio(&self, ratio: f64) -> f64 {
        let current = self.stretch_ratio();
        let applied = sanitize(ratio, current) as f32;
        self.update(|_, pitch| (applied, pitch));
        if clamp_ratio(ratio) != ratio {
            log::debug!("Stretch ratio {} clamped to {}", ratio, applied);
        }
        applied as f64
    }

    /// Sets the pitch ratio, clamped into `[RATIO_MIN, RATIO_MAX]`.
    ///
    /// Returns the value actually applied.
    pub fn set_pitch_ratio(&self, ratio: f64) -> f64 {
        let current = self.pitch_ratio();
        let applied = sanitize(ratio, current) as f32;
        self.update(|stretch, _| (stretch, applied));
        if clamp_ratio(ratio) != ratio {
            log::debug!("Pitch ratio {} clamped to {}", ratio, applied);
        }
        applied as f64
    }

    /// Sets the pitch shift in semitones. Returns the applied ratio.
    pub fn set_pitch_semitones(&self, semitones: f64) -> f64 {
        self.set_pitch_ratio(semitones_to_ratio(semitones))
    }

    /// Asks the engine to stop at the next block boundary.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    #[inline]
    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Clears and returns the pending stop request.
    #[inline]
    pub(crate) fn take_stop(&self) -> bool {
        self.stop_requested.swap(false, Ordering::AcqRel)
    }

    #[inline]
    pub(crate) fn clear_stop(&self) {
        self.stop_requested.store(false, Ordering::Release);
    }

    fn update(&self, f: impl Fn(f32, f32) -> (f32, f32)) {
        let _ = self
            .ratios
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                let (stretch, pitch) = unpack(word);
                let (s, p) = f(stretch, pitch);
                Some(pack(s, p))
            });
    }
}

/// Clamps a requested ratio, keeping `fallback` for NaN/Inf.
#[inline]
fn sanitize(ratio: f64, fallback: f64) -> f64 {
    if ratio.is_finite() {
        clamp_ratio(ratio)
    } else {
        fallback.clamp(RATIO_MIN, RATIO_MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_set_and_snapshot() {
        let control = StretchControl::default();
        assert_eq!(control.set_stretch_ratio(1.5), 1.5);
        assert_eq!(control.set_pitch_ratio(0.5), 0.5);
        let snap = control.snapshot();
        assert_eq!(snap.stretch_ratio, 1.5);
        assert_eq!(snap.pitch_ratio, 0.5);
    }

    #[test]
    fn test_out_of_range_clamped() {
        let control = StretchControl::default();
        assert_eq!(control.set_stretch_ratio(10.0), RATIO_MAX);
        assert_eq!(control.set_stretch_ratio(0.0), RATIO_MIN);
        assert_eq!(control.set_pitch_ratio(-3.0), RATIO_MIN);
        assert_eq!(control.stretch_ratio(), RATIO_MIN);
    }

    #[test]
    fn test_non_finite_ignored() {
        let control = StretchControl::new(2.0, 1.0);
        assert_eq!(control.set_stretch_ratio(f64::NAN), 2.0);
        assert_eq!(control.stretch_ratio(), 2.0);
    }

    #[test]
    fn test_semitones_applied() {
        let control = StretchControl::default();
        let applied = control.set_pitch_semitones(12.0);
        assert!((applied - 2.0).abs() < 1e-6);
        let applied = control.set_pitch_semitones(36.0);
        assert_eq!(applied, RATIO_MAX);
    }

    #[test]
    fn test_stop_flag() {
        let control = StretchControl::default();
        assert!(!control.stop_requested());
        control.request_stop();
        assert!(control.stop_requested());
        assert!(control.take_stop());
        assert!(!control.take_stop());
    }

    #[test]
    fn test_concurrent_setters_never_tear() {
        let control = Arc::new(StretchControl::default());
        let writer = {
            let control = Arc::clone(&control);
            std::thread::spawn(move || {
                for i in 0..1000 {
                    let r = if i % 2 == 0 { 0.5 } else { 2.0 };
                    control.set_stretch_ratio(r);
                    control.set_pitch_ratio(r);
                }
            })
        };
        for _ in 0..1000 {
            let snap = control.snapshot();
            assert!(snap.stretch_ratio >= RATIO_MIN && snap.stretch_ratio <= RATIO_MAX);
            assert!(snap.pitch_ratio >= RATIO_MIN && snap.pitch_ratio <= RATIO_MAX);
        }
        writer.join().unwrap();
    }
}
