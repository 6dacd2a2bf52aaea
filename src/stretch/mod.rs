pub mod control;
pub mod params;
pub mod phase_vocoder;

pub use control::{RatioSnapshot, StretchControl};
pub use params::{Quality, VocoderParams, RATIO_MAX, RATIO_MIN, VALID_FRAME_SIZES};
pub use phase_vocoder::PhaseVocoder;
