//! Core types, window functions, FFT helpers and the real-time sample ring.

pub mod fft;
pub mod ring_buffer;
pub mod types;
pub mod window;

pub use ring_buffer::SampleRing;
pub use types::*;
pub use window::{generate_window, window_energy, WindowType};
