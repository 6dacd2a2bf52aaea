//! Real-time block processing around the phase vocoder.

pub mod processor;

pub use processor::{BlockReport, ProcessorState, StreamProcessor};
