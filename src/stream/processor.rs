use std::sync::Arc;

use crate::core::fft::{WINDOW_SUM_EPSILON, WINDOW_SUM_FLOOR_RATIO};
use crate::core::ring_buffer::SampleRing;
use crate::core::window::window_energy;
use crate::error::BeatshiftError;
use crate::stretch::control::{RatioSnapshot, StretchControl};
use crate::stretch::params::{VocoderParams, RATIO_MAX};
use crate::stretch::phase_vocoder::{FrameOutcome, PhaseVocoder};

/// Lifecycle state of a [`StreamProcessor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessorState {
    /// No session; `process` outputs silence.
    #[default]
    Idle,
    /// A session is running.
    Streaming,
}

/// Per-block accounting returned by [`StreamProcessor::process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockReport {
    /// Synthesized samples written to the caller's output block.
    pub produced: usize,
    /// Output samples filled with silence because nothing was ready.
    pub underrun: usize,
    /// Synthesized samples dropped because the output ring was full.
    pub overrun: usize,
    /// Non-finite input blocks or frames replaced with silence.
    pub anomalies: usize,
    /// Input samples refused because the block exceeded `max_block_size`.
    pub rejected: usize,
    /// State after the block.
    pub state: ProcessorState,
}

impl BlockReport {
    fn merge(&mut self, other: BlockReport) {
        self.produced += other.produced;
        self.underrun += other.underrun;
        self.overrun += other.overrun;
        self.anomalies += other.anomalies;
        self.rejected += other.rejected;
        self.state = other.state;
    }

    /// Turns recorded anomalies and rejected input into an error.
    ///
    /// The processor never logs from the audio thread; hosts call this (and
    /// log the error) elsewhere.
    pub fn into_result(self) -> Result<BlockReport, BeatshiftError> {
        if self.rejected > 0 {
            return Err(BeatshiftError::InvalidInput(format!(
                "{} input sample(s) refused: block larger than the session's max block size",
                self.rejected
            )));
        }
        if self.anomalies > 0 {
            return Err(BeatshiftError::NumericAnomaly(format!(
                "{} non-finite block(s) or frame(s) replaced with silence",
                self.anomalies
            )));
        }
        Ok(self)
    }
}

/// Buffers owned by one Streaming session.
struct Session {
    params: VocoderParams,
    vocoder: PhaseVocoder,
    input: SampleRing,
    output: SampleRing,
    /// Frame copied out of the input ring.
    frame: Vec<f32>,
    /// Overlap-add accumulator; index 0 is the next output sample.
    ola: Vec<f32>,
    /// Squared-window sum matching `ola`.
    window_sum: Vec<f32>,
    /// Fractional part of the synthesis hop carried between frames.
    hop_carry: f64,
    window_energy: f32,
}

impl Session {
    fn new(params: VocoderParams) -> Self {
        let frame_size = params.frame_size;
        let vocoder = PhaseVocoder::new(frame_size, params.hop_size);
        let window_energy = window_energy(vocoder.window());

        let mut input = SampleRing::with_capacity(frame_size);
        input.push_silence(params.latency_samples());

        // Largest burst one block can synthesize, twice over for drain slack.
        let frames_per_block = params.max_block_size / params.hop_size + 2;
        let max_hop = (params.hop_size as f64 * RATIO_MAX).ceil() as usize;
        let output_capacity = 2 * (frames_per_block * max_hop + frame_size);

        Self {
            vocoder,
            input,
            output: SampleRing::with_capacity(output_capacity),
            frame: vec![0.0; frame_size],
            ola: vec![0.0; frame_size],
            window_sum: vec![0.0; frame_size],
            hop_carry: 0.0,
            window_energy,
            params,
        }
    }

    /// Feeds samples (or silence) through the ring, running a frame each time it fills.
    fn feed(&mut self, input: &[f32], silent: bool, ratios: RatioSnapshot, report: &mut BlockReport) {
        let mut offset = 0;
        while offset < input.len() {
            let written = if silent {
                self.input.push_silence(input.len() - offset)
            } else {
                self.input.push_slice(&input[offset..])
            };
            offset += written;
            if self.input.is_full() {
                self.run_frame(ratios, report);
            }
        }
    }

    fn run_frame(&mut self, ratios: RatioSnapshot, report: &mut BlockReport) {
        let hop = self.params.hop_size;
        self.input.copy_front(&mut self.frame);
        self.input.skip(hop);

        self.hop_carry += hop as f64 * ratios.stretch_ratio;
        let synthesis_hop = (self.hop_carry.floor() as usize).min(self.params.frame_size);
        self.hop_carry -= synthesis_hop as f64;

        if self.vocoder.process_frame(&self.frame, synthesis_hop, ratios.pitch_ratio as f32)
            == FrameOutcome::Reset
        {
            report.anomalies += 1;
        }

        let window = self.vocoder.window();
        let out = self.vocoder.output();
        for i in 0..self.params.frame_size {
            self.ola[i] += out[i];
            self.window_sum[i] += window[i] * window[i];
        }

        if synthesis_hop == 0 {
            return;
        }

        let floor = (WINDOW_SUM_FLOOR_RATIO * self.window_energy / synthesis_hop as f32)
            .max(WINDOW_SUM_EPSILON);
        for i in 0..synthesis_hop {
            self.ola[i] /= self.window_sum[i].max(floor);
        }
        let written = self.output.push_slice(&self.ola[..synthesis_hop]);
        report.overrun += synthesis_hop - written;

        let n = self.params.frame_size;
        self.ola.copy_within(synthesis_hop..n, 0);
        self.window_sum.copy_within(synthesis_hop..n, 0);
        self.ola[n - synthesis_hop..].iter_mut().for_each(|s| *s = 0.0);
        self.window_sum[n - synthesis_hop..].iter_mut().for_each(|s| *s = 0.0);
    }
}

/// Streaming phase-vocoder engine.
///
/// Starts `Idle`. [`StreamProcessor::start`] validates parameters, allocates
/// every buffer and enters `Streaming`; [`StreamProcessor::stop`] (or a stop
/// request through [`StretchControl`]) releases them. While streaming,
/// [`StreamProcessor::process`] performs no allocation, locking or I/O,
/// logging included: problems are only counted in the returned [`BlockReport`].
///
/// Input blocks longer than [`VocoderParams::max_block_size`] are refused
/// whole, since the output ring is sized for that bound.
///
/// Output lags input by [`StreamProcessor::latency_samples`].
pub struct StreamProcessor {
    control: Arc<StretchControl>,
    session: Option<Session>,
}

impl Default for StreamProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamProcessor {
    /// Creates an idle processor with its own controls.
    pub fn new() -> Self {
        Self::with_control(Arc::new(StretchControl::default()))
    }

    /// Creates an idle processor driven by existing controls.
    pub fn with_control(control: Arc<StretchControl>) -> Self {
        Self {
            control,
            session: None,
        }
    }

    /// Shared ratio and stop controls.
    pub fn control(&self) -> Arc<StretchControl> {
        Arc::clone(&self.control)
    }

    pub fn state(&self) -> ProcessorState {
        if self.session.is_some() {
            ProcessorState::Streaming
        } else {
            ProcessorState::Idle
        }
    }

    /// Parameters of the running session.
    pub fn params(&self) -> Option<&VocoderParams> {
        self.session.as_ref().map(|s| &s.params)
    }

    /// Starts a session, replacing any running one.
    ///
    /// The controls are set to the ratios in `params` and any pending stop
    /// request is cleared.
    pub fn start(&mut self, params: VocoderParams) -> Result<(), BeatshiftError> {
        params.validate()?;
        self.control.set_stretch_ratio(params.stretch_ratio);
        self.control.set_pitch_ratio(params.pitch_ratio);
        self.control.clear_stop();
        log::debug!(
            "Starting vocoder session: frame {}, hop {}, stretch {}, pitch {}",
            params.frame_size,
            params.hop_size,
            params.stretch_ratio,
            params.pitch_ratio
        );
        self.session = Some(Session::new(params));
        Ok(())
    }

    /// Ends the session and releases its buffers.
    pub fn stop(&mut self) {
        if self.session.take().is_some() {
            log::debug!("Vocoder session stopped");
        }
    }

    /// Honours a pending stop request. Returns true if the processor is streaming.
    fn check_stop(&mut self) -> bool {
        if self.control.take_stop() {
            self.stop();
        }
        self.session.is_some()
    }

    /// Processes one block: feeds `input` and fills `output`.
    ///
    /// Ratios are read once at the start of the block. Output not yet
    /// synthesized is filled with silence and counted as underrun. An input
    /// block containing NaN or Inf is processed as silence; one longer than
    /// `max_block_size` is not consumed and counted as rejected.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) -> BlockReport {
        if !self.check_stop() {
            output.iter_mut().for_each(|s| *s = 0.0);
            return BlockReport::default();
        }
        let mut report = self.push_input(input);
        report.merge(self.drain_output(output));
        report
    }

    /// Feeds input without draining output.
    pub fn push_input(&mut self, input: &[f32]) -> BlockReport {
        if !self.check_stop() {
            return BlockReport::default();
        }
        let ratios = self.control.snapshot();
        let Some(session) = self.session.as_mut() else {
            return BlockReport::default();
        };
        let mut report = BlockReport {
            state: ProcessorState::Streaming,
            ..BlockReport::default()
        };
        if input.len() > session.params.max_block_size {
            report.rejected = input.len();
            return report;
        }
        let silent = input.iter().any(|s| !s.is_finite());
        if silent {
            report.anomalies += 1;
        }
        session.feed(input, silent, ratios, &mut report);
        report
    }

    /// Fills `output` from synthesized samples, padding with silence.
    pub fn drain_output(&mut self, output: &mut [f32]) -> BlockReport {
        let Some(session) = self.session.as_mut() else {
            output.iter_mut().for_each(|s| *s = 0.0);
            return BlockReport::default();
        };
        let produced = session.output.pop_into(output);
        output[produced..].iter_mut().for_each(|s| *s = 0.0);
        BlockReport {
            produced,
            underrun: output.len() - produced,
            state: ProcessorState::Streaming,
            ..BlockReport::default()
        }
    }

    /// Pushes enough silence to synthesize everything already fed.
    ///
    /// Returns the number of samples ready in the output ring.
    pub fn flush(&mut self) -> usize {
        let ratios = self.control.snapshot();
        let Some(session) = self.session.as_mut() else {
            return 0;
        };
        let mut report = BlockReport::default();
        // Enough for the frame whose first hop holds the last fed sample
        let mut remaining = session.params.latency_samples() + session.params.hop_size - 1;
        while remaining > 0 {
            let n = remaining.min(session.input.free().max(1));
            let pushed = session.input.push_silence(n);
            remaining -= pushed;
            if session.input.is_full() {
                session.run_frame(ratios, &mut report);
            }
        }
        if report.overrun > 0 {
            log::warn!("Flush dropped {} samples on a full output ring", report.overrun);
        }
        session.output.len()
    }

    /// Delay in samples between an input sample and its output.
    pub fn latency_samples(&self) -> usize {
        self.session
            .as_ref()
            .map_or(0, |s| s.params.latency_samples())
    }

    /// [`StreamProcessor::latency_samples`] in seconds at the session's sample rate.
    pub fn latency_secs(&self) -> f64 {
        self.session.as_ref().map_or(0.0, |s| s.params.latency_secs())
    }

    /// Synthesized samples waiting to be drained.
    pub fn available_output(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.output.len())
    }

    /// Input samples needed before `output_len` samples can be drained at
    /// the current stretch ratio.
    ///
    /// The result may exceed `max_block_size`; feed it in blocks no larger
    /// than that.
    pub fn input_needed(&self, output_len: usize) -> usize {
        let Some(session) = self.session.as_ref() else {
            return 0;
        };
        let deficit = output_len.saturating_sub(session.output.len());
        if deficit == 0 {
            return 0;
        }
        let hop = session.params.hop_size;
        let per_frame = hop as f64 * self.control.stretch_ratio();
        let frames = ((deficit as f64 - session.hop_carry) / per_frame).ceil().max(1.0) as usize;
        session.input.free() + (frames - 1) * hop
    }
}
