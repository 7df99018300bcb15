// Streaming and flush loops
//
// Idle → Configuring → Streaming → Flushing → Closed, with Failed reachable
// from every state but Closed. Resources are owned by the session; this
// module only moves bytes through the engine.

use colored::*;
use serde::Serialize;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::buffer::SampleBuffer;
use super::error::{ConversionError, ConversionResult};
use super::planner::{output_capacity_for, BufferPlan};
use super::resampling::{EngineGuard, ResampleEngine};
use crate::chunk_trace;

/// Cooperative cancellation, observed between chunks
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Configuring,
    Streaming,
    Flushing,
    Closed,
    Failed,
}

/// Tracks and logs the lifecycle of one session
#[derive(Debug)]
pub struct PipelineStateMachine {
    session_id: String,
    state: PipelineState,
    history: Vec<PipelineState>,
}

impl PipelineStateMachine {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            state: PipelineState::Idle,
            history: vec![PipelineState::Idle],
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Every state visited so far, in order
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    pub fn transition(&mut self, next: PipelineState) {
        if self.state == PipelineState::Closed || self.state == next {
            return;
        }
        debug!("session {}: {:?} → {:?}", self.session_id, self.state, next);
        self.state = next;
        self.history.push(next);
    }

    pub fn fail(&mut self, error: &ConversionError) {
        warn!(
            "❌ {}: session {} failed in {:?}: {}",
            "PIPELINE_FAILED".red(),
            self.session_id,
            self.state,
            error
        );
        self.transition(PipelineState::Failed);
    }
}

/// Counters collected while streaming and flushing
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineStats {
    pub input_frames: u64,
    pub input_bytes: u64,
    pub output_frames: u64,
    pub output_bytes: u64,
    /// Frames emitted after the input was exhausted
    pub flush_frames: u64,
    /// Engine delay (source-rate frames) when streaming ended
    pub delay_at_flush: u64,
    pub convert_calls: u64,
    /// Bytes of an incomplete final frame that could not be converted
    pub trailing_bytes_dropped: u64,
    /// Largest output capacity used after re-planning
    pub peak_output_capacity_frames: usize,
    /// Engine error that ended streaming early; output before it is kept
    pub conversion_error: Option<String>,
    pub cancelled: bool,
}

/// Borrowed resources for one run of the loops
pub struct Pipeline<'a, E: ResampleEngine> {
    engine: &'a mut EngineGuard<E>,
    plan: &'a BufferPlan,
    input: &'a mut SampleBuffer,
    output: &'a mut SampleBuffer,
    cancel: &'a CancelFlag,
    output_capacity_frames: usize,
    stats: PipelineStats,
}

impl<'a, E: ResampleEngine> Pipeline<'a, E> {
    pub fn new(
        engine: &'a mut EngineGuard<E>,
        plan: &'a BufferPlan,
        input: &'a mut SampleBuffer,
        output: &'a mut SampleBuffer,
        cancel: &'a CancelFlag,
    ) -> Self {
        let output_capacity_frames = plan.output_capacity_frames.min(output.capacity_frames());
        Self {
            engine,
            plan,
            input,
            output,
            cancel,
            output_capacity_frames,
            stats: PipelineStats {
                peak_output_capacity_frames: output_capacity_frames,
                ..Default::default()
            },
        }
    }

    /// Run Streaming then Flushing. I/O failures abort; engine failures
    /// only stop further output.
    pub fn run<R, W>(
        mut self,
        reader: &mut R,
        writer: &mut W,
        machine: &mut PipelineStateMachine,
    ) -> ConversionResult<PipelineStats>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        machine.transition(PipelineState::Streaming);
        self.stream(reader, writer)?;

        if self.stats.cancelled {
            return Ok(self.stats);
        }

        machine.transition(PipelineState::Flushing);
        self.flush(writer)?;
        Ok(self.stats)
    }

    fn stream<R, W>(&mut self, reader: &mut R, writer: &mut W) -> ConversionResult<()>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        let source = self.plan.source;
        let source_bytes_per_frame = source.bytes_per_frame();

        loop {
            if self.cancel.is_cancelled() {
                info!("⏹️ {}: cancelled while streaming", "PIPELINE".yellow());
                self.stats.cancelled = true;
                return Ok(());
            }

            let bytes_read = self
                .input
                .fill_from(reader)
                .map_err(ConversionError::InputRead)?;
            if bytes_read == 0 {
                return Ok(());
            }

            let frames_read = bytes_read / source_bytes_per_frame;
            let remainder = bytes_read % source_bytes_per_frame;
            self.stats.input_bytes += bytes_read as u64;
            self.stats.input_frames += frames_read as u64;
            if remainder != 0 {
                warn!(
                    "⚠️ {}: input ends with {} bytes of an incomplete {}-byte frame, dropped",
                    "PARTIAL_FRAME".yellow(),
                    remainder,
                    source_bytes_per_frame
                );
                self.stats.trailing_bytes_dropped += remainder as u64;
            }
            if frames_read == 0 {
                return Ok(());
            }
            self.input.spread_planes(frames_read);

            self.ensure_capacity(frames_read)?;

            self.stats.convert_calls += 1;
            let converted = self.engine.convert(
                self.output,
                self.output_capacity_frames,
                Some((&*self.input, frames_read)),
            );
            match converted {
                Ok(frames_produced) => {
                    chunk_trace!(
                        "convert: {} frames in → {} frames out (capacity {})",
                        frames_read,
                        frames_produced,
                        self.output_capacity_frames
                    );
                    self.emit(frames_produced, writer)?;
                }
                Err(e) => {
                    warn!(
                        "❌ {}: {} - stopping input, keeping {} frames already written",
                        "CONVERT_ERROR".red(),
                        e,
                        self.stats.output_frames
                    );
                    self.stats.conversion_error = Some(e.to_string());
                    return Ok(());
                }
            }
        }
    }

    fn flush<W: Write + ?Sized>(&mut self, writer: &mut W) -> ConversionResult<()> {
        let source_rate = self.plan.source.sample_rate();
        self.stats.delay_at_flush = self.engine.pending_delay(source_rate);
        self.ensure_capacity(0)?;

        loop {
            if self.cancel.is_cancelled() {
                info!("⏹️ {}: cancelled while flushing", "PIPELINE".yellow());
                self.stats.cancelled = true;
                return Ok(());
            }

            self.stats.convert_calls += 1;
            match self
                .engine
                .convert(self.output, self.output_capacity_frames, None)
            {
                Ok(0) => break,
                Ok(frames_produced) => {
                    chunk_trace!("flush: {} frames out", frames_produced);
                    self.stats.flush_frames += frames_produced as u64;
                    self.emit(frames_produced, writer)?;
                }
                Err(e) => {
                    warn!("❌ {}: {}", "FLUSH_ERROR".red(), e);
                    if self.stats.conversion_error.is_none() {
                        self.stats.conversion_error = Some(e.to_string());
                    }
                    break;
                }
            }
        }

        debug!(
            "flush drained {} frames (delay at flush was {} source frames)",
            self.stats.flush_frames, self.stats.delay_at_flush
        );
        Ok(())
    }

    /// Grow the output buffer if the engine's current delay plus the next
    /// input could produce more than it holds.
    fn ensure_capacity(&mut self, input_frames: usize) -> ConversionResult<()> {
        let delay = self.engine.pending_delay(self.plan.source.sample_rate());
        let needed = output_capacity_for(input_frames, delay, &self.plan.source, &self.plan.destination)?;
        if needed > self.output_capacity_frames {
            debug!(
                "re-planning output: {} → {} frames (delay {})",
                self.output_capacity_frames, needed, delay
            );
            self.output.grow(needed)?;
            self.output_capacity_frames = needed;
            self.stats.peak_output_capacity_frames = needed;
        }
        Ok(())
    }

    fn emit<W: Write + ?Sized>(&mut self, frames_produced: usize, writer: &mut W) -> ConversionResult<()> {
        if frames_produced == 0 {
            return Ok(());
        }
        let produced_bytes = self
            .output
            .write_frames(frames_produced, writer)
            .map_err(ConversionError::OutputWrite)?;
        self.stats.output_frames += frames_produced as u64;
        self.stats.output_bytes += produced_bytes as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::resampling::EngineOptions;
    use crate::audio::types::{AudioSpec, ChannelLayout, SampleFormat};
    use std::io::Cursor;

    /// Passes frames through unchanged but fails on a chosen call
    struct FailingEngine {
        spec: AudioSpec,
        fail_on_call: usize,
        calls: usize,
        released: bool,
    }

    impl ResampleEngine for FailingEngine {
        fn configure(
            destination: &AudioSpec,
            _source: &AudioSpec,
            _options: &EngineOptions,
        ) -> ConversionResult<Self> {
            Ok(Self {
                spec: *destination,
                fail_on_call: 2,
                calls: 0,
                released: false,
            })
        }

        fn pending_delay(&self, _base_rate: u32) -> u64 {
            0
        }

        fn convert(
            &mut self,
            output: &mut SampleBuffer,
            output_capacity_frames: usize,
            input: Option<(&SampleBuffer, usize)>,
        ) -> ConversionResult<usize> {
            self.calls += 1;
            if self.calls == self.fail_on_call {
                return Err(ConversionError::ConversionFailed("injected".to_string()));
            }
            let Some((input, frames)) = input else {
                return Ok(0);
            };
            let frames = frames.min(output_capacity_frames);
            for frame in 0..frames {
                for ch in 0..self.spec.channels() {
                    let bytes = input.sample_bytes(frame, ch).to_vec();
                    output.sample_bytes_mut(frame, ch).copy_from_slice(&bytes);
                }
            }
            Ok(frames)
        }

        fn release(&mut self) {
            self.released = true;
        }

        fn is_released(&self) -> bool {
            self.released
        }
    }

    fn spec() -> AudioSpec {
        AudioSpec::new(ChannelLayout::stereo(), SampleFormat::S16, 48000)
    }

    #[test]
    fn test_conversion_error_keeps_earlier_output() {
        let spec = spec();
        let plan = BufferPlan::new(4, &spec, &spec, 0).unwrap();
        let (mut input, mut output) = plan.allocate().unwrap();
        let mut engine = EngineGuard::<FailingEngine>::configure(&spec, &spec, &EngineOptions::default()).unwrap();
        let cancel = CancelFlag::new();
        let mut machine = PipelineStateMachine::new("test");

        let data: Vec<u8> = (0..64).collect(); // 16 frames = 4 chunks
        let mut reader = Cursor::new(data.clone());
        let mut writer = Vec::new();

        let stats = Pipeline::new(&mut engine, &plan, &mut input, &mut output, &cancel)
            .run(&mut reader, &mut writer, &mut machine)
            .unwrap();

        // First chunk written, second call failed, nothing after it
        assert_eq!(writer, data[..16].to_vec());
        assert_eq!(stats.output_frames, 4);
        assert!(stats.conversion_error.as_deref().unwrap().contains("injected"));
        assert_eq!(machine.state(), PipelineState::Flushing);
    }

    #[test]
    fn test_cancel_before_first_chunk() {
        let spec = spec();
        let plan = BufferPlan::new(4, &spec, &spec, 0).unwrap();
        let (mut input, mut output) = plan.allocate().unwrap();
        let mut engine = EngineGuard::<FailingEngine>::configure(&spec, &spec, &EngineOptions::default()).unwrap();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let mut machine = PipelineStateMachine::new("test");

        let mut reader = Cursor::new(vec![0u8; 64]);
        let mut writer = Vec::new();
        let stats = Pipeline::new(&mut engine, &plan, &mut input, &mut output, &cancel)
            .run(&mut reader, &mut writer, &mut machine)
            .unwrap();

        assert!(stats.cancelled);
        assert_eq!(stats.input_frames, 0);
        assert!(writer.is_empty());
        assert_eq!(machine.state(), PipelineState::Streaming);
    }

    #[test]
    fn test_state_machine_ignores_moves_after_closed() {
        let mut machine = PipelineStateMachine::new("test");
        machine.transition(PipelineState::Configuring);
        machine.fail(&ConversionError::ConfigurationFailed("nope".to_string()));
        machine.transition(PipelineState::Closed);
        machine.transition(PipelineState::Streaming);
        assert_eq!(machine.state(), PipelineState::Closed);
        assert_eq!(
            machine.history(),
            &[
                PipelineState::Idle,
                PipelineState::Configuring,
                PipelineState::Failed,
                PipelineState::Closed
            ]
        );
    }
}
