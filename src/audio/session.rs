// Conversion session
//
// Owns everything one run needs: the engine guard, both byte streams and
// both buffers. Setup order is configure → open input → open output →
// allocate, and every exit path tears down in reverse through ownership.

use colored::*;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use super::error::{ConversionError, ConversionResult};
use super::pipeline::{CancelFlag, Pipeline, PipelineState, PipelineStateMachine, PipelineStats};
use super::planner::BufferPlan;
use super::resampling::{EngineGuard, ResampleEngine, RubatoEngine};
use super::types::AudioSpec;
use crate::config::ConversionConfig;

/// Structured outcome of one session
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub session_id: String,
    pub source: AudioSpec,
    pub destination: AudioSpec,
    pub input_chunk_frames: usize,
    /// Output capacity planned before the first read
    pub output_capacity_frames: usize,
    pub final_state: PipelineState,
    #[serde(flatten)]
    pub stats: PipelineStats,
}

impl ConversionReport {
    pub fn input_duration_secs(&self) -> f64 {
        self.source.duration_secs(self.stats.input_frames)
    }

    pub fn output_duration_secs(&self) -> f64 {
        self.destination.duration_secs(self.stats.output_frames)
    }

    /// Output minus input duration; near zero for a complete run
    pub fn duration_drift_secs(&self) -> f64 {
        self.output_duration_secs() - self.input_duration_secs()
    }

    /// True when all input was converted and flushed
    pub fn is_complete(&self) -> bool {
        self.stats.conversion_error.is_none() && !self.stats.cancelled
    }
}

/// One conversion request. Each run builds its own engine and buffers;
/// nothing is shared with other sessions.
pub struct ConversionSession {
    id: String,
    config: ConversionConfig,
}

impl ConversionSession {
    pub fn new(config: ConversionConfig) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            config,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Convert `input_path` into `output_path` with the rubato engine
    pub fn run(&self, cancel: &CancelFlag) -> ConversionResult<ConversionReport> {
        self.run_with_engine::<RubatoEngine>(cancel)
    }

    pub fn run_with_engine<E: ResampleEngine>(
        &self,
        cancel: &CancelFlag,
    ) -> ConversionResult<ConversionReport> {
        let mut machine = PipelineStateMachine::new(self.id.clone());
        info!(
            "🎬 {}: session {} {} → {}",
            "CONVERSION_START".green(),
            self.id,
            self.config.input_path.display(),
            self.config.output_path.display()
        );

        let result = self
            .config
            .validate_paths()
            .and_then(|_| self.configure::<E>(&mut machine))
            .and_then(|engine| {
                let mut reader = open_source(&self.config.input_path)?;
                let mut writer = open_sink(&self.config.output_path)?;
                self.drive(engine, &mut reader, &mut writer, cancel, &mut machine)
            });
        self.finish(result, &mut machine)
    }

    /// Same as `run` but over caller-supplied streams
    pub fn run_streams<E, R, W>(
        &self,
        reader: &mut R,
        writer: &mut W,
        cancel: &CancelFlag,
    ) -> ConversionResult<ConversionReport>
    where
        E: ResampleEngine,
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        let mut machine = PipelineStateMachine::new(self.id.clone());
        let result = self
            .configure::<E>(&mut machine)
            .and_then(|engine| self.drive(engine, reader, writer, cancel, &mut machine));
        self.finish(result, &mut machine)
    }

    fn configure<E: ResampleEngine>(
        &self,
        machine: &mut PipelineStateMachine,
    ) -> ConversionResult<EngineGuard<E>> {
        machine.transition(PipelineState::Configuring);
        self.config.validate()?;
        EngineGuard::configure(
            &self.config.destination,
            &self.config.source,
            &self.config.engine_options(),
        )
    }

    fn drive<E, R, W>(
        &self,
        mut engine: EngineGuard<E>,
        reader: &mut R,
        writer: &mut W,
        cancel: &CancelFlag,
        machine: &mut PipelineStateMachine,
    ) -> ConversionResult<ConversionReport>
    where
        E: ResampleEngine,
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        let source = self.config.source;
        let destination = self.config.destination;
        let plan = BufferPlan::new(
            self.config.input_chunk_frames,
            &source,
            &destination,
            engine.pending_delay(source.sample_rate()),
        )?;
        let (mut input, mut output) = plan.allocate()?;

        let outcome = Pipeline::new(&mut engine, &plan, &mut input, &mut output, cancel)
            .run(&mut *reader, &mut *writer, machine);

        // Closed: flush the sink, then release the engine; buffers drop with this frame
        let flushed = writer.flush().map_err(ConversionError::OutputWrite);
        engine.release();

        let stats = outcome?;
        flushed?;
        Ok(ConversionReport {
            session_id: self.id.clone(),
            source,
            destination,
            input_chunk_frames: plan.input_chunk_frames,
            output_capacity_frames: plan.output_capacity_frames,
            final_state: PipelineState::Closed,
            stats,
        })
    }

    fn finish(
        &self,
        result: ConversionResult<ConversionReport>,
        machine: &mut PipelineStateMachine,
    ) -> ConversionResult<ConversionReport> {
        match result {
            Ok(report) => {
                machine.transition(PipelineState::Closed);
                info!(
                    "🏁 {}: session {} {} frames in → {} frames out ({} flushed, drift {:.4}s)",
                    "CONVERSION_DONE".green(),
                    self.id,
                    report.stats.input_frames,
                    report.stats.output_frames,
                    report.stats.flush_frames,
                    report.duration_drift_secs()
                );
                Ok(report)
            }
            Err(e) => {
                machine.fail(&e);
                machine.transition(PipelineState::Closed);
                Err(e)
            }
        }
    }
}

fn open_source(path: &Path) -> ConversionResult<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| ConversionError::SourceUnavailable {
            path: path.to_path_buf(),
            source,
        })
}

fn open_sink(path: &Path) -> ConversionResult<BufWriter<File>> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|source| ConversionError::SinkUnavailable {
            path: path.to_path_buf(),
            source,
        })
}
