// Resampling engine binding
//
// The pipeline drives any engine through `ResampleEngine`; the DSP behind
// it is opaque. `RubatoEngine` is the shipped implementation.
//
// Contract:
// - `configure` validates the source/destination pairing up front
// - `pending_delay` reports frames fed but not yet emitted
// - `convert` with no input is the flush signal; `Ok(0)` is not an error
// - `release` is idempotent

pub mod rubato_engine;
pub mod samples;

use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};

use super::buffer::SampleBuffer;
use super::error::ConversionResult;
use super::planner::DEFAULT_INPUT_CHUNK_FRAMES;
use super::types::AudioSpec;

pub use rubato_engine::RubatoEngine;
pub use samples::ChannelMix;

/// Quality/CPU trade-off for the rate converter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleQuality {
    /// Windowed sinc interpolation
    #[default]
    HighQuality,
    /// Polynomial interpolation
    Fast,
}

/// Engine tuning knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub quality: ResampleQuality,
    /// Frames the rate converter consumes per internal step
    pub chunk_frames: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            quality: ResampleQuality::default(),
            chunk_frames: DEFAULT_INPUT_CHUNK_FRAMES,
        }
    }
}

/// Stateful format/rate converter with an internal delay line
pub trait ResampleEngine: Send {
    fn configure(
        destination: &AudioSpec,
        source: &AudioSpec,
        options: &EngineOptions,
    ) -> ConversionResult<Self>
    where
        Self: Sized;

    /// Frames buffered inside the engine, expressed at `base_rate`, rounded up
    fn pending_delay(&self, base_rate: u32) -> u64;

    /// Consume `input` (or flush when `None`) and write at most
    /// `output_capacity_frames` frames into `output`. Returns frames produced.
    fn convert(
        &mut self,
        output: &mut SampleBuffer,
        output_capacity_frames: usize,
        input: Option<(&SampleBuffer, usize)>,
    ) -> ConversionResult<usize>;

    fn release(&mut self);

    fn is_released(&self) -> bool;
}

/// Owns a configured engine and releases it exactly once, on every exit path
pub struct EngineGuard<E: ResampleEngine> {
    engine: E,
}

impl<E: ResampleEngine> EngineGuard<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    /// Configure an engine and wrap it in a guard
    pub fn configure(
        destination: &AudioSpec,
        source: &AudioSpec,
        options: &EngineOptions,
    ) -> ConversionResult<Self> {
        E::configure(destination, source, options).map(Self::new)
    }

    /// Release early. Dropping the guard afterwards is a no-op.
    pub fn release(&mut self) {
        self.engine.release();
    }
}

impl<E: ResampleEngine> Deref for EngineGuard<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.engine
    }
}

impl<E: ResampleEngine> DerefMut for EngineGuard<E> {
    fn deref_mut(&mut self) -> &mut E {
        &mut self.engine
    }
}

impl<E: ResampleEngine> Drop for EngineGuard<E> {
    fn drop(&mut self) {
        if !self.engine.is_released() {
            self.engine.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Engine that only counts real teardown work
    struct CountingEngine {
        teardowns: Arc<AtomicUsize>,
        released: bool,
    }

    impl ResampleEngine for CountingEngine {
        fn configure(_: &AudioSpec, _: &AudioSpec, _: &EngineOptions) -> ConversionResult<Self> {
            unreachable!("constructed directly in tests")
        }

        fn pending_delay(&self, _base_rate: u32) -> u64 {
            0
        }

        fn convert(
            &mut self,
            _output: &mut SampleBuffer,
            _output_capacity_frames: usize,
            _input: Option<(&SampleBuffer, usize)>,
        ) -> ConversionResult<usize> {
            Ok(0)
        }

        fn release(&mut self) {
            if !self.released {
                self.released = true;
                self.teardowns.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn is_released(&self) -> bool {
            self.released
        }
    }

    #[test]
    fn test_guard_releases_once_on_drop() {
        let teardowns = Arc::new(AtomicUsize::new(0));
        {
            let _guard = EngineGuard::new(CountingEngine {
                teardowns: teardowns.clone(),
                released: false,
            });
        }
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_explicit_release_then_drop_is_single_teardown() {
        let teardowns = Arc::new(AtomicUsize::new(0));
        {
            let mut guard = EngineGuard::new(CountingEngine {
                teardowns: teardowns.clone(),
                released: false,
            });
            guard.release();
            guard.release();
            assert!(guard.is_released());
        }
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    }
}
