// Audio module - PCM format and sample rate conversion
//
// This module is broken down into logical components:
// - types: AudioSpec, sample formats and channel layouts
// - buffer / planner / rescale: buffer sizing and allocation
// - resampling: the engine contract and the rubato-backed engine
// - pipeline: streaming and flush loops
// - session / runner: setup, teardown and background execution

pub mod buffer;
pub mod error;
pub mod pipeline;
pub mod planner;
pub mod resampling;
pub mod rescale;
pub mod runner;
pub mod session;
pub mod types;

// Re-export commonly used types for easier imports
pub use buffer::SampleBuffer;
pub use error::{ConversionError, ConversionResult};
pub use pipeline::{CancelFlag, PipelineState, PipelineStats};
pub use planner::{BufferPlan, DEFAULT_INPUT_CHUNK_FRAMES};
pub use resampling::{EngineGuard, EngineOptions, ResampleEngine, ResampleQuality, RubatoEngine};
pub use runner::{spawn_conversion, spawn_conversion_with, ConversionHandle};
pub use session::{ConversionReport, ConversionSession};
pub use types::{AudioSpec, ChannelLayout, SampleFormat};
