pub mod audio;
pub mod config;
pub mod log;

// Re-export audio types for testing and external use
pub use audio::{
    spawn_conversion, AudioSpec, BufferPlan, CancelFlag, ChannelLayout, ConversionError,
    ConversionHandle, ConversionReport, ConversionSession, ResampleEngine, ResampleQuality,
    RubatoEngine, SampleFormat,
};
pub use config::ConversionConfig;
