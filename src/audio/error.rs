// Conversion error types
//
// Every failure a conversion session can hit is a variant here so callers
// can react programmatically instead of scraping log output.

use std::io;
use std::path::PathBuf;

/// Errors surfaced by a conversion session
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// The engine rejected the source/destination pairing
    #[error("Engine configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("Input source unavailable ({}): {source}", .path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Output sink unavailable ({}): {source}", .path.display())]
    SinkUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Buffer acquisition failed or the requested size does not fit in memory
    #[error("Buffer allocation failed ({bytes} bytes requested)")]
    AllocationFailed { bytes: u64 },

    /// The engine reported an error result from a convert call
    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    #[error("Failed to read input: {0}")]
    InputRead(#[source] io::Error),

    #[error("Failed to write output: {0}")]
    OutputWrite(#[source] io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The background task died before yielding a result
    #[error("Conversion task failed: {0}")]
    Task(String),
}

impl ConversionError {
    /// Short machine-friendly tag for the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ConversionError::ConfigurationFailed(_) => "configuration_failed",
            ConversionError::SourceUnavailable { .. } => "source_unavailable",
            ConversionError::SinkUnavailable { .. } => "sink_unavailable",
            ConversionError::AllocationFailed { .. } => "allocation_failed",
            ConversionError::ConversionFailed(_) => "conversion_failed",
            ConversionError::InputRead(_) => "input_read",
            ConversionError::OutputWrite(_) => "output_write",
            ConversionError::InvalidConfig(_) => "invalid_config",
            ConversionError::Task(_) => "task",
        }
    }
}

pub type ConversionResult<T> = Result<T, ConversionError>;
