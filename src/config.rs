// Conversion configuration
//
// Endpoints, file paths and chunk size are explicit parameters of a
// session. `Default` reproduces the classic desktop setup: stereo f32 at
// 44.1 kHz in, stereo s16 at 48 kHz out.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::audio::error::{ConversionError, ConversionResult};
use crate::audio::planner::DEFAULT_INPUT_CHUNK_FRAMES;
use crate::audio::resampling::{EngineOptions, ResampleQuality};
use crate::audio::types::{AudioSpec, ChannelLayout, SampleFormat};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub source: AudioSpec,
    pub destination: AudioSpec,
    pub input_chunk_frames: usize, // frames per read
    pub quality: ResampleQuality,
    /// Log every convert call at debug level
    pub chunk_trace: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("in.pcm"),
            output_path: PathBuf::from("out.pcm"),
            source: AudioSpec::new(ChannelLayout::stereo(), SampleFormat::F32, 44100),
            destination: AudioSpec::new(ChannelLayout::stereo(), SampleFormat::S16, 48000),
            input_chunk_frames: DEFAULT_INPUT_CHUNK_FRAMES,
            quality: ResampleQuality::HighQuality,
            chunk_trace: false,
        }
    }
}

impl ConversionConfig {
    /// Config for a pair of files with default formats
    pub fn for_files(input_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            ..Default::default()
        }
    }

    pub fn with_specs(mut self, source: AudioSpec, destination: AudioSpec) -> Self {
        self.source = source;
        self.destination = destination;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse conversion config")
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            quality: self.quality,
            chunk_frames: self.input_chunk_frames,
        }
    }

    /// Checks that do not need the engine. Endpoint compatibility is the
    /// engine's call at configure time.
    pub fn validate(&self) -> ConversionResult<()> {
        if self.input_chunk_frames == 0 {
            return Err(ConversionError::InvalidConfig(
                "input_chunk_frames must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Only relevant when the session opens the files itself
    pub fn validate_paths(&self) -> ConversionResult<()> {
        if self.input_path.as_os_str().is_empty() || self.output_path.as_os_str().is_empty() {
            return Err(ConversionError::InvalidConfig(
                "input and output paths must be set".to_string(),
            ));
        }
        if self.input_path == self.output_path {
            return Err(ConversionError::InvalidConfig(format!(
                "output would truncate the input: {}",
                self.input_path.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_desktop_setup() {
        let config = ConversionConfig::default();
        assert_eq!(config.source.sample_format(), SampleFormat::F32);
        assert_eq!(config.source.sample_rate(), 44100);
        assert_eq!(config.destination.sample_format(), SampleFormat::S16);
        assert_eq!(config.destination.sample_rate(), 48000);
        assert_eq!(config.input_chunk_frames, 1024);
        assert!(config.validate().is_ok());
        assert!(config.validate_paths().is_ok());
        assert!(!config.chunk_trace);
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config = ConversionConfig::from_json_str(
            r#"{
                "input_path": "/tmp/a.pcm",
                "destination": {
                    "channel_layout": { "channels": 1 },
                    "sample_format": "s16",
                    "sample_rate": 16000
                },
                "quality": "fast",
                "chunk_trace": true
            }"#,
        )
        .unwrap();
        assert_eq!(config.input_path, PathBuf::from("/tmp/a.pcm"));
        assert_eq!(config.output_path, PathBuf::from("out.pcm"));
        assert_eq!(config.destination.channels(), 1);
        assert_eq!(config.destination.sample_rate(), 16000);
        assert_eq!(config.quality, ResampleQuality::Fast);
        assert!(config.chunk_trace);
        assert_eq!(config.engine_options().chunk_frames, 1024);
    }

    #[test]
    fn test_validate_paths_rejects_same_path() {
        let config = ConversionConfig::for_files("same.pcm", "same.pcm");
        assert!(config.validate().is_ok());
        assert!(matches!(config.validate_paths(), Err(ConversionError::InvalidConfig(_))));

        let config = ConversionConfig::for_files("", "out.pcm");
        assert!(matches!(config.validate_paths(), Err(ConversionError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_zero_chunk() {
        let config = ConversionConfig {
            input_chunk_frames: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConversionError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = ConversionConfig::from_json_file("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }
}
