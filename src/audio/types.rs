// Core audio format types
//
// An `AudioSpec` describes one endpoint of a conversion: channel layout,
// sample encoding and sample rate. Bytes per frame is always derived from
// the first two and never stored on its own.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-sample numeric encoding plus interleaved/planar storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    U8,
    S16,
    S32,
    F32,
    F64,
    U8P,
    S16P,
    S32P,
    F32P,
    F64P,
}

impl SampleFormat {
    pub const fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::U8 | SampleFormat::U8P => 1,
            SampleFormat::S16 | SampleFormat::S16P => 2,
            SampleFormat::S32 | SampleFormat::S32P | SampleFormat::F32 | SampleFormat::F32P => 4,
            SampleFormat::F64 | SampleFormat::F64P => 8,
        }
    }

    pub const fn is_planar(&self) -> bool {
        matches!(
            self,
            SampleFormat::U8P
                | SampleFormat::S16P
                | SampleFormat::S32P
                | SampleFormat::F32P
                | SampleFormat::F64P
        )
    }

    /// Interleaved variant of the same encoding
    pub const fn packed(&self) -> Self {
        match self {
            SampleFormat::U8P => SampleFormat::U8,
            SampleFormat::S16P => SampleFormat::S16,
            SampleFormat::S32P => SampleFormat::S32,
            SampleFormat::F32P => SampleFormat::F32,
            SampleFormat::F64P => SampleFormat::F64,
            other => *other,
        }
    }

    /// Planar variant of the same encoding
    pub const fn planar(&self) -> Self {
        match self {
            SampleFormat::U8 => SampleFormat::U8P,
            SampleFormat::S16 => SampleFormat::S16P,
            SampleFormat::S32 => SampleFormat::S32P,
            SampleFormat::F32 => SampleFormat::F32P,
            SampleFormat::F64 => SampleFormat::F64P,
            other => *other,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            SampleFormat::U8 => "u8",
            SampleFormat::S16 => "s16",
            SampleFormat::S32 => "s32",
            SampleFormat::F32 => "f32",
            SampleFormat::F64 => "f64",
            SampleFormat::U8P => "u8p",
            SampleFormat::S16P => "s16p",
            SampleFormat::S32P => "s32p",
            SampleFormat::F32P => "f32p",
            SampleFormat::F64P => "f64p",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Channel count plus spatial arrangement bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelLayout {
    pub channels: u16,
    /// Speaker positions; 0 when only the count is known
    #[serde(default)]
    pub mask: u64,
}

impl ChannelLayout {
    pub const FRONT_LEFT: u64 = 1 << 0;
    pub const FRONT_RIGHT: u64 = 1 << 1;
    pub const FRONT_CENTER: u64 = 1 << 2;
    pub const LOW_FREQUENCY: u64 = 1 << 3;
    pub const BACK_LEFT: u64 = 1 << 4;
    pub const BACK_RIGHT: u64 = 1 << 5;

    pub const fn mono() -> Self {
        Self {
            channels: 1,
            mask: Self::FRONT_CENTER,
        }
    }

    pub const fn stereo() -> Self {
        Self {
            channels: 2,
            mask: Self::FRONT_LEFT | Self::FRONT_RIGHT,
        }
    }

    pub const fn surround_5_1() -> Self {
        Self {
            channels: 6,
            mask: Self::FRONT_LEFT
                | Self::FRONT_RIGHT
                | Self::FRONT_CENTER
                | Self::LOW_FREQUENCY
                | Self::BACK_LEFT
                | Self::BACK_RIGHT,
        }
    }

    pub const fn unspecified(channels: u16) -> Self {
        Self { channels, mask: 0 }
    }

    pub const fn is_mono(&self) -> bool {
        self.channels == 1
    }
}

/// One endpoint of a conversion. Immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioSpec {
    channel_layout: ChannelLayout,
    sample_format: SampleFormat,
    sample_rate: u32,
}

impl AudioSpec {
    pub const fn new(channel_layout: ChannelLayout, sample_format: SampleFormat, sample_rate: u32) -> Self {
        Self {
            channel_layout,
            sample_format,
            sample_rate,
        }
    }

    pub const fn channel_layout(&self) -> ChannelLayout {
        self.channel_layout
    }

    pub const fn sample_format(&self) -> SampleFormat {
        self.sample_format
    }

    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub const fn channels(&self) -> usize {
        self.channel_layout.channels as usize
    }

    pub const fn is_planar(&self) -> bool {
        self.sample_format.is_planar()
    }

    /// Bytes for one sample on every channel
    pub const fn bytes_per_frame(&self) -> usize {
        self.sample_format.bytes_per_sample() * self.channels()
    }

    /// Number of separate byte regions a buffer of this spec needs
    pub const fn plane_count(&self) -> usize {
        if self.is_planar() {
            self.channels()
        } else {
            1
        }
    }

    /// Seconds of audio represented by `frames` at this rate
    pub fn duration_secs(&self, frames: u64) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        frames as f64 / self.sample_rate as f64
    }

    /// Reject specs that can never describe real audio
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".to_string());
        }
        if self.channel_layout.channels == 0 {
            return Err("channel layout has no channels".to_string());
        }
        if self.channel_layout.mask != 0
            && self.channel_layout.mask.count_ones() != self.channel_layout.channels as u32
        {
            return Err(format!(
                "channel mask {:#x} does not match {} channels",
                self.channel_layout.mask, self.channel_layout.channels
            ));
        }
        Ok(())
    }
}

impl fmt::Display for AudioSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}ch {} @ {}Hz",
            self.channel_layout.channels, self.sample_format, self.sample_rate
        )
    }
}
