// Sample decoding, encoding and channel remixing
//
// The engine works on per-channel f32 planes internally. These helpers move
// raw little-endian bytes in any supported `SampleFormat` into and out of
// that representation.

use std::collections::VecDeque;

use crate::audio::buffer::SampleBuffer;
use crate::audio::types::{ChannelLayout, SampleFormat};

/// How source channels map onto destination channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMix {
    /// Same channel count, channels pass through
    Identity,
    /// Mono source copied to every destination channel
    Duplicate,
    /// Every source channel averaged into a mono destination
    Average,
}

impl ChannelMix {
    /// `None` when there is no supported mapping between the layouts
    pub fn between(source: &ChannelLayout, destination: &ChannelLayout) -> Option<Self> {
        if source.channels == destination.channels {
            Some(ChannelMix::Identity)
        } else if source.is_mono() {
            Some(ChannelMix::Duplicate)
        } else if destination.is_mono() {
            Some(ChannelMix::Average)
        } else {
            None
        }
    }
}

/// `bytes` must be exactly one sample of `format`
pub fn decode_sample(bytes: &[u8], format: SampleFormat) -> f32 {
    debug_assert_eq!(bytes.len(), format.bytes_per_sample(), "one {format} sample");
    match format.packed() {
        SampleFormat::U8 => (bytes[0] as f32 - 128.0) / 128.0,
        SampleFormat::S16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 32768.0,
        SampleFormat::S32 => {
            (i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64 / 2_147_483_648.0) as f32
        }
        SampleFormat::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        _ => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[..8]);
            f64::from_le_bytes(raw) as f32
        }
    }
}

/// Integer targets are scaled, rounded and clipped; float targets are stored as is
pub fn encode_sample(value: f32, format: SampleFormat, out: &mut [u8]) {
    debug_assert_eq!(out.len(), format.bytes_per_sample(), "one {format} sample");
    match format.packed() {
        SampleFormat::U8 => {
            out[0] = ((value * 128.0).round() + 128.0).clamp(0.0, 255.0) as u8;
        }
        SampleFormat::S16 => {
            let v = (value * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            out[..2].copy_from_slice(&v.to_le_bytes());
        }
        SampleFormat::S32 => {
            let v = (value as f64 * 2_147_483_648.0)
                .round()
                .clamp(i32::MIN as f64, i32::MAX as f64) as i32;
            out[..4].copy_from_slice(&v.to_le_bytes());
        }
        SampleFormat::F32 => out[..4].copy_from_slice(&value.to_le_bytes()),
        _ => out[..8].copy_from_slice(&(value as f64).to_le_bytes()),
    }
}

/// Decode `frames` frames from `input` and append them, remixed, to `planes`
pub fn decode_into(input: &SampleBuffer, frames: usize, mix: ChannelMix, planes: &mut [Vec<f32>]) {
    let format = input.spec().sample_format();
    let in_channels = input.spec().channels();

    for plane in planes.iter_mut() {
        plane.reserve(frames);
    }

    for frame in 0..frames {
        match mix {
            ChannelMix::Identity => {
                for (ch, plane) in planes.iter_mut().enumerate().take(in_channels) {
                    plane.push(decode_sample(input.sample_bytes(frame, ch), format));
                }
            }
            ChannelMix::Duplicate => {
                let value = decode_sample(input.sample_bytes(frame, 0), format);
                for plane in planes.iter_mut() {
                    plane.push(value);
                }
            }
            ChannelMix::Average => {
                let sum: f32 = (0..in_channels)
                    .map(|ch| decode_sample(input.sample_bytes(frame, ch), format))
                    .sum();
                planes[0].push(sum / in_channels as f32);
            }
        }
    }
}

/// Pop `frames` frames off the front of `planes` and encode them into `output`
pub fn encode_from(planes: &mut [VecDeque<f32>], frames: usize, output: &mut SampleBuffer) {
    let format = output.spec().sample_format();
    for frame in 0..frames {
        for (ch, plane) in planes.iter_mut().enumerate() {
            let value = plane.pop_front().unwrap_or(0.0);
            encode_sample(value, format, output.sample_bytes_mut(frame, ch));
        }
    }
}
