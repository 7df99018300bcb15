// Raw sample buffers
//
// A `SampleBuffer` is one contiguous byte allocation. Packed formats use it
// as a single interleaved region; planar formats split it into one region
// per channel, each `plane_stride` bytes long, so the plane offsets play the
// role of a plane pointer table.

use std::io::{self, Read, Write};

use super::error::{ConversionError, ConversionResult};
use super::types::AudioSpec;

#[derive(Debug)]
pub struct SampleBuffer {
    data: Vec<u8>,
    spec: AudioSpec,
    capacity_frames: usize,
}

impl SampleBuffer {
    /// Acquire a zeroed buffer able to hold `frames` frames of `spec`.
    ///
    /// Size overflow and allocator refusal both map to `AllocationFailed`.
    pub fn allocate(spec: &AudioSpec, frames: usize) -> ConversionResult<Self> {
        let data = Self::acquire(spec, frames)?;
        Ok(Self {
            data,
            spec: *spec,
            capacity_frames: frames,
        })
    }

    fn acquire(spec: &AudioSpec, frames: usize) -> ConversionResult<Vec<u8>> {
        let bytes = frames
            .checked_mul(spec.bytes_per_frame())
            .ok_or(ConversionError::AllocationFailed { bytes: u64::MAX })?;
        let mut data = Vec::new();
        data.try_reserve_exact(bytes)
            .map_err(|_| ConversionError::AllocationFailed { bytes: bytes as u64 })?;
        data.resize(bytes, 0);
        Ok(data)
    }

    pub fn spec(&self) -> &AudioSpec {
        &self.spec
    }

    pub fn capacity_frames(&self) -> usize {
        self.capacity_frames
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    pub fn plane_count(&self) -> usize {
        self.spec.plane_count()
    }

    /// Length in bytes of each plane region
    pub fn plane_stride(&self) -> usize {
        if self.spec.is_planar() {
            self.capacity_frames * self.spec.sample_format().bytes_per_sample()
        } else {
            self.data.len()
        }
    }

    /// Byte offset of one sample within the allocation
    pub fn sample_offset(&self, frame: usize, channel: usize) -> usize {
        let bps = self.spec.sample_format().bytes_per_sample();
        if self.spec.is_planar() {
            channel * self.plane_stride() + frame * bps
        } else {
            frame * self.spec.bytes_per_frame() + channel * bps
        }
    }

    pub fn sample_bytes(&self, frame: usize, channel: usize) -> &[u8] {
        let offset = self.sample_offset(frame, channel);
        &self.data[offset..offset + self.spec.sample_format().bytes_per_sample()]
    }

    pub fn sample_bytes_mut(&mut self, frame: usize, channel: usize) -> &mut [u8] {
        let offset = self.sample_offset(frame, channel);
        let bps = self.spec.sample_format().bytes_per_sample();
        &mut self.data[offset..offset + bps]
    }

    /// Replace the allocation with a larger zeroed one. Contents are not kept.
    pub fn grow(&mut self, frames: usize) -> ConversionResult<()> {
        if frames <= self.capacity_frames {
            return Ok(());
        }
        self.data = Self::acquire(&self.spec, frames)?;
        self.capacity_frames = frames;
        Ok(())
    }

    /// Read until the buffer is full or the reader hits end of stream.
    ///
    /// Short reads are retried so a pipe delivering odd byte counts still
    /// yields whole frames; only the final read of a stream can leave a
    /// partial trailing frame. Returns the number of bytes stored.
    pub fn fill_from<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<usize> {
        let mut filled = 0;
        while filled < self.data.len() {
            match reader.read(&mut self.data[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    /// Move planes read back to back into their stride positions.
    ///
    /// A planar chunk of `frames` frames arrives as `channels` consecutive
    /// runs of `frames` samples. When the chunk is short those runs must be
    /// spread out to the plane offsets. No-op for packed formats.
    pub fn spread_planes(&mut self, frames: usize) {
        if !self.spec.is_planar() || frames >= self.capacity_frames {
            return;
        }
        let run = frames * self.spec.sample_format().bytes_per_sample();
        let stride = self.plane_stride();
        for plane in (1..self.plane_count()).rev() {
            let src = plane * run;
            self.data.copy_within(src..src + run, plane * stride);
        }
    }

    /// Write the first `frames` frames, plane after plane for planar formats.
    /// Returns the number of bytes written.
    pub fn write_frames<W: Write + ?Sized>(&self, frames: usize, writer: &mut W) -> io::Result<usize> {
        let frames = frames.min(self.capacity_frames);
        if self.spec.is_planar() {
            let run = frames * self.spec.sample_format().bytes_per_sample();
            let stride = self.plane_stride();
            for plane in 0..self.plane_count() {
                let start = plane * stride;
                writer.write_all(&self.data[start..start + run])?;
            }
            Ok(run * self.plane_count())
        } else {
            let produced_bytes = frames * self.spec.bytes_per_frame();
            writer.write_all(&self.data[..produced_bytes])?;
            Ok(produced_bytes)
        }
    }
}
