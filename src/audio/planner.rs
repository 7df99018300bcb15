// Buffer planning
//
// Output capacity per convert call is
//   ceil((pending_delay + input_chunk) * dst_rate / src_rate)
// computed through `rescale_rnd` so it can neither overflow nor round down.
// Under-allocating here silently loses audio on the highest-delay call.

use colored::*;
use tracing::info;

use super::buffer::SampleBuffer;
use super::error::{ConversionError, ConversionResult};
use super::rescale::{rescale_frames, Rounding};
use super::types::AudioSpec;

/// Default input chunk size in frames
pub const DEFAULT_INPUT_CHUNK_FRAMES: usize = 1024;

/// Sizes for one session's input and output buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPlan {
    pub source: AudioSpec,
    pub destination: AudioSpec,
    pub input_chunk_frames: usize,
    pub output_capacity_frames: usize,
}

impl BufferPlan {
    /// Plan buffers for `input_chunk_frames` per read given the engine's
    /// current delay (source-rate frames).
    pub fn new(
        input_chunk_frames: usize,
        source: &AudioSpec,
        destination: &AudioSpec,
        pending_delay_frames: u64,
    ) -> ConversionResult<Self> {
        if input_chunk_frames == 0 {
            return Err(ConversionError::InvalidConfig(
                "input chunk size must be at least one frame".to_string(),
            ));
        }
        let output_capacity_frames = output_capacity_for(
            input_chunk_frames,
            pending_delay_frames,
            source,
            destination,
        )?;

        Ok(Self {
            source: *source,
            destination: *destination,
            input_chunk_frames,
            output_capacity_frames,
        })
    }

    pub fn input_bytes(&self) -> usize {
        self.input_chunk_frames * self.source.bytes_per_frame()
    }

    pub fn output_bytes(&self) -> usize {
        self.output_capacity_frames * self.destination.bytes_per_frame()
    }

    /// Acquire both buffers. The input buffer is dropped again if the
    /// output allocation fails.
    pub fn allocate(&self) -> ConversionResult<(SampleBuffer, SampleBuffer)> {
        let input = SampleBuffer::allocate(&self.source, self.input_chunk_frames)?;
        let output = SampleBuffer::allocate(&self.destination, self.output_capacity_frames)?;

        info!(
            "🧮 {}: in {} frames ({} bytes, {} plane(s)) → out {} frames ({} bytes, {} plane(s))",
            "BUFFER_PLAN".cyan(),
            self.input_chunk_frames,
            input.byte_len(),
            input.plane_count(),
            self.output_capacity_frames,
            output.byte_len(),
            output.plane_count()
        );

        Ok((input, output))
    }
}

/// Worst-case output frames for one convert call of `input_frames` when
/// the engine already holds `pending_delay_frames` (source rate).
pub fn output_capacity_for(
    input_frames: usize,
    pending_delay_frames: u64,
    source: &AudioSpec,
    destination: &AudioSpec,
) -> ConversionResult<usize> {
    let total_in = pending_delay_frames
        .checked_add(input_frames as u64)
        .ok_or(ConversionError::AllocationFailed { bytes: u64::MAX })?;
    let frames = rescale_frames(
        total_in,
        destination.sample_rate(),
        source.sample_rate(),
        Rounding::Up,
    )
    .ok_or(ConversionError::AllocationFailed { bytes: u64::MAX })?;
    usize::try_from(frames).map_err(|_| ConversionError::AllocationFailed { bytes: u64::MAX })
}
