use colored::*;
use rubato::{
    FastFixedIn, PolynomialDegree, ResampleError, Resampler as RubatoResampler, SincFixedIn,
    SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

use super::samples::{decode_into, encode_from, ChannelMix};
use super::{EngineOptions, ResampleEngine, ResampleQuality};
use crate::audio::buffer::SampleBuffer;
use crate::audio::error::{ConversionError, ConversionResult};
use crate::audio::rescale::{rescale_frames, Rounding};
use crate::audio::types::AudioSpec;

/// Source-side lead placed before the calibration impulse
const IMPULSE_LEAD_FRAMES: usize = 64;

/// Extra silence fed on flush beyond the ratio estimate
const FLUSH_SLACK_FRAMES: u64 = 1024;

/// Rubato resampler (high-quality or fast)
enum ResamplerType {
    HighQuality(SincFixedIn<f32>),
    Fast(FastFixedIn<f32>),
}

impl ResamplerType {
    fn process_chunk(
        &mut self,
        input: &[&[f32]],
        output: &mut [Vec<f32>],
    ) -> Result<(usize, usize), ResampleError> {
        match self {
            ResamplerType::HighQuality(r) => r.process_into_buffer(input, output, None),
            ResamplerType::Fast(r) => r.process_into_buffer(input, output, None),
        }
    }

    /// Process fewer frames than a full chunk; `None` feeds silence
    fn process_partial(
        &mut self,
        input: Option<&[&[f32]]>,
        output: &mut [Vec<f32>],
    ) -> Result<(usize, usize), ResampleError> {
        match self {
            ResamplerType::HighQuality(r) => r.process_partial_into_buffer(input, output, None),
            ResamplerType::Fast(r) => r.process_partial_into_buffer(input, output, None),
        }
    }

    fn output_delay(&self) -> usize {
        match self {
            ResamplerType::HighQuality(r) => r.output_delay(),
            ResamplerType::Fast(r) => r.output_delay(),
        }
    }

    fn output_frames_max(&self) -> usize {
        match self {
            ResamplerType::HighQuality(r) => r.output_frames_max(),
            ResamplerType::Fast(r) => r.output_frames_max(),
        }
    }
}

/// Format, layout and rate converter backed by rubato.
///
/// Rubato consumes fixed-size chunks, so decoded input queues in
/// `pending_in` until a full chunk is available, and converted frames queue
/// in `pending_out` until a convert call has room for them. The resampler's
/// filter latency is trimmed from the head of the output and the tail is
/// padded on flush so the total output is exactly
/// `round(total_in * dst_rate / src_rate)` frames.
pub struct RubatoEngine {
    source: AudioSpec,
    destination: AudioSpec,
    mix: ChannelMix,
    resampler: ResamplerType,
    chunk_frames: usize,
    /// Decoded, remixed input waiting for a full chunk (one Vec per destination channel)
    pending_in: Vec<Vec<f32>>,
    /// Rubato output scratch, sized to `output_frames_max`
    scratch_out: Vec<Vec<f32>>,
    /// Converted frames not yet handed to the caller
    pending_out: Vec<VecDeque<f32>>,
    /// Leading latency frames still to discard
    latency_remaining: usize,
    total_input_frames: u64,
    accepted_frames: u64,
    delivered_frames: u64,
    flushed: bool,
    released: bool,
}

impl RubatoEngine {
    fn build_resampler(
        ratio: f64,
        channels: usize,
        options: &EngineOptions,
    ) -> ConversionResult<ResamplerType> {
        match options.quality {
            ResampleQuality::HighQuality => {
                let params = SincInterpolationParameters {
                    sinc_len: 256,
                    f_cutoff: 0.95,
                    interpolation: SincInterpolationType::Linear,
                    oversampling_factor: 256,
                    window: WindowFunction::BlackmanHarris2,
                };
                SincFixedIn::new(ratio, 1.0, params, options.chunk_frames, channels)
                    .map(ResamplerType::HighQuality)
                    .map_err(|e| ConversionError::ConfigurationFailed(format!("sinc resampler: {e}")))
            }
            ResampleQuality::Fast => FastFixedIn::new(
                ratio,
                1.0,
                PolynomialDegree::Septic,
                options.chunk_frames,
                channels,
            )
            .map(ResamplerType::Fast)
            .map_err(|e| ConversionError::ConfigurationFailed(format!("fast resampler: {e}"))),
        }
    }

    /// Output frames between an input frame and where it lands after conversion.
    ///
    /// `output_delay()` is a nominal figure that does not match the actual
    /// alignment of either resampler, so an impulse is pushed through a mono
    /// twin built with the same parameters and the peak is located.
    fn measure_latency(ratio: f64, options: &EngineOptions) -> ConversionResult<usize> {
        let mut twin = Self::build_resampler(ratio, 1, options)?;
        let chunk = options.chunk_frames;
        let impulse_at = (IMPULSE_LEAD_FRAMES as f64 / ratio).ceil() as usize;
        let expected_at = impulse_at as f64 * ratio;
        let window = expected_at.ceil() as usize + twin.output_delay() + IMPULSE_LEAD_FRAMES;
        let max_input = impulse_at
            + (window as f64 / ratio).ceil() as usize
            + 4 * chunk
            + FLUSH_SLACK_FRAMES as usize;

        let mut input = vec![0.0f32; chunk];
        let mut scratch = vec![vec![0.0f32; twin.output_frames_max()]];
        let mut response: Vec<f32> = Vec::with_capacity(window);
        let mut fed = 0;
        while response.len() < window && fed < max_input {
            input.iter_mut().for_each(|sample| *sample = 0.0);
            if (fed..fed + chunk).contains(&impulse_at) {
                input[impulse_at - fed] = 1.0;
            }
            let (_, produced) = twin
                .process_chunk(&[input.as_slice()], &mut scratch)
                .map_err(|e| ConversionError::ConfigurationFailed(format!("latency calibration: {e}")))?;
            response.extend_from_slice(&scratch[0][..produced]);
            fed += chunk;
        }

        let peak = response
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .map(|(index, _)| index)
            .ok_or_else(|| {
                ConversionError::ConfigurationFailed(
                    "resampler produced no output while measuring latency".to_string(),
                )
            })?;
        Ok((peak as f64 - expected_at).round().max(0.0) as usize)
    }

    /// Output frames the input seen so far maps to
    fn expected_total_frames(&self) -> u64 {
        rescale_frames(
            self.total_input_frames,
            self.destination.sample_rate(),
            self.source.sample_rate(),
            Rounding::NearInf,
        )
        .unwrap_or(u64::MAX)
    }

    /// Move `produced` scratch frames into `pending_out`, dropping leading
    /// latency and anything beyond `limit` total accepted frames.
    fn accept(&mut self, produced: usize, limit: Option<u64>) {
        for frame in 0..produced {
            if self.latency_remaining > 0 {
                self.latency_remaining -= 1;
                continue;
            }
            if limit.is_some_and(|limit| self.accepted_frames >= limit) {
                break;
            }
            for (plane, scratch) in self.pending_out.iter_mut().zip(&self.scratch_out) {
                plane.push_back(scratch[frame]);
            }
            self.accepted_frames += 1;
        }
    }

    fn process_ready_chunks(&mut self) -> ConversionResult<()> {
        let chunk = self.chunk_frames;
        while self.pending_in[0].len() >= chunk {
            let slices: Vec<&[f32]> = self.pending_in.iter().map(|c| &c[..chunk]).collect();
            let (_, produced) = self
                .resampler
                .process_chunk(&slices, &mut self.scratch_out)
                .map_err(|e| ConversionError::ConversionFailed(e.to_string()))?;
            for plane in self.pending_in.iter_mut() {
                plane.drain(..chunk);
            }
            self.accept(produced, None);
        }
        Ok(())
    }

    /// Push the queued tail and the filter's delay line out of the resampler
    fn flush(&mut self) -> ConversionResult<()> {
        let target = self.expected_total_frames();

        if !self.pending_in[0].is_empty() {
            let slices: Vec<&[f32]> = self.pending_in.iter().map(|c| c.as_slice()).collect();
            let (_, produced) = self
                .resampler
                .process_partial(Some(slices.as_slice()), &mut self.scratch_out)
                .map_err(|e| ConversionError::ConversionFailed(e.to_string()))?;
            for plane in self.pending_in.iter_mut() {
                plane.clear();
            }
            self.accept(produced, Some(target));
        }

        // A round can legitimately yield nothing at steep downsampling ratios,
        // so the bound is the silence needed to push the whole delay line out.
        let needed = target.saturating_sub(self.accepted_frames) + self.latency_remaining as u64;
        let ratio = self.destination.sample_rate() as f64 / self.source.sample_rate() as f64;
        let silence_frames = (needed as f64 / ratio).ceil() as u64
            + FLUSH_SLACK_FRAMES
            + 2 * self.chunk_frames as u64;
        let max_rounds = silence_frames.div_ceil(self.chunk_frames as u64);

        let mut rounds = 0;
        while self.accepted_frames < target && rounds < max_rounds {
            let (_, produced) = self
                .resampler
                .process_partial(None, &mut self.scratch_out)
                .map_err(|e| ConversionError::ConversionFailed(e.to_string()))?;
            self.accept(produced, Some(target));
            rounds += 1;
        }
        if self.accepted_frames < target {
            let missing = target - self.accepted_frames;
            warn!(
                "⚠️ {}: delay line ran dry after {} rounds, padding {} frames of silence",
                "RUBATO_FLUSH".yellow(),
                rounds,
                missing
            );
            for plane in self.pending_out.iter_mut() {
                plane.extend(std::iter::repeat(0.0).take(missing as usize));
            }
            self.accepted_frames = target;
        }

        // Streaming accepts without a limit and can run a frame past the target
        let excess = self.accepted_frames.saturating_sub(target);
        let trimmable = excess.min(self.pending_out[0].len() as u64) as usize;
        for plane in self.pending_out.iter_mut() {
            plane.truncate(plane.len() - trimmable);
        }
        self.accepted_frames -= trimmable as u64;

        self.flushed = true;
        debug!(
            "RUBATO_FLUSH: {} rounds, {} frames accepted of {} expected",
            rounds, self.accepted_frames, target
        );
        Ok(())
    }
}

impl ResampleEngine for RubatoEngine {
    fn configure(
        destination: &AudioSpec,
        source: &AudioSpec,
        options: &EngineOptions,
    ) -> ConversionResult<Self> {
        source
            .validate()
            .map_err(|e| ConversionError::ConfigurationFailed(format!("source {source}: {e}")))?;
        destination.validate().map_err(|e| {
            ConversionError::ConfigurationFailed(format!("destination {destination}: {e}"))
        })?;
        if options.chunk_frames == 0 {
            return Err(ConversionError::ConfigurationFailed(
                "engine chunk size must be positive".to_string(),
            ));
        }

        let mix = ChannelMix::between(&source.channel_layout(), &destination.channel_layout())
            .ok_or_else(|| {
                ConversionError::ConfigurationFailed(format!(
                    "no channel mapping from {} to {} channels",
                    source.channels(),
                    destination.channels()
                ))
            })?;

        let channels = destination.channels();
        let ratio = destination.sample_rate() as f64 / source.sample_rate() as f64;
        let resampler = Self::build_resampler(ratio, channels, options)?;
        let latency = Self::measure_latency(ratio, options)?;
        let max_out = resampler.output_frames_max();

        info!(
            "🎯 {}: {} → {} ({:?}, ratio {:.4}, chunk {} frames, latency {} frames, nominal {})",
            "RUBATO_ENGINE".blue(),
            source,
            destination,
            mix,
            ratio,
            options.chunk_frames,
            latency,
            resampler.output_delay()
        );

        Ok(Self {
            source: *source,
            destination: *destination,
            mix,
            resampler,
            chunk_frames: options.chunk_frames,
            pending_in: vec![Vec::with_capacity(options.chunk_frames * 2); channels],
            scratch_out: vec![vec![0.0; max_out]; channels],
            pending_out: vec![VecDeque::with_capacity(max_out * 2); channels],
            latency_remaining: latency,
            total_input_frames: 0,
            accepted_frames: 0,
            delivered_frames: 0,
            flushed: false,
            released: false,
        })
    }

    fn pending_delay(&self, base_rate: u32) -> u64 {
        let pending_out = self
            .expected_total_frames()
            .saturating_sub(self.delivered_frames);
        rescale_frames(pending_out, base_rate, self.destination.sample_rate(), Rounding::Up)
            .unwrap_or(u64::MAX)
    }

    fn convert(
        &mut self,
        output: &mut SampleBuffer,
        output_capacity_frames: usize,
        input: Option<(&SampleBuffer, usize)>,
    ) -> ConversionResult<usize> {
        if self.released {
            return Err(ConversionError::ConversionFailed(
                "engine already released".to_string(),
            ));
        }
        if output.spec() != &self.destination {
            return Err(ConversionError::ConversionFailed(format!(
                "output buffer is {}, engine produces {}",
                output.spec(),
                self.destination
            )));
        }

        match input {
            Some((buffer, frames)) => {
                if self.flushed {
                    return Err(ConversionError::ConversionFailed(
                        "input supplied after flush".to_string(),
                    ));
                }
                if buffer.spec() != &self.source {
                    return Err(ConversionError::ConversionFailed(format!(
                        "input buffer is {}, engine expects {}",
                        buffer.spec(),
                        self.source
                    )));
                }
                let frames = frames.min(buffer.capacity_frames());
                decode_into(buffer, frames, self.mix, &mut self.pending_in);
                self.total_input_frames += frames as u64;
                self.process_ready_chunks()?;
            }
            None => {
                if !self.flushed {
                    self.flush()?;
                }
            }
        }

        let frames_produced = output_capacity_frames
            .min(output.capacity_frames())
            .min(self.pending_out[0].len());
        encode_from(&mut self.pending_out, frames_produced, output);
        self.delivered_frames += frames_produced as u64;
        Ok(frames_produced)
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.pending_in = Vec::new();
        self.scratch_out = Vec::new();
        self.pending_out = Vec::new();
        debug!(
            "RUBATO_RELEASE: {} input frames in, {} frames delivered",
            self.total_input_frames, self.delivered_frames
        );
    }

    fn is_released(&self) -> bool {
        self.released
    }
}
