use pcm_resampler::audio::pipeline::{Pipeline, PipelineStateMachine};
use pcm_resampler::audio::rescale::{rescale_frames, Rounding};
use pcm_resampler::audio::*;
use proptest::prelude::*;
use std::io::Cursor;

#[cfg(test)]
mod pipeline_property_tests {
    use super::*;

    /// Wraps the rubato engine and records every capacity/production pair
    struct RecordingEngine {
        inner: RubatoEngine,
        calls: Vec<(usize, usize)>,
    }

    impl ResampleEngine for RecordingEngine {
        fn configure(
            destination: &AudioSpec,
            source: &AudioSpec,
            options: &EngineOptions,
        ) -> ConversionResult<Self> {
            Ok(Self {
                inner: RubatoEngine::configure(destination, source, options)?,
                calls: Vec::new(),
            })
        }

        fn pending_delay(&self, base_rate: u32) -> u64 {
            self.inner.pending_delay(base_rate)
        }

        fn convert(
            &mut self,
            output: &mut SampleBuffer,
            output_capacity_frames: usize,
            input: Option<(&SampleBuffer, usize)>,
        ) -> ConversionResult<usize> {
            let produced = self.inner.convert(output, output_capacity_frames, input)?;
            self.calls.push((output_capacity_frames, produced));
            Ok(produced)
        }

        fn release(&mut self) {
            self.inner.release();
        }

        fn is_released(&self) -> bool {
            self.inner.is_released()
        }
    }

    fn run_recorded(
        quality: ResampleQuality,
        chunk: usize,
        source: AudioSpec,
        destination: AudioSpec,
        input: Vec<u8>,
    ) -> (EngineGuard<RecordingEngine>, PipelineStats, Vec<u8>) {
        let options = EngineOptions {
            quality,
            chunk_frames: chunk,
        };
        let mut engine = EngineGuard::<RecordingEngine>::configure(&destination, &source, &options).unwrap();
        let plan = BufferPlan::new(chunk, &source, &destination, engine.pending_delay(source.sample_rate())).unwrap();
        let (mut input_buf, mut output_buf) = plan.allocate().unwrap();
        let mut machine = PipelineStateMachine::new("property");
        let mut writer = Vec::new();

        let stats = Pipeline::new(&mut engine, &plan, &mut input_buf, &mut output_buf, &CancelFlag::new())
            .run(&mut Cursor::new(input), &mut writer, &mut machine)
            .unwrap();
        (engine, stats, writer)
    }

    fn rate() -> impl Strategy<Value = u32> {
        prop::sample::select(vec![8000u32, 11025, 16000, 22050, 32000, 44100, 48000, 96000])
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        /// No convert call ever produces more than the capacity it was given,
        /// and the total matches the rate ratio
        #[test]
        fn prop_no_truncation(
            chunk in 16usize..2048,
            frames in 0usize..6000,
            src_rate in rate(),
            dst_rate in rate(),
        ) {
            let source = AudioSpec::new(ChannelLayout::stereo(), SampleFormat::S16, src_rate);
            let destination = AudioSpec::new(ChannelLayout::stereo(), SampleFormat::S16, dst_rate);
            let (engine, stats, output) = run_recorded(ResampleQuality::Fast, chunk, source, destination, vec![0u8; frames * 4]);

            for (capacity, produced) in &engine.calls {
                prop_assert!(produced <= capacity);
            }
            let expected = rescale_frames(frames as u64, dst_rate, src_rate, Rounding::NearInf).unwrap();
            prop_assert!(stats.output_frames.abs_diff(expected) <= 1,
                "{} frames out, expected {}", stats.output_frames, expected);
            prop_assert_eq!(output.len() as u64, stats.output_frames * 4);
            prop_assert_eq!(stats.input_frames, frames as u64);
        }
    }

    fn extreme_rates() -> impl Strategy<Value = (u32, u32)> {
        prop::sample::select(vec![(192000u32, 8000u32), (8000, 192000), (96000, 11025), (44100, 48000)])
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        /// Both qualities drain completely even when a chunk is smaller than the rate ratio
        #[test]
        fn prop_flush_completes_with_tiny_chunks(
            chunk in 2usize..32,
            frames in 1usize..1500,
            (src_rate, dst_rate) in extreme_rates(),
            high_quality in any::<bool>(),
        ) {
            let quality = if high_quality { ResampleQuality::HighQuality } else { ResampleQuality::Fast };
            let source = AudioSpec::new(ChannelLayout::mono(), SampleFormat::S16, src_rate);
            let destination = AudioSpec::new(ChannelLayout::mono(), SampleFormat::S16, dst_rate);
            let (engine, stats, output) = run_recorded(quality, chunk, source, destination, vec![0u8; frames * 2]);

            for (capacity, produced) in &engine.calls {
                prop_assert!(produced <= capacity);
            }
            let expected = rescale_frames(frames as u64, dst_rate, src_rate, Rounding::NearInf).unwrap();
            prop_assert!(stats.output_frames.abs_diff(expected) <= 1,
                "{:?} chunk {}: {} frames out, expected {}", quality, chunk, stats.output_frames, expected);
            prop_assert_eq!(output.len() as u64, stats.output_frames * 2);
        }
    }

    /// The engine is released once the guard is released, and the last flush call returns 0
    #[test]
    fn test_flush_terminates_and_releases() {
        let source = AudioSpec::new(ChannelLayout::stereo(), SampleFormat::F32, 44100);
        let destination = AudioSpec::new(ChannelLayout::stereo(), SampleFormat::S16, 48000);
        let (mut engine, stats, _) = run_recorded(ResampleQuality::HighQuality, 1024, source, destination, vec![0u8; 4096 * 8]);

        assert_eq!(engine.calls.last().map(|(_, produced)| *produced), Some(0));
        assert!(stats.flush_frames > 0);
        assert!(!engine.is_released());

        engine.release();
        assert!(engine.is_released());
        engine.release();
        assert!(engine.is_released());
    }

    /// Heavy upsampling still fits the planned buffer without a single truncated call
    #[test]
    fn test_extreme_upsampling_ratio() {
        let source = AudioSpec::new(ChannelLayout::mono(), SampleFormat::S16, 8000);
        let destination = AudioSpec::new(ChannelLayout::stereo(), SampleFormat::F32, 96000);
        let (engine, stats, output) = run_recorded(ResampleQuality::Fast, 256, source, destination, vec![0u8; 1000 * 2]);

        assert!(engine.calls.iter().all(|(capacity, produced)| produced <= capacity));
        assert_eq!(stats.output_frames, 12000);
        assert_eq!(output.len(), 12000 * 8);
        assert!(stats.peak_output_capacity_frames >= 256 * 12);
    }
}
