//! Neural denoising using RNNoise via nnnoiseless
//!
//! The default enhancement capability. Stateless between calls: every call
//! builds its own `DenoiseState`, so one instance can be shared by all requests.

use nnnoiseless::DenoiseState;

use super::{AudioTensor, EnhancementCapability, TensorRank};
use crate::error::CapabilityError;

/// RNNoise frame size (fixed at 480 samples at 48kHz = 10ms)
const RNNOISE_FRAME_SIZE: usize = 480;
/// RNNoise sample rate (fixed at 48kHz)
const RNNOISE_SAMPLE_RATE: u32 = 48000;
/// RNNoise works on 16-bit PCM magnitudes
const PCM_SCALE: f32 = 32767.0;

#[derive(Debug, Default)]
pub struct RnnoiseEnhancer;

impl RnnoiseEnhancer {
    pub fn new() -> Self {
        Self
    }

    /// Run audio through RNNoise
    fn run_rnnoise(&self, samples: &[f32]) -> Vec<f32> {
        let mut state = DenoiseState::new();
        let mut output = Vec::with_capacity(samples.len());

        let mut frame = [0.0f32; RNNOISE_FRAME_SIZE];
        let mut output_frame = [0.0f32; RNNOISE_FRAME_SIZE];

        for chunk in samples.chunks(RNNOISE_FRAME_SIZE) {
            // Pad the last frame with zeros
            frame.fill(0.0);
            for (dst, src) in frame.iter_mut().zip(chunk) {
                *dst = src * PCM_SCALE;
            }

            state.process_frame(&mut output_frame, &frame);

            output.extend(output_frame[..chunk.len()].iter().map(|s| s / PCM_SCALE));
        }

        output
    }
}

impl EnhancementCapability for RnnoiseEnhancer {
    fn name(&self) -> &str {
        "rnnoise"
    }

    fn sample_rate(&self) -> u32 {
        RNNOISE_SAMPLE_RATE
    }

    fn input_rank(&self) -> TensorRank {
        TensorRank::Flat
    }

    fn enhance(&self, input: AudioTensor) -> Result<AudioTensor, CapabilityError> {
        if input.shape().len() != 1 {
            return Err(format!("rnnoise expects a [N] tensor, got {:?}", input.shape()).into());
        }
        Ok(AudioTensor::flat(self.run_rnnoise(input.data())))
    }
}
