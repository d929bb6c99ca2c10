//! Enhancement stage
//!
//! The noise-suppression model is an opaque [`EnhancementCapability`] loaded once
//! and shared read-only between requests. [`EnhancementInvoker`] owns the shape
//! contract around it: mono in, `[1, N]` out, same duration, finite samples.

pub mod neural;
pub mod tensor;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{CapabilityError, EnhancementError};
use crate::waveform::{SampleFormat, Waveform};

pub use neural::RnnoiseEnhancer;
pub use tensor::{AudioTensor, TensorRank};

/// Opaque noise-suppression model
pub trait EnhancementCapability: Send + Sync {
    fn name(&self) -> &str;

    /// Rate the model was trained for
    fn sample_rate(&self) -> u32;

    /// Rank of the tensor `enhance` expects
    fn input_rank(&self) -> TensorRank;

    /// Enhance a mono signal. Must not carry state across calls.
    fn enhance(&self, input: AudioTensor) -> Result<AudioTensor, CapabilityError>;
}

#[derive(Clone)]
pub struct EnhancementInvoker {
    capability: Arc<dyn EnhancementCapability>,
}

impl EnhancementInvoker {
    pub fn new(capability: Arc<dyn EnhancementCapability>) -> Self {
        Self { capability }
    }

    pub fn capability(&self) -> &Arc<dyn EnhancementCapability> {
        &self.capability
    }

    /// Enhance `waveform`, optionally blending with the original by `strength`.
    ///
    /// The result is always mono with the same rate and frame count as the input.
    pub fn enhance(
        &self,
        waveform: &Waveform,
        strength: Option<f32>,
    ) -> Result<Waveform, EnhancementError> {
        let name = self.capability.name().to_string();
        let expected_rate = self.capability.sample_rate();
        if waveform.sample_rate != expected_rate {
            return Err(EnhancementError::RateMismatch {
                expected: expected_rate,
                actual: waveform.sample_rate,
            });
        }

        let original = if waveform.is_mono() {
            waveform.samples.clone()
        } else {
            log::warn!("Enhancer received {} channels, collapsing to mono", waveform.channels);
            waveform.clone().into_mono().samples
        };

        if original.is_empty() {
            return Ok(Waveform::mono(Vec::new(), waveform.sample_rate));
        }

        let input = AudioTensor::with_rank(original.clone(), self.capability.input_rank());
        let capability = &self.capability;
        let result = catch_unwind(AssertUnwindSafe(|| capability.enhance(input)))
            .map_err(|payload| EnhancementError::Panicked {
                name: name.clone(),
                message: panic_message(payload.as_ref()),
            })?
            .map_err(|source| EnhancementError::Capability {
                name: name.clone(),
                source,
            })?;

        let output = result
            .into_batched()
            .map_err(|tensor| EnhancementError::ShapeMismatch {
                shape: tensor.shape().to_vec(),
            })?;

        let mut enhanced = output.into_data();
        if enhanced.iter().any(|s| !s.is_finite()) {
            return Err(EnhancementError::NonFinite);
        }
        if enhanced.len() != original.len() {
            log::debug!(
                "Enhancer '{}' returned {} samples for {}, fitting to input length",
                name,
                enhanced.len(),
                original.len()
            );
            enhanced.resize(original.len(), 0.0);
        }

        if let Some(strength) = strength {
            blend(&original, &mut enhanced, strength);
        }

        Ok(Waveform::new(enhanced, 1, waveform.sample_rate, SampleFormat::F32))
    }
}

/// `enhanced = (1 - s) * original + s * enhanced`, with `s` clamped to [0, 1]
pub fn blend(original: &[f32], enhanced: &mut [f32], strength: f32) {
    let s = if strength.is_nan() { 1.0 } else { strength.clamp(0.0, 1.0) };
    if s >= 1.0 {
        return;
    }
    for (out, &orig) in enhanced.iter_mut().zip(original) {
        *out = orig * (1.0 - s) + *out * s;
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    struct PanickingEnhancer;

    impl EnhancementCapability for PanickingEnhancer {
        fn name(&self) -> &str {
            "panicking"
        }
        fn sample_rate(&self) -> u32 {
            48000
        }
        fn input_rank(&self) -> TensorRank {
            TensorRank::Flat
        }
        fn enhance(&self, _input: AudioTensor) -> Result<AudioTensor, CapabilityError> {
            panic!("index out of bounds");
        }
    }

    struct StereoEnhancer;

    impl EnhancementCapability for StereoEnhancer {
        fn name(&self) -> &str {
            "stereo"
        }
        fn sample_rate(&self) -> u32 {
            48000
        }
        fn input_rank(&self) -> TensorRank {
            TensorRank::Flat
        }
        fn enhance(&self, input: AudioTensor) -> Result<AudioTensor, CapabilityError> {
            let mut data = input.data().to_vec();
            data.extend_from_slice(input.data());
            let len = input.data().len();
            Ok(AudioTensor::new(data, vec![2, len]).ok_or("shape")?)
        }
    }

    fn invoker(capability: impl EnhancementCapability + 'static) -> EnhancementInvoker {
        EnhancementInvoker::new(Arc::new(capability))
    }

    #[test]
    fn test_rank_adaptation_both_ways() {
        let wave = Waveform::mono(vec![0.4, -0.8, 0.2], 48000);
        for rank in [TensorRank::Flat, TensorRank::Batched] {
            let out = invoker(HalvingEnhancer { rank }).enhance(&wave, None).unwrap();
            assert_eq!(out.channels, 1);
            assert_eq!(out.sample_rate, 48000);
            assert_eq!(out.samples, vec![0.2, -0.4, 0.1]);
        }
    }

    #[test]
    fn test_multichannel_input_is_collapsed_first() {
        let wave = Waveform::new(vec![1.0, 0.0, 0.5, 0.5], 2, 48000, SampleFormat::F32);
        let out = invoker(HalvingEnhancer { rank: TensorRank::Flat })
            .enhance(&wave, None)
            .unwrap();
        assert_eq!(out.samples, vec![0.25, 0.25]);
    }

    #[test]
    fn test_strength_blend() {
        let wave = Waveform::mono(vec![1.0, -1.0], 48000);
        let inv = invoker(HalvingEnhancer { rank: TensorRank::Flat });

        let none = inv.enhance(&wave, Some(0.0)).unwrap();
        assert_eq!(none.samples, vec![1.0, -1.0]);

        let full = inv.enhance(&wave, Some(1.0)).unwrap();
        assert_eq!(full.samples, vec![0.5, -0.5]);

        let mixed = inv.enhance(&wave, Some(0.7)).unwrap();
        assert!((mixed.samples[0] - 0.65).abs() < 1e-6);

        let clamped = inv.enhance(&wave, Some(3.0)).unwrap();
        assert_eq!(clamped.samples, vec![0.5, -0.5]);
    }

    #[test]
    fn test_capability_error_is_wrapped() {
        let wave = Waveform::mono(vec![0.1; 10], 48000);
        let err = invoker(FailingEnhancer).enhance(&wave, None).unwrap_err();
        match err {
            EnhancementError::Capability { name, source } => {
                assert_eq!(name, "failing");
                assert!(source.to_string().contains("layer 3"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_capability_panic_is_caught() {
        let wave = Waveform::mono(vec![0.1; 10], 48000);
        let err = invoker(PanickingEnhancer).enhance(&wave, None).unwrap_err();
        assert!(matches!(err, EnhancementError::Panicked { .. }));
    }

    #[test]
    fn test_multichannel_output_rejected() {
        let wave = Waveform::mono(vec![0.1; 10], 48000);
        let err = invoker(StereoEnhancer).enhance(&wave, None).unwrap_err();
        match err {
            EnhancementError::ShapeMismatch { shape } => assert_eq!(shape, vec![2, 10]),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_rate_mismatch() {
        let wave = Waveform::mono(vec![0.1; 10], 16000);
        let err = invoker(FailingEnhancer).enhance(&wave, None).unwrap_err();
        assert!(matches!(err, EnhancementError::RateMismatch { expected: 48000, actual: 16000 }));
    }

    #[test]
    fn test_empty_waveform_skips_capability() {
        let wave = Waveform::mono(Vec::new(), 48000);
        let out = invoker(FailingEnhancer).enhance(&wave, None).unwrap();
        assert!(out.is_empty());
    }
}
