//! Upload normalization and noise-suppression pipeline.
//!
//! [`Pipeline::run`] takes the bytes of one uploaded file plus its declared
//! name and returns a cleaned mono WAV at the canonical rate, or a
//! [`PipelineError`] carrying only a kind and a message. Transport layers
//! (HTTP, CLI) are thin adapters around that call.

pub mod audio_util;
pub mod config;
pub mod enhance;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod services;
pub mod waveform;

pub use config::{OutputEncoding, PipelineConfig, CANONICAL_SAMPLE_RATE};
pub use enhance::{
    AudioTensor, EnhancementCapability, EnhancementInvoker, RnnoiseEnhancer, TensorRank,
};
pub use error::{PipelineError, PipelineErrorKind};
pub use pipeline::{Pipeline, PipelineOutput, Stage};
pub use services::scope::{with_scope, WorkingScope};
pub use waveform::{SampleFormat, Waveform};
