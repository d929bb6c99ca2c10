//! Error types for each pipeline stage and the caller-facing `PipelineError`.

use serde::Serialize;
use std::path::PathBuf;

/// Boxed cause returned by an enhancement capability
pub type CapabilityError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read settings {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse settings {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid settings: {0}")]
    Invalid(String),
}

/// Upload rejected before it reaches the pipeline
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("No file provided")]
    NoFile,
    #[error("No selected file")]
    EmptyFilename,
    #[error("Unsupported file type '{0}'")]
    DisallowedExtension(String),
    #[error("File is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },
}

/// Failure of a single decode path
#[derive(Debug, thiserror::Error)]
pub enum DecodePathError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to probe format: {0}")]
    Probe(String),
    #[error("No audio tracks found")]
    NoTrack,
    #[error("Failed to create decoder: {0}")]
    Codec(String),
    #[error("Decode error: {0}")]
    Stream(String),
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("Unsupported WAV format: {0}")]
    UnsupportedWav(String),
    #[error("Resample error: {0}")]
    Resample(String),
    #[error("Failed to write normalized audio: {0}")]
    Persist(#[from] SerializationError),
    #[error("Failed to run {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{program:?} exited with {status}: {stderr}")]
    Transcoder {
        program: PathBuf,
        status: String,
        stderr: String,
    },
}

/// Both decode paths failed
#[derive(Debug, thiserror::Error)]
#[error(
    "Could not decode {path:?}: primary decode failed ({primary}); \
     fallback conversion failed ({fallback})"
)]
pub struct DecodeError {
    pub path: PathBuf,
    pub primary: DecodePathError,
    pub fallback: DecodePathError,
}

#[derive(Debug, thiserror::Error)]
pub enum EnhancementError {
    #[error("Enhancer expects {expected} Hz input, got {actual} Hz")]
    RateMismatch { expected: u32, actual: u32 },
    #[error("Enhancer returned tensor of shape {shape:?}, expected [N] or [1, N]")]
    ShapeMismatch { shape: Vec<usize> },
    #[error("Enhancer produced non-finite samples")]
    NonFinite,
    #[error("Enhancer '{name}' failed: {source}")]
    Capability {
        name: String,
        #[source]
        source: CapabilityError,
    },
    #[error("Enhancer '{name}' panicked: {message}")]
    Panicked { name: String, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("Cannot encode non-finite sample at index {0}")]
    NonFinite(usize),
    #[error("Expected mono output, got {0} channels")]
    NotMono(u16),
    #[error("WAV encode error: {0}")]
    Wav(#[from] hound::Error),
}

/// Removal of a tracked path failed; logged, never returned to callers
#[derive(Debug, thiserror::Error)]
#[error("Failed to remove {path:?}: {source}")]
pub struct ResourceCleanupError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PipelineErrorKind {
    Validation,
    UnsupportedFormat,
    ProcessingFailure,
}

/// The only error shape that leaves the pipeline
#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[error("{kind:?}: {message}")]
pub struct PipelineError {
    pub kind: PipelineErrorKind,
    pub message: String,
}

impl PipelineError {
    pub fn processing(message: impl Into<String>) -> Self {
        Self {
            kind: PipelineErrorKind::ProcessingFailure,
            message: message.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self.kind,
            PipelineErrorKind::Validation | PipelineErrorKind::UnsupportedFormat
        )
    }

    /// Advisory HTTP status for adapters
    pub fn status_code(&self) -> u16 {
        if self.is_validation() {
            400
        } else {
            500
        }
    }
}

impl From<ValidationError> for PipelineError {
    fn from(err: ValidationError) -> Self {
        let kind = match err {
            ValidationError::DisallowedExtension(_) => PipelineErrorKind::UnsupportedFormat,
            _ => PipelineErrorKind::Validation,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

impl From<DecodeError> for PipelineError {
    fn from(_: DecodeError) -> Self {
        Self::processing("Could not decode the uploaded audio")
    }
}

impl From<EnhancementError> for PipelineError {
    fn from(_: EnhancementError) -> Self {
        Self::processing("Noise suppression failed")
    }
}

impl From<SerializationError> for PipelineError {
    fn from(_: SerializationError) -> Self {
        Self::processing("Failed to encode cleaned audio")
    }
}
