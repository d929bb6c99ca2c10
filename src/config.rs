//! Pipeline configuration
//!
//! Settings are stored as camelCase JSON. A missing settings file means defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Sample rate every normalized and enhanced buffer is held at
pub const CANONICAL_SAMPLE_RATE: u32 = 48000;

/// Extensions accepted at upload time
pub const ALLOWED_EXTENSIONS: &[&str] = &["wav", "mp3", "ogg", "flac", "m4a", "webm"];

/// Extension of the canonical (uncompressed) container
pub const CANONICAL_EXTENSION: &str = "wav";

/// Upload size cap (50 MB)
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Strength used by callers that don't supply one
pub const DEFAULT_STRENGTH: f32 = 0.7;

/// Sample encoding of the serialized output WAV
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum OutputEncoding {
    /// 32-bit IEEE float
    #[default]
    Float32,
    /// 16-bit signed PCM
    Pcm16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    pub sample_rate: u32,
    pub allowed_extensions: Vec<String>,
    pub max_upload_bytes: u64,
    pub default_strength: f32,
    /// External transcoder used by the fallback decode path
    pub transcoder_program: PathBuf,
    /// Parent directory for per-request working scopes (system temp dir when unset)
    pub work_dir: Option<PathBuf>,
    pub output_encoding: OutputEncoding,
    pub output_filename: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: CANONICAL_SAMPLE_RATE,
            allowed_extensions: ALLOWED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            max_upload_bytes: MAX_UPLOAD_BYTES,
            default_strength: DEFAULT_STRENGTH,
            transcoder_program: PathBuf::from("ffmpeg"),
            work_dir: None,
            output_encoding: OutputEncoding::Float32,
            output_filename: "cleaned_audio.wav".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Load settings from a JSON file, falling back to defaults when it doesn't exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No settings at {:?}, using defaults", path);
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        let config: Self = serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sampleRate must be non-zero".into()));
        }
        if self.allowed_extensions.is_empty() {
            return Err(ConfigError::Invalid("allowedExtensions must not be empty".into()));
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid("maxUploadBytes must be non-zero".into()));
        }
        if !(0.0..=1.0).contains(&self.default_strength) {
            return Err(ConfigError::Invalid(format!(
                "defaultStrength {} is outside [0, 1]",
                self.default_strength
            )));
        }
        if self.output_filename.trim().is_empty() {
            return Err(ConfigError::Invalid("outputFilename must not be empty".into()));
        }
        Ok(())
    }

    /// Case-insensitive check against the allowed extension set
    pub fn is_allowed_extension(&self, ext: &str) -> bool {
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext))
    }

    pub fn work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
