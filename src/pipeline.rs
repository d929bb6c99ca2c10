//! Pipeline orchestration
//!
//! One request: validate → save into a working scope → normalize → enhance →
//! serialize. Every stage error is converted to a `PipelineError` at its
//! boundary; the working scope is torn down on every exit path.

use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::audio_util::encode_wav;
use crate::config::PipelineConfig;
use crate::enhance::{EnhancementCapability, EnhancementInvoker};
use crate::error::{ConfigError, PipelineError, ValidationError};
use crate::normalize::Normalizer;
use crate::services::scope::WorkingScope;

/// Progress of a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Received,
    Saved,
    Normalized,
    Enhanced,
    Serialized,
    Done,
}

/// Cleaned audio ready to hand back to the caller
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutput {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    /// Advisory download name
    pub filename: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration: f64,
}

pub struct Pipeline {
    config: PipelineConfig,
    normalizer: Normalizer,
    invoker: EnhancementInvoker,
}

impl Pipeline {
    /// Build a pipeline; the configured rate must be the rate the capability runs at
    pub fn new(
        config: PipelineConfig,
        capability: Arc<dyn EnhancementCapability>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if config.sample_rate != capability.sample_rate() {
            return Err(ConfigError::Invalid(format!(
                "sampleRate {} does not match enhancer '{}' ({} Hz)",
                config.sample_rate,
                capability.name(),
                capability.sample_rate()
            )));
        }

        let normalizer = Normalizer::from_config(&config);
        Ok(Self {
            config,
            normalizer,
            invoker: EnhancementInvoker::new(capability),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Check an upload before any file is written; returns the lowercased extension
    pub fn validate(
        &self,
        source: &[u8],
        declared_filename: &str,
    ) -> Result<String, ValidationError> {
        let name = declared_filename.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyFilename);
        }

        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !self.config.is_allowed_extension(&ext) {
            return Err(ValidationError::DisallowedExtension(ext));
        }

        if source.is_empty() {
            return Err(ValidationError::NoFile);
        }
        let size = source.len() as u64;
        if size > self.config.max_upload_bytes {
            return Err(ValidationError::TooLarge {
                size,
                limit: self.config.max_upload_bytes,
            });
        }

        Ok(ext)
    }

    /// Clean one uploaded file
    pub fn run(
        &self,
        source: &[u8],
        declared_filename: &str,
        strength: Option<f32>,
    ) -> Result<PipelineOutput, PipelineError> {
        log::debug!(
            "[{:?}] {} ({} bytes)",
            Stage::Received,
            declared_filename,
            source.len()
        );

        let ext = self.validate(source, declared_filename).map_err(|e| {
            log::warn!("Rejected upload {:?}: {}", declared_filename, e);
            PipelineError::from(e)
        })?;

        let scope = WorkingScope::create(&self.config.work_dir()).map_err(|e| {
            log::error!("Failed to create working scope: {}", e);
            PipelineError::processing("Failed to allocate working storage")
        })?;

        self.run_scoped(scope, source, declared_filename, &ext, strength)
    }

    /// Process a validated upload inside `scope`, tearing the scope down afterwards
    fn run_scoped(
        &self,
        mut scope: WorkingScope,
        source: &[u8],
        declared_filename: &str,
        ext: &str,
        strength: Option<f32>,
    ) -> Result<PipelineOutput, PipelineError> {
        let mut stage = Stage::Received;
        let result = self.run_in_scope(&mut scope, &mut stage, source, ext, strength);
        match &result {
            Ok(output) => log::info!(
                "Cleaned {:?}: {:.2}s at {} Hz",
                declared_filename,
                output.duration,
                output.sample_rate
            ),
            Err(e) => log::warn!(
                "Request for {:?} failed after {:?}: {}",
                declared_filename,
                stage,
                e
            ),
        }

        // Cleanup problems are logged by the scope and never change the outcome
        let failures = scope.close();
        if !failures.is_empty() {
            log::warn!(
                "{} path(s) left behind by request for {:?}",
                failures.len(),
                declared_filename
            );
        }
        result
    }

    fn run_in_scope(
        &self,
        scope: &mut WorkingScope,
        stage: &mut Stage,
        source: &[u8],
        ext: &str,
        strength: Option<f32>,
    ) -> Result<PipelineOutput, PipelineError> {
        let input_path = scope.track(&format!("source.{}", ext));
        let normalized_path = scope.track("normalized.wav");

        fs::write(&input_path, source).map_err(|e| {
            log::error!("Failed to save upload to {:?}: {}", input_path, e);
            PipelineError::processing("Failed to save upload")
        })?;
        advance(stage, Stage::Saved);

        let waveform = self
            .normalizer
            .normalize(&input_path, &normalized_path)
            .map_err(|e| {
                log::error!("{}", e);
                PipelineError::from(e)
            })?;
        advance(stage, Stage::Normalized);

        let enhanced = self.invoker.enhance(&waveform, strength).map_err(|e| {
            log_chain(&e);
            PipelineError::from(e)
        })?;
        advance(stage, Stage::Enhanced);

        let bytes = encode_wav(&enhanced, self.config.output_encoding).map_err(|e| {
            log::error!("{}", e);
            PipelineError::from(e)
        })?;
        advance(stage, Stage::Serialized);

        let output = PipelineOutput {
            bytes,
            filename: self.config.output_filename.clone(),
            sample_rate: enhanced.sample_rate,
            channels: enhanced.channels,
            duration: enhanced.duration_secs(),
        };
        advance(stage, Stage::Done);
        Ok(output)
    }

    /// Run one request on tokio's blocking pool
    pub async fn run_blocking(
        self: Arc<Self>,
        source: Vec<u8>,
        declared_filename: String,
        strength: Option<f32>,
    ) -> Result<PipelineOutput, PipelineError> {
        tokio::task::spawn_blocking(move || self.run(&source, &declared_filename, strength))
            .await
            .map_err(|e| {
                log::error!("Pipeline task failed: {}", e);
                PipelineError::processing("Processing task aborted")
            })?
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    log::debug!("[{:?}] -> [{:?}]", stage, next);
    *stage = next;
}

fn log_chain(err: &dyn std::error::Error) {
    log::error!("{}", err);
    let mut source = err.source();
    while let Some(cause) = source {
        log::error!("  caused by: {}", cause);
        source = cause.source();
    }
}
