use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clean_audio::{Pipeline, PipelineConfig, RnnoiseEnhancer};

/// Remove background noise from audio files
#[derive(Debug, Parser)]
#[command(name = "clean-audio", version, about)]
struct Cli {
    /// Audio files to clean (wav, mp3, ogg, flac, m4a, webm)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory for cleaned_<name>.wav outputs
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Blend between original (0.0) and fully denoised (1.0)
    #[arg(short, long, value_parser = parse_strength)]
    strength: Option<f32>,

    /// Return the denoiser output without blending
    #[arg(long, conflicts_with = "strength")]
    no_blend: bool,

    /// JSON settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Transcoder used when built-in decoding fails
    #[arg(long)]
    ffmpeg: Option<PathBuf>,
}

fn parse_strength(value: &str) -> Result<f32, String> {
    let strength: f32 = value.parse().map_err(|e| format!("{}", e))?;
    if !(0.0..=1.0).contains(&strength) {
        return Err(format!("strength {} is outside [0, 1]", strength));
    }
    Ok(strength)
}

fn output_path(output_dir: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "audio".to_string());
    output_dir.join(format!("cleaned_{}.wav", stem))
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match PipelineConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => PipelineConfig::default(),
    };
    if let Some(ffmpeg) = &cli.ffmpeg {
        config.transcoder_program = ffmpeg.clone();
    }

    let strength = if cli.no_blend {
        None
    } else {
        Some(cli.strength.unwrap_or(config.default_strength))
    };

    if let Err(e) = tokio::fs::create_dir_all(&cli.output_dir).await {
        log::error!("Failed to create output directory {:?}: {}", cli.output_dir, e);
        return ExitCode::FAILURE;
    }

    // Loaded once, shared read-only by every request
    let pipeline = match Pipeline::new(config, Arc::new(RnnoiseEnhancer::new())) {
        Ok(pipeline) => Arc::new(pipeline),
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if !pipeline.normalizer().transcoder().is_available() {
        log::warn!(
            "{:?} not available; files symphonia can't decode will fail",
            pipeline.config().transcoder_program
        );
    }

    let mut tasks = Vec::with_capacity(cli.inputs.len());
    for input in cli.inputs {
        let pipeline = pipeline.clone();
        let output = output_path(&cli.output_dir, &input);
        tasks.push(tokio::spawn(async move {
            let bytes = tokio::fs::read(&input)
                .await
                .map_err(|e| format!("Failed to read {:?}: {}", input, e))?;
            let name = input
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            let cleaned = pipeline
                .run_blocking(bytes, name, strength)
                .await
                .map_err(|e| format!("{:?}: {} (status {})", input, e, e.status_code()))?;

            tokio::fs::write(&output, &cleaned.bytes)
                .await
                .map_err(|e| format!("Failed to write {:?}: {}", output, e))?;
            log::info!("{:?} -> {:?} ({:.2}s)", input, output, cleaned.duration);
            Ok::<_, String>(output)
        }));
    }

    let mut failed = 0usize;
    for task in tasks {
        match task.await {
            Ok(Ok(output)) => println!("{}", output.display()),
            Ok(Err(e)) => {
                log::error!("{}", e);
                failed += 1;
            }
            Err(e) => {
                log::error!("Task panicked: {}", e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
