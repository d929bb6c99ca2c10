//! Fallback decode path: external transcoder (ffmpeg) subprocess
//!
//! Arguments are always passed as a literal argv; no shell is involved.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::DecodePathError;

/// Longest stderr tail kept in error messages
const STDERR_TAIL_BYTES: usize = 2048;

#[derive(Debug, Clone)]
pub struct Transcoder {
    program: PathBuf,
    sample_rate: u32,
}

impl Transcoder {
    pub fn new(program: impl Into<PathBuf>, sample_rate: u32) -> Self {
        Self {
            program: program.into(),
            sample_rate,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Argument vector forcing mono output at the canonical rate as 32-bit float WAV
    pub fn command_args(&self, input: &Path, target: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-nostdin", "-hide_banner", "-loglevel", "error", "-y", "-i"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push(input.as_os_str().to_os_string());
        args.extend(["-vn", "-ac", "1", "-ar"].iter().map(OsString::from));
        args.push(OsString::from(self.sample_rate.to_string()));
        args.extend(["-c:a", "pcm_f32le", "-f", "wav"].iter().map(OsString::from));
        args.push(target.as_os_str().to_os_string());
        args
    }

    /// Convert `input` into a mono canonical-rate WAV at `target`
    pub fn convert(&self, input: &Path, target: &Path) -> Result<(), DecodePathError> {
        log::info!("Converting {:?} with {:?}", input, self.program);

        let output = Command::new(&self.program)
            .args(self.command_args(input, target))
            .stdin(Stdio::null())
            .output()
            .map_err(|e| DecodePathError::Spawn {
                program: self.program.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(DecodePathError::Transcoder {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        if !target.exists() {
            return Err(DecodePathError::Transcoder {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: "no output file was written".to_string(),
            });
        }

        Ok(())
    }

    /// Whether the transcoder can be launched at all
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_TAIL_BYTES {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}
