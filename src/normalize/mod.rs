//! Format normalization
//!
//! Turns an arbitrary uploaded file into a mono, canonical-rate waveform and a
//! matching WAV at a target path. Decoding goes through symphonia first and
//! falls back to an external transcoder when that fails.

pub mod decode;
pub mod resample;
pub mod transcode;

use std::fs;
use std::path::Path;

use crate::audio_util::{read_wav, write_wav_file};
use crate::config::{OutputEncoding, PipelineConfig, CANONICAL_EXTENSION};
use crate::error::{DecodeError, DecodePathError};
use crate::waveform::Waveform;

pub use transcode::Transcoder;

pub struct Normalizer {
    sample_rate: u32,
    transcoder: Transcoder,
}

impl Normalizer {
    pub fn new(sample_rate: u32, transcoder: Transcoder) -> Self {
        Self {
            sample_rate,
            transcoder,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.sample_rate,
            Transcoder::new(config.transcoder_program.clone(), config.sample_rate),
        )
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn transcoder(&self) -> &Transcoder {
        &self.transcoder
    }

    /// Normalize `input` to mono at the canonical rate, writing the result to `target`.
    ///
    /// On error `target` does not exist.
    pub fn normalize(&self, input: &Path, target: &Path) -> Result<Waveform, DecodeError> {
        let primary = match self.primary(input, target) {
            Ok(wave) => return Ok(wave),
            Err(e) => e,
        };
        log::warn!(
            "Primary decode of {:?} failed ({}), trying {:?}",
            input,
            primary,
            self.transcoder.program()
        );
        remove_partial(target);

        match self.fallback(input, target) {
            Ok(wave) => {
                log::info!("Fallback conversion of {:?} succeeded", input);
                Ok(wave)
            }
            Err(fallback) => {
                remove_partial(target);
                Err(DecodeError {
                    path: input.to_path_buf(),
                    primary,
                    fallback,
                })
            }
        }
    }

    fn primary(&self, input: &Path, target: &Path) -> Result<Waveform, DecodePathError> {
        if has_canonical_extension(input) {
            // Copy untouched so sub-formats survive; only rewrite if conversion is needed
            fs::copy(input, target)?;
            let wave = match read_wav(target) {
                Ok(wave) => wave,
                Err(e) => {
                    // hound only reads integer PCM and 32-bit float; companded and
                    // 64-bit float WAVs still go through symphonia
                    log::debug!("hound could not read {:?} ({}), using symphonia", input, e);
                    let wave = decode::decode_file(target)?;
                    let wave = self.conform(wave)?;
                    self.persist(target, &wave)?;
                    return Ok(wave);
                }
            };
            if wave.is_mono() && wave.sample_rate == self.sample_rate {
                log::debug!("{:?} is already canonical, kept byte-for-byte", input);
                return Ok(wave);
            }
            let wave = self.conform(wave)?;
            self.persist(target, &wave)?;
            return Ok(wave);
        }

        let wave = decode::decode_file(input)?;
        let wave = self.conform(wave)?;
        self.persist(target, &wave)?;
        Ok(wave)
    }

    fn fallback(&self, input: &Path, target: &Path) -> Result<Waveform, DecodePathError> {
        self.transcoder.convert(input, target)?;
        let wave = read_wav(target)?;
        // Trust but verify: the tool was told to produce exactly this shape
        self.conform(wave)
    }

    /// Collapse channels and resample to the canonical rate
    fn conform(&self, wave: Waveform) -> Result<Waveform, DecodePathError> {
        let wave = if wave.is_mono() {
            wave
        } else {
            log::debug!("Collapsing {} channels to mono", wave.channels);
            wave.into_mono()
        };

        if wave.sample_rate == self.sample_rate {
            return Ok(wave);
        }

        log::debug!("Resampling {} Hz -> {} Hz", wave.sample_rate, self.sample_rate);
        let samples = resample::resample_mono(&wave.samples, wave.sample_rate, self.sample_rate)?;
        Ok(Waveform::new(samples, 1, self.sample_rate, wave.sample_format))
    }

    fn persist(&self, target: &Path, wave: &Waveform) -> Result<(), DecodePathError> {
        write_wav_file(target, wave, OutputEncoding::Float32)?;
        Ok(())
    }
}

fn has_canonical_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(CANONICAL_EXTENSION))
        .unwrap_or(false)
}

fn remove_partial(target: &Path) {
    match fs::remove_file(target) {
        Ok(()) => log::debug!("Removed partial output {:?}", target),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove partial output {:?}: {}", target, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn write_wav(
        path: &Path,
        channels: u16,
        sample_rate: u32,
        frames: usize,
        frame: impl Fn(usize, u16) -> f32,
    ) {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            for ch in 0..channels {
                writer.write_sample(frame(i, ch)).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    fn normalizer(dir: &Path) -> Normalizer {
        Normalizer::new(48000, Transcoder::new(dir.join("missing-ffmpeg"), 48000))
    }

    #[test]
    fn test_canonical_wav_is_copied_byte_for_byte() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.wav");
        let target = dir.path().join("normalized.wav");
        write_wav(&input, 1, 48000, 4800, |i, _| (i as f32 * 0.01).sin() * 0.3);

        let wave = normalizer(dir.path()).normalize(&input, &target).unwrap();
        assert_eq!(fs::read(&input).unwrap(), fs::read(&target).unwrap());
        assert_eq!(wave, read_wav(&input).unwrap());
    }

    #[test]
    fn test_stereo_wav_is_collapsed_by_mean() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("stereo.WAV");
        let target = dir.path().join("normalized.wav");
        write_wav(&input, 2, 48000, 1000, |i, ch| {
            if ch == 0 {
                i as f32 / 1000.0
            } else {
                -0.5
            }
        });

        let wave = normalizer(dir.path()).normalize(&input, &target).unwrap();
        assert_eq!(wave.channels, 1);
        assert_eq!(wave.samples.len(), 1000);
        for (i, s) in wave.samples.iter().enumerate() {
            let expected = (i as f32 / 1000.0 - 0.5) / 2.0;
            assert!((s - expected).abs() < 1e-6);
        }

        let persisted = read_wav(&target).unwrap();
        assert_eq!(persisted.channels, 1);
        assert_eq!(persisted.samples, wave.samples);
    }

    #[test]
    fn test_rate_is_always_canonical() {
        let dir = tempfile::tempdir().unwrap();
        let normalizer = normalizer(dir.path());
        for rate in [8000u32, 22050, 44100, 96000] {
            let input = dir.path().join(format!("tone_{}.wav", rate));
            let target = dir.path().join(format!("normalized_{}.wav", rate));
            write_wav(&input, 1, rate, rate as usize / 2, |_, _| 0.0);

            let wave = normalizer.normalize(&input, &target).unwrap();
            assert_eq!(wave.sample_rate, 48000);
            assert_eq!(wave.samples.len(), 24000);
            assert_eq!(read_wav(&target).unwrap().sample_rate, 48000);
        }
    }

    /// 8 kHz mono G.711 mu-law, which hound refuses
    fn write_mulaw_wav(path: &Path, frames: usize) {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(4 + 8 + 18 + 8 + frames as u32).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&18u32.to_le_bytes());
        bytes.extend_from_slice(&7u16.to_le_bytes()); // WAVE_FORMAT_MULAW
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&8000u32.to_le_bytes());
        bytes.extend_from_slice(&8000u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&8u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&(frames as u32).to_le_bytes());
        // 0xFF is mu-law silence
        bytes.extend(std::iter::repeat(0xFFu8).take(frames));
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_mulaw_wav_decodes_without_transcoder() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("phone.wav");
        let target = dir.path().join("normalized.wav");
        write_mulaw_wav(&input, 4800);
        assert!(read_wav(&input).is_err());

        let wave = normalizer(dir.path()).normalize(&input, &target).unwrap();
        assert_eq!(wave.channels, 1);
        assert_eq!(wave.sample_rate, 48000);
        assert_eq!(wave.samples.len(), 28800);
        assert!(wave.samples.iter().all(|s| s.abs() < 1e-3));

        let persisted = read_wav(&target).unwrap();
        assert_eq!(persisted.sample_rate, 48000);
        assert_eq!(persisted.samples.len(), 28800);
    }

    #[test]
    fn test_empty_wav_yields_empty_waveform() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("empty.wav");
        let target = dir.path().join("normalized.wav");
        write_wav(&input, 2, 44100, 0, |_, _| 0.0);

        let wave = normalizer(dir.path()).normalize(&input, &target).unwrap();
        assert!(wave.is_empty());
        assert_eq!(wave.sample_rate, 48000);
    }

    #[test]
    fn test_both_paths_failing_leaves_no_target() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("corrupt.wav");
        let target = dir.path().join("normalized.wav");
        fs::write(&input, b"RIFF\x00\x00\x00\x00WAVEjunkjunkjunk").unwrap();

        let err = normalizer(dir.path()).normalize(&input, &target).unwrap_err();
        assert!(matches!(err.fallback, DecodePathError::Spawn { .. }));
        assert!(!target.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_fallback_produces_canonical_output() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fixture = dir.path().join("fixture.wav");
        write_wav(&fixture, 1, 48000, 4800, |_, _| 0.25);

        // Stand-in transcoder: insists on forced mono/rate flags, then writes the fixture
        let script = dir.path().join("fake-ffmpeg");
        fs::write(
            &script,
            format!(
                "#!/bin/sh\ncase \"$*\" in *\"-ac 1 -ar 48000\"*) ;; *) exit 3 ;; esac\n\
                 for last; do :; done\ncp '{}' \"$last\"\n",
                fixture.display()
            ),
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let input = dir.path().join("clip.m4a");
        fs::write(&input, b"not something symphonia can parse").unwrap();
        let target = dir.path().join("normalized.wav");

        let normalizer = Normalizer::new(48000, Transcoder::new(&script, 48000));
        let wave = normalizer.normalize(&input, &target).unwrap();
        assert_eq!(wave.channels, 1);
        assert_eq!(wave.sample_rate, 48000);
        assert_eq!(wave.samples.len(), 4800);
        assert!(target.exists());
    }
}
