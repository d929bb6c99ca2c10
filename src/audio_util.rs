use hound::{WavReader, WavSpec, WavWriter};
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Seek, Write};
use std::path::Path;

use crate::config::OutputEncoding;
use crate::error::{DecodePathError, SerializationError};
use crate::waveform::{SampleFormat, Waveform};

/// Read a WAV file into f32 samples in [-1.0, 1.0]
pub(crate) fn read_wav(path: &Path) -> Result<Waveform, DecodePathError> {
    let reader = WavReader::new(BufReader::new(File::open(path)?))?;
    let spec = reader.spec();

    let (samples, format) = match (spec.sample_format, spec.bits_per_sample) {
        // hound yields 8-bit PCM already shifted to signed
        (hound::SampleFormat::Int, 8) => (read_int_samples(reader, 128.0)?, SampleFormat::U8),
        (hound::SampleFormat::Int, 16) => {
            (read_int_samples(reader, 32768.0)?, SampleFormat::I16)
        }
        (hound::SampleFormat::Int, 24) => {
            (read_int_samples(reader, 8388608.0)?, SampleFormat::I24)
        }
        (hound::SampleFormat::Int, 32) => {
            (read_int_samples(reader, 2147483648.0)?, SampleFormat::I32)
        }
        (hound::SampleFormat::Float, 32) => (
            reader.into_samples::<f32>().collect::<Result<Vec<_>, _>>()?,
            SampleFormat::F32,
        ),
        (format, bits) => {
            return Err(DecodePathError::UnsupportedWav(format!("{:?} {}-bit", format, bits)));
        }
    };

    Ok(Waveform::new(samples, spec.channels, spec.sample_rate, format))
}

fn read_int_samples<R: std::io::Read>(
    reader: WavReader<R>,
    scale: f32,
) -> Result<Vec<f32>, hound::Error> {
    reader
        .into_samples::<i32>()
        .map(|s| s.map(|s| s as f32 / scale))
        .collect()
}

fn wav_spec(wave: &Waveform, encoding: OutputEncoding) -> WavSpec {
    let (bits_per_sample, sample_format) = match encoding {
        OutputEncoding::Float32 => (32, hound::SampleFormat::Float),
        OutputEncoding::Pcm16 => (16, hound::SampleFormat::Int),
    };
    WavSpec {
        channels: wave.channels,
        sample_rate: wave.sample_rate,
        bits_per_sample,
        sample_format,
    }
}

fn write_samples<W: Write + Seek>(
    writer: W,
    wave: &Waveform,
    encoding: OutputEncoding,
) -> Result<(), SerializationError> {
    if let Some(index) = wave.samples.iter().position(|s| !s.is_finite()) {
        return Err(SerializationError::NonFinite(index));
    }

    let mut writer = WavWriter::new(writer, wav_spec(wave, encoding))?;
    match encoding {
        OutputEncoding::Float32 => {
            for &sample in &wave.samples {
                writer.write_sample(sample)?;
            }
        }
        OutputEncoding::Pcm16 => {
            for &sample in &wave.samples {
                writer.write_sample((sample.clamp(-1.0, 1.0) * 32767.0) as i16)?;
            }
        }
    }
    writer.finalize()?;
    Ok(())
}

/// Write a waveform to a WAV file
pub(crate) fn write_wav_file(
    path: &Path,
    wave: &Waveform,
    encoding: OutputEncoding,
) -> Result<(), SerializationError> {
    let file = File::create(path).map_err(hound::Error::IoError)?;
    write_samples(BufWriter::new(file), wave, encoding)
}

/// Encode a waveform as an in-memory WAV container
pub fn encode_wav(
    wave: &Waveform,
    encoding: OutputEncoding,
) -> Result<Vec<u8>, SerializationError> {
    let mut cursor = Cursor::new(Vec::with_capacity(44 + wave.samples.len() * 4));
    write_samples(&mut cursor, wave, encoding)?;
    Ok(cursor.into_inner())
}
