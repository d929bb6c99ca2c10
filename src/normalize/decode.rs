//! Primary decode path: symphonia container probe + codec decode to f32

use std::fs::File;
use std::path::Path;
use symphonia::core::audio::{AudioBufferRef, SampleBuffer};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::DecodePathError;
use crate::waveform::{SampleFormat, Waveform};

/// Decode every packet of the first audio track into interleaved f32 samples.
///
/// Isolated corrupt packets are skipped. A stream where every packet fails to
/// decode is an error rather than an empty waveform.
pub fn decode_file(path: &Path) -> Result<Waveform, DecodePathError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let format_opts = FormatOptions::default();
    let metadata_opts = MetadataOptions::default();
    let decoder_opts = DecoderOptions::default();

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &format_opts, &metadata_opts)
        .map_err(|e| DecodePathError::Probe(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodePathError::NoTrack)?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count() as u16);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &decoder_opts)
        .map_err(|e| DecodePathError::Codec(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_format = SampleFormat::F32;
    let mut decoded_packets = 0usize;
    let mut failed_packets = 0usize;
    let mut last_error: Option<String> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(SymphoniaError::DecodeError(e)) => {
                failed_packets += 1;
                last_error = Some(e.to_string());
                continue;
            }
            Err(e) => return Err(DecodePathError::Stream(format!("Error reading packet: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                failed_packets += 1;
                last_error = Some(e.to_string());
                continue;
            }
            Err(e) => return Err(DecodePathError::Stream(e.to_string())),
        };

        let spec = *decoded.spec();
        sample_rate = Some(spec.rate);
        channels = Some(spec.channels.count() as u16);
        sample_format = buffer_format(&decoded);

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
        decoded_packets += 1;
    }

    if decoded_packets == 0 && failed_packets > 0 {
        return Err(DecodePathError::Stream(format!(
            "all {} packets failed to decode (last: {})",
            failed_packets,
            last_error.unwrap_or_default()
        )));
    }
    if failed_packets > 0 {
        log::warn!(
            "Skipped {} undecodable packets in {:?} ({} decoded)",
            failed_packets,
            path,
            decoded_packets
        );
    }

    let sample_rate =
        sample_rate.ok_or_else(|| DecodePathError::Stream("unknown sample rate".into()))?;
    let channels = channels.unwrap_or(1);

    log::debug!(
        "Decoded {:?}: {} Hz, {} ch, {} frames",
        path,
        sample_rate,
        channels,
        samples.len() / channels.max(1) as usize
    );

    Ok(Waveform::new(samples, channels, sample_rate, sample_format))
}

fn buffer_format(buf: &AudioBufferRef<'_>) -> SampleFormat {
    match buf {
        AudioBufferRef::U8(_) | AudioBufferRef::S8(_) => SampleFormat::U8,
        AudioBufferRef::U16(_) | AudioBufferRef::S16(_) => SampleFormat::I16,
        AudioBufferRef::U24(_) | AudioBufferRef::S24(_) => SampleFormat::I24,
        AudioBufferRef::U32(_) | AudioBufferRef::S32(_) => SampleFormat::I32,
        AudioBufferRef::F32(_) => SampleFormat::F32,
        AudioBufferRef::F64(_) => SampleFormat::F64,
    }
}
