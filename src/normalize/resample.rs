//! Mono sample-rate conversion
//!
//! Windowed-sinc resampling via rubato, with the resampler's output delay
//! trimmed so the result lines up with the input and lasts exactly
//! `round(len * to / from)` samples.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::DecodePathError;

/// Input frames fed to the sinc resampler per call
const RESAMPLE_CHUNK: usize = 1024;

/// Below this length sinc filtering has nothing to work with; interpolate linearly
const MIN_SINC_INPUT: usize = 16;

/// Output length that preserves duration to within one output sample
pub fn expected_len(input_len: usize, from_rate: u32, to_rate: u32) -> usize {
    ((input_len as u64 * to_rate as u64 + from_rate as u64 / 2) / from_rate as u64) as usize
}

/// Resample mono `samples` from `from_rate` to `to_rate`
pub fn resample_mono(
    samples: &[f32],
    from_rate: u32,
    to_rate: u32,
) -> Result<Vec<f32>, DecodePathError> {
    if from_rate == 0 || to_rate == 0 {
        return Err(DecodePathError::Resample(format!(
            "invalid rate conversion {} -> {}",
            from_rate, to_rate
        )));
    }
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let target_len = expected_len(samples.len(), from_rate, to_rate);
    if samples.len() < MIN_SINC_INPUT {
        return Ok(resample_linear(samples, target_len));
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK, 1)
        .map_err(|e| DecodePathError::Resample(format!("Failed to create resampler: {}", e)))?;

    let delay = resampler.output_delay();
    let mut output: Vec<f32> = Vec::with_capacity(target_len + delay + RESAMPLE_CHUNK);

    for chunk in samples.chunks(RESAMPLE_CHUNK) {
        let input: [&[f32]; 1] = [chunk];
        let frames = if chunk.len() == RESAMPLE_CHUNK {
            resampler.process(&input[..], None)
        } else {
            resampler.process_partial(Some(&input[..]), None)
        }
        .map_err(|e| DecodePathError::Resample(e.to_string()))?;
        output.extend_from_slice(&frames[0]);
    }

    // Flush the filter tail until the delayed signal is fully out
    while output.len() < target_len + delay {
        let frames = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(|e| DecodePathError::Resample(e.to_string()))?;
        if frames[0].is_empty() {
            break;
        }
        output.extend_from_slice(&frames[0]);
    }

    output.drain(..delay.min(output.len()));
    output.resize(target_len, 0.0);
    Ok(output)
}

fn resample_linear(samples: &[f32], target_len: usize) -> Vec<f32> {
    if samples.len() == 1 || target_len <= 1 {
        return vec![samples[0]; target_len];
    }
    let step = (samples.len() - 1) as f64 / (target_len - 1) as f64;
    (0..target_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            let a = samples[idx];
            let b = samples[(idx + 1).min(samples.len() - 1)];
            a + (b - a) * frac
        })
        .collect()
}
