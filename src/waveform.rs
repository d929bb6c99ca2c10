//! In-memory sample buffers passed between pipeline stages

/// Sample representation the buffer was decoded from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    U8,
    I16,
    I24,
    I32,
    F32,
    F64,
}

/// Interleaved f32 samples tagged with channel count, rate and source format.
///
/// Samples are interleaved frame by frame: `[L0, R0, L1, R1, ...]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
    pub sample_format: SampleFormat,
}

impl Waveform {
    pub fn new(
        samples: Vec<f32>,
        channels: u16,
        sample_rate: u32,
        sample_format: SampleFormat,
    ) -> Self {
        Self {
            samples,
            channels: channels.max(1),
            sample_rate,
            sample_format,
        }
    }

    /// Mono f32 buffer
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(samples, 1, sample_rate, SampleFormat::F32)
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }

    pub fn is_mono(&self) -> bool {
        self.channels == 1
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Collapse channels by arithmetic mean. Mono input is returned as is.
    pub fn into_mono(self) -> Self {
        if self.is_mono() {
            return self;
        }
        let samples = mix_to_mono(&self.samples, self.channels as usize);
        Self {
            samples,
            channels: 1,
            sample_rate: self.sample_rate,
            sample_format: self.sample_format,
        }
    }
}

/// Average interleaved channels into one. A trailing partial frame is dropped.
pub fn mix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
