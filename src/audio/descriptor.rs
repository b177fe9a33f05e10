/// Sample rates the VAD engine accepts.
pub const SUPPORTED_SAMPLE_RATES: [u32; 4] = [8000, 16000, 32000, 48000];

/// Rate we resample to when the source rate is not supported.
pub const FALLBACK_SAMPLE_RATE: u32 = 16000;

/// Canonical sample width in bytes (16-bit linear PCM, little-endian).
pub const CANONICAL_SAMPLE_WIDTH: u16 = 2;

/// Shape of a PCM stream as read from its container header. Immutable once read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioStreamDescriptor {
    pub channels: u16,
    /// Bytes per sample.
    pub sample_width: u16,
    pub sample_rate: u32,
    /// Inter-channel frames in the stream (samples per channel).
    pub frame_count: u32,
}

impl AudioStreamDescriptor {
    pub fn from_reader<R: std::io::Read>(reader: &hound::WavReader<R>) -> Self {
        let spec = reader.spec();
        Self {
            channels: spec.channels,
            sample_width: spec.bits_per_sample / 8,
            sample_rate: spec.sample_rate,
            frame_count: reader.duration(),
        }
    }

    /// True iff the stream already satisfies the canonical contract:
    /// mono, 2-byte samples, supported rate.
    pub fn is_canonical(&self) -> bool {
        self.channels == 1
            && self.sample_width == CANONICAL_SAMPLE_WIDTH
            && SUPPORTED_SAMPLE_RATES.contains(&self.sample_rate)
    }
}
