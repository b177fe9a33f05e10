use crate::analysis::result::{AnalysisResult, SpeechSegment};
use crate::audio::descriptor::{AudioStreamDescriptor, CANONICAL_SAMPLE_WIDTH};
use crate::error::AnalysisError;
use std::path::Path;
use tracing::{debug, info};
use webrtc_vad::{SampleRate, Vad, VadMode};

pub const SUPPORTED_FRAME_DURATIONS: [u32; 3] = [10, 20, 30];
pub const DEFAULT_FRAME_DURATION_MS: u32 = 30;
pub const MAX_SENSITIVITY: u8 = 3;

/// Frame-based voice-activity classifier. Consumes a canonical PCM stream
/// and produces merged speech intervals plus duration statistics.
///
/// Reentrant: no state is shared between `analyze` calls.
pub struct SegmentClassifier {
    sensitivity: u8,
    frame_duration_ms: u32,
}

impl SegmentClassifier {
    /// Out-of-range parameters are coerced, never rejected: sensitivity is
    /// clamped into 0..=3 and unknown frame durations fall back to 30 ms.
    pub fn new(sensitivity: u8, frame_duration_ms: u32) -> Self {
        Self {
            sensitivity: sensitivity.min(MAX_SENSITIVITY),
            frame_duration_ms: if SUPPORTED_FRAME_DURATIONS.contains(&frame_duration_ms) {
                frame_duration_ms
            } else {
                DEFAULT_FRAME_DURATION_MS
            },
        }
    }

    pub fn sensitivity(&self) -> u8 {
        self.sensitivity
    }

    pub fn frame_duration_ms(&self) -> u32 {
        self.frame_duration_ms
    }

    /// Classify `path` frame by frame and merge decisions into segments.
    /// The file must already be canonical; violations fail fast with no
    /// partial result.
    pub fn analyze(&self, path: &Path) -> Result<AnalysisResult, AnalysisError> {
        if !path.exists() {
            return Err(AnalysisError::FileNotFound(path.to_path_buf()));
        }

        let mut reader =
            hound::WavReader::open(path).map_err(|e| AnalysisError::from_container(e, path))?;
        let descriptor = AudioStreamDescriptor::from_reader(&reader);

        if descriptor.channels != 1 {
            return Err(AnalysisError::UnsupportedChannelLayout(descriptor.channels));
        }
        if descriptor.sample_width != CANONICAL_SAMPLE_WIDTH
            || reader.spec().sample_format != hound::SampleFormat::Int
        {
            return Err(AnalysisError::UnsupportedSampleWidth(
                descriptor.sample_width * 8,
            ));
        }
        let sample_rate = descriptor.sample_rate;
        let vad_rate = vad_sample_rate(sample_rate)?;

        let samples: Vec<i16> = reader
            .samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AnalysisError::from_container(e, path))?;

        let mut vad = Vad::new_with_rate_and_mode(vad_rate, vad_mode(self.sensitivity));

        let frame_size = (sample_rate as usize * self.frame_duration_ms as usize) / 1000;
        let total_frames = samples.len().div_ceil(frame_size);
        let frame_duration_sec = self.frame_duration_ms as f64 / 1000.0;

        debug!(
            total_samples = samples.len(),
            frame_size, total_frames, "classifying frames"
        );

        let mut frame_buf = vec![0i16; frame_size];
        let mut speech_frames: usize = 0;
        let mut segments: Vec<SpeechSegment> = Vec::new();
        let mut speech_active = false;
        let mut segment_start = 0.0;

        for index in 0..total_frames {
            let offset = index * frame_size;
            let end = (offset + frame_size).min(samples.len());
            let available = end - offset;

            frame_buf[..available].copy_from_slice(&samples[offset..end]);
            // Zero-pad the short final frame rather than reading past the end.
            frame_buf[available..].fill(0);

            // A per-frame engine fault degrades to non-speech instead of
            // failing the whole pass.
            let is_speech = vad.is_voice_segment(&frame_buf).unwrap_or(false);

            if is_speech {
                speech_frames += 1;
                if !speech_active {
                    speech_active = true;
                    segment_start = index as f64 * frame_duration_sec;
                }
            } else if speech_active {
                speech_active = false;
                segments.push(SpeechSegment {
                    start_seconds: segment_start,
                    end_seconds: index as f64 * frame_duration_sec,
                });
            }
        }

        // Never leave a dangling open segment.
        if speech_active {
            segments.push(SpeechSegment {
                start_seconds: segment_start,
                end_seconds: total_frames as f64 * frame_duration_sec,
            });
        }

        // total_duration is sample-exact while speech_duration is
        // frame-quantized; the clamp absorbs the rounding discrepancy.
        let total_duration = samples.len() as f64 / sample_rate as f64;
        let speech_duration = speech_frames as f64 * frame_duration_sec;
        let silence_duration = (total_duration - speech_duration).max(0.0);

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        info!(
            total_duration,
            speech_duration,
            segments = segments.len(),
            "analysis complete"
        );

        Ok(AnalysisResult {
            file_path: path.to_path_buf(),
            file_name,
            total_duration,
            speech_duration,
            silence_duration,
            sample_rate,
            sensitivity: self.sensitivity,
            frame_duration_ms: self.frame_duration_ms,
            speech_segments: segments,
        })
    }
}

fn vad_sample_rate(rate: u32) -> Result<SampleRate, AnalysisError> {
    match rate {
        8000 => Ok(SampleRate::Rate8kHz),
        16000 => Ok(SampleRate::Rate16kHz),
        32000 => Ok(SampleRate::Rate32kHz),
        48000 => Ok(SampleRate::Rate48kHz),
        other => Err(AnalysisError::UnsupportedSampleRate(other)),
    }
}

/// Sensitivity 0 detects the least speech, 3 is the most permissive.
fn vad_mode(sensitivity: u8) -> VadMode {
    match sensitivity {
        0 => VadMode::VeryAggressive,
        1 => VadMode::Aggressive,
        2 => VadMode::LowBitrate,
        _ => VadMode::Quality,
    }
}
