use serde::Serialize;
use std::path::PathBuf;

/// A maximal run of consecutive speech-classified frames, as a time interval
/// on the canonical stream's timeline. Always start < end, both >= 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpeechSegment {
    pub start_seconds: f64,
    pub end_seconds: f64,
}

impl SpeechSegment {
    pub fn duration(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }
}

/// Outcome of one full classification pass. Constructed once by the
/// classifier, immutable afterwards; the orchestrator only substitutes the
/// display name before handing it to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub file_path: PathBuf,
    pub file_name: String,
    /// Seconds, exact sample-count based.
    pub total_duration: f64,
    /// Seconds, frame-quantized. May differ from the sum of segment lengths
    /// by a fraction of one frame.
    pub speech_duration: f64,
    /// Seconds, clamped >= 0.
    pub silence_duration: f64,
    pub sample_rate: u32,
    pub sensitivity: u8,
    pub frame_duration_ms: u32,
    /// Ordered by start time, non-overlapping.
    pub speech_segments: Vec<SpeechSegment>,
}

impl AnalysisResult {
    pub fn speech_percentage(&self) -> f64 {
        if self.total_duration <= 0.0 {
            return 0.0;
        }
        self.speech_duration / self.total_duration * 100.0
    }

    pub fn silence_percentage(&self) -> f64 {
        100.0 - self.speech_percentage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(total: f64, speech: f64) -> AnalysisResult {
        AnalysisResult {
            file_path: PathBuf::from("test.wav"),
            file_name: "test.wav".to_string(),
            total_duration: total,
            speech_duration: speech,
            silence_duration: (total - speech).max(0.0),
            sample_rate: 16000,
            sensitivity: 2,
            frame_duration_ms: 30,
            speech_segments: vec![],
        }
    }

    #[test]
    fn percentages_sum_to_100() {
        let r = result(10.0, 4.0);
        assert!((r.speech_percentage() - 40.0).abs() < 1e-9);
        assert_eq!(r.speech_percentage() + r.silence_percentage(), 100.0);
    }

    #[test]
    fn zero_duration_has_no_nan() {
        let r = result(0.0, 0.0);
        assert_eq!(r.speech_percentage(), 0.0);
        assert_eq!(r.silence_percentage(), 100.0);
    }
}
