use std::path::PathBuf;
use thiserror::Error;

/// Everything that can abort an analysis job. Format and precondition
/// violations surface as a single terminal failure; per-frame VAD faults
/// never reach this type (they degrade to silence inside the classifier).
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("unreadable audio container: {0}")]
    UnreadableAudio(String),

    #[error("only mono audio is supported (got {0} channels)")]
    UnsupportedChannelLayout(u16),

    #[error("only 16-bit audio is supported (got {0} bit)")]
    UnsupportedSampleWidth(u16),

    #[error("unsupported sample rate: {0}Hz (supported: 8000, 16000, 32000, 48000)")]
    UnsupportedSampleRate(u32),

    #[error("no transcoder binary is available")]
    TranscoderUnavailable,

    #[error("transcoder failed: {0}")]
    TranscodeFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AnalysisError {
    /// Map a hound open/read failure. Hound wraps missing files in its own
    /// io variant, so we recover the spec-level distinction here.
    pub fn from_container(err: hound::Error, path: &std::path::Path) -> Self {
        match err {
            hound::Error::IoError(e) if e.kind() == std::io::ErrorKind::NotFound => {
                AnalysisError::FileNotFound(path.to_path_buf())
            }
            other => AnalysisError::UnreadableAudio(other.to_string()),
        }
    }
}
