pub mod analysis;
pub mod audio;
pub mod error;

// Re-export specific items if needed for convenient access
pub use analysis::classifier::SegmentClassifier;
pub use analysis::orchestrator::{
    AnalysisEvent, AnalysisJob, AnalysisOrchestrator, AnalysisRequest,
};
pub use analysis::result::{AnalysisResult, SpeechSegment};
pub use audio::negotiator::{FormatNegotiator, NegotiatorConfig, Prepared};
pub use audio::toolchain::Toolchain;
pub use error::AnalysisError;
