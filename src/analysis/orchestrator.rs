use crate::analysis::classifier::SegmentClassifier;
use crate::analysis::result::AnalysisResult;
use crate::audio::negotiator::{FormatNegotiator, NegotiatorConfig, Prepared};
use crate::error::AnalysisError;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Ordered notifications delivered to the presentation layer. A job emits
/// any number of Status/Progress events followed by exactly one terminal
/// Done or Failed, unless it was cancelled first (then it falls silent).
#[derive(Debug, Clone)]
pub enum AnalysisEvent {
    Status(String),
    Progress(f32),
    Done(AnalysisResult),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub path: PathBuf,
    pub sensitivity: u8,
    pub frame_duration_ms: u32,
}

/// Handle to one running analysis job.
pub struct AnalysisJob {
    pub events: mpsc::Receiver<AnalysisEvent>,
    token: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

impl AnalysisJob {
    /// Cooperative: the worker checks the flag between observable steps.
    /// Cleanup of any temp file still runs after a cancel.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for the worker to finish, including its cleanup.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

/// Drives FormatNegotiator then SegmentClassifier for one input on a
/// dedicated background worker. At most one active job per instance at a
/// time is the caller's responsibility.
pub struct AnalysisOrchestrator {
    config: NegotiatorConfig,
}

impl AnalysisOrchestrator {
    pub fn new(config: NegotiatorConfig) -> Self {
        Self { config }
    }

    pub fn spawn(&self, request: AnalysisRequest) -> AnalysisJob {
        let (tx, rx) = mpsc::channel(32);
        let token = CancellationToken::new();
        let config = self.config.clone();
        let worker_token = token.clone();

        // The transcode step blocks on child-process output line by line,
        // so the whole job runs on a blocking worker.
        let handle = tokio::task::spawn_blocking(move || {
            run_job(request, config, worker_token, tx);
        });

        AnalysisJob {
            events: rx,
            token,
            handle,
        }
    }
}

fn run_job(
    request: AnalysisRequest,
    config: NegotiatorConfig,
    cancel: CancellationToken,
    tx: mpsc::Sender<AnalysisEvent>,
) {
    let negotiator = FormatNegotiator::new(config);
    let classifier = SegmentClassifier::new(request.sensitivity, request.frame_duration_ms);

    let display_name = request
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| request.path.display().to_string());

    let mut canonical_path: Option<PathBuf> = None;

    let outcome = execute(
        &negotiator,
        &classifier,
        &request,
        &display_name,
        &cancel,
        &tx,
        &mut canonical_path,
    );

    match outcome {
        Ok(Some(result)) => {
            let _ = tx.blocking_send(AnalysisEvent::Done(result));
        }
        Ok(None) => {
            info!(file = %display_name, "job cancelled");
        }
        Err(e) => {
            warn!(file = %display_name, "job failed: {e}");
            if !cancel.is_cancelled() {
                let _ = tx.blocking_send(AnalysisEvent::Failed(e.to_string()));
            }
        }
    }

    // Runs exactly once per job, whichever terminal state was reached.
    // Never touches the source input.
    if let Some(path) = canonical_path {
        negotiator.cleanup(&path, &request.path);
    }
}

fn execute(
    negotiator: &FormatNegotiator,
    classifier: &SegmentClassifier,
    request: &AnalysisRequest,
    display_name: &str,
    cancel: &CancellationToken,
    tx: &mpsc::Sender<AnalysisEvent>,
    canonical_path: &mut Option<PathBuf>,
) -> Result<Option<AnalysisResult>, AnalysisError> {
    if !negotiator.is_canonical(&request.path) {
        let _ = tx.blocking_send(AnalysisEvent::Status(format!(
            "Converting {display_name}..."
        )));
    }

    let prepared = negotiator.prepare(&request.path, cancel, &mut |percent| {
        if !cancel.is_cancelled() {
            let _ = tx.blocking_send(AnalysisEvent::Progress(percent));
        }
    })?;

    let path = match prepared {
        Prepared::Ready(path) => path,
        Prepared::Cancelled => return Ok(None),
    };
    *canonical_path = Some(path.clone());

    if cancel.is_cancelled() {
        return Ok(None);
    }

    let _ = tx.blocking_send(AnalysisEvent::Status("Analyzing audio...".to_string()));

    let mut result = classifier.analyze(&path)?;
    // Report the file the user handed us, not the temp artifact.
    result.file_name = display_name.to_string();

    if cancel.is_cancelled() {
        return Ok(None);
    }

    Ok(Some(result))
}
