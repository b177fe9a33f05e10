use std::path::{Path, PathBuf};
use tracing::debug;

#[cfg(windows)]
const ENCODER_BIN: &str = "ffmpeg.exe";
#[cfg(windows)]
const PROBER_BIN: &str = "ffprobe.exe";

#[cfg(not(windows))]
const ENCODER_BIN: &str = "ffmpeg";
#[cfg(not(windows))]
const PROBER_BIN: &str = "ffprobe";

/// Resolved paths to the external encoder/prober pair. Both are optional;
/// `available()` gates the transcode path, probing degrades gracefully.
#[derive(Debug, Clone, Default)]
pub struct Toolchain {
    pub encoder: Option<PathBuf>,
    pub prober: Option<PathBuf>,
}

impl Toolchain {
    /// Locate the binaries. Search order: the override directory (if any),
    /// then every entry of the PATH environment variable.
    pub fn discover(override_dir: Option<&Path>) -> Self {
        let encoder = find_binary(ENCODER_BIN, override_dir);
        let prober = find_binary(PROBER_BIN, override_dir);
        debug!(?encoder, ?prober, "toolchain discovery");
        Self { encoder, prober }
    }

    pub fn with_paths(encoder: Option<PathBuf>, prober: Option<PathBuf>) -> Self {
        Self { encoder, prober }
    }

    /// An empty toolchain, for callers that must not shell out.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn available(&self) -> bool {
        self.encoder.is_some() && self.prober.is_some()
    }
}

fn find_binary(name: &str, override_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = override_dir {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }

    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
