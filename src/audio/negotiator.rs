use crate::audio::descriptor::{
    AudioStreamDescriptor, FALLBACK_SAMPLE_RATE, SUPPORTED_SAMPLE_RATES,
};
use crate::audio::toolchain::Toolchain;
use crate::error::AnalysisError;
use regex::Regex;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Container extensions we know how to handle, directly or via the transcoder.
pub const SUPPORTED_FORMATS: [&str; 7] = ["wav", "mp3", "flac", "ogg", "m4a", "aac", "wma"];

/// Outcome of format preparation. `Cancelled` means the caller asked us to
/// stop mid-transcode; any partial output has already been discarded.
#[derive(Debug)]
pub enum Prepared {
    Ready(PathBuf),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct NegotiatorConfig {
    pub temp_dir: PathBuf,
    pub toolchain: Toolchain,
}

impl NegotiatorConfig {
    pub fn new(temp_dir: PathBuf, toolchain: Toolchain) -> Self {
        Self { temp_dir, toolchain }
    }
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir(),
            toolchain: Toolchain::discover(None),
        }
    }
}

/// Guarantees any input file comes out as a canonical WAV path:
/// mono, 16-bit linear PCM, at one of the supported sample rates.
pub struct FormatNegotiator {
    config: NegotiatorConfig,
}

impl FormatNegotiator {
    pub fn new(config: NegotiatorConfig) -> Self {
        Self { config }
    }

    /// Fast pre-check by extension only. A true result still requires
    /// `normalize` to verify channels, sample width and rate.
    pub fn is_canonical(&self, path: &Path) -> bool {
        extension_of(path).as_deref() == Some("wav")
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        match extension_of(path) {
            Some(ext) => SUPPORTED_FORMATS.contains(&ext.as_str()),
            None => false,
        }
    }

    /// Convert `path` into canonical form, whatever its container is.
    /// WAV inputs go through `normalize`; everything else through the
    /// external transcoder with progress reporting.
    pub fn prepare(
        &self,
        path: &Path,
        cancel: &CancellationToken,
        on_progress: &mut dyn FnMut(f32),
    ) -> Result<Prepared, AnalysisError> {
        if !path.exists() {
            return Err(AnalysisError::FileNotFound(path.to_path_buf()));
        }

        if self.is_canonical(path) {
            self.normalize(path).map(Prepared::Ready)
        } else {
            self.transcode(path, cancel, on_progress)
        }
    }

    /// Open a WAV container and bring it to canonical form. Already-canonical
    /// streams are returned unchanged (no copy). Otherwise the stream is
    /// down-mixed to mono, re-quantized to 16 bits and, only when the source
    /// rate is unsupported, resampled to 16 kHz, into a fresh temp file.
    pub fn normalize(&self, path: &Path) -> Result<PathBuf, AnalysisError> {
        if !path.exists() {
            return Err(AnalysisError::FileNotFound(path.to_path_buf()));
        }

        let mut reader =
            hound::WavReader::open(path).map_err(|e| AnalysisError::from_container(e, path))?;
        let descriptor = AudioStreamDescriptor::from_reader(&reader);

        if descriptor.is_canonical() {
            debug!(?path, "already canonical, no conversion");
            return Ok(path.to_path_buf());
        }

        info!(
            channels = descriptor.channels,
            width = descriptor.sample_width,
            rate = descriptor.sample_rate,
            "normalizing WAV"
        );

        let mono = read_mono_f32(&mut reader, &descriptor, path)?;

        let target_rate = if SUPPORTED_SAMPLE_RATES.contains(&descriptor.sample_rate) {
            descriptor.sample_rate
        } else {
            FALLBACK_SAMPLE_RATE
        };

        let mono = if target_rate == descriptor.sample_rate {
            mono
        } else {
            resample(mono, descriptor.sample_rate, target_rate)?
        };

        let out_path = self.fresh_temp_path();
        write_canonical_wav(&out_path, target_rate, &mono)?;
        Ok(out_path)
    }

    /// Run the external transcoder to produce a canonical WAV, parsing its
    /// diagnostic output for elapsed-time markers and reporting percentage
    /// progress. Progress is monotonically non-decreasing and clamped at 100;
    /// it is suppressed entirely when the source duration is unknown.
    pub fn transcode(
        &self,
        path: &Path,
        cancel: &CancellationToken,
        on_progress: &mut dyn FnMut(f32),
    ) -> Result<Prepared, AnalysisError> {
        let encoder = self
            .config
            .toolchain
            .encoder
            .clone()
            .ok_or(AnalysisError::TranscoderUnavailable)?;

        let total_duration = self.discover_duration(path);
        let out_path = self.fresh_temp_path();

        info!(?path, ?out_path, total_duration, "spawning transcoder");

        let mut child = Command::new(&encoder)
            .arg("-y")
            .arg("-i")
            .arg(path)
            .args(["-ac", "1"])
            .args(["-ar", "16000"])
            .args(["-acodec", "pcm_s16le"])
            .arg(&out_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let pumped = match child.stderr.take() {
            Some(stderr) => pump_progress(
                std::io::BufReader::new(stderr),
                cancel,
                total_duration,
                on_progress,
            ),
            None => Ok(false),
        };

        let cancelled = match pumped {
            Ok(cancelled) => cancelled,
            Err(e) => {
                // A pipe failure must not leak the child or its partial output.
                let _ = child.kill();
                let _ = child.wait();
                remove_quietly(&out_path);
                return Err(e.into());
            }
        };

        if cancelled || cancel.is_cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            remove_quietly(&out_path);
            return Ok(Prepared::Cancelled);
        }

        let status = match child.wait() {
            Ok(status) => status,
            Err(e) => {
                remove_quietly(&out_path);
                return Err(e.into());
            }
        };

        if !status.success() {
            remove_quietly(&out_path);
            return Err(AnalysisError::TranscodeFailed(format!(
                "encoder exited with {status}"
            )));
        }

        Ok(Prepared::Ready(out_path))
    }

    /// Source duration in seconds via the external prober. Advisory only:
    /// any failure (no prober, bad output) yields 0.0, which in turn
    /// suppresses progress reporting rather than failing the job.
    pub fn discover_duration(&self, path: &Path) -> f64 {
        let Some(prober) = self.config.toolchain.prober.as_ref() else {
            return 0.0;
        };

        let output = Command::new(prober)
            .args(["-v", "error"])
            .args(["-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(path)
            .stdin(Stdio::null())
            .output();

        match output {
            Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout)
                .trim()
                .parse::<f64>()
                .unwrap_or(0.0),
            Ok(out) => {
                debug!(status = ?out.status, "prober exited non-zero");
                0.0
            }
            Err(e) => {
                debug!("prober invocation failed: {e}");
                0.0
            }
        }
    }

    /// Best-effort reclaim of a conversion artifact. Deletes `result_path`
    /// iff it differs from `original_path` and exists; failures are swallowed.
    pub fn cleanup(&self, result_path: &Path, original_path: &Path) {
        if result_path != original_path && result_path.exists() {
            remove_quietly(result_path);
        }
    }

    fn fresh_temp_path(&self) -> PathBuf {
        self.config
            .temp_dir
            .join(format!("speechscan-{}.wav", Uuid::new_v4()))
    }
}

/// Clamps to 100 and never goes backwards, even if the underlying parser
/// observes a lower timestamp on a later line.
struct ProgressTracker {
    last: f32,
}

impl ProgressTracker {
    fn new() -> Self {
        Self { last: 0.0 }
    }

    fn advance(&mut self, percent: f32) -> f32 {
        let clamped = percent.clamp(0.0, 100.0);
        if clamped > self.last {
            self.last = clamped;
        }
        self.last
    }
}

/// Read the encoder's diagnostic stream to completion, reporting a clamped
/// monotonic percentage for every elapsed-time marker. The stream rewrites
/// its status line with carriage returns, so each buffered line is split on
/// `\r` as well. Returns true if the caller cancelled mid-stream.
fn pump_progress(
    mut reader: impl BufRead,
    cancel: &CancellationToken,
    total_duration: f64,
    on_progress: &mut dyn FnMut(f32),
) -> std::io::Result<bool> {
    let time_re = Regex::new(r"time=(\d{2}):(\d{2}):(\d{2}\.\d+)").unwrap();
    let mut tracker = ProgressTracker::new();
    let mut buf = Vec::new();

    loop {
        if cancel.is_cancelled() {
            return Ok(true);
        }

        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(false);
        }

        let text = String::from_utf8_lossy(&buf);
        for chunk in text.split('\r') {
            if let Some(elapsed) = parse_elapsed_seconds(&time_re, chunk) {
                if total_duration > 0.0 {
                    let percent = (elapsed / total_duration * 100.0) as f32;
                    on_progress(tracker.advance(percent));
                }
            }
        }
    }
}

fn parse_elapsed_seconds(time_re: &Regex, line: &str) -> Option<f64> {
    let caps = time_re.captures(line)?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        debug!(?path, "temp file removal failed: {e}");
    }
}

/// Decode the whole stream to normalized f32 and average channels down to one.
fn read_mono_f32<R: std::io::Read>(
    reader: &mut hound::WavReader<R>,
    descriptor: &AudioStreamDescriptor,
    path: &Path,
) -> Result<Vec<f32>, AnalysisError> {
    let spec = reader.spec();
    let channels = descriptor.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AnalysisError::from_container(e, path))?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| AnalysisError::from_container(e, path))?
        }
    };

    if channels == 1 {
        return Ok(interleaved);
    }

    let mono = interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();
    Ok(mono)
}

fn write_canonical_wav(path: &Path, sample_rate: u32, samples: &[f32]) -> Result<(), AnalysisError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| AnalysisError::UnreadableAudio(e.to_string()))?;
    for &sample in samples {
        let quantized = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(quantized)
            .map_err(|e| AnalysisError::UnreadableAudio(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| AnalysisError::UnreadableAudio(e.to_string()))?;
    Ok(())
}

fn resample(samples: Vec<f32>, from_rate: u32, to_rate: u32) -> Result<Vec<f32>, AnalysisError> {
    if samples.is_empty() {
        return Ok(samples);
    }

    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };

    let chunk_size = 1024;
    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_size, 1)
        .map_err(|e| AnalysisError::UnreadableAudio(format!("resampler init: {e}")))?;

    let expected = (samples.len() as f64 * ratio).ceil() as usize;
    let mut out = Vec::with_capacity(expected);
    let mut pos = 0;

    while samples.len() - pos >= chunk_size {
        let frames = resampler
            .process(&[&samples[pos..pos + chunk_size]], None)
            .map_err(|e| AnalysisError::UnreadableAudio(format!("resample: {e}")))?;
        out.extend_from_slice(&frames[0]);
        pos += chunk_size;
    }

    if pos < samples.len() {
        let frames = resampler
            .process_partial(Some(&[&samples[pos..]]), None)
            .map_err(|e| AnalysisError::UnreadableAudio(format!("resample: {e}")))?;
        out.extend_from_slice(&frames[0]);
    }

    // Drain whatever the filter still holds.
    let frames = resampler
        .process_partial::<&[f32]>(None, None)
        .map_err(|e| AnalysisError::UnreadableAudio(format!("resample: {e}")))?;
    out.extend_from_slice(&frames[0]);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_never_regresses() {
        let mut tracker = ProgressTracker::new();
        assert_eq!(tracker.advance(10.0), 10.0);
        assert_eq!(tracker.advance(40.0), 40.0);
        // Later line with an earlier timestamp must not move us backwards.
        assert_eq!(tracker.advance(25.0), 40.0);
        assert_eq!(tracker.advance(250.0), 100.0);
        assert_eq!(tracker.advance(99.0), 100.0);
    }

    #[test]
    fn elapsed_marker_parsing() {
        let re = Regex::new(r"time=(\d{2}):(\d{2}):(\d{2}\.\d+)").unwrap();
        let line = "size=  1024kB time=00:01:10.50 bitrate= 119.4kbits/s speed=40x";
        assert_eq!(parse_elapsed_seconds(&re, line), Some(70.5));

        assert_eq!(parse_elapsed_seconds(&re, "frame=  100 fps=25"), None);
        assert_eq!(
            parse_elapsed_seconds(&re, "time=01:00:00.00"),
            Some(3600.0)
        );
    }

    /// Delivers one status line, then fails like a torn-down pipe.
    struct BrokenStream {
        line: &'static [u8],
        sent: usize,
    }

    impl std::io::Read for BrokenStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.sent < self.line.len() {
                let n = (self.line.len() - self.sent).min(buf.len());
                buf[..n].copy_from_slice(&self.line[self.sent..self.sent + n]);
                self.sent += n;
                Ok(n)
            } else {
                Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "stderr pipe closed",
                ))
            }
        }
    }

    #[test]
    fn pump_surfaces_stream_failures_after_partial_progress() {
        let stream = BrokenStream {
            line: b"time=00:00:01.00 bitrate=N/A\n",
            sent: 0,
        };
        let cancel = CancellationToken::new();
        let mut seen = Vec::new();

        let err = pump_progress(std::io::BufReader::new(stream), &cancel, 2.0, &mut |p| {
            seen.push(p)
        })
        .unwrap_err();

        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
        assert_eq!(seen, vec![50.0]);
    }

    #[test]
    fn pump_stops_once_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let cancelled = pump_progress(
            std::io::BufReader::new(&b"time=00:00:01.00\n"[..]),
            &cancel,
            2.0,
            &mut |_| panic!("no progress after cancel"),
        )
        .unwrap();

        assert!(cancelled);
    }

    #[test]
    fn pump_handles_carriage_return_rewrites() {
        let data = &b"frame=1\rtime=00:00:01.00 x\rtime=00:00:00.50 x\ntime=00:00:02.00\n"[..];
        let cancel = CancellationToken::new();
        let mut seen = Vec::new();

        let cancelled = pump_progress(std::io::BufReader::new(data), &cancel, 2.0, &mut |p| {
            seen.push(p)
        })
        .unwrap();

        assert!(!cancelled);
        // The regressing 0.5s marker is held at the previous emission.
        assert_eq!(seen, vec![50.0, 50.0, 100.0]);
    }

    #[test]
    fn extension_detection() {
        let negotiator = FormatNegotiator::new(NegotiatorConfig::new(
            std::env::temp_dir(),
            Toolchain::unavailable(),
        ));
        assert!(negotiator.is_canonical(Path::new("a/b/sound.WAV")));
        assert!(!negotiator.is_canonical(Path::new("a/b/sound.mp3")));
        assert!(negotiator.is_supported(Path::new("x.flac")));
        assert!(negotiator.is_supported(Path::new("x.M4A")));
        assert!(!negotiator.is_supported(Path::new("x.txt")));
        assert!(!negotiator.is_supported(Path::new("noext")));
    }
}
