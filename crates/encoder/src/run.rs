//! Running the encoder and cleaning up after it.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use shadercap_common::error::{ShadercapError, ShadercapResult};
use shadercap_session_model::{OutputFormat, FRAME_EXTENSION, FRAME_PREFIX};

use crate::binary::EncoderBinary;
use crate::command::{build_args, EncodeJob};

/// Result of encoding one format.
#[derive(Debug)]
pub struct FormatOutcome {
    pub format: OutputFormat,
    pub output: PathBuf,
    /// `None` on success.
    pub error: Option<ShadercapError>,
}

impl FormatOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of a whole encode job.
#[derive(Debug, Default)]
pub struct EncodeReport {
    pub outcomes: Vec<FormatOutcome>,
    pub frames_deleted: usize,
}

impl EncodeReport {
    pub fn any_succeeded(&self) -> bool {
        self.outcomes.iter().any(FormatOutcome::succeeded)
    }

    /// Files that were produced.
    pub fn outputs(&self) -> Vec<PathBuf> {
        self.outcomes
            .iter()
            .filter(|o| o.succeeded())
            .map(|o| o.output.clone())
            .collect()
    }

    /// One line per failed format.
    pub fn warnings(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter_map(|o| o.error.as_ref().map(ToString::to_string))
            .collect()
    }
}

/// Encoder implementations the orchestrator can drive.
#[async_trait::async_trait]
pub trait EncoderBackend: Send + Sync {
    /// Encode every requested format. Per-format failures are reported in the
    /// returned [`EncodeReport`]; `Err` means the job could not run at all.
    async fn encode(&self, job: EncodeJob) -> ShadercapResult<EncodeReport>;

    fn name(&self) -> &str;
}

/// ffmpeg subprocess backend.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: EncoderBinary,
}

impl FfmpegEncoder {
    pub fn new(binary: EncoderBinary) -> Self {
        Self { binary }
    }

    pub fn binary(&self) -> &EncoderBinary {
        &self.binary
    }
}

#[async_trait::async_trait]
impl EncoderBackend for FfmpegEncoder {
    async fn encode(&self, job: EncodeJob) -> ShadercapResult<EncodeReport> {
        let binary = self.binary.clone();
        tokio::task::spawn_blocking(move || encode_blocking(&binary, &job))
            .await
            .map_err(|e| ShadercapError::Other(anyhow::anyhow!("Encoder task failed: {e}")))
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Encode each requested format in turn, then remove the frames if any
/// format succeeded.
pub fn encode_blocking(binary: &EncoderBinary, job: &EncodeJob) -> EncodeReport {
    let mut report = EncodeReport::default();

    for format in job.formats.requested() {
        let output = job.output_path(format);
        let error = run_format(binary, job, format).err();
        match &error {
            None => tracing::info!(format = format.label(), output = %output.display(), "Encoded"),
            Some(e) => tracing::warn!(format = format.label(), error = %e, "Encoding failed"),
        }
        report.outcomes.push(FormatOutcome {
            format,
            output,
            error,
        });
    }

    if report.any_succeeded() && !job.keep_frames {
        report.frames_deleted = remove_frames(&job.frames_dir);
    }
    report
}

fn run_format(binary: &EncoderBinary, job: &EncodeJob, format: OutputFormat) -> ShadercapResult<()> {
    let args = build_args(job, format);
    tracing::debug!(program = %binary.program.display(), ?args, "Running encoder");

    let started = std::time::Instant::now();
    let output = Command::new(&binary.program)
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| {
            ShadercapError::subprocess(
                format.label(),
                "not started",
                format!("{}: {e}", binary.program.display()),
            )
        })?;

    tracing::debug!(
        format = format.label(),
        status = %output.status,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Encoder exited"
    );

    if output.status.success() {
        return Ok(());
    }
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Err(ShadercapError::subprocess(
        format.label(),
        output.status.to_string(),
        text.trim(),
    ))
}

/// Delete `frame_*.png` from `dir`. Per-file failures are logged and skipped.
///
/// Returns the number of files removed.
pub fn remove_frames(dir: &Path) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Cannot list frames for cleanup");
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !is_frame_file(&path) {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to delete frame"),
        }
    }
    tracing::info!(dir = %dir.display(), removed, "Removed intermediate frames");
    removed
}

fn is_frame_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.starts_with(FRAME_PREFIX)
        && path.extension().and_then(|e| e.to_str()) == Some(FRAME_EXTENSION)
}
