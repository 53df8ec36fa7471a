//! Encode jobs and ffmpeg argument lists.

use std::path::{Path, PathBuf};

use shadercap_session_model::{frame_pattern, ExportSettings, OutputFormat, OutputFormats};

/// Output file stem when the target has no id.
pub const DEFAULT_OUTPUT_STEM: &str = "capture";

/// Everything needed to turn a frame directory into videos.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeJob {
    /// Directory holding `frame_%04d.png`; outputs are written next to them.
    pub frames_dir: PathBuf,

    /// Output file name without extension.
    pub output_stem: String,

    pub fps: u32,

    /// x264 constant rate factor.
    pub crf: u32,

    /// GIFs wider than this are scaled down.
    pub gif_max_width: u32,

    pub formats: OutputFormats,

    /// Leave frames on disk after a successful encode.
    pub keep_frames: bool,
}

impl EncodeJob {
    pub fn from_settings(settings: &ExportSettings, frames_dir: &Path, shader_id: &str) -> Self {
        let output_stem = if shader_id.is_empty() {
            DEFAULT_OUTPUT_STEM.to_string()
        } else {
            shader_id.to_string()
        };
        Self {
            frames_dir: frames_dir.to_path_buf(),
            output_stem,
            fps: settings.fps,
            crf: settings.crf,
            gif_max_width: settings.gif_max_width,
            formats: settings.formats,
            keep_frames: settings.keep_frames,
        }
    }

    pub fn input_pattern(&self) -> PathBuf {
        frame_pattern(&self.frames_dir)
    }

    pub fn output_path(&self, format: OutputFormat) -> PathBuf {
        self.frames_dir
            .join(format!("{}.{}", self.output_stem, format.extension()))
    }
}

/// Full argument list for one format.
pub fn build_args(job: &EncodeJob, format: OutputFormat) -> Vec<String> {
    let mut args = input_args(job);
    match format {
        OutputFormat::Mp4 => args.extend(mp4_codec_args(job.crf)),
        OutputFormat::Gif => args.extend(gif_filter_args(job.fps, job.gif_max_width)),
    }
    args.push(job.output_path(format).to_string_lossy().into_owned());
    args
}

fn input_args(job: &EncodeJob) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-framerate".to_string(),
        job.fps.to_string(),
        "-i".to_string(),
        job.input_pattern().to_string_lossy().into_owned(),
    ]
}

fn mp4_codec_args(crf: u32) -> Vec<String> {
    vec![
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "medium".to_string(),
        "-profile:v".to_string(),
        "high".to_string(),
        "-crf".to_string(),
        crf.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
    ]
}

fn gif_filter_args(fps: u32, max_width: u32) -> Vec<String> {
    vec![
        "-vf".to_string(),
        format!(
            "fps={fps},scale='min({max_width},iw)':-1:flags=lanczos,split[s0][s1];[s0]palettegen[p];[s1][p]paletteuse"
        ),
    ]
}
