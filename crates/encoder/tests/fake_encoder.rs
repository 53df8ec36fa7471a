#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use shadercap_common::error::ShadercapError;
use shadercap_encoder::{
    encode_blocking, BinarySource, EncodeJob, EncoderBackend, EncoderBinary, FfmpegEncoder,
};
use shadercap_session_model::{frame_file_name, OutputFormat, OutputFormats};

/// Writes a stand-in encoder that records its arguments, creates the output
/// file, and exits 3 for outputs ending in `fail_ext`.
fn fake_encoder(dir: &Path, fail_ext: &str) -> EncoderBinary {
    let script = format!(
        r#"#!/bin/sh
for arg in "$@"; do out="$arg"; done
echo "$@" >> "$(dirname "$out")/invocations.log"
case "$out" in
  *.{fail_ext}) echo "simulated failure for $out" >&2; exit 3 ;;
esac
echo "wrote $out"
printf 'encoded' > "$out"
"#
    );
    let path = dir.join("fake-ffmpeg");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    EncoderBinary {
        program: path,
        source: BinarySource::Configured,
    }
}

fn frames_dir(root: &Path, count: u64) -> PathBuf {
    let dir = root.join("abc123");
    std::fs::create_dir_all(&dir).unwrap();
    for i in 0..count {
        std::fs::write(dir.join(frame_file_name(i)), b"png").unwrap();
    }
    dir
}

fn job(dir: &Path, mp4: bool, gif: bool) -> EncodeJob {
    EncodeJob {
        frames_dir: dir.to_path_buf(),
        output_stem: "abc123".to_string(),
        fps: 10,
        crf: 18,
        gif_max_width: 640,
        formats: OutputFormats { mp4, gif },
        keep_frames: false,
    }
}

fn frames_left(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().starts_with("frame_"))
        .count()
}

#[test]
fn mp4_success_removes_frames() {
    let root = tempfile::tempdir().unwrap();
    let binary = fake_encoder(root.path(), "never");
    let dir = frames_dir(root.path(), 10);

    let report = encode_blocking(&binary, &job(&dir, true, false));

    assert!(report.any_succeeded());
    assert_eq!(report.frames_deleted, 10);
    assert_eq!(frames_left(&dir), 0);
    assert_eq!(report.outputs(), vec![dir.join("abc123.mp4")]);
    assert!(dir.join("abc123.mp4").exists());

    let log = std::fs::read_to_string(dir.join("invocations.log")).unwrap();
    assert_eq!(log.lines().count(), 1);
    assert!(log.contains("-framerate 10"));
    assert!(log.contains("-crf 18"));
}

#[test]
fn failing_format_does_not_stop_the_other() {
    let root = tempfile::tempdir().unwrap();
    let binary = fake_encoder(root.path(), "mp4");
    let dir = frames_dir(root.path(), 3);

    let report = encode_blocking(&binary, &job(&dir, true, true));

    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.outcomes[0].format, OutputFormat::Mp4);
    match &report.outcomes[0].error {
        Some(ShadercapError::Subprocess { format, output, .. }) => {
            assert_eq!(format, "MP4");
            assert!(output.contains("simulated failure"));
        }
        other => panic!("expected subprocess error, got {other:?}"),
    }
    assert!(report.outcomes[1].succeeded());
    assert_eq!(report.frames_deleted, 3);
    assert_eq!(report.warnings().len(), 1);
}

#[test]
fn all_formats_failing_keeps_frames() {
    let root = tempfile::tempdir().unwrap();
    let binary = fake_encoder(root.path(), "*");
    let dir = frames_dir(root.path(), 4);

    let report = encode_blocking(&binary, &job(&dir, true, true));

    assert!(!report.any_succeeded());
    assert_eq!(report.frames_deleted, 0);
    assert_eq!(frames_left(&dir), 4);
    assert_eq!(report.warnings().len(), 2);
}

#[test]
fn keep_frames_skips_cleanup() {
    let root = tempfile::tempdir().unwrap();
    let binary = fake_encoder(root.path(), "never");
    let dir = frames_dir(root.path(), 2);
    let mut job = job(&dir, false, true);
    job.keep_frames = true;

    let report = encode_blocking(&binary, &job);

    assert!(report.any_succeeded());
    assert_eq!(report.frames_deleted, 0);
    assert_eq!(frames_left(&dir), 2);
}

#[tokio::test]
async fn backend_runs_off_the_async_context() {
    let root = tempfile::tempdir().unwrap();
    let encoder = FfmpegEncoder::new(fake_encoder(root.path(), "never"));
    let dir = frames_dir(root.path(), 1);

    let report = encoder.encode(job(&dir, true, true)).await.unwrap();

    assert_eq!(encoder.name(), "ffmpeg");
    assert_eq!(report.outputs().len(), 2);
}
