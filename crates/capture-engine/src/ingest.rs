//! Frame ingest pipeline.
//!
//! Decodes `frame_data` payloads and persists them as PNG files on a bounded
//! pool of blocking workers. Workers never touch the [`ExportSession`]; they
//! report a [`WriteCompletion`] on a channel and the control loop applies it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{ImageFormat, RgbaImage};
use shadercap_common::error::{ShadercapError, ShadercapResult};
use shadercap_session_model::ExportSession;
use tokio::sync::{mpsc, Semaphore};

/// One decoded frame, moved into the write worker and dropped after the write.
#[derive(Debug)]
pub struct CapturedFrame {
    pub index: u64,
    pub image: RgbaImage,
}

impl CapturedFrame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Outcome of one background write, stamped with the session generation.
#[derive(Debug)]
pub struct WriteCompletion {
    pub generation: u64,
    pub index: u64,
    pub result: ShadercapResult<()>,
}

/// Decode a base64 frame payload.
///
/// With non-zero `width`/`height` the payload must be raw RGBA of exactly
/// `width * height * 4` bytes. Otherwise it is an encoded image in any format
/// the `image` crate recognises.
pub fn decode_frame(index: u64, payload: &str, width: u32, height: u32) -> ShadercapResult<CapturedFrame> {
    if payload.is_empty() {
        return Err(ShadercapError::invalid_input(format!(
            "Frame {index} has an empty payload"
        )));
    }
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| ShadercapError::decode(format!("Frame {index}: invalid base64: {e}")))?;

    let image = if width > 0 && height > 0 {
        let expected = width as usize * height as usize * 4;
        if bytes.len() != expected {
            return Err(ShadercapError::decode(format!(
                "Frame {index}: expected {expected} bytes for {width}x{height} RGBA, got {}",
                bytes.len()
            )));
        }
        RgbaImage::from_raw(width, height, bytes).ok_or_else(|| {
            ShadercapError::decode(format!("Frame {index}: invalid raw frame dimensions"))
        })?
    } else {
        image::load_from_memory(&bytes)
            .map_err(|e| ShadercapError::decode(format!("Frame {index}: {e}")))?
            .to_rgba8()
    };

    Ok(CapturedFrame { index, image })
}

/// Write `frame` to `path` as PNG. Blocking.
pub fn save_frame(path: &Path, frame: &CapturedFrame) -> ShadercapResult<()> {
    frame
        .image
        .save_with_format(path, ImageFormat::Png)
        .map_err(|e| match e {
            image::ImageError::IoError(io) => ShadercapError::Io(io),
            other => ShadercapError::Other(anyhow::Error::new(other)),
        })
}

/// Schedules frame writes and hands completions back to the control loop.
pub struct FrameIngest {
    permits: Arc<Semaphore>,
    completions: mpsc::UnboundedSender<WriteCompletion>,
}

impl FrameIngest {
    /// Create a pipeline with `workers` concurrent writes and its completion receiver.
    pub fn new(workers: usize) -> (Self, mpsc::UnboundedReceiver<WriteCompletion>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ingest = Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
            completions: tx,
        };
        (ingest, rx)
    }

    /// Decode one frame and schedule its write.
    ///
    /// Validation and decoding happen on the caller; on success the session's
    /// pending count has been incremented and the write is in flight. Returns
    /// the accepted frame index.
    pub fn ingest(
        &self,
        session: &mut ExportSession,
        frame_index: i64,
        payload: &str,
        width: u32,
        height: u32,
    ) -> ShadercapResult<u64> {
        let index = session.check_frame_index(frame_index)?;
        let frame = decode_frame(index, payload, width, height)?;

        let dir = session.target_directory();
        if !dir.is_dir() {
            std::fs::create_dir_all(dir).map_err(|source| ShadercapError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        session.record_write_started();
        self.schedule_write(session.generation(), session.frame_path(index), frame);
        Ok(index)
    }

    fn schedule_write(&self, generation: u64, path: PathBuf, frame: CapturedFrame) {
        let permits = self.permits.clone();
        let completions = self.completions.clone();
        let index = frame.index;

        tokio::spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(permit) => tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    save_frame(&path, &frame)
                })
                .await
                .unwrap_or_else(|e| {
                    Err(ShadercapError::Other(anyhow::anyhow!(
                        "Frame write task failed: {e}"
                    )))
                }),
                Err(e) => Err(ShadercapError::Other(anyhow::Error::new(e))),
            };
            if let Err(e) = &result {
                tracing::warn!(generation, index, error = %e, "Frame write failed");
            } else {
                tracing::trace!(generation, index, "Frame written");
            }
            let _ = completions.send(WriteCompletion {
                generation,
                index,
                result,
            });
        });
    }
}
