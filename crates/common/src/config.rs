//! Application configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Export preferences, snapshotted at export start.
    pub export: ExportPreferences,

    /// Encoder executable resolution.
    pub encoder: EncoderConfig,

    /// Capture loop tuning.
    pub capture: CaptureTuning,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Persisted export preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportPreferences {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub start_time_secs: f64,
    pub duration_secs: f64,

    /// Base directory for captured frames and encoded outputs.
    pub output_directory: PathBuf,

    /// Constant rate factor for H.264 output (lower = better quality).
    pub crf: u32,

    /// Encode an MP4 after capture.
    pub mp4: bool,

    /// Encode a GIF after capture.
    pub gif: bool,

    /// Maximum GIF width in pixels.
    pub gif_max_width: u32,

    /// Keep intermediate PNG frames after a successful encode.
    pub keep_frames: bool,
}

/// Where to find the encoder executable.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EncoderConfig {
    /// Explicit encoder binary; skips bundled/PATH resolution when set.
    pub binary: Option<PathBuf>,

    /// Directory holding bundled encoder builds (`<dir>/<os>/ffmpeg[.exe]`).
    /// Defaults to `bin/` next to the running executable.
    pub bundled_dir: Option<PathBuf>,
}

/// Capture loop tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureTuning {
    /// Maximum concurrent frame writes.
    pub write_workers: usize,

    /// Readiness checks before a load is reported as failed.
    pub readiness_attempts: u32,

    /// Delay between readiness checks (milliseconds).
    pub readiness_interval_ms: u64,

    /// How often the navigation monitor is re-checked (milliseconds).
    pub watchdog_interval_ms: u64,

    /// How often "waiting for N frames" is reported while draining (milliseconds).
    pub drain_status_interval_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "shadercap=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for ExportPreferences {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 60,
            start_time_secs: 0.0,
            duration_secs: 10.0,
            output_directory: dirs_default_output(),
            crf: 18,
            mp4: true,
            gif: false,
            gif_max_width: 640,
            keep_frames: false,
        }
    }
}

impl Default for CaptureTuning {
    fn default() -> Self {
        Self {
            write_workers: 4,
            readiness_attempts: 20,
            readiness_interval_ms: 500,
            watchdog_interval_ms: 2000,
            drain_status_interval_ms: 500,
        }
    }
}

impl CaptureTuning {
    pub fn readiness_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_interval_ms)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms.max(1))
    }

    pub fn drain_status_interval(&self) -> Duration {
        Duration::from_millis(self.drain_status_interval_ms.max(1))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&config_file_path())
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, config_path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("shadercap").join("config.json")
}

/// Default capture output directory.
fn dirs_default_output() -> PathBuf {
    let base = std::env::var("XDG_VIDEOS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join("Videos")
        });
    base.join("shadercap")
}

/// Coalesces bursts of preference changes into a single save.
///
/// Every [`DebouncedSaver::touch`] restarts a single-shot timer; the save
/// callback runs once the timer expires without another touch. Dropping the
/// saver flushes a pending save.
pub struct DebouncedSaver {
    tx: mpsc::UnboundedSender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl DebouncedSaver {
    /// Spawn the debounce task. Must be called from within a tokio runtime.
    pub fn spawn<F>(window: Duration, save: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let save = Arc::new(save);
        let task = tokio::spawn(async move {
            let mut dirty = false;
            loop {
                if dirty {
                    tokio::select! {
                        msg = rx.recv() => {
                            if msg.is_none() {
                                save();
                                break;
                            }
                        }
                        _ = tokio::time::sleep(window) => {
                            save();
                            dirty = false;
                        }
                    }
                } else {
                    match rx.recv().await {
                        Some(()) => dirty = true,
                        None => break,
                    }
                }
            }
        });
        Self { tx, task }
    }

    /// Record a change and restart the debounce window.
    pub fn touch(&self) {
        let _ = self.tx.send(());
    }

    /// Stop accepting changes and wait for any pending save to finish.
    pub async fn flush(self) {
        drop(self.tx);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Settings autosave task failed");
        }
    }
}
