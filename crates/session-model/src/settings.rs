//! Export settings and the settings store seam.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shadercap_common::clock::frame_count;
use shadercap_common::config::{AppConfig, DebouncedSaver, ExportPreferences};
use shadercap_common::error::{ShadercapError, ShadercapResult};

/// A video format the encoder can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Mp4,
    Gif,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Gif => "gif",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Mp4 => "MP4",
            Self::Gif => "GIF",
        }
    }
}

/// Which formats to encode once capture finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFormats {
    pub mp4: bool,
    pub gif: bool,
}

impl OutputFormats {
    pub fn any(&self) -> bool {
        self.mp4 || self.gif
    }

    /// Requested formats in encode order (MP4 first).
    pub fn requested(&self) -> Vec<OutputFormat> {
        let mut formats = Vec::with_capacity(2);
        if self.mp4 {
            formats.push(OutputFormat::Mp4);
        }
        if self.gif {
            formats.push(OutputFormat::Gif);
        }
        formats
    }
}

/// Immutable snapshot of export parameters, taken at export start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub start_time_secs: f64,
    pub duration_secs: f64,
    pub output_directory: PathBuf,
    pub crf: u32,
    pub formats: OutputFormats,
    pub gif_max_width: u32,
    pub keep_frames: bool,
}

impl ExportSettings {
    /// Check every constraint an export relies on.
    pub fn validate(&self) -> ShadercapResult<()> {
        if self.output_directory.as_os_str().is_empty() {
            return Err(ShadercapError::invalid_input("Output directory is not set"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ShadercapError::invalid_input(format!(
                "Resolution must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(ShadercapError::invalid_input("FPS must be positive"));
        }
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return Err(ShadercapError::invalid_input(format!(
                "Duration must be positive, got {}",
                self.duration_secs
            )));
        }
        if !self.start_time_secs.is_finite() || self.start_time_secs < 0.0 {
            return Err(ShadercapError::invalid_input(format!(
                "Start time must be non-negative, got {}",
                self.start_time_secs
            )));
        }
        if self.target_frame_count() == 0 {
            return Err(ShadercapError::invalid_input(
                "Duration is shorter than a single frame",
            ));
        }
        Ok(())
    }

    /// `round(duration * fps)`.
    pub fn target_frame_count(&self) -> u64 {
        frame_count(self.duration_secs, self.fps)
    }

    /// Directory frames for `shader_id` are written to.
    pub fn target_directory(&self, shader_id: &str) -> PathBuf {
        if shader_id.is_empty() {
            self.output_directory.clone()
        } else {
            self.output_directory.join(shader_id)
        }
    }
}

impl From<&ExportPreferences> for ExportSettings {
    fn from(prefs: &ExportPreferences) -> Self {
        Self {
            width: prefs.width,
            height: prefs.height,
            fps: prefs.fps,
            start_time_secs: prefs.start_time_secs,
            duration_secs: prefs.duration_secs,
            output_directory: prefs.output_directory.clone(),
            crf: prefs.crf,
            formats: OutputFormats {
                mp4: prefs.mp4,
                gif: prefs.gif,
            },
            gif_max_width: prefs.gif_max_width,
            keep_frames: prefs.keep_frames,
        }
    }
}

/// Source of export settings, read once at export start.
pub trait SettingsStore: Send + Sync {
    /// Snapshot the current export settings.
    fn export_settings(&self) -> ExportSettings;
}

impl SettingsStore for ExportSettings {
    fn export_settings(&self) -> ExportSettings {
        self.clone()
    }
}

/// Settings store backed by the JSON config file.
///
/// Updates are applied in memory immediately. With autosave enabled they are
/// persisted at most once per debounce window; otherwise call [`Self::save`].
pub struct JsonSettingsStore {
    path: PathBuf,
    config: Arc<Mutex<AppConfig>>,
    saver: Option<DebouncedSaver>,
}

impl JsonSettingsStore {
    /// Load settings from `path`, falling back to defaults.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let config = AppConfig::load_from(&path);
        Self {
            path,
            config: Arc::new(Mutex::new(config)),
            saver: None,
        }
    }

    /// Persist changes automatically after `window` of inactivity.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_autosave(mut self, window: Duration) -> Self {
        let config = self.config.clone();
        let path = self.path.clone();
        self.saver = Some(DebouncedSaver::spawn(window, move || {
            let snapshot = lock(&config).clone();
            if let Err(e) = snapshot.save_to(&path) {
                tracing::warn!(error = %e, path = %path.display(), "Failed to save settings");
            } else {
                tracing::debug!(path = %path.display(), "Settings saved");
            }
        }));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current configuration.
    pub fn config(&self) -> AppConfig {
        lock(&self.config).clone()
    }

    /// Mutate the export preferences.
    pub fn update(&self, apply: impl FnOnce(&mut ExportPreferences)) {
        {
            let mut config = lock(&self.config);
            apply(&mut config.export);
        }
        if let Some(saver) = &self.saver {
            saver.touch();
        }
    }

    /// Write the configuration now.
    pub fn save(&self) -> ShadercapResult<()> {
        let snapshot = self.config();
        snapshot.save_to(&self.path)?;
        Ok(())
    }

    /// Flush pending autosaves, or save directly when autosave is off.
    pub async fn close(self) -> ShadercapResult<()> {
        match self.saver {
            Some(saver) => {
                saver.flush().await;
                Ok(())
            }
            None => {
                let snapshot = lock(&self.config).clone();
                snapshot.save_to(&self.path)?;
                Ok(())
            }
        }
    }
}

impl SettingsStore for JsonSettingsStore {
    fn export_settings(&self) -> ExportSettings {
        ExportSettings::from(&lock(&self.config).export)
    }
}

fn lock(config: &Mutex<AppConfig>) -> std::sync::MutexGuard<'_, AppConfig> {
    config.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
