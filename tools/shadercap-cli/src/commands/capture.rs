//! Capture a shader page to video.

use std::path::{Path, PathBuf};

use clap::Args;
use shadercap_common::config::ExportPreferences;

/// Per-run overrides of the persisted export preferences.
#[derive(Debug, Default, Args)]
pub struct Overrides {
    /// Frames per second
    #[arg(long)]
    pub fps: Option<u32>,

    /// Capture length in seconds
    #[arg(long)]
    pub duration: Option<f64>,

    /// Shader time of the first frame in seconds
    #[arg(long)]
    pub start: Option<f64>,

    /// Capture width
    #[arg(long)]
    pub width: Option<u32>,

    /// Capture height
    #[arg(long)]
    pub height: Option<u32>,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// H.264 quality (lower is better)
    #[arg(long)]
    pub crf: Option<u32>,

    /// Also encode a GIF
    #[arg(long)]
    pub gif: bool,

    /// Skip the MP4
    #[arg(long)]
    pub no_mp4: bool,

    /// Keep the PNG frames after encoding
    #[arg(long)]
    pub keep_frames: bool,
}

impl Overrides {
    pub fn apply(&self, prefs: &mut ExportPreferences) {
        if let Some(fps) = self.fps {
            prefs.fps = fps;
        }
        if let Some(duration) = self.duration {
            prefs.duration_secs = duration;
        }
        if let Some(start) = self.start {
            prefs.start_time_secs = start;
        }
        if let Some(width) = self.width {
            prefs.width = width;
        }
        if let Some(height) = self.height {
            prefs.height = height;
        }
        if let Some(output) = &self.output {
            prefs.output_directory = output.clone();
        }
        if let Some(crf) = self.crf {
            prefs.crf = crf;
        }
        if self.gif {
            prefs.gif = true;
        }
        if self.no_mp4 {
            prefs.mp4 = false;
        }
        if self.keep_frames {
            prefs.keep_frames = true;
        }
    }
}

/// Browser launch flags.
#[derive(Debug, Default)]
#[cfg_attr(not(feature = "chromium"), allow(dead_code))]
pub struct BrowserOptions {
    pub headed: bool,
    pub no_sandbox: bool,
    pub executable: Option<PathBuf>,
}

#[cfg(not(feature = "chromium"))]
pub async fn run(
    _config_path: &Path,
    url: String,
    _overrides: Overrides,
    _browser: BrowserOptions,
) -> anyhow::Result<()> {
    Err(anyhow::anyhow!(
        "Cannot capture {url}: this build has no render surface. Rebuild with `--features chromium`."
    ))
}

#[cfg(feature = "chromium")]
pub async fn run(
    config_path: &Path,
    url: String,
    overrides: Overrides,
    browser: BrowserOptions,
) -> anyhow::Result<()> {
    use std::sync::Arc;

    use shadercap_capture_engine::{Command, ExportOrchestrator, OrchestratorConfig};
    use shadercap_encoder::{resolve_encoder, FfmpegEncoder};
    use shadercap_session_model::{ExportState, JsonSettingsStore, Notifier};
    use shadercap_surface_driver::{ChromiumOptions, ChromiumSurface, DriverConfig, SurfaceDriver};
    use tokio::sync::mpsc;

    let store = JsonSettingsStore::open(config_path);
    store.update(|prefs| overrides.apply(prefs));
    let config = store.config();

    let encoder = resolve_encoder(&config.encoder);
    tracing::info!(encoder = %encoder.program.display(), source = ?encoder.source, "Encoder resolved");

    println!("Capturing: {url}");
    println!(
        "  {}x{} @ {} fps, {:.2}s from t={:.2}s",
        config.export.width,
        config.export.height,
        config.export.fps,
        config.export.duration_secs,
        config.export.start_time_secs
    );
    println!("  Output: {}", config.export.output_directory.display());
    println!();

    let (surface, inbox) = ChromiumSurface::launch(ChromiumOptions {
        headed: browser.headed,
        no_sandbox: browser.no_sandbox,
        executable: browser.executable,
        window_width: config.export.width.max(640),
        window_height: config.export.height.max(480),
    })
    .await?;

    let (notifier, mut events) = Notifier::channel();
    let driver = SurfaceDriver::new(
        surface,
        inbox,
        notifier.clone(),
        DriverConfig::from(&config.capture),
    );
    let mut orchestrator = ExportOrchestrator::new(
        driver,
        Arc::new(store),
        Arc::new(FfmpegEncoder::new(encoder)),
        notifier,
        OrchestratorConfig::from(&config.capture),
    );

    let (commands, rx) = mpsc::unbounded_channel();

    let printer = {
        let commands = commands.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if print_event(&event) {
                    let _ = commands.send(Command::Shutdown);
                }
            }
        })
    };

    let interrupt = {
        let commands = commands.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!();
                let _ = commands.send(Command::Cancel);
                let _ = commands.send(Command::Shutdown);
            }
        })
    };

    let result = async {
        orchestrator.load_target(&url).await?;
        orchestrator.start_export().await?;
        orchestrator.run(rx).await
    }
    .await;

    interrupt.abort();
    drop(commands);
    if let Err(e) = orchestrator.driver().surface().close().await {
        tracing::warn!(error = %e, "Failed to close browser");
    }
    let state = orchestrator.state();
    drop(orchestrator);
    let _ = printer.await;

    result?;
    match state {
        ExportState::Done => Ok(()),
        other => Err(anyhow::anyhow!("Export ended in state {other:?}")),
    }
}

/// Print one notification. Returns `true` once the export has ended.
#[cfg(feature = "chromium")]
fn print_event(event: &shadercap_session_model::Notification) -> bool {
    use shadercap_session_model::Notification;
    use std::io::Write;

    match event {
        Notification::ExportProgress { current, total } => {
            print!("\r  Progress: {current}/{total} frames  ");
            let _ = std::io::stdout().flush();
            false
        }
        Notification::StatusChanged { message } => {
            tracing::info!("{message}");
            false
        }
        Notification::TargetLoaded { shader_id, .. } => {
            println!("Loaded shader {shader_id}");
            false
        }
        Notification::LoadFailed { url, reason } => {
            println!("Failed to load {url}: {reason}");
            false
        }
        Notification::ExportComplete { outputs, warnings } => {
            println!();
            for warning in warnings {
                println!("  Warning: {warning}");
            }
            for output in outputs {
                println!("Export complete: {}", output.display());
            }
            true
        }
        Notification::ExportCancelled => {
            println!("\nExport cancelled");
            true
        }
        Notification::ExportFailed { message } => {
            println!("\nExport failed: {message}");
            true
        }
        _ => false,
    }
}
