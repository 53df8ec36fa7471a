//! Export orchestrator.
//!
//! Owns the export lifecycle `Idle → Capturing → Finishing → Encoding →
//! Done | Cancelled | Error` and is the only place the [`ExportSession`] is
//! mutated. Everything runs on one task: UI commands, surface messages, write
//! completions and the navigation watchdog are multiplexed by [`ExportOrchestrator::run`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shadercap_common::config::CaptureTuning;
use shadercap_common::error::{ShadercapError, ShadercapResult};
use shadercap_encoder::{remove_frames, EncodeJob, EncoderBackend};
use shadercap_session_model::{
    ExportSession, ExportState, InboundMessage, Notification, Notifier, SettingsStore, WriteOutcome,
};
use shadercap_surface_driver::{CaptureParams, NavigationOutcome, RenderSurface, SurfaceDriver};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::ingest::{FrameIngest, WriteCompletion};

/// Commands accepted by the control loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "url", rename_all = "snake_case")]
pub enum Command {
    Start,
    Cancel,
    /// Navigate to a new target.
    Load(String),
    /// Re-run readiness polling and injection for the current target.
    Reload,
    Shutdown,
}

/// Orchestrator tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub write_workers: usize,
    pub watchdog_interval: Duration,
    pub drain_status_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&CaptureTuning::default())
    }
}

impl From<&CaptureTuning> for OrchestratorConfig {
    fn from(tuning: &CaptureTuning) -> Self {
        Self {
            write_workers: tuning.write_workers.max(1),
            watchdog_interval: tuning.watchdog_interval(),
            drain_status_interval: tuning.drain_status_interval(),
        }
    }
}

/// Drives one render surface through exports.
pub struct ExportOrchestrator<S> {
    driver: SurfaceDriver<S>,
    settings: Arc<dyn SettingsStore>,
    encoder: Arc<dyn EncoderBackend>,
    notifier: Notifier,
    ingest: FrameIngest,
    completions: mpsc::UnboundedReceiver<WriteCompletion>,
    config: OrchestratorConfig,
    session: Option<ExportSession>,
    /// State reported while no session is live.
    resting_state: ExportState,
    generation: u64,
    shutdown_requested: bool,
}

impl<S: RenderSurface> ExportOrchestrator<S> {
    pub fn new(
        driver: SurfaceDriver<S>,
        settings: Arc<dyn SettingsStore>,
        encoder: Arc<dyn EncoderBackend>,
        notifier: Notifier,
        config: OrchestratorConfig,
    ) -> Self {
        let (ingest, completions) = FrameIngest::new(config.write_workers);
        Self {
            driver,
            settings,
            encoder,
            notifier,
            ingest,
            completions,
            config,
            session: None,
            resting_state: ExportState::Idle,
            generation: 0,
            shutdown_requested: false,
        }
    }

    pub fn state(&self) -> ExportState {
        self.session
            .as_ref()
            .map_or(self.resting_state, ExportSession::state)
    }

    /// The live session, if an export is running.
    pub fn session(&self) -> Option<&ExportSession> {
        self.session.as_ref()
    }

    pub fn driver(&self) -> &SurfaceDriver<S> {
        &self.driver
    }

    /// Load a target into the surface, cancelling any export in progress.
    pub async fn load_target(&mut self, url: &str) -> ShadercapResult<()> {
        if self.state() == ExportState::Encoding {
            return Err(ShadercapError::invalid_state(
                "Cannot change target while encoding",
            ));
        }
        if self.state().is_cancellable() {
            self.cancel_export().await?;
        }
        self.driver.load_target(url).await
    }

    /// Begin an export with a fresh settings snapshot.
    ///
    /// Nothing changes on failure; the reason is also published as a status.
    pub async fn start_export(&mut self) -> ShadercapResult<()> {
        let result = self.try_start_export().await;
        if let Err(e) = &result {
            self.notifier.status(format!("Cannot start export: {e}"));
        }
        result
    }

    async fn try_start_export(&mut self) -> ShadercapResult<()> {
        let state = self.state();
        if !state.can_start() {
            return Err(ShadercapError::invalid_state(format!(
                "Export already running ({state:?})"
            )));
        }

        let settings = self.settings.export_settings();
        settings.validate()?;
        if !self.driver.is_loaded() {
            return Err(ShadercapError::invalid_state("No shader is loaded"));
        }

        let shader_id = self.driver.session().shader_id.clone();
        let mut session = ExportSession::new(self.generation + 1, settings, shader_id)?;

        let dir = session.target_directory().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| ShadercapError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        // frames left by an earlier run would be read as part of this sequence
        let stale = tokio::task::spawn_blocking(move || remove_frames(&dir))
            .await
            .unwrap_or_default();
        if stale > 0 {
            tracing::info!(stale, "Removed frames from a previous export");
        }

        self.generation += 1;
        session.transition(ExportState::Capturing)?;
        let total = session.target_frame_count();
        let settings = session.settings().clone();
        tracing::info!(
            generation = session.generation(),
            total,
            dir = %session.target_directory().display(),
            "Export started"
        );
        self.session = Some(session);

        self.notifier.emit(Notification::ExportStarted { total });
        self.notifier
            .emit(Notification::ExportProgress { current: 0, total });
        self.notifier.status(format!("Capturing {total} frames"));

        let params = CaptureParams {
            fps: settings.fps,
            start_time_secs: settings.start_time_secs,
            total_frames: total,
            width: settings.width,
            height: settings.height,
        };
        if let Err(e) = self.driver.start_capture(params).await {
            self.fail_export(&e).await;
            return Err(e);
        }
        Ok(())
    }

    /// Accept one frame from the surface. Ignored unless capturing.
    ///
    /// A frame that cannot be accepted cancels the export.
    pub async fn handle_frame_data(
        &mut self,
        frame_number: i64,
        width: u32,
        height: u32,
        data: &str,
    ) -> ShadercapResult<()> {
        let Some(session) = self.session.as_mut() else {
            tracing::debug!(frame_number, "Frame received with no export running; ignored");
            return Ok(());
        };
        if session.state() != ExportState::Capturing {
            tracing::debug!(frame_number, state = ?session.state(), "Frame received outside capture; ignored");
            return Ok(());
        }

        match self.ingest.ingest(session, frame_number, data, width, height) {
            Ok(index) => {
                tracing::trace!(index, pending = session.pending_write_count(), "Frame queued");
                Ok(())
            }
            Err(e) => {
                self.abort_export(&format!("Frame {frame_number} rejected: {e}"))
                    .await;
                Err(e)
            }
        }
    }

    /// Apply a write completion reported by the ingest pipeline.
    pub async fn handle_write_completion(&mut self, completion: WriteCompletion) {
        let WriteCompletion {
            generation,
            index,
            result,
        } = completion;

        let Some(session) = self.session.as_mut().filter(|s| s.generation() == generation) else {
            tracing::debug!(generation, index, "Ignoring completion from a discarded export");
            return;
        };

        match session.record_write_finished(index, result.is_ok()) {
            WriteOutcome::Progressed { current, total } => {
                self.notifier
                    .emit(Notification::ExportProgress { current, total });
            }
            WriteOutcome::OutOfOrder { index, current } => {
                tracing::warn!(index, current, "Out-of-order frame write; progress unchanged");
            }
            WriteOutcome::Failed => {
                let reason = match result {
                    Err(e) => format!("Failed to write frame {index}: {e}"),
                    Ok(()) => format!("Failed to write frame {index}"),
                };
                self.abort_export(&reason).await;
            }
        }
    }

    /// Await and apply the next write completion. Returns `false` if none can arrive.
    pub async fn process_next_completion(&mut self) -> bool {
        match self.completions.recv().await {
            Some(completion) => {
                self.handle_write_completion(completion).await;
                true
            }
            None => false,
        }
    }

    /// The surface finished producing frames: drain, restore, encode.
    pub async fn finish_export(&mut self) -> ShadercapResult<()> {
        self.finish_with(None).await
    }

    async fn finish_with(
        &mut self,
        mut commands: Option<&mut mpsc::UnboundedReceiver<Command>>,
    ) -> ShadercapResult<()> {
        let Some(session) = self.session.as_mut() else {
            tracing::debug!("Capture completion with no export running; ignored");
            return Ok(());
        };
        if session.state() != ExportState::Capturing {
            tracing::debug!(state = ?session.state(), "Capture completion outside capture; ignored");
            return Ok(());
        }
        session.transition(ExportState::Finishing)?;
        let generation = session.generation();
        self.notifier.status("Finishing capture");

        if !self.drain(generation, &mut commands).await {
            return Ok(());
        }

        if let Err(e) = self.driver.restore_state().await {
            tracing::warn!(error = %e, "Failed to restore render surface");
        }

        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let settings = session.settings().clone();
        if !settings.formats.any() {
            self.complete_export(Vec::new(), Vec::new())?;
            return Ok(());
        }

        session.transition(ExportState::Encoding)?;
        let job = EncodeJob::from_settings(&settings, session.target_directory(), session.shader_id());
        self.notifier.status(format!(
            "Encoding {} with {}",
            labels(&settings.formats.requested()),
            self.encoder.name()
        ));

        match self.encoder.encode(job).await {
            Ok(report) => {
                for warning in report.warnings() {
                    self.notifier.status(warning);
                }
                if report.frames_deleted > 0 {
                    tracing::debug!(deleted = report.frames_deleted, "Intermediate frames removed");
                }
                self.complete_export(report.outputs(), report.warnings())
            }
            Err(e) => {
                self.fail_export(&e).await;
                Err(e)
            }
        }
    }

    /// Wait until the session has no writes in flight, servicing completions
    /// and (from the control loop) commands meanwhile.
    ///
    /// Returns `false` if the session was discarded while waiting.
    async fn drain(
        &mut self,
        generation: u64,
        commands: &mut Option<&mut mpsc::UnboundedReceiver<Command>>,
    ) -> bool {
        let mut status = tokio::time::interval(self.config.drain_status_interval);
        status.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let pending = match self.session.as_ref() {
                Some(s) if s.generation() != generation => return false,
                Some(s) if s.is_drained() => {
                    tracing::debug!(generation, "Frame writes drained");
                    return true;
                }
                Some(s) => s.pending_write_count(),
                None => return false,
            };

            tokio::select! {
                Some(completion) = self.completions.recv() => {
                    self.handle_write_completion(completion).await;
                }
                command = next_command(commands) => {
                    self.handle_command_while_busy(command).await;
                }
                _ = status.tick() => {
                    self.notifier.status(format!("Waiting for {pending} frames to finish writing"));
                }
            }
        }
    }

    async fn handle_command_while_busy(&mut self, command: Option<Command>) {
        match command {
            Some(Command::Cancel) => {
                if let Err(e) = self.cancel_export().await {
                    self.notifier.status(e.to_string());
                }
            }
            Some(Command::Shutdown) | None => {
                self.shutdown_requested = true;
                if let Err(e) = self.cancel_export().await {
                    tracing::debug!(error = %e, "Nothing to cancel on shutdown");
                }
            }
            Some(other) => {
                tracing::debug!(command = ?other, "Command rejected while finishing");
                self.notifier
                    .status("Export is finishing; cancel it first");
            }
        }
    }

    /// Abandon the capture. Valid while capturing or finishing.
    pub async fn cancel_export(&mut self) -> ShadercapResult<()> {
        let state = self.state();
        if !state.is_cancellable() {
            return Err(ShadercapError::invalid_state(format!(
                "Nothing to cancel ({state:?})"
            )));
        }

        if let Err(e) = self.driver.restore_state().await {
            tracing::warn!(error = %e, "Failed to restore render surface");
        }
        if let Some(mut session) = self.session.take() {
            session.transition(ExportState::Cancelled)?;
            tracing::info!(
                generation = session.generation(),
                started_at = session.started_at(),
                written = session.current_frame_index(),
                pending = session.pending_write_count(),
                "Export cancelled"
            );
        }
        self.resting_state = ExportState::Cancelled;
        self.notifier.emit(Notification::ExportCancelled);
        self.notifier.status("Export cancelled");
        Ok(())
    }

    /// Report `reason` and cancel. Used for write, decode and page errors.
    async fn abort_export(&mut self, reason: &str) {
        tracing::warn!(reason, "Aborting export");
        self.notifier.status(reason);
        if let Err(e) = self.cancel_export().await {
            tracing::debug!(error = %e, "Abort found no export to cancel");
        }
    }

    async fn fail_export(&mut self, error: &ShadercapError) {
        tracing::error!(error = %error, "Export failed");
        if let Err(e) = self.driver.restore_state().await {
            tracing::warn!(error = %e, "Failed to restore render surface");
        }
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.transition(ExportState::Error) {
                tracing::debug!(error = %e, "Unexpected state on failure");
            }
        }
        self.resting_state = ExportState::Error;
        self.notifier.emit(Notification::ExportFailed {
            message: error.to_string(),
        });
        self.notifier.status(format!("Export failed: {error}"));
    }

    fn complete_export(
        &mut self,
        outputs: Vec<std::path::PathBuf>,
        warnings: Vec<String>,
    ) -> ShadercapResult<()> {
        if let Some(mut session) = self.session.take() {
            session.transition(ExportState::Done)?;
            tracing::info!(
                generation = session.generation(),
                started_at = session.started_at(),
                frames = session.current_frame_index(),
                outputs = outputs.len(),
                warnings = warnings.len(),
                "Export complete"
            );
        }
        self.resting_state = ExportState::Done;
        let message = if warnings.is_empty() {
            "Export complete".to_string()
        } else {
            format!("Export complete with {} warning(s)", warnings.len())
        };
        self.notifier
            .emit(Notification::ExportComplete { outputs, warnings });
        self.notifier.status(message);
        Ok(())
    }

    /// Dispatch one surface message.
    pub async fn handle_message(&mut self, message: InboundMessage) {
        self.dispatch_message(message, None).await;
    }

    async fn dispatch_message(
        &mut self,
        message: InboundMessage,
        commands: Option<&mut mpsc::UnboundedReceiver<Command>>,
    ) {
        tracing::trace!(kind = message.kind(), "Surface message");
        match message {
            InboundMessage::FrameData {
                frame_number,
                width,
                height,
                data,
            } => {
                // failures are reported and cancel the export inside
                let _ = self
                    .handle_frame_data(frame_number, width, height, &data)
                    .await;
            }
            InboundMessage::ExportComplete => {
                if let Err(e) = self.finish_with(commands).await {
                    tracing::warn!(error = %e, "Finishing export failed");
                }
            }
            InboundMessage::ShadertoyReady => self.driver.note_readiness(true),
            InboundMessage::ShadertoyNotReady => self.driver.note_readiness(false),
            InboundMessage::UrlChanged { url } => {
                let outcome = self.driver.handle_navigation(&url);
                self.apply_navigation(outcome).await;
            }
            InboundMessage::UrlMonitorStatus {
                installed,
                current_url,
            } => {
                match self
                    .driver
                    .handle_monitor_status(installed, &current_url)
                    .await
                {
                    Ok(Some(outcome)) => self.apply_navigation(outcome).await,
                    Ok(None) => {}
                    Err(e) => tracing::warn!(error = %e, "Failed to reinstall navigation monitor"),
                }
                // a replaced document no longer runs the capture loop
                if !installed && self.state().is_cancellable() {
                    self.abort_export("Page reloaded during capture").await;
                }
            }
            InboundMessage::Error { message } => {
                if self.state().is_cancellable() {
                    self.abort_export(&format!("Render surface error: {message}"))
                        .await;
                } else {
                    self.notifier
                        .status(format!("Render surface error: {message}"));
                }
            }
        }
    }

    async fn apply_navigation(&mut self, outcome: NavigationOutcome) {
        match outcome {
            NavigationOutcome::Unchanged => {}
            NavigationOutcome::NewTarget { url, .. } => {
                if self.state().is_cancellable() {
                    self.abort_export("Navigated to another shader").await;
                }
                self.notifier.status(format!("Loading {url}"));
                if let Err(e) = self.driver.reconnect().await {
                    tracing::warn!(error = %e, "Reconnect after navigation failed");
                }
            }
            NavigationOutcome::LeftTarget { url } => {
                if self.state().is_cancellable() {
                    self.abort_export("Navigated away from the shader").await;
                }
                self.notifier.status(format!("No shader at {url}"));
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        tracing::debug!(?command, "Command");
        let result = match command {
            // failures are published by start_export itself
            Command::Start => {
                let _ = self.start_export().await;
                return;
            }
            Command::Cancel => self.cancel_export().await,
            Command::Load(url) => self.load_target(&url).await,
            Command::Reload if self.state().can_start() => self.driver.reconnect().await,
            Command::Reload => Err(ShadercapError::invalid_state(
                "Cannot reload while an export is running",
            )),
            Command::Shutdown => {
                self.shutdown_requested = true;
                Ok(())
            }
        };
        if let Err(e) = result {
            self.notifier.status(e.to_string());
        }
    }

    /// Run the control loop until `Shutdown`, the command channel closes,
    /// or the surface goes away. An export still capturing is cancelled on exit.
    pub async fn run(&mut self, mut commands: mpsc::UnboundedReceiver<Command>) -> ShadercapResult<()> {
        let mut watchdog = tokio::time::interval(self.config.watchdog_interval);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!("Control loop started");

        while !self.shutdown_requested {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(completion) = self.completions.recv() => {
                    self.handle_write_completion(completion).await;
                }
                message = self.driver.next_message() => match message {
                    Some(message) => self.dispatch_message(message, Some(&mut commands)).await,
                    None => {
                        tracing::warn!("Render surface closed");
                        break;
                    }
                },
                _ = watchdog.tick() => self.watchdog().await,
            }
        }

        if self.state().is_cancellable() {
            self.cancel_export().await?;
        }
        tracing::info!(state = ?self.state(), "Control loop stopped");
        Ok(())
    }

    async fn watchdog(&mut self) {
        if self.driver.session().source_url.is_empty() {
            return;
        }
        if let Err(e) = self.driver.watchdog_tick().await {
            tracing::debug!(error = %e, "Watchdog check failed");
        }
    }
}

async fn next_command(
    commands: &mut Option<&mut mpsc::UnboundedReceiver<Command>>,
) -> Option<Command> {
    match commands {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn labels(formats: &[shadercap_session_model::OutputFormat]) -> String {
    formats
        .iter()
        .map(|f| f.label())
        .collect::<Vec<_>>()
        .join(" + ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_tuning() {
        let tuning = CaptureTuning {
            write_workers: 0,
            watchdog_interval_ms: 1500,
            ..CaptureTuning::default()
        };
        let config = OrchestratorConfig::from(&tuning);
        assert_eq!(config.write_workers, 1);
        assert_eq!(config.watchdog_interval, Duration::from_millis(1500));
    }

    #[test]
    fn test_command_wire_format() {
        assert_eq!(
            serde_json::to_string(&Command::Load("https://x/view/a".into())).unwrap(),
            r#"{"command":"load","url":"https://x/view/a"}"#
        );
        assert_eq!(
            serde_json::from_str::<Command>(r#"{"command":"cancel"}"#).unwrap(),
            Command::Cancel
        );
    }

    #[test]
    fn test_labels() {
        use shadercap_session_model::OutputFormat;
        assert_eq!(labels(&[OutputFormat::Mp4, OutputFormat::Gif]), "MP4 + GIF");
    }
}
