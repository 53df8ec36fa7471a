//! Render-surface driver.
//!
//! Turns a real-time page into a frame-stepped frame source. The driver owns
//! the [`ShaderSession`] describing what is loaded, injects the controller and
//! navigation monitor, and translates navigation reports into outcomes the
//! orchestrator acts on.

use serde_json::Value;
use shadercap_common::clock::RetrySchedule;
use shadercap_common::config::CaptureTuning;
use shadercap_common::error::{ShadercapError, ShadercapResult};
use shadercap_session_model::{
    is_shader_url, parse_inbound, InboundMessage, Notification, Notifier, ShaderSession,
};
use tokio::sync::mpsc;

use crate::scripts::{self, CaptureParams};
use crate::surface::RenderSurface;

/// Driver tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    /// Readiness checks before a load fails.
    pub readiness: RetrySchedule,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            readiness: RetrySchedule::default(),
        }
    }
}

impl From<&CaptureTuning> for DriverConfig {
    fn from(tuning: &CaptureTuning) -> Self {
        Self {
            readiness: RetrySchedule::new(
                tuning.readiness_attempts.max(1),
                tuning.readiness_interval(),
            ),
        }
    }
}

/// What a navigation report means for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// A different target is now showing; the caller should reconnect.
    NewTarget { url: String, shader_id: String },
    /// Same target as before.
    Unchanged,
    /// The page no longer shows a target.
    LeftTarget { url: String },
}

/// Drives one render surface.
pub struct SurfaceDriver<S> {
    surface: S,
    inbox: mpsc::UnboundedReceiver<String>,
    notifier: Notifier,
    config: DriverConfig,
    session: ShaderSession,
    deferred_installed: bool,
    override_active: bool,
}

impl<S: RenderSurface> SurfaceDriver<S> {
    /// Wrap `surface`. `inbox` carries raw messages posted by page scripts.
    pub fn new(
        surface: S,
        inbox: mpsc::UnboundedReceiver<String>,
        notifier: Notifier,
        config: DriverConfig,
    ) -> Self {
        Self {
            surface,
            inbox,
            notifier,
            config,
            session: ShaderSession::default(),
            deferred_installed: false,
            override_active: false,
        }
    }

    pub fn session(&self) -> &ShaderSession {
        &self.session
    }

    pub fn is_loaded(&self) -> bool {
        self.session.is_loaded
    }

    /// Whether the page's clock and render loop are currently overridden.
    pub fn is_capturing(&self) -> bool {
        self.override_active
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Navigate to `url` and prepare it for capture.
    ///
    /// Emits `TargetLoaded` on success and `LoadFailed` otherwise. A readiness
    /// timeout is returned as [`ShadercapError::Timeout`].
    pub async fn load_target(&mut self, url: &str) -> ShadercapResult<()> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ShadercapError::invalid_input("Target URL is empty"));
        }

        self.session.retarget(url);
        self.override_active = false;
        tracing::info!(
            surface = self.surface.name(),
            url,
            shader_id = %self.session.shader_id,
            "Loading target"
        );

        if let Err(e) = self.surface.load_url(url).await {
            self.fail_load(&e.to_string());
            return Err(e);
        }
        self.connect().await
    }

    /// Re-run readiness polling and script injection for the current URL.
    pub async fn reconnect(&mut self) -> ShadercapResult<()> {
        if self.session.source_url.is_empty() {
            return Err(ShadercapError::invalid_state("No target to reconnect to"));
        }
        tracing::info!(url = %self.session.source_url, "Reconnecting to target");
        self.session.mark_unloaded();
        self.override_active = false;
        self.connect().await
    }

    async fn connect(&mut self) -> ShadercapResult<()> {
        if !self.poll_ready().await {
            let reason = format!(
                "Shader did not become ready within {:.1}s",
                self.config.readiness.timeout().as_secs_f64()
            );
            self.fail_load(&reason);
            return Err(ShadercapError::timeout(reason));
        }
        self.session.is_ready = true;

        if let Err(e) = self.install_scripts().await {
            self.fail_load(&e.to_string());
            return Err(e);
        }
        self.session.is_loaded = true;

        tracing::info!(shader_id = %self.session.shader_id, "Target ready for capture");
        self.notifier.emit(Notification::TargetLoaded {
            url: self.session.source_url.clone(),
            shader_id: self.session.shader_id.clone(),
        });
        Ok(())
    }

    async fn poll_ready(&mut self) -> bool {
        let RetrySchedule { attempts, interval } = self.config.readiness;
        let check = scripts::readiness_check();

        for attempt in 1..=attempts {
            match self.surface.eval_script(&check).await {
                Ok(Value::Bool(true)) => {
                    tracing::debug!(attempt, "Readiness check succeeded");
                    return true;
                }
                Ok(_) => tracing::trace!(attempt, "Target not ready yet"),
                Err(e) => tracing::debug!(attempt, error = %e, "Readiness check failed"),
            }
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }
        false
    }

    async fn install_scripts(&mut self) -> ShadercapResult<()> {
        if !self.deferred_installed {
            self.surface.inject_deferred(scripts::controller()).await?;
            self.surface.inject_deferred(scripts::url_monitor()).await?;
            self.deferred_installed = true;
        }
        self.surface.eval_script(scripts::controller()).await?;
        self.inject_url_monitor().await
    }

    /// Install the history/hash change monitor into the current document.
    pub async fn inject_url_monitor(&self) -> ShadercapResult<()> {
        self.surface.eval_script(scripts::url_monitor()).await?;
        Ok(())
    }

    fn fail_load(&mut self, reason: &str) {
        tracing::warn!(url = %self.session.source_url, reason, "Target load failed");
        self.session.mark_unloaded();
        self.notifier.emit(Notification::LoadFailed {
            url: self.session.source_url.clone(),
            reason: reason.to_string(),
        });
    }

    /// Put the page into frame-stepped mode.
    ///
    /// Frames arrive later as `frame_data` messages, followed by
    /// `export_complete` once `total_frames` have been produced.
    pub async fn start_capture(&mut self, params: CaptureParams) -> ShadercapResult<()> {
        if !self.session.is_loaded {
            return Err(ShadercapError::invalid_state("No target is loaded"));
        }
        tracing::info!(
            fps = params.fps,
            start_time_secs = params.start_time_secs,
            total_frames = params.total_frames,
            width = params.width,
            height = params.height,
            "Starting frame-stepped capture"
        );
        let accepted = self
            .surface
            .eval_script(&scripts::start_capture(&params))
            .await?;
        if accepted == Value::Bool(false) {
            return Err(ShadercapError::surface(
                "Capture controller refused to start",
            ));
        }
        self.override_active = true;
        Ok(())
    }

    /// Revert clock, render hook, and canvas size.
    ///
    /// Returns `false` without touching the page when no override is active.
    pub async fn restore_state(&mut self) -> ShadercapResult<bool> {
        if !self.override_active {
            return Ok(false);
        }
        self.override_active = false;
        self.surface.eval_script(scripts::restore()).await?;
        tracing::debug!("Render surface restored");
        Ok(true)
    }

    /// Apply a navigation report.
    ///
    /// An active capture override is left flagged so the caller can still
    /// restore the page before reconnecting.
    pub fn handle_navigation(&mut self, url: &str) -> NavigationOutcome {
        if is_shader_url(url) {
            if url == self.session.source_url {
                return NavigationOutcome::Unchanged;
            }
            self.session.retarget(url);
            tracing::info!(url, shader_id = %self.session.shader_id, "Navigated to new target");
            self.notifier.emit(Notification::TargetChanged {
                url: url.to_string(),
                shader_id: self.session.shader_id.clone(),
            });
            NavigationOutcome::NewTarget {
                url: url.to_string(),
                shader_id: self.session.shader_id.clone(),
            }
        } else {
            let was_loaded = self.session.is_loaded;
            self.session.source_url = url.to_string();
            self.session.shader_id.clear();
            self.session.mark_unloaded();
            tracing::info!(url, was_loaded, "Navigated away from target");
            self.notifier.emit(Notification::TargetUnloaded {
                url: url.to_string(),
            });
            NavigationOutcome::LeftTarget {
                url: url.to_string(),
            }
        }
    }

    /// Ask the page whether the navigation monitor survived.
    ///
    /// The answer arrives as a `url_monitor_status` message.
    pub async fn watchdog_tick(&self) -> ShadercapResult<()> {
        self.surface
            .eval_script(&scripts::monitor_status_check())
            .await?;
        Ok(())
    }

    /// React to a `url_monitor_status` answer.
    ///
    /// A missing monitor means the document was replaced: any capture override
    /// went with it, the monitor and the controller are reinstalled, and a URL
    /// change the monitor could not report is synthesized.
    pub async fn handle_monitor_status(
        &mut self,
        installed: bool,
        current_url: &str,
    ) -> ShadercapResult<Option<NavigationOutcome>> {
        if installed {
            return Ok(None);
        }
        tracing::warn!(
            current_url,
            had_override = self.override_active,
            "Navigation monitor missing; reinstalling"
        );
        self.override_active = false;
        self.inject_url_monitor().await?;
        if self.session.is_loaded {
            self.surface.eval_script(scripts::controller()).await?;
        }

        if !current_url.is_empty() && current_url != self.session.source_url {
            tracing::info!(
                last_known = %self.session.source_url,
                current_url,
                "Synthesizing missed navigation"
            );
            return Ok(Some(self.handle_navigation(current_url)));
        }
        Ok(None)
    }

    /// Record a readiness message posted by the page.
    pub fn note_readiness(&mut self, ready: bool) {
        self.session.is_ready = ready;
    }

    /// Next well-formed message from the page, or `None` once the surface is gone.
    ///
    /// Unparseable messages are dropped. Cancel-safe.
    pub async fn next_message(&mut self) -> Option<InboundMessage> {
        loop {
            let raw = self.inbox.recv().await?;
            if let Some(message) = parse_inbound(&raw) {
                return Some(message);
            }
        }
    }
}
