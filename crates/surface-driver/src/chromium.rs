//! Chrome DevTools Protocol render surface.
//!
//! Launches a Chromium instance, opens one page, and exposes the page through
//! [`RenderSurface`]. The page-to-host bridge is a CDP binding: calls to
//! `window.__shadercapPost(json)` surface as `Runtime.bindingCalled` events
//! whose payloads are forwarded to the driver's inbox.

use std::path::PathBuf;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::js_protocol::runtime::{AddBindingParams, EventBindingCalled};
use chromiumoxide::page::Page;
use futures::StreamExt;
use shadercap_common::error::{ShadercapError, ShadercapResult};
use shadercap_session_model::BRIDGE_FUNCTION;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::surface::RenderSurface;

/// Launch options for [`ChromiumSurface`].
#[derive(Debug, Clone)]
pub struct ChromiumOptions {
    /// Show the browser window.
    pub headed: bool,
    /// Disable the Chromium sandbox (containers, CI).
    pub no_sandbox: bool,
    /// Browser binary; auto-detected when unset.
    pub executable: Option<PathBuf>,
    /// Initial window size.
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for ChromiumOptions {
    fn default() -> Self {
        Self {
            headed: false,
            no_sandbox: false,
            executable: None,
            window_width: 1280,
            window_height: 800,
        }
    }
}

/// A single Chromium page driven over CDP.
pub struct ChromiumSurface {
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler: JoinHandle<()>,
    bridge: JoinHandle<()>,
}

impl ChromiumSurface {
    /// Launch the browser and return the surface plus its message inbox.
    pub async fn launch(
        options: ChromiumOptions,
    ) -> ShadercapResult<(Self, mpsc::UnboundedReceiver<String>)> {
        let mut builder =
            BrowserConfig::builder().window_size(options.window_width, options.window_height);
        if options.headed {
            builder = builder.with_head();
        }
        if options.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref path) = options.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(ShadercapError::surface)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(cdp_error)?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "CDP handler stopped");
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(cdp_error)?;
        page.execute(AddBindingParams::new(BRIDGE_FUNCTION))
            .await
            .map_err(cdp_error)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut calls = page
            .event_listener::<EventBindingCalled>()
            .await
            .map_err(cdp_error)?;
        let bridge = tokio::spawn(async move {
            while let Some(call) = calls.next().await {
                if call.name != BRIDGE_FUNCTION {
                    continue;
                }
                if tx.send(call.payload.clone()).is_err() {
                    break;
                }
            }
        });

        tracing::info!(headed = options.headed, "Chromium surface launched");
        Ok((
            Self {
                browser: Mutex::new(Some(browser)),
                page,
                handler,
                bridge,
            },
            rx,
        ))
    }

    /// Close the browser and stop the background tasks.
    pub async fn close(&self) -> ShadercapResult<()> {
        let browser = self.browser.lock().await.take();
        if let Some(mut browser) = browser {
            browser.close().await.map_err(cdp_error)?;
            if let Err(e) = browser.wait().await {
                tracing::debug!(error = %e, "Browser process did not exit cleanly");
            }
        }
        self.bridge.abort();
        self.handler.abort();
        Ok(())
    }
}

#[async_trait::async_trait]
impl RenderSurface for ChromiumSurface {
    async fn load_url(&self, url: &str) -> ShadercapResult<()> {
        self.page.goto(url).await.map_err(cdp_error)?;
        Ok(())
    }

    async fn eval_script(&self, script: &str) -> ShadercapResult<serde_json::Value> {
        let result = self.page.evaluate(script).await.map_err(cdp_error)?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn inject_deferred(&self, script: &str) -> ShadercapResult<()> {
        self.page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(script))
            .await
            .map_err(cdp_error)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "chromium"
    }
}

fn cdp_error(e: impl std::fmt::Display) -> ShadercapError {
    ShadercapError::surface(e.to_string())
}
