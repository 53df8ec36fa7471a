//! The render surface seam.

use shadercap_common::error::ShadercapResult;

/// Abstract interface to a browser-like component that renders the target.
///
/// Commands are fire-and-forget from the protocol's point of view: anything
/// the page wants to tell the host arrives later as a raw JSON string on the
/// inbox channel handed to [`crate::SurfaceDriver::new`], posted from page
/// scripts via `window.__shadercapPost`.
#[async_trait::async_trait]
pub trait RenderSurface: Send + Sync {
    /// Navigate to `url`.
    async fn load_url(&self, url: &str) -> ShadercapResult<()>;

    /// Evaluate `script` in the current document and return its value.
    async fn eval_script(&self, script: &str) -> ShadercapResult<serde_json::Value>;

    /// Register `script` to run at the start of every future document.
    async fn inject_deferred(&self, script: &str) -> ShadercapResult<()>;

    /// Surface name for logs.
    fn name(&self) -> &str;
}
