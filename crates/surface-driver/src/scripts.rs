//! Scripts evaluated inside the render surface.
//!
//! The two long scripts live in `assets/` and are idempotent: evaluating them
//! again on a page where they are already installed is a no-op. Commands are
//! small expressions built here and sent fire-and-forget.

use serde::Serialize;
use shadercap_session_model::BRIDGE_FUNCTION;

const CONTROLLER_JS: &str = include_str!("../assets/controller.js");
const URL_MONITOR_JS: &str = include_str!("../assets/url_monitor.js");

/// Parameters of a frame-stepped capture, as the controller expects them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureParams {
    pub fps: u32,
    #[serde(rename = "startTime")]
    pub start_time_secs: f64,
    pub total_frames: u64,
    pub width: u32,
    pub height: u32,
}

/// Installs `window.__shadercap`.
pub fn controller() -> &'static str {
    CONTROLLER_JS
}

/// Installs the navigation monitor.
pub fn url_monitor() -> &'static str {
    URL_MONITOR_JS
}

/// Evaluates to `true` when the target's runtime object exists, and posts the
/// matching readiness message.
pub fn readiness_check() -> String {
    format!(
        "(function () {{ \
var ok = typeof window.gShaderToy !== 'undefined' && window.gShaderToy !== null; \
try {{ if (typeof window.{BRIDGE_FUNCTION} === 'function') {{ \
window.{BRIDGE_FUNCTION}(JSON.stringify({{ type: ok ? 'shadertoy_ready' : 'shadertoy_not_ready' }})); \
}} }} catch (e) {{}} \
return ok; }})()"
    )
}

/// Asks the page to post a `url_monitor_status` message.
pub fn monitor_status_check() -> String {
    format!(
        "(function () {{ \
try {{ if (typeof window.{BRIDGE_FUNCTION} === 'function') {{ \
window.{BRIDGE_FUNCTION}(JSON.stringify({{ type: 'url_monitor_status', installed: !!window.__shadercapUrlMonitor, currentUrl: location.href }})); \
}} }} catch (e) {{}} \
return !!window.__shadercapUrlMonitor; }})()"
    )
}

/// Starts a frame-stepped capture.
pub fn start_capture(params: &CaptureParams) -> String {
    let args = serde_json::to_string(params).unwrap_or_else(|_| "{}".to_string());
    format!(
        "(function () {{ \
if (!window.__shadercap) {{ \
try {{ window.{BRIDGE_FUNCTION}(JSON.stringify({{ type: 'error', message: 'Capture controller is not installed' }})); }} catch (e) {{}} \
return false; }} \
return window.__shadercap.start({args}); }})()"
    )
}

/// Reverts clock, render hook, and canvas size. Safe when nothing is overridden.
pub fn restore() -> &'static str {
    "(function () { return window.__shadercap ? window.__shadercap.restore() : false; })()"
}
