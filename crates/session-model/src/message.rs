//! Messages posted by scripts running inside the render surface.
//!
//! Scripts call `window.__shadercapPost(JSON.stringify(msg))`; the surface
//! adapter forwards the raw string to the host. Every message is a JSON
//! object discriminated by its `type` field. Anything that does not parse is
//! dropped by the receiver.

use serde::{Deserialize, Serialize};

/// Name of the in-page function scripts use to post messages to the host.
pub const BRIDGE_FUNCTION: &str = "__shadercapPost";

/// Discriminated union of inbound surface messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// One captured frame.
    FrameData {
        /// Zero-based frame index.
        #[serde(rename = "frameNumber")]
        frame_number: i64,
        /// Pixel width of `data` when it is a raw RGBA buffer, otherwise 0.
        #[serde(default)]
        width: u32,
        /// Pixel height of `data` when it is a raw RGBA buffer, otherwise 0.
        #[serde(default)]
        height: u32,
        /// Base64 pixel payload (raw RGBA, or an encoded image when width/height are 0).
        data: String,
    },

    /// The frame-stepped loop reached its target frame count.
    ExportComplete,

    /// Readiness check found the target's runtime object.
    ShadertoyReady,

    /// Readiness check did not find the target's runtime object.
    ShadertoyNotReady,

    /// The page navigated (history API, hash change, or reload).
    UrlChanged { url: String },

    /// Watchdog answer: whether the navigation monitor is still installed.
    UrlMonitorStatus {
        installed: bool,
        #[serde(rename = "currentUrl", default)]
        current_url: String,
    },

    /// Structured error raised by an injected script.
    Error { message: String },
}

impl InboundMessage {
    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FrameData { .. } => "frame_data",
            Self::ExportComplete => "export_complete",
            Self::ShadertoyReady => "shadertoy_ready",
            Self::ShadertoyNotReady => "shadertoy_not_ready",
            Self::UrlChanged { .. } => "url_changed",
            Self::UrlMonitorStatus { .. } => "url_monitor_status",
            Self::Error { .. } => "error",
        }
    }
}

/// Parse a raw inbound message. Returns `None` for anything unrecognised.
pub fn parse_inbound(raw: &str) -> Option<InboundMessage> {
    match serde_json::from_str::<InboundMessage>(raw) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::trace!(error = %e, len = raw.len(), "Dropping unparseable surface message");
            None
        }
    }
}
