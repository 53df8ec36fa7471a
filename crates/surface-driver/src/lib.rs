//! Shadercap Surface Driver
//!
//! Controls the page that renders the capture target:
//! - **Surface:** The [`RenderSurface`] seam over a browser-like component
//! - **Scripts:** Controller and navigation monitor evaluated in the page
//! - **Driver:** Readiness polling, injection, capture start/restore, navigation
//! - **Chromium:** CDP-backed surface (feature `chromium`)

pub mod driver;
pub mod scripts;
pub mod surface;

#[cfg(feature = "chromium")]
pub mod chromium;

pub use driver::{DriverConfig, NavigationOutcome, SurfaceDriver};
pub use scripts::CaptureParams;
pub use surface::RenderSurface;

#[cfg(feature = "chromium")]
pub use chromium::{ChromiumOptions, ChromiumSurface};
