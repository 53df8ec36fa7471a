//! Shadercap Capture Engine
//!
//! Turns a loaded render surface into a frame-accurate export. The
//! orchestrator owns the export session and runs a single control loop; frame
//! writes happen on a bounded pool of blocking workers that report back to it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 ExportOrchestrator                    │
//! │  commands ─┐                                          │
//! │  surface  ─┼─▶ control loop ──▶ ExportSession         │
//! │  watchdog ─┘        │   ▲                             │
//! │                     ▼   │ WriteCompletion             │
//! │               ┌──────────────┐      ┌──────────────┐  │
//! │               │ FrameIngest  │      │   Encoder    │  │
//! │               │ (PNG writes) │      │  (ffmpeg)    │  │
//! │               └──────┬───────┘      └──────┬───────┘  │
//! │                      ▼                     ▼          │
//! │        <out>/<id>/frame_%04d.png   <out>/<id>/<id>.mp4│
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod ingest;
pub mod orchestrator;

pub use ingest::{decode_frame, save_frame, CapturedFrame, FrameIngest, WriteCompletion};
pub use orchestrator::{Command, ExportOrchestrator, OrchestratorConfig};
