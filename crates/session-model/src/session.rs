//! Export session state.
//!
//! One session exists per export. It is owned by the orchestrator's control
//! loop and only mutated there; write workers report back instead of touching
//! it. The `generation` stamp lets the loop recognise completions that belong
//! to a session that has since been discarded.

use std::path::{Path, PathBuf};

use serde::Serialize;
use shadercap_common::error::{ShadercapError, ShadercapResult};

use crate::settings::ExportSettings;

/// File name prefix of captured frames.
pub const FRAME_PREFIX: &str = "frame_";

/// File extension of captured frames.
pub const FRAME_EXTENSION: &str = "png";

/// File name of frame `index`: `frame_0000.png`.
pub fn frame_file_name(index: u64) -> String {
    format!("{FRAME_PREFIX}{index:04}.{FRAME_EXTENSION}")
}

/// Encoder input pattern matching [`frame_file_name`].
pub fn frame_pattern(dir: &Path) -> PathBuf {
    dir.join(format!("{FRAME_PREFIX}%04d.{FRAME_EXTENSION}"))
}

/// Lifecycle of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportState {
    /// No export running.
    Idle,
    /// The surface is producing frames.
    Capturing,
    /// Capture signalled completion; waiting for writes to drain.
    Finishing,
    /// The encoder is running.
    Encoding,
    Done,
    Cancelled,
    Error,
}

impl ExportState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled | Self::Error)
    }

    /// Whether a new export may start from this state.
    pub fn can_start(self) -> bool {
        self == Self::Idle || self.is_terminal()
    }

    /// Whether the export can still be cancelled.
    pub fn is_cancellable(self) -> bool {
        matches!(self, Self::Capturing | Self::Finishing)
    }

    /// Allowed transitions. Everything else is a programming error.
    pub fn can_transition_to(self, next: ExportState) -> bool {
        use ExportState::*;
        matches!(
            (self, next),
            (Idle, Capturing)
                | (Capturing, Finishing)
                | (Capturing, Cancelled)
                | (Capturing, Error)
                | (Finishing, Encoding)
                | (Finishing, Done)
                | (Finishing, Cancelled)
                | (Finishing, Error)
                | (Encoding, Done)
                | (Encoding, Error)
        )
    }
}

/// What a write completion did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Progress advanced to `current` of `total`.
    Progressed { current: u64, total: u64 },
    /// The write landed behind the progress counter; nothing changed.
    OutOfOrder { index: u64, current: u64 },
    /// The write failed.
    Failed,
}

/// A live export.
#[derive(Debug, Clone)]
pub struct ExportSession {
    generation: u64,
    state: ExportState,
    settings: ExportSettings,
    shader_id: String,
    target_directory: PathBuf,
    target_frame_count: u64,
    current_frame_index: u64,
    pending_write_count: usize,
    started_at: String,
}

impl ExportSession {
    /// Create an idle session from a validated settings snapshot.
    pub fn new(
        generation: u64,
        settings: ExportSettings,
        shader_id: impl Into<String>,
    ) -> ShadercapResult<Self> {
        settings.validate()?;
        let shader_id = shader_id.into();
        let target_directory = settings.target_directory(&shader_id);
        let target_frame_count = settings.target_frame_count();
        Ok(Self {
            generation,
            state: ExportState::Idle,
            settings,
            shader_id,
            target_directory,
            target_frame_count,
            current_frame_index: 0,
            pending_write_count: 0,
            started_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> ExportState {
        self.state
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    pub fn shader_id(&self) -> &str {
        &self.shader_id
    }

    pub fn target_directory(&self) -> &Path {
        &self.target_directory
    }

    pub fn target_frame_count(&self) -> u64 {
        self.target_frame_count
    }

    pub fn current_frame_index(&self) -> u64 {
        self.current_frame_index
    }

    pub fn pending_write_count(&self) -> usize {
        self.pending_write_count
    }

    /// Wall-clock start time (RFC 3339).
    pub fn started_at(&self) -> &str {
        &self.started_at
    }

    /// `(current, total)` for progress reporting.
    pub fn progress(&self) -> (u64, u64) {
        (self.current_frame_index, self.target_frame_count)
    }

    /// Path frame `index` is written to.
    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.target_directory.join(frame_file_name(index))
    }

    /// Move to `next`, rejecting transitions outside the lifecycle table.
    pub fn transition(&mut self, next: ExportState) -> ShadercapResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(ShadercapError::invalid_state(format!(
                "Cannot move export from {:?} to {:?}",
                self.state, next
            )));
        }
        tracing::debug!(from = ?self.state, to = ?next, generation = self.generation, "Export state change");
        self.state = next;
        Ok(())
    }

    /// Validate an inbound frame index against this session.
    pub fn check_frame_index(&self, index: i64) -> ShadercapResult<u64> {
        if index < 0 {
            return Err(ShadercapError::invalid_input(format!(
                "Negative frame index {index}"
            )));
        }
        let index = index as u64;
        if index >= self.target_frame_count {
            return Err(ShadercapError::invalid_input(format!(
                "Frame index {index} is past the target of {} frames",
                self.target_frame_count
            )));
        }
        Ok(index)
    }

    /// A frame write has been scheduled.
    pub fn record_write_started(&mut self) {
        self.pending_write_count += 1;
    }

    /// A frame write finished. Must be paired with [`Self::record_write_started`].
    pub fn record_write_finished(&mut self, index: u64, succeeded: bool) -> WriteOutcome {
        debug_assert!(self.pending_write_count > 0, "write finished without start");
        self.pending_write_count = self.pending_write_count.saturating_sub(1);

        if !succeeded {
            return WriteOutcome::Failed;
        }

        let next = (index + 1).min(self.target_frame_count);
        if next <= self.current_frame_index {
            return WriteOutcome::OutOfOrder {
                index,
                current: self.current_frame_index,
            };
        }
        self.current_frame_index = next;
        WriteOutcome::Progressed {
            current: self.current_frame_index,
            total: self.target_frame_count,
        }
    }

    /// All scheduled writes have completed.
    pub fn is_drained(&self) -> bool {
        self.pending_write_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::OutputFormats;
    use proptest::prelude::*;

    fn settings(duration_secs: f64, fps: u32) -> ExportSettings {
        ExportSettings {
            width: 320,
            height: 240,
            fps,
            start_time_secs: 0.0,
            duration_secs,
            output_directory: PathBuf::from("/tmp/shadercap"),
            crf: 18,
            formats: OutputFormats {
                mp4: true,
                gif: false,
            },
            gif_max_width: 640,
            keep_frames: false,
        }
    }

    #[test]
    fn test_frame_file_names_are_zero_padded() {
        assert_eq!(frame_file_name(0), "frame_0000.png");
        assert_eq!(frame_file_name(42), "frame_0042.png");
        assert_eq!(frame_file_name(12345), "frame_12345.png");
        assert_eq!(
            frame_pattern(Path::new("/out")),
            PathBuf::from("/out/frame_%04d.png")
        );
    }

    #[test]
    fn test_new_session_uses_id_subdirectory() {
        let session = ExportSession::new(1, settings(1.0, 10), "abc").unwrap();
        assert_eq!(session.state(), ExportState::Idle);
        assert_eq!(session.target_frame_count(), 10);
        assert_eq!(session.target_directory(), Path::new("/tmp/shadercap/abc"));
        assert_eq!(
            session.frame_path(3),
            PathBuf::from("/tmp/shadercap/abc/frame_0003.png")
        );
    }

    #[test]
    fn test_invalid_settings_rejected() {
        assert!(ExportSession::new(1, settings(0.0, 10), "").is_err());
    }

    #[test]
    fn test_transition_table() {
        use ExportState::*;
        assert!(Idle.can_transition_to(Capturing));
        assert!(Capturing.can_transition_to(Finishing));
        assert!(Finishing.can_transition_to(Done));
        assert!(Finishing.can_transition_to(Encoding));
        assert!(Encoding.can_transition_to(Done));
        assert!(!Idle.can_transition_to(Finishing));
        assert!(!Encoding.can_transition_to(Cancelled));
        assert!(!Done.can_transition_to(Capturing));
        assert!(!Cancelled.can_transition_to(Done));
    }

    #[test]
    fn test_transition_rejects_skips() {
        let mut session = ExportSession::new(1, settings(1.0, 10), "").unwrap();
        assert!(session.transition(ExportState::Encoding).is_err());
        session.transition(ExportState::Capturing).unwrap();
        session.transition(ExportState::Finishing).unwrap();
        session.transition(ExportState::Done).unwrap();
        assert!(session.state().is_terminal());
    }

    #[test]
    fn test_frame_index_bounds() {
        let session = ExportSession::new(1, settings(1.0, 10), "").unwrap();
        assert!(session.check_frame_index(-1).is_err());
        assert!(session.check_frame_index(10).is_err());
        assert_eq!(session.check_frame_index(9).unwrap(), 9);
    }

    #[test]
    fn test_progress_follows_index_plus_one() {
        let mut session = ExportSession::new(1, settings(1.0, 10), "").unwrap();
        session.record_write_started();
        session.record_write_started();
        assert_eq!(
            session.record_write_finished(1, true),
            WriteOutcome::Progressed {
                current: 2,
                total: 10
            }
        );
        assert_eq!(
            session.record_write_finished(0, true),
            WriteOutcome::OutOfOrder {
                index: 0,
                current: 2
            }
        );
        assert_eq!(session.progress(), (2, 10));
        assert!(session.is_drained());
    }

    #[test]
    fn test_failed_write_releases_pending() {
        let mut session = ExportSession::new(1, settings(1.0, 10), "").unwrap();
        session.record_write_started();
        assert_eq!(session.record_write_finished(0, false), WriteOutcome::Failed);
        assert_eq!(session.pending_write_count(), 0);
        assert_eq!(session.current_frame_index(), 0);
    }

    proptest! {
        #[test]
        fn sequential_writes_reach_target(duration in 1.0f64..5.0, fps in 1u32..60) {
            let mut session = ExportSession::new(7, settings(duration, fps), "x").unwrap();
            let total = session.target_frame_count();
            prop_assert_eq!(total, (duration * fps as f64).round() as u64);

            for index in 0..total {
                session.record_write_started();
                session.record_write_finished(index, true);
            }
            prop_assert_eq!(session.current_frame_index(), total);
            prop_assert_eq!(session.pending_write_count(), 0);
        }

        #[test]
        fn counter_never_exceeds_target(order in proptest::collection::vec(0u64..20, 1..40)) {
            let mut session = ExportSession::new(1, settings(2.0, 10), "").unwrap();
            for _ in &order {
                session.record_write_started();
            }
            for index in order {
                session.record_write_finished(index, true);
                prop_assert!(session.current_frame_index() <= session.target_frame_count());
            }
            prop_assert!(session.is_drained());
        }
    }
}
