//! Lifecycle notifications for the UI layer.
//!
//! Both the surface driver and the export orchestrator publish through a
//! shared [`Notifier`]. The receiving end is whatever front end drives the
//! export; it never calls back into the core from the channel.

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::mpsc;

/// An observable event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    ExportStarted {
        total: u64,
    },
    ExportProgress {
        current: u64,
        total: u64,
    },
    /// Export reached `Done`. `warnings` lists per-format encoder failures.
    ExportComplete {
        outputs: Vec<PathBuf>,
        warnings: Vec<String>,
    },
    ExportCancelled,
    /// Export reached `Error`.
    ExportFailed {
        message: String,
    },
    StatusChanged {
        message: String,
    },
    TargetLoaded {
        url: String,
        shader_id: String,
    },
    LoadFailed {
        url: String,
        reason: String,
    },
    /// The page navigated to a different target.
    TargetChanged {
        url: String,
        shader_id: String,
    },
    /// The page navigated away from any target.
    TargetUnloaded {
        url: String,
    },
}

/// Cloneable sending half of the notification channel.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: Option<mpsc::UnboundedSender<Notification>>,
}

impl Notifier {
    /// Create a notifier and the receiver the UI layer listens on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A notifier that drops everything.
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, notification: Notification) {
        tracing::trace!(?notification, "Notify");
        if let Some(tx) = &self.tx {
            let _ = tx.send(notification);
        }
    }

    /// Publish a human-readable status line.
    pub fn status(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(status = %message);
        self.emit(Notification::StatusChanged { message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notifications_reach_receiver_in_order() {
        let (notifier, mut rx) = Notifier::channel();
        notifier.emit(Notification::ExportStarted { total: 3 });
        notifier.status("capturing");

        assert_eq!(rx.try_recv().unwrap(), Notification::ExportStarted { total: 3 });
        assert_eq!(
            rx.try_recv().unwrap(),
            Notification::StatusChanged {
                message: "capturing".to_string()
            }
        );
    }

    #[test]
    fn test_disconnected_notifier_is_silent() {
        let notifier = Notifier::disconnected();
        notifier.emit(Notification::ExportCancelled);
        notifier.status("ignored");
    }

    #[test]
    fn test_serializes_with_event_tag() {
        let json = serde_json::to_string(&Notification::ExportProgress {
            current: 1,
            total: 10,
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"export_progress","current":1,"total":10}"#);
    }
}
