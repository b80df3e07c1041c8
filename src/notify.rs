/// Alert content and the notifier seam
///
/// The watcher composes alert content only. Delivery (webhooks, chat bots)
/// lives behind the `Notifier` trait; failures are logged by the caller and
/// never retried.

use std::path::PathBuf;
use tracing::{info, warn};

use crate::error::NotifyError;

/// Content of one alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Restore script, present only for griefed alerts
    pub script: Option<String>,
    /// Reference and latest snapshot files, in that order
    pub images: Vec<PathBuf>,
}

impl Notification {
    /// Alert for a project that differs from its reference
    pub fn griefed(project: &str, changed: usize, restorable: usize, script: Option<String>, images: Vec<PathBuf>) -> Self {
        let body = match &script {
            Some(_) => format!(
                "{changed} pixels changed in {project}. The script below restores {restorable} of them (before, after attached)."
            ),
            None => format!(
                "{changed} pixels changed in {project}. No restore script: the tile coordinates of the project are unknown."
            ),
        };
        Self {
            title: format!("ALERT! {changed} pixels changed in {project}"),
            body,
            script,
            images,
        }
    }

    /// Notice that a previously griefed project matches its reference again
    pub fn restored(project: &str) -> Self {
        Self {
            title: format!("{project} restored"),
            body: format!("Pixels of {project} are back to their original state."),
            script: None,
            images: Vec::new(),
        }
    }
}

/// Delivery channel for alerts
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Notifier that only writes alerts to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        match &notification.script {
            Some(script) => warn!(
                "🚨 {} ({} bytes of restore script, {} images)",
                notification.title,
                script.len(),
                notification.images.len()
            ),
            None => info!("🔔 {}: {}", notification.title, notification.body),
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Notifier that remembers everything it was asked to send
    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub(crate) sent: Mutex<Vec<Notification>>,
        pub(crate) fail: bool,
    }

    impl RecordingNotifier {
        pub(crate) fn failing() -> Self {
            Self { sent: Mutex::new(Vec::new()), fail: true }
        }

        pub(crate) fn sent(&self) -> Vec<Notification> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(notification.clone());
            if self.fail {
                return Err(NotifyError {
                    title: notification.title.clone(),
                    reason: "webhook unreachable".into(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn test_griefed_alert_content() {
        let alert = Notification::griefed("Cat", 3, 2, Some("js".into()), vec![PathBuf::from("a.png")]);
        assert_eq!(alert.title, "ALERT! 3 pixels changed in Cat");
        assert!(alert.body.contains("restores 2"));
        assert_eq!(alert.script.as_deref(), Some("js"));

        let blind = Notification::griefed("Cat", 3, 0, None, Vec::new());
        assert!(blind.body.contains("No restore script"));
    }

    #[test]
    fn test_restored_alert_has_no_script() {
        let alert = Notification::restored("Cat");
        assert!(alert.script.is_none());
        assert!(LogNotifier.notify(&alert).is_ok());
    }
}
