//! Notification platform seam and the two in-process implementations.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use sitelog_core::ids::{LocationId, TaskId};

use crate::errors::ReminderError;

/// Opaque data attached to a reminder so a tap can route back to the task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderPayload {
    pub task_id: TaskId,
    pub location_id: LocationId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderNotification {
    pub title: String,
    pub body: String,
    pub payload: ReminderPayload,
}

impl ReminderNotification {
    pub const TITLE: &'static str = "Urgent task";

    pub fn for_task(task_id: TaskId, location_id: LocationId, task_title: &str) -> Self {
        Self {
            title: Self::TITLE.to_string(),
            body: format!("\"{task_title}\" still needs attention"),
            payload: ReminderPayload {
                task_id,
                location_id,
            },
        }
    }
}

/// Delivers reminders to the user.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Ask the platform for permission to post notifications.
    async fn request_permission(&self) -> Result<bool, ReminderError>;

    async fn deliver(&self, notification: &ReminderNotification) -> Result<(), ReminderError>;
}

/// Posts reminders to the log and stdout.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn request_permission(&self) -> Result<bool, ReminderError> {
        Ok(true)
    }

    async fn deliver(&self, notification: &ReminderNotification) -> Result<(), ReminderError> {
        let payload = serde_json::to_string(&notification.payload)
            .map_err(|e| ReminderError::Delivery(e.to_string()))?;
        info!(
            title = %notification.title,
            body = %notification.body,
            payload = %payload,
            "reminder delivered"
        );
        println!("[{}] {} {}", notification.title, notification.body, payload);
        Ok(())
    }
}

/// Keeps every delivered reminder in memory.
pub struct RecordingNotifier {
    granted: bool,
    fail_deliveries: bool,
    permission_requests: AtomicUsize,
    delivered: Mutex<Vec<ReminderNotification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            granted: true,
            fail_deliveries: false,
            permission_requests: AtomicUsize::new(0),
            delivered: Mutex::new(Vec::new()),
        }
    }

    /// A notifier whose permission prompt is always declined.
    pub fn denying() -> Self {
        Self {
            granted: false,
            ..Self::new()
        }
    }

    /// A notifier that grants permission but fails every delivery.
    pub fn failing() -> Self {
        Self {
            fail_deliveries: true,
            ..Self::new()
        }
    }

    pub fn delivered(&self) -> Vec<ReminderNotification> {
        self.delivered.lock().clone()
    }

    pub fn permission_requests(&self) -> usize {
        self.permission_requests.load(Ordering::SeqCst)
    }
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn request_permission(&self) -> Result<bool, ReminderError> {
        let _ = self.permission_requests.fetch_add(1, Ordering::SeqCst);
        Ok(self.granted)
    }

    async fn deliver(&self, notification: &ReminderNotification) -> Result<(), ReminderError> {
        if self.fail_deliveries {
            return Err(ReminderError::Delivery("recording notifier set to fail".into()));
        }
        self.delivered.lock().push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_embeds_task_title_and_ids() {
        let n = ReminderNotification::for_task(TaskId::new(1), LocationId::new(2), "Inspect forklift");
        assert_eq!(n.title, "Urgent task");
        assert!(n.body.contains("Inspect forklift"));
        assert_eq!(n.payload.task_id, TaskId::new(1));
        assert_eq!(n.payload.location_id, LocationId::new(2));
    }

    #[test]
    fn payload_uses_camel_case_keys() {
        let payload = ReminderPayload {
            task_id: TaskId::new(1),
            location_id: LocationId::new(1),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json, serde_json::json!({"taskId": 1, "locationId": 1}));
    }

    #[tokio::test]
    async fn recording_notifier_records() {
        let notifier = RecordingNotifier::new();
        assert!(notifier.request_permission().await.unwrap());
        let n = ReminderNotification::for_task(TaskId::new(3), LocationId::new(1), "t");
        notifier.deliver(&n).await.unwrap();
        assert_eq!(notifier.delivered(), vec![n]);
        assert_eq!(notifier.permission_requests(), 1);
    }

    #[tokio::test]
    async fn failing_notifier_errors() {
        let notifier = RecordingNotifier::failing();
        let n = ReminderNotification::for_task(TaskId::new(3), LocationId::new(1), "t");
        assert!(matches!(notifier.deliver(&n).await, Err(ReminderError::Delivery(_))));
        assert!(notifier.delivered().is_empty());
    }

    #[tokio::test]
    async fn log_notifier_accepts() {
        let n = ReminderNotification::for_task(TaskId::new(3), LocationId::new(1), "t");
        assert!(LogNotifier.request_permission().await.unwrap());
        LogNotifier.deliver(&n).await.unwrap();
    }
}
