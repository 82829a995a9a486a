//! # sitelog-reminders
//!
//! One-shot local reminders for urgent tasks.
//!
//! The [`ReminderScheduler`] keeps at most one pending reminder per task:
//! scheduling again replaces the earlier reminder, and cancelling removes it.
//! Delivery goes through a [`Notifier`], the seam to the platform's
//! notification service. Reminders are best-effort; delivery failures are
//! logged and never reach the caller that saved the task.

pub mod errors;
pub mod notifier;
pub mod scheduler;

pub use errors::ReminderError;
pub use notifier::{LogNotifier, Notifier, RecordingNotifier, ReminderNotification, ReminderPayload};
pub use scheduler::{PendingReminder, ReminderDue, ReminderRequest, ReminderScheduler};
