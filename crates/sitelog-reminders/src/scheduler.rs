use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use sitelog_core::ids::{LocationId, ReminderId, TaskId};

use crate::errors::ReminderError;
use crate::notifier::{Notifier, ReminderNotification};

/// When a reminder should fire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReminderDue {
    After(Duration),
    At(DateTime<Utc>),
}

impl ReminderDue {
    /// Time left until the reminder is due. Past timestamps are due immediately.
    pub fn delay_from(&self, now: DateTime<Utc>) -> Duration {
        match *self {
            Self::After(delay) => delay,
            Self::At(at) => (at - now).to_std().unwrap_or(Duration::ZERO),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ReminderRequest {
    pub task_id: TaskId,
    pub location_id: LocationId,
    pub title: String,
    pub due: ReminderDue,
}

/// A reminder that has been scheduled and has not fired or been cancelled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingReminder {
    pub id: ReminderId,
    pub task_id: TaskId,
    pub fire_at: DateTime<Utc>,
}

struct Tracked {
    id: ReminderId,
    fire_at: DateTime<Utc>,
    cancel: CancellationToken,
}

/// Schedules one-shot reminders, at most one per task.
pub struct ReminderScheduler {
    notifier: Arc<dyn Notifier>,
    permission: OnceCell<bool>,
    pending: Arc<DashMap<TaskId, Tracked>>,
    tracker: TaskTracker,
}

impl ReminderScheduler {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            permission: OnceCell::new(),
            pending: Arc::new(DashMap::new()),
            tracker: TaskTracker::new(),
        }
    }

    /// Request notification permission once per scheduler. A failed request is
    /// retried on the next call; a definite answer is kept.
    pub async fn ensure_permission(&self) -> Result<(), ReminderError> {
        let notifier = self.notifier.clone();
        let granted = self
            .permission
            .get_or_try_init(|| async move { notifier.request_permission().await })
            .await?;
        if *granted {
            Ok(())
        } else {
            Err(ReminderError::PermissionDenied)
        }
    }

    /// Schedule a reminder for a task, replacing any reminder already pending for it.
    #[instrument(skip(self, request), fields(task_id = %request.task_id, location_id = %request.location_id))]
    pub async fn schedule(&self, request: ReminderRequest) -> Result<ReminderId, ReminderError> {
        self.ensure_permission().await?;

        let now = Utc::now();
        let delay = request.due.delay_from(now);
        let fire_at = now + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
        let id = ReminderId::new();
        let cancel = CancellationToken::new();

        let replaced = self.pending.insert(
            request.task_id,
            Tracked {
                id: id.clone(),
                fire_at,
                cancel: cancel.clone(),
            },
        );
        if let Some(previous) = replaced {
            previous.cancel.cancel();
            debug!(previous = %previous.id, "replaced pending reminder");
        }

        let notification =
            ReminderNotification::for_task(request.task_id, request.location_id, &request.title);
        let notifier = self.notifier.clone();
        let pending = self.pending.clone();
        let task_id = request.task_id;
        let reminder_id = id.clone();

        let _ = self.tracker.spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(reminder_id = %reminder_id, "reminder cancelled");
                }
                () = tokio::time::sleep(delay) => {
                    let _ = pending.remove_if(&task_id, |_, tracked| tracked.id == reminder_id);
                    match notifier.deliver(&notification).await {
                        Ok(()) => debug!(reminder_id = %reminder_id, "reminder fired"),
                        Err(e) => warn!(reminder_id = %reminder_id, error = %e, "reminder delivery failed"),
                    }
                }
            }
        });

        info!(reminder_id = %id, delay_ms = delay.as_millis() as u64, "reminder scheduled");
        Ok(id)
    }

    /// Cancel the pending reminder for a task. Returns `false` if none was pending.
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub fn cancel(&self, task_id: TaskId) -> bool {
        match self.pending.remove(&task_id) {
            Some((_, tracked)) => {
                tracked.cancel.cancel();
                debug!(reminder_id = %tracked.id, "reminder cancelled");
                true
            }
            None => false,
        }
    }

    /// Pending reminders, soonest first.
    pub fn pending(&self) -> Vec<PendingReminder> {
        let mut list: Vec<PendingReminder> = self
            .pending
            .iter()
            .map(|entry| PendingReminder {
                id: entry.id.clone(),
                task_id: *entry.key(),
                fire_at: entry.fire_at,
            })
            .collect();
        list.sort_by_key(|p| p.fire_at);
        list
    }

    /// Wait until every pending reminder has fired or been cancelled.
    pub async fn drain(&self) {
        let _ = self.tracker.close();
        self.tracker.wait().await;
        let _ = self.tracker.reopen();
    }

    /// Cancel every pending reminder and wait for their timers to stop.
    /// Returns how many were dropped.
    pub async fn shutdown(&self) -> usize {
        let task_ids: Vec<TaskId> = self.pending.iter().map(|entry| *entry.key()).collect();
        let dropped = task_ids.into_iter().filter(|id| self.cancel(*id)).count();
        self.drain().await;
        if dropped > 0 {
            info!(dropped, "pending reminders cancelled at shutdown");
        }
        dropped
    }
}
