//! The save workflow behind the location and task screens.
//!
//! Every command runs one store statement (or a read followed by one write)
//! and then adjusts the task's reminder:
//!
//! - **Urgent save**: schedules a reminder, replacing any earlier one for the task.
//! - **Non-urgent save**: cancels any pending reminder.
//! - **Finish / location delete**: cancels reminders before the rows disappear.
//!
//! Mutating workflows hold the service's write lock end to end, so a finish
//! can never slip in between a task's write and its reminder registration.
//!
//! Reminder failures are logged and reported as `reminder: None`; they never
//! fail the save.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use sitelog_core::ids::{LocationId, ReminderId, TaskId};
use sitelog_core::model::{Location, Task, TaskDraft};
use sitelog_reminders::{ReminderDue, ReminderRequest, ReminderScheduler};
use sitelog_store::{Database, LocationRepo, StoreError, TaskRepo};

use crate::error::EngineError;

/// Result of saving a task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
    pub task: Task,
    pub created: bool,
    /// Set when an urgent save scheduled a reminder.
    pub reminder: Option<ReminderId>,
}

pub struct TaskService {
    locations: LocationRepo,
    tasks: TaskRepo,
    reminders: Arc<ReminderScheduler>,
    default_due: ReminderDue,
    reminders_enabled: bool,
    write_lock: Mutex<()>,
}

impl TaskService {
    pub fn new(db: Database, reminders: Arc<ReminderScheduler>, reminder_delay: Duration) -> Self {
        Self {
            locations: LocationRepo::new(db.clone()),
            tasks: TaskRepo::new(db),
            reminders,
            default_due: ReminderDue::After(reminder_delay),
            reminders_enabled: true,
            write_lock: Mutex::new(()),
        }
    }

    /// Turn urgent-task reminders on or off. Saves still cancel stale reminders.
    pub fn with_reminders_enabled(mut self, enabled: bool) -> Self {
        self.reminders_enabled = enabled;
        self
    }

    pub fn reminders(&self) -> &ReminderScheduler {
        &self.reminders
    }

    // ── Locations ───────────────────────────────────────────────────────

    pub async fn list_locations(&self) -> Result<Vec<Location>, EngineError> {
        Ok(self.locations.list()?)
    }

    pub async fn add_location(&self, name: &str) -> Result<Location, EngineError> {
        let location = self.locations.add(name)?;
        info!(location_id = %location.id, "location added");
        Ok(location)
    }

    /// Name of a location, or `None` so the caller can keep its default title.
    pub async fn location_name(&self, id: LocationId) -> Result<Option<String>, EngineError> {
        Ok(self.locations.name(id)?)
    }

    /// Delete a location together with its tasks and their reminders.
    #[instrument(skip(self), fields(location_id = %id))]
    pub async fn delete_location(&self, id: LocationId) -> Result<bool, EngineError> {
        let _guard = self.write_lock.lock().await;
        let task_ids = self.tasks.ids_for_location(id)?;
        let deleted = self.locations.delete(id)?;
        if deleted {
            let cancelled = task_ids.into_iter().filter(|t| self.reminders.cancel(*t)).count();
            info!(cancelled_reminders = cancelled, "location deleted");
        }
        Ok(deleted)
    }

    // ── Tasks ───────────────────────────────────────────────────────────

    pub async fn list_tasks(&self, location_id: LocationId) -> Result<Vec<Task>, EngineError> {
        Ok(self.tasks.list_for_location(location_id)?)
    }

    pub async fn get_task(&self, id: TaskId) -> Result<Task, EngineError> {
        self.tasks
            .get(id)?
            .ok_or_else(|| StoreError::NotFound(format!("task {id}")).into())
    }

    /// Insert (no id) or update (with id) a task, then reconcile its reminder.
    #[instrument(skip(self, draft), fields(task_id = ?draft.id, location_id = %draft.location_id))]
    pub async fn save_task(&self, draft: TaskDraft) -> Result<SaveOutcome, EngineError> {
        let _guard = self.write_lock.lock().await;
        let (task, created) = match draft.id {
            None => (self.tasks.create(draft.location_id, &draft.fields)?, true),
            Some(id) => {
                let existing = self.get_task(id).await?;
                if existing.location_id != draft.location_id {
                    return Err(EngineError::LocationMismatch {
                        task: id.to_string(),
                        claimed: draft.location_id.to_string(),
                        actual: existing.location_id.to_string(),
                    });
                }
                (self.tasks.update(id, &draft.fields)?, false)
            }
        };

        let reminder = if task.is_urgent && self.reminders_enabled {
            let due = draft.remind_at.map_or(self.default_due, ReminderDue::At);
            self.schedule_reminder(&task, due).await
        } else {
            let _ = self.reminders.cancel(task.id);
            None
        };

        info!(task_id = %task.id, created, urgent = task.is_urgent, "task saved");
        Ok(SaveOutcome {
            task,
            created,
            reminder,
        })
    }

    /// Finishing a task deletes it. Returns `false` if it was already gone.
    #[instrument(skip(self), fields(task_id = %id))]
    pub async fn finish_task(&self, id: TaskId) -> Result<bool, EngineError> {
        let _guard = self.write_lock.lock().await;
        let _ = self.reminders.cancel(id);
        let deleted = self.tasks.delete(id)?;
        info!(deleted, "task finished");
        Ok(deleted)
    }

    async fn schedule_reminder(&self, task: &Task, due: ReminderDue) -> Option<ReminderId> {
        let request = ReminderRequest {
            task_id: task.id,
            location_id: task.location_id,
            title: task.title.clone(),
            due,
        };
        match self.reminders.schedule(request).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "could not schedule reminder");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitelog_core::model::TaskFields;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use sitelog_reminders::{Notifier, RecordingNotifier, ReminderError, ReminderNotification};
    use tokio::sync::Notify;

    const DELAY: Duration = Duration::from_secs(5);

    fn setup() -> (Arc<RecordingNotifier>, TaskService) {
        let notifier = Arc::new(RecordingNotifier::new());
        let scheduler = Arc::new(ReminderScheduler::new(notifier.clone()));
        let service = TaskService::new(Database::in_memory().unwrap(), scheduler, DELAY);
        (notifier, service)
    }

    #[tokio::test(start_paused = true)]
    async fn walkthrough() {
        let (notifier, service) = setup();

        let location = service.add_location("Warehouse A").await.unwrap();
        assert_eq!(location.id, LocationId::new(1));

        let saved = service
            .save_task(TaskDraft::new(
                location.id,
                TaskFields::new("Inspect forklift").urgent(true),
            ))
            .await
            .unwrap();
        assert!(saved.created);
        assert_eq!(saved.task.id, TaskId::new(1));
        assert!(saved.reminder.is_some());

        tokio::time::sleep(Duration::from_secs(6)).await;
        let delivered = notifier.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].payload.task_id, TaskId::new(1));
        assert_eq!(delivered[0].payload.location_id, LocationId::new(1));
        assert!(delivered[0].body.contains("Inspect forklift"));

        let updated = service
            .save_task(TaskDraft::existing(
                saved.task.id,
                location.id,
                TaskFields::new("Inspect forklift").description("done"),
            ))
            .await
            .unwrap();
        assert!(!updated.created);
        assert!(updated.reminder.is_none());
        assert!(!service.get_task(saved.task.id).await.unwrap().is_urgent);

        assert!(service.finish_task(saved.task.id).await.unwrap());
        assert!(service.list_tasks(location.id).await.unwrap().is_empty());
        assert_eq!(notifier.delivered().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_urgent_save_schedules_nothing() {
        let (notifier, service) = setup();
        let location = service.add_location("Yard").await.unwrap();
        let saved = service
            .save_task(TaskDraft::new(location.id, TaskFields::new("Sweep")))
            .await
            .unwrap();
        assert!(saved.reminder.is_none());
        assert!(service.reminders().pending().is_empty());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(notifier.delivered().is_empty());
        assert_eq!(notifier.permission_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn urgent_save_schedules_exactly_one_reminder() {
        let (notifier, service) = setup();
        let location = service.add_location("Yard").await.unwrap();
        let fields = TaskFields::new("Fix gate").urgent(true);
        let saved = service
            .save_task(TaskDraft::new(location.id, fields.clone()))
            .await
            .unwrap();
        // Saving again while still urgent replaces the pending reminder.
        let _ = service
            .save_task(TaskDraft::existing(saved.task.id, location.id, fields))
            .await
            .unwrap();
        assert_eq!(service.reminders().pending().len(), 1);

        service.reminders().drain().await;
        assert_eq!(notifier.delivered().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn clearing_urgency_cancels_reminder() {
        let (notifier, service) = setup();
        let location = service.add_location("Yard").await.unwrap();
        let saved = service
            .save_task(TaskDraft::new(location.id, TaskFields::new("Fix gate").urgent(true)))
            .await
            .unwrap();
        let _ = service
            .save_task(TaskDraft::existing(saved.task.id, location.id, TaskFields::new("Fix gate")))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(notifier.delivered().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn finishing_cancels_reminder() {
        let (notifier, service) = setup();
        let location = service.add_location("Yard").await.unwrap();
        let saved = service
            .save_task(TaskDraft::new(location.id, TaskFields::new("Fix gate").urgent(true)))
            .await
            .unwrap();
        assert!(service.finish_task(saved.task.id).await.unwrap());
        assert!(!service.finish_task(saved.task.id).await.unwrap());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(notifier.delivered().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_due_time_is_used() {
        let (notifier, service) = setup();
        let location = service.add_location("Yard").await.unwrap();
        let at = chrono::Utc::now() + chrono::Duration::seconds(60);
        let _ = service
            .save_task(
                TaskDraft::new(location.id, TaskFields::new("Late check").urgent(true)).remind_at(at),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(notifier.delivered().is_empty());
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(notifier.delivered().len(), 1);
    }

    #[tokio::test]
    async fn permission_denied_does_not_fail_save() {
        let notifier = Arc::new(RecordingNotifier::denying());
        let scheduler = Arc::new(ReminderScheduler::new(notifier.clone()));
        let service = TaskService::new(Database::in_memory().unwrap(), scheduler, DELAY);

        let location = service.add_location("Yard").await.unwrap();
        let saved = service
            .save_task(TaskDraft::new(location.id, TaskFields::new("Fix gate").urgent(true)))
            .await
            .unwrap();
        assert!(saved.reminder.is_none());
        assert_eq!(service.list_tasks(location.id).await.unwrap(), vec![saved.task]);
    }

    #[tokio::test]
    async fn disabled_reminders_skip_scheduling() {
        let (notifier, service) = setup();
        let service = service.with_reminders_enabled(false);
        let location = service.add_location("Yard").await.unwrap();
        let saved = service
            .save_task(TaskDraft::new(location.id, TaskFields::new("Fix gate").urgent(true)))
            .await
            .unwrap();
        assert!(saved.reminder.is_none());
        assert_eq!(notifier.permission_requests(), 0);
    }

    #[tokio::test]
    async fn save_under_unknown_location_fails() {
        let (_, service) = setup();
        let result = service
            .save_task(TaskDraft::new(LocationId::new(9), TaskFields::new("Orphan").urgent(true)))
            .await;
        assert!(matches!(
            result,
            Err(EngineError::Store(StoreError::ReferentialIntegrity(_)))
        ));
        assert!(service.reminders().pending().is_empty());
    }

    #[tokio::test]
    async fn update_of_missing_task_is_not_found() {
        let (_, service) = setup();
        let location = service.add_location("Yard").await.unwrap();
        let result = service
            .save_task(TaskDraft::existing(TaskId::new(5), location.id, TaskFields::new("Ghost")))
            .await;
        let err = result.unwrap_err();
        assert!(err.is_not_found(), "got: {err}");
        assert!(matches!(err, EngineError::Store(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn get_of_missing_task_is_store_not_found() {
        let (_, service) = setup();
        let err = service.get_task(TaskId::new(3)).await.unwrap_err();
        assert!(matches!(err, EngineError::Store(StoreError::NotFound(_))));
        assert_eq!(err.error_kind(), "not_found");
    }

    /// Grants permission only once the test opens the gate.
    struct GatedPermission {
        gate: Notify,
        delivered: AtomicUsize,
    }

    #[async_trait]
    impl Notifier for GatedPermission {
        async fn request_permission(&self) -> Result<bool, ReminderError> {
            self.gate.notified().await;
            Ok(true)
        }

        async fn deliver(&self, _notification: &ReminderNotification) -> Result<(), ReminderError> {
            let _ = self.delivered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn finish_during_permission_prompt_leaves_no_reminder() {
        let notifier = Arc::new(GatedPermission {
            gate: Notify::new(),
            delivered: AtomicUsize::new(0),
        });
        let scheduler = Arc::new(ReminderScheduler::new(notifier.clone()));
        let service = TaskService::new(Database::in_memory().unwrap(), scheduler, DELAY);
        let location = service.add_location("Yard").await.unwrap();

        let save = service.save_task(TaskDraft::new(
            location.id,
            TaskFields::new("Fix gate").urgent(true),
        ));
        let finish = async {
            tokio::task::yield_now().await;
            service.finish_task(TaskId::new(1)).await
        };
        let open_gate = async {
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            notifier.gate.notify_one();
        };
        let (saved, finished, ()) = tokio::join!(save, finish, open_gate);

        assert!(saved.unwrap().reminder.is_some());
        assert!(finished.unwrap());
        assert!(service.get_task(TaskId::new(1)).await.unwrap_err().is_not_found());
        assert!(service.reminders().pending().is_empty());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(notifier.delivered.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn update_under_wrong_location_is_rejected() {
        let (_, service) = setup();
        let a = service.add_location("A").await.unwrap();
        let b = service.add_location("B").await.unwrap();
        let saved = service
            .save_task(TaskDraft::new(a.id, TaskFields::new("t")))
            .await
            .unwrap();
        let result = service
            .save_task(TaskDraft::existing(saved.task.id, b.id, TaskFields::new("t2")))
            .await;
        assert!(matches!(result, Err(EngineError::LocationMismatch { .. })));
        assert_eq!(service.get_task(saved.task.id).await.unwrap().title, "t");
    }

    #[tokio::test]
    async fn blank_location_name_is_rejected() {
        let (_, service) = setup();
        let result = service.add_location("   ").await;
        assert!(matches!(result, Err(EngineError::Store(StoreError::Validation(_)))));
    }

    #[tokio::test]
    async fn location_name_lookup() {
        let (_, service) = setup();
        let location = service.add_location("Dock").await.unwrap();
        assert_eq!(service.location_name(location.id).await.unwrap().as_deref(), Some("Dock"));
        assert!(service.location_name(LocationId::new(99)).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn deleting_location_removes_tasks_and_reminders() {
        let (notifier, service) = setup();
        let location = service.add_location("Condemned").await.unwrap();
        let saved = service
            .save_task(TaskDraft::new(location.id, TaskFields::new("Board up").urgent(true)))
            .await
            .unwrap();

        assert!(service.delete_location(location.id).await.unwrap());
        assert!(service.list_locations().await.unwrap().is_empty());
        assert!(service.get_task(saved.task.id).await.unwrap_err().is_not_found());
        assert!(service.reminders().pending().is_empty());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(notifier.delivered().is_empty());
        assert!(!service.delete_location(location.id).await.unwrap());
    }
}
