use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{LocationId, TaskId};

/// A named physical site under which tasks are grouped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
}

/// A work item belonging to exactly one location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub location_id: LocationId,
    pub title: String,
    pub description: String,
    pub is_urgent: bool,
    /// Opaque reference to an attached image. The file itself is not managed here.
    pub image_uri: Option<String>,
}

/// The mutable fields of a task, written on both insert and update.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFields {
    pub title: String,
    pub description: String,
    pub is_urgent: bool,
    pub image_uri: Option<String>,
}

impl TaskFields {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn urgent(mut self, is_urgent: bool) -> Self {
        self.is_urgent = is_urgent;
        self
    }

    pub fn image_uri(mut self, uri: Option<String>) -> Self {
        self.image_uri = uri;
        self
    }
}

impl Task {
    pub fn fields(&self) -> TaskFields {
        TaskFields {
            title: self.title.clone(),
            description: self.description.clone(),
            is_urgent: self.is_urgent,
            image_uri: self.image_uri.clone(),
        }
    }
}

/// What a task form submits: no `id` means insert, an `id` means update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub id: Option<TaskId>,
    pub location_id: LocationId,
    pub fields: TaskFields,
    /// Explicit reminder time for urgent tasks; falls back to the configured delay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remind_at: Option<DateTime<Utc>>,
}

impl TaskDraft {
    pub fn new(location_id: LocationId, fields: TaskFields) -> Self {
        Self {
            id: None,
            location_id,
            fields,
            remind_at: None,
        }
    }

    pub fn existing(id: TaskId, location_id: LocationId, fields: TaskFields) -> Self {
        Self {
            id: Some(id),
            location_id,
            fields,
            remind_at: None,
        }
    }

    pub fn remind_at(mut self, at: DateTime<Utc>) -> Self {
        self.remind_at = Some(at);
        self
    }
}
