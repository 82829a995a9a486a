use rusqlite::params;
use tracing::{debug, instrument};

use sitelog_core::ids::{LocationId, TaskId};
use sitelog_core::model::{Task, TaskFields};
use sitelog_core::validation::require_text;

use crate::database::Database;
use crate::error::{is_foreign_key_violation, StoreError};
use crate::row_helpers;

const TASK_COLUMNS: &str = "id, location_id, title, description, is_urgent, image_uri";

pub struct TaskRepo {
    db: Database,
}

impl TaskRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// List the tasks of one location, oldest first.
    #[instrument(skip(self), fields(location_id = %location_id))]
    pub fn list_for_location(&self, location_id: LocationId) -> Result<Vec<Task>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE location_id = ?1 ORDER BY id ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([location_id.get()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_task(row)?);
            }
            Ok(results)
        })
    }

    /// Ids of every task under a location.
    #[instrument(skip(self), fields(location_id = %location_id))]
    pub fn ids_for_location(&self, location_id: LocationId) -> Result<Vec<TaskId>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM tasks WHERE location_id = ?1 ORDER BY id")?;
            let ids = stmt
                .query_map([location_id.get()], |row| row.get::<_, i64>(0))?
                .map(|r| r.map(TaskId::new))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    #[instrument(skip(self), fields(task_id = %id))]
    pub fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([id.get()])?;
            match rows.next()? {
                Some(row) => row_to_task(row).map(Some),
                None => Ok(None),
            }
        })
    }

    /// Insert a task under an existing location.
    #[instrument(skip(self, fields), fields(location_id = %location_id, urgent = fields.is_urgent))]
    pub fn create(&self, location_id: LocationId, fields: &TaskFields) -> Result<Task, StoreError> {
        require_text("task title", &fields.title)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tasks (location_id, title, description, is_urgent, image_uri)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    location_id.get(),
                    fields.title,
                    fields.description,
                    i64::from(fields.is_urgent),
                    fields.image_uri,
                ],
            )
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    StoreError::ReferentialIntegrity(format!("location {location_id} does not exist"))
                } else {
                    StoreError::from(e)
                }
            })?;

            let id = TaskId::new(conn.last_insert_rowid());
            debug!(task_id = %id, "task created");
            Ok(Task {
                id,
                location_id,
                title: fields.title.clone(),
                description: fields.description.clone(),
                is_urgent: fields.is_urgent,
                image_uri: fields.image_uri.clone(),
            })
        })
    }

    /// Overwrite the mutable fields of an existing task.
    /// A missing id is reported as `NotFound` rather than a silent no-op.
    #[instrument(skip(self, fields), fields(task_id = %id, urgent = fields.is_urgent))]
    pub fn update(&self, id: TaskId, fields: &TaskFields) -> Result<Task, StoreError> {
        require_text("task title", &fields.title)?;
        self.db.with_conn(|conn| {
            let affected = conn.execute(
                "UPDATE tasks SET title = ?1, description = ?2, is_urgent = ?3, image_uri = ?4
                 WHERE id = ?5",
                params![
                    fields.title,
                    fields.description,
                    i64::from(fields.is_urgent),
                    fields.image_uri,
                    id.get(),
                ],
            )?;
            if affected == 0 {
                return Err(StoreError::NotFound(format!("task {id}")));
            }

            let location_id: i64 =
                conn.query_row("SELECT location_id FROM tasks WHERE id = ?1", [id.get()], |row| {
                    row.get(0)
                })?;
            debug!(task_id = %id, "task updated");
            Ok(Task {
                id,
                location_id: LocationId::new(location_id),
                title: fields.title.clone(),
                description: fields.description.clone(),
                is_urgent: fields.is_urgent,
                image_uri: fields.image_uri.clone(),
            })
        })
    }

    /// Hard-delete a task. Returns `false` if it was already absent.
    #[instrument(skip(self), fields(task_id = %id))]
    pub fn delete(&self, id: TaskId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let affected = conn.execute("DELETE FROM tasks WHERE id = ?1", [id.get()])?;
            Ok(affected > 0)
        })
    }
}

fn row_to_task(row: &rusqlite::Row<'_>) -> Result<Task, StoreError> {
    let urgent: i64 = row_helpers::get(row, 4, "tasks", "is_urgent")?;
    Ok(Task {
        id: TaskId::new(row_helpers::get(row, 0, "tasks", "id")?),
        location_id: LocationId::new(row_helpers::get(row, 1, "tasks", "location_id")?),
        title: row_helpers::get(row, 2, "tasks", "title")?,
        description: row_helpers::get(row, 3, "tasks", "description")?,
        is_urgent: row_helpers::parse_flag(urgent, "tasks", "is_urgent")?,
        image_uri: row_helpers::get_opt(row, 5, "tasks", "image_uri")?,
    })
}
