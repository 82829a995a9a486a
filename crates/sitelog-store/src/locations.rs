use rusqlite::OptionalExtension;
use tracing::{debug, instrument};

use sitelog_core::ids::LocationId;
use sitelog_core::model::Location;
use sitelog_core::validation::require_text;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

pub struct LocationRepo {
    db: Database,
}

impl LocationRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// List all locations in insertion order.
    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<Location>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name FROM locations ORDER BY id ASC")?;
            let mut rows = stmt.query([])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_location(row)?);
            }
            Ok(results)
        })
    }

    /// Add a location. The name is trimmed and must not be blank.
    #[instrument(skip(self))]
    pub fn add(&self, name: &str) -> Result<Location, StoreError> {
        let name = require_text("location name", name)?;
        self.db.with_conn(|conn| {
            conn.execute("INSERT INTO locations (name) VALUES (?1)", [name])?;
            let id = LocationId::new(conn.last_insert_rowid());
            debug!(location_id = %id, "location added");
            Ok(Location {
                id,
                name: name.to_string(),
            })
        })
    }

    #[instrument(skip(self), fields(location_id = %id))]
    pub fn get(&self, id: LocationId) -> Result<Option<Location>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name FROM locations WHERE id = ?1")?;
            let mut rows = stmt.query([id.get()])?;
            match rows.next()? {
                Some(row) => row_to_location(row).map(Some),
                None => Ok(None),
            }
        })
    }

    /// The display name of a location, or `None` if it does not exist.
    #[instrument(skip(self), fields(location_id = %id))]
    pub fn name(&self, id: LocationId) -> Result<Option<String>, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT name FROM locations WHERE id = ?1",
                [id.get()],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)
        })
    }

    /// Delete a location and, through the foreign key cascade, all of its tasks.
    /// Returns `false` if the location was already absent.
    #[instrument(skip(self), fields(location_id = %id))]
    pub fn delete(&self, id: LocationId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let affected = conn.execute("DELETE FROM locations WHERE id = ?1", [id.get()])?;
            Ok(affected > 0)
        })
    }
}

fn row_to_location(row: &rusqlite::Row<'_>) -> Result<Location, StoreError> {
    Ok(Location {
        id: LocationId::new(row_helpers::get(row, 0, "locations", "id")?),
        name: row_helpers::get(row, 1, "locations", "name")?,
    })
}
