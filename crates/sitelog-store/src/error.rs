use sitelog_core::validation::BlankField;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("referential integrity: {0}")]
    ReferentialIntegrity(String),

    /// The engine could not open the file or run a statement.
    #[error("database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("corrupt row in {table}.{column}: {detail}")]
    CorruptRow {
        table: &'static str,
        column: &'static str,
        detail: String,
    },
}

impl StoreError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::ReferentialIntegrity(_) => "referential_integrity",
            Self::Database(_) => "storage_unavailable",
            Self::Io(_) => "io",
            Self::CorruptRow { .. } => "corrupt_row",
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<BlankField> for StoreError {
    fn from(e: BlankField) -> Self {
        StoreError::Validation(e.to_string())
    }
}

/// True if `e` is a foreign key violation reported by SQLite.
pub(crate) fn is_foreign_key_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}
