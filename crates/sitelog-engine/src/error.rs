use sitelog_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("task {task} belongs to location {actual}, not {claimed}")]
    LocationMismatch {
        task: String,
        claimed: String,
        actual: String,
    },
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::NotFound(_)))
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Store(e) => e.error_kind(),
            Self::LocationMismatch { .. } => "location_mismatch",
        }
    }
}
