use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReminderError {
    /// The platform refused notification permission for this process.
    #[error("notification permission denied")]
    PermissionDenied,

    #[error("permission request failed: {0}")]
    Permission(String),

    #[error("delivery failed: {0}")]
    Delivery(String),
}
