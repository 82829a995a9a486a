pub mod error;
pub mod service;

pub use error::EngineError;
pub use service::{SaveOutcome, TaskService};
