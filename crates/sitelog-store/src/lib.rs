pub mod database;
pub mod error;
pub mod locations;
pub mod row_helpers;
pub mod schema;
pub mod tasks;

pub use database::Database;
pub use error::StoreError;
pub use locations::LocationRepo;
pub use tasks::TaskRepo;
