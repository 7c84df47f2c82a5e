//! `PostgreSQL` adapters for the task store port.

mod clock;
mod migrations;
mod models;
mod schema;
mod store;

pub use clock::StoreClock;
pub use migrations::{MIGRATIONS, Migration, run_pending_migrations};
pub use store::{PostgresTaskStore, TaskPgPool};
