pub mod sqlite;

pub use sqlite::SqliteDb;

/// Embedded schema migrations for the sqlite backend.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();
