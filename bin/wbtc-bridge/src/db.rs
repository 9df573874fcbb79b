use std::path::Path;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;
use wbtc_bridge_db::persistent::{SqliteDb, MIGRATOR};

use crate::constants::DB_FILE;

/// Opens (creating if needed) the sqlite database and applies migrations.
pub(crate) async fn open_sqlite(datadir: &Path) -> anyhow::Result<SqliteDb> {
    let path = datadir.join(DB_FILE);

    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .with_context(|| format!("could not open database at {}", path.display()))?;

    MIGRATOR
        .run(&pool)
        .await
        .context("could not apply database migrations")?;

    info!(path = %path.display(), "database ready");

    Ok(SqliteDb::new(pool))
}
