use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use trusty_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// SQLite tuning for the coordinator's access pattern: WAL keeps status
/// reads from queueing behind lifecycle writes, foreign keys guard the
/// user -> agent -> transaction chain, and the busy timeout covers short
/// writer contention between the API and a spawned shopping task.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens the pool described by the `[database]` config section.
pub async fn connect(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .connect_with(options)
        .await
}
