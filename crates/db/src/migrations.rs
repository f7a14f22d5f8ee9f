use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Rows in sqlx's bookkeeping table; zero on a database that has never been
/// migrated, where the table itself does not exist yet.
pub async fn applied_count(pool: &DbPool) -> u64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .ok()
        .and_then(|count| u64::try_from(count).ok())
        .unwrap_or(0)
}
