use trusty_core::domain::agent::Agent;
use trusty_core::domain::transaction::Transaction;

use super::agent::upsert_agent;
use super::transaction::upsert_transaction;
use super::{LifecycleStepStore, RepositoryError};
use crate::DbPool;

/// Runs both upserts inside one database transaction so a crash between them
/// cannot leave the agent row and its transaction row disagreeing.
pub struct SqlLifecycleStepStore {
    pool: DbPool,
}

impl SqlLifecycleStepStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl LifecycleStepStore for SqlLifecycleStepStore {
    async fn save_step(
        &self,
        agent: Agent,
        transaction: Transaction,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        upsert_agent(&mut *tx, &agent).await?;
        upsert_transaction(&mut *tx, &transaction).await?;
        tx.commit().await?;
        Ok(())
    }
}
