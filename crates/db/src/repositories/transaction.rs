use sqlx::{sqlite::SqliteRow, Row};

use trusty_core::domain::agent::AgentId;
use trusty_core::domain::transaction::{Transaction, TransactionId, TransactionStatus};

use super::agent::parse_decimal;
use super::user::{parse_timestamp, parse_uuid};
use super::{RepositoryError, TransactionRepository};
use crate::DbPool;

pub struct SqlTransactionRepository {
    pool: DbPool,
}

impl SqlTransactionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const SELECT_COLUMNS: &str = "SELECT
    id,
    agent_id,
    amount,
    merchant,
    merchant_wallet,
    market_average_price,
    status,
    transfer_hash,
    rejection_reason,
    created_at,
    verified_at
 FROM transactions";

#[async_trait::async_trait]
impl TransactionRepository for SqlTransactionRepository {
    async fn find_by_id(&self, id: &TransactionId) -> Result<Option<Transaction>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id.0.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(transaction_from_row).transpose()
    }

    async fn latest_for_agent(
        &self,
        agent_id: &AgentId,
    ) -> Result<Option<Transaction>, RepositoryError> {
        let row = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE agent_id = ? ORDER BY created_at DESC, id DESC LIMIT 1"
        ))
        .bind(agent_id.0.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(transaction_from_row).transpose()
    }

    async fn save(&self, transaction: Transaction) -> Result<(), RepositoryError> {
        upsert_transaction(&self.pool, &transaction).await
    }
}

/// Counterpart of `upsert_agent`: one upsert per transaction row, usable
/// standalone or inside a lifecycle step.
pub(crate) async fn upsert_transaction<'e, E>(
    executor: E,
    transaction: &Transaction,
) -> Result<(), RepositoryError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO transactions (
            id,
            agent_id,
            amount,
            merchant,
            merchant_wallet,
            market_average_price,
            status,
            transfer_hash,
            rejection_reason,
            created_at,
            verified_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            status = excluded.status,
            transfer_hash = excluded.transfer_hash,
            rejection_reason = excluded.rejection_reason,
            verified_at = excluded.verified_at",
    )
    .bind(transaction.id.0.to_string())
    .bind(transaction.agent_id.0.to_string())
    .bind(transaction.amount.to_string())
    .bind(&transaction.merchant)
    .bind(&transaction.merchant_wallet)
    .bind(transaction.market_average_price.map(|price| price.to_string()))
    .bind(transaction.status.as_str())
    .bind(&transaction.transfer_hash)
    .bind(&transaction.rejection_reason)
    .bind(transaction.created_at.to_rfc3339())
    .bind(transaction.verified_at.map(|at| at.to_rfc3339()))
    .execute(executor)
    .await?;

    Ok(())
}

fn transaction_from_row(row: SqliteRow) -> Result<Transaction, RepositoryError> {
    let status_raw: String = row.try_get("status")?;
    let status = TransactionStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown transaction status `{status_raw}`"))
    })?;

    Ok(Transaction {
        id: TransactionId(parse_uuid(row.try_get("id")?)?),
        agent_id: AgentId(parse_uuid(row.try_get("agent_id")?)?),
        amount: parse_decimal(row.try_get("amount")?)?,
        merchant: row.try_get("merchant")?,
        merchant_wallet: row.try_get("merchant_wallet")?,
        market_average_price: row
            .try_get::<Option<String>, _>("market_average_price")?
            .map(parse_decimal)
            .transpose()?,
        status,
        transfer_hash: row.try_get("transfer_hash")?,
        rejection_reason: row.try_get("rejection_reason")?,
        created_at: parse_timestamp(row.try_get("created_at")?)?,
        verified_at: row
            .try_get::<Option<String>, _>("verified_at")?
            .map(parse_timestamp)
            .transpose()?,
    })
}
