use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use trusty_core::domain::agent::{Agent, AgentId, AgentState};
use trusty_core::domain::constraint::{ConstraintSet, ConstraintSource};
use trusty_core::domain::transaction::TransactionId;
use trusty_core::domain::user::UserId;

use super::user::{parse_timestamp, parse_uuid};
use super::{AgentRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAgentRepository {
    pool: DbPool,
}

impl SqlAgentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AgentRepository for SqlAgentRepository {
    async fn find_by_id(&self, id: &AgentId) -> Result<Option<Agent>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                user_id,
                state,
                constraints_json,
                constraint_source,
                max_budget,
                allowed_merchants_json,
                wallet_address,
                trust_score,
                failure_reason,
                latest_transaction_id,
                created_at,
                updated_at
             FROM agents
             WHERE id = ?",
        )
        .bind(id.0.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(agent_from_row).transpose()
    }

    async fn save(&self, agent: Agent) -> Result<(), RepositoryError> {
        upsert_agent(&self.pool, &agent).await
    }
}

/// Writes the whole agent row in one upsert. Takes any executor so the same
/// statement serves both the standalone save and a multi-row lifecycle step.
pub(crate) async fn upsert_agent<'e, E>(executor: E, agent: &Agent) -> Result<(), RepositoryError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let constraints_json = agent
        .constraints
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|error| RepositoryError::Decode(format!("constraints: {error}")))?;
    let merchants_json = serde_json::to_string(&agent.allowed_merchants)
        .map_err(|error| RepositoryError::Decode(format!("allowed_merchants: {error}")))?;

    sqlx::query(
        "INSERT INTO agents (
            id,
            user_id,
            state,
            constraints_json,
            constraint_source,
            max_budget,
            allowed_merchants_json,
            wallet_address,
            trust_score,
            failure_reason,
            latest_transaction_id,
            created_at,
            updated_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            state = excluded.state,
            constraints_json = excluded.constraints_json,
            constraint_source = excluded.constraint_source,
            max_budget = excluded.max_budget,
            allowed_merchants_json = excluded.allowed_merchants_json,
            wallet_address = excluded.wallet_address,
            trust_score = excluded.trust_score,
            failure_reason = excluded.failure_reason,
            latest_transaction_id = excluded.latest_transaction_id,
            updated_at = excluded.updated_at",
    )
    .bind(agent.id.0.to_string())
    .bind(agent.user_id.0.to_string())
    .bind(agent.state.as_str())
    .bind(constraints_json)
    .bind(agent.constraint_source.map(|source| source.as_str()))
    .bind(agent.max_budget.to_string())
    .bind(merchants_json)
    .bind(&agent.wallet_address)
    .bind(agent.trust_score)
    .bind(&agent.failure_reason)
    .bind(agent.latest_transaction_id.map(|id| id.0.to_string()))
    .bind(agent.created_at.to_rfc3339())
    .bind(agent.updated_at.to_rfc3339())
    .execute(executor)
    .await?;

    Ok(())
}

fn agent_from_row(row: SqliteRow) -> Result<Agent, RepositoryError> {
    let state_raw: String = row.try_get("state")?;
    let state = AgentState::parse(&state_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown agent state `{state_raw}`")))?;

    let constraints = row
        .try_get::<Option<String>, _>("constraints_json")?
        .map(|raw| {
            serde_json::from_str::<ConstraintSet>(&raw)
                .map_err(|error| RepositoryError::Decode(format!("constraints: {error}")))
        })
        .transpose()?;

    let constraint_source = row
        .try_get::<Option<String>, _>("constraint_source")?
        .map(|raw| {
            ConstraintSource::parse(&raw).ok_or_else(|| {
                RepositoryError::Decode(format!("unknown constraint source `{raw}`"))
            })
        })
        .transpose()?;

    let allowed_merchants: Vec<String> =
        serde_json::from_str(&row.try_get::<String, _>("allowed_merchants_json")?)
            .map_err(|error| RepositoryError::Decode(format!("allowed_merchants: {error}")))?;

    Ok(Agent {
        id: AgentId(parse_uuid(row.try_get("id")?)?),
        user_id: UserId(parse_uuid(row.try_get("user_id")?)?),
        state,
        constraints,
        constraint_source,
        max_budget: parse_decimal(row.try_get("max_budget")?)?,
        allowed_merchants,
        wallet_address: row.try_get("wallet_address")?,
        trust_score: row.try_get("trust_score")?,
        failure_reason: row.try_get("failure_reason")?,
        latest_transaction_id: row
            .try_get::<Option<String>, _>("latest_transaction_id")?
            .map(|raw| parse_uuid(raw).map(TransactionId))
            .transpose()?,
        created_at: parse_timestamp(row.try_get("created_at")?)?,
        updated_at: parse_timestamp(row.try_get("updated_at")?)?,
    })
}

pub(crate) fn parse_decimal(value: String) -> Result<Decimal, RepositoryError> {
    value.parse().map_err(|error| RepositoryError::Decode(format!("decimal: {error}")))
}
