use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use uuid::Uuid;

use trusty_core::domain::user::{User, UserId};

use super::{RepositoryError, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, username, email, password_hash, wallet_address, created_at
             FROM users
             WHERE id = ?",
        )
        .bind(id.0.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(user_from_row).transpose()
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, username, email, password_hash, wallet_address, created_at
             FROM users
             WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.map(user_from_row).transpose()
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, wallet_address, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                password_hash = excluded.password_hash,
                wallet_address = excluded.wallet_address",
        )
        .bind(user.id.0.to_string())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.wallet_address)
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                Err(RepositoryError::Conflict(format!(
                    "username `{}` already registered",
                    user.username
                )))
            }
            Err(error) => Err(error.into()),
        }
    }
}

fn user_from_row(row: SqliteRow) -> Result<User, RepositoryError> {
    Ok(User {
        id: UserId(parse_uuid(row.try_get("id")?)?),
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        wallet_address: row.try_get("wallet_address")?,
        created_at: parse_timestamp(row.try_get("created_at")?)?,
    })
}

pub(crate) fn parse_uuid(value: String) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(&value).map_err(|error| RepositoryError::Decode(format!("uuid: {error}")))
}

pub(crate) fn parse_timestamp(value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("timestamp: {error}")))
}
