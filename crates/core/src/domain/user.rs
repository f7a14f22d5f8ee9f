use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Registered account. Immutable after registration apart from credential
/// rotation, which is out of scope for the coordinator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    /// Argon2id PHC string, never the raw password.
    pub password_hash: String,
    /// Ledger wallet address derived at registration.
    pub wallet_address: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
        wallet_address: impl Into<String>,
    ) -> Self {
        Self {
            id: UserId::generate(),
            username: username.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            wallet_address: wallet_address.into(),
            created_at: Utc::now(),
        }
    }
}
