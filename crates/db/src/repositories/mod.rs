use async_trait::async_trait;
use thiserror::Error;

use trusty_core::domain::agent::{Agent, AgentId};
use trusty_core::domain::transaction::{Transaction, TransactionId};
use trusty_core::domain::user::{User, UserId};

pub mod agent;
pub mod memory;
pub mod step;
pub mod transaction;
pub mod user;

pub use agent::SqlAgentRepository;
pub use memory::{
    InMemoryAgentRepository, InMemoryLifecycleStepStore, InMemoryTransactionRepository,
    InMemoryUserRepository,
};
pub use step::SqlLifecycleStepStore;
pub use transaction::SqlTransactionRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("uniqueness violation: {0}")]
    Conflict(String),
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError>;
    async fn save(&self, user: User) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn find_by_id(&self, id: &AgentId) -> Result<Option<Agent>, RepositoryError>;
    /// Persists the whole agent row in one statement so a state and the data
    /// attached by its transition become durable together.
    async fn save(&self, agent: Agent) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn find_by_id(&self, id: &TransactionId) -> Result<Option<Transaction>, RepositoryError>;
    async fn latest_for_agent(&self, agent_id: &AgentId)
        -> Result<Option<Transaction>, RepositoryError>;
    async fn save(&self, transaction: Transaction) -> Result<(), RepositoryError>;
}

/// Persists a lifecycle step that touches both aggregates at once: the agent
/// after its transition and the transaction the transition produced. Either
/// both rows land or neither does.
#[async_trait]
pub trait LifecycleStepStore: Send + Sync {
    async fn save_step(
        &self,
        agent: Agent,
        transaction: Transaction,
    ) -> Result<(), RepositoryError>;
}
