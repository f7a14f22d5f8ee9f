use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use trusty_core::domain::agent::{Agent, AgentId};
use trusty_core::domain::transaction::{Transaction, TransactionId};
use trusty_core::domain::user::{User, UserId};

use super::{
    AgentRepository, LifecycleStepStore, RepositoryError, TransactionRepository, UserRepository,
};

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<UserId, User>>,
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.values().find(|user| user.username == username).cloned())
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        let duplicate = users
            .values()
            .any(|existing| existing.username == user.username && existing.id != user.id);
        if duplicate {
            return Err(RepositoryError::Conflict(format!(
                "username `{}` already registered",
                user.username
            )));
        }
        users.insert(user.id, user);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAgentRepository {
    agents: RwLock<HashMap<AgentId, Agent>>,
}

#[async_trait::async_trait]
impl AgentRepository for InMemoryAgentRepository {
    async fn find_by_id(&self, id: &AgentId) -> Result<Option<Agent>, RepositoryError> {
        let agents = self.agents.read().await;
        Ok(agents.get(id).cloned())
    }

    async fn save(&self, agent: Agent) -> Result<(), RepositoryError> {
        let mut agents = self.agents.write().await;
        agents.insert(agent.id, agent);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryTransactionRepository {
    transactions: RwLock<HashMap<TransactionId, Transaction>>,
}

impl InMemoryTransactionRepository {
    pub async fn count_for_agent(&self, agent_id: &AgentId) -> usize {
        let transactions = self.transactions.read().await;
        transactions.values().filter(|tx| tx.agent_id == *agent_id).count()
    }
}

#[async_trait::async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn find_by_id(&self, id: &TransactionId) -> Result<Option<Transaction>, RepositoryError> {
        let transactions = self.transactions.read().await;
        Ok(transactions.get(id).cloned())
    }

    async fn latest_for_agent(
        &self,
        agent_id: &AgentId,
    ) -> Result<Option<Transaction>, RepositoryError> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .values()
            .filter(|tx| tx.agent_id == *agent_id)
            .max_by_key(|tx| tx.created_at)
            .cloned())
    }

    async fn save(&self, transaction: Transaction) -> Result<(), RepositoryError> {
        let mut transactions = self.transactions.write().await;
        transactions.insert(transaction.id, transaction);
        Ok(())
    }
}

/// In-memory stand-in for the transactional step store. The two map writes
/// cannot fail halfway, so plain delegation preserves the all-or-nothing
/// contract.
pub struct InMemoryLifecycleStepStore {
    agents: Arc<InMemoryAgentRepository>,
    transactions: Arc<InMemoryTransactionRepository>,
}

impl InMemoryLifecycleStepStore {
    pub fn new(
        agents: Arc<InMemoryAgentRepository>,
        transactions: Arc<InMemoryTransactionRepository>,
    ) -> Self {
        Self { agents, transactions }
    }
}

#[async_trait::async_trait]
impl LifecycleStepStore for InMemoryLifecycleStepStore {
    async fn save_step(
        &self,
        agent: Agent,
        transaction: Transaction,
    ) -> Result<(), RepositoryError> {
        self.agents.save(agent).await?;
        self.transactions.save(transaction).await?;
        Ok(())
    }
}
