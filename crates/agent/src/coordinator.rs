//! The Agent Task Coordinator owns every lifecycle transition of a shopping
//! task. Operations on the same agent are serialized through a per-agent
//! lock (single-writer invariant); agents share nothing else, so cross-agent
//! operations need no coordination.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use trusty_core::domain::agent::{Agent, AgentId, AgentState};
use trusty_core::domain::constraint::{ConstraintSet, ConstraintSource};
use trusty_core::domain::transaction::{Transaction, TransactionId, TransactionStatus};
use trusty_core::domain::user::UserId;
use trusty_core::errors::{ApplicationError, DomainError};
use trusty_core::lifecycle::{self, LifecycleEvent};
use trusty_core::trust::{self, TrustEvent};
use trusty_db::repositories::{
    AgentRepository, LifecycleStepStore, RepositoryError, TransactionRepository, UserRepository,
};

use crate::extractor::ConstraintExtractor;
use crate::shopper::{self, OfferSource};
use crate::verifier::{TransactionVerifier, Verdict};
use crate::wallet::WalletService;

pub const DEFAULT_MAX_BUDGET: Decimal = Decimal::from_parts(1_000, 0, 0, false, 0);

#[derive(Clone, Debug, Serialize)]
pub struct ShopAck {
    pub agent_id: AgentId,
    pub task_id: Uuid,
    pub state: AgentState,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransactionView {
    pub id: TransactionId,
    pub amount: Decimal,
    pub merchant: String,
    pub status: TransactionStatus,
    pub transfer_hash: Option<String>,
    pub rejection_reason: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AgentStatusView {
    pub agent_id: AgentId,
    pub state: AgentState,
    pub trust_score: i32,
    pub constraint_source: Option<ConstraintSource>,
    pub failure_reason: Option<String>,
    pub transaction: Option<TransactionView>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum VerifyOutcome {
    Executed { transaction_id: TransactionId, transfer_hash: String },
    Rejected { transaction_id: TransactionId, reason: String },
}

type LockMap = Arc<Mutex<HashMap<AgentId, Arc<Mutex<()>>>>>;
type TaskMap = Arc<Mutex<HashMap<AgentId, JoinHandle<()>>>>;

pub struct AgentTaskCoordinator {
    users: Arc<dyn UserRepository>,
    agents: Arc<dyn AgentRepository>,
    transactions: Arc<dyn TransactionRepository>,
    steps: Arc<dyn LifecycleStepStore>,
    extractor: Arc<dyn ConstraintExtractor>,
    verifier: Arc<dyn TransactionVerifier>,
    wallet: Arc<dyn WalletService>,
    offers: Arc<dyn OfferSource>,
    // Entries live only while an agent is active; `release` and the shopping
    // task drop them once the agent reaches a terminal state.
    locks: LockMap,
    tasks: TaskMap,
}

impl AgentTaskCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        users: Arc<dyn UserRepository>,
        agents: Arc<dyn AgentRepository>,
        transactions: Arc<dyn TransactionRepository>,
        steps: Arc<dyn LifecycleStepStore>,
        extractor: Arc<dyn ConstraintExtractor>,
        verifier: Arc<dyn TransactionVerifier>,
        wallet: Arc<dyn WalletService>,
        offers: Arc<dyn OfferSource>,
    ) -> Self {
        Self {
            users,
            agents,
            transactions,
            steps,
            extractor,
            verifier,
            wallet,
            offers,
            locks: Arc::new(Mutex::new(HashMap::new())),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create an agent for the user and resolve its constraint set from the
    /// free-text requirements. Extraction failure is absorbed: the agent
    /// still reaches `ConstraintsResolved`, carrying the fallback set.
    pub async fn setup(
        &self,
        user_id: UserId,
        requirements: &str,
        max_budget: Option<Decimal>,
    ) -> Result<Agent, ApplicationError> {
        let user = self
            .users
            .find_by_id(&user_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| ApplicationError::NotFound(format!("user {user_id}")))?;

        let mut agent =
            Agent::new(user.id, max_budget.unwrap_or(DEFAULT_MAX_BUDGET), user.wallet_address);

        let (constraints, source) = match self.extractor.extract(requirements).await {
            Ok(set) => (set, ConstraintSource::Extracted),
            Err(error) => {
                tracing::warn!(
                    agent_id = %agent.id,
                    error = %error,
                    "constraint extraction failed, using fallback set"
                );
                (ConstraintSet::fallback(), ConstraintSource::Fallback)
            }
        };

        agent.attach_constraints(constraints, source).map_err(ApplicationError::from)?;
        self.agents.save(agent.clone()).await.map_err(persistence)?;

        tracing::info!(
            agent_id = %agent.id,
            constraint_source = source.as_str(),
            "agent setup complete"
        );
        Ok(agent)
    }

    /// Begin shopping. Moves the agent to `Shopping` and spawns the candidate
    /// selection as an awaitable, cancellable unit of work; clients poll
    /// `status` while it runs. Fails with an invalid-transition error unless
    /// the agent is in `ConstraintsResolved`.
    pub async fn shop(
        &self,
        user_id: UserId,
        agent_id: AgentId,
    ) -> Result<ShopAck, ApplicationError> {
        let lock = self.lock_for(agent_id).await;
        let _guard = lock.lock().await;

        let mut agent = self.load_owned_agent(user_id, agent_id).await?;
        let outcome = lifecycle::apply(agent.state, &LifecycleEvent::ShoppingStarted)
            .map_err(|error| ApplicationError::Domain(error.into()))?;
        agent.transition_to(outcome.to).map_err(ApplicationError::from)?;
        self.agents.save(agent.clone()).await.map_err(persistence)?;

        let task_id = Uuid::new_v4();
        let handle = tokio::spawn(run_shopping_task(
            self.agents.clone(),
            self.steps.clone(),
            self.offers.clone(),
            lock.clone(),
            self.locks.clone(),
            self.tasks.clone(),
            agent_id,
        ));
        self.tasks.lock().await.insert(agent_id, handle);

        tracing::info!(agent_id = %agent_id, task_id = %task_id, "shopping task started");
        Ok(ShopAck { agent_id, task_id, state: agent.state })
    }

    /// Wait for the agent's in-flight shopping task, if any. Aborted tasks
    /// count as finished.
    pub async fn await_shopping(&self, agent_id: AgentId) -> Result<(), ApplicationError> {
        let handle = self.tasks.lock().await.remove(&agent_id);
        if let Some(handle) = handle {
            if let Err(error) = handle.await {
                if !error.is_cancelled() {
                    return Err(ApplicationError::Integration(format!(
                        "shopping task failed: {error}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Abort the in-flight shopping task and fault the agent if it was still
    /// shopping.
    pub async fn cancel_shopping(
        &self,
        user_id: UserId,
        agent_id: AgentId,
    ) -> Result<(), ApplicationError> {
        let handle = self.tasks.lock().await.remove(&agent_id);
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }

        let lock = self.lock_for(agent_id).await;
        let _guard = lock.lock().await;

        let mut agent = self.load_owned_agent(user_id, agent_id).await?;
        if agent.state == AgentState::Shopping {
            let outcome = lifecycle::apply(agent.state, &LifecycleEvent::TaskFaulted)
                .map_err(|error| ApplicationError::Domain(error.into()))?;
            agent.transition_to(outcome.to).map_err(ApplicationError::from)?;
            agent.failure_reason = Some("shopping cancelled".to_string());
            self.agents.save(agent.clone()).await.map_err(persistence)?;
            tracing::info!(agent_id = %agent_id, "shopping task cancelled");
        }
        drop(_guard);
        if agent.state.is_terminal() {
            self.release(agent_id).await;
        }
        Ok(())
    }

    /// Read-only lifecycle snapshot. Repeated reads after a terminal state
    /// return the same transaction id.
    pub async fn status(
        &self,
        user_id: UserId,
        agent_id: AgentId,
    ) -> Result<AgentStatusView, ApplicationError> {
        let agent = self.load_owned_agent(user_id, agent_id).await?;

        let transaction = match agent.latest_transaction_id {
            Some(id) => self.transactions.find_by_id(&id).await.map_err(persistence)?,
            None => None,
        };

        Ok(AgentStatusView {
            agent_id: agent.id,
            state: agent.state,
            trust_score: agent.trust_score,
            constraint_source: agent.constraint_source,
            failure_reason: agent.failure_reason,
            transaction: transaction.map(transaction_view),
        })
    }

    /// Verify a proposed transaction exactly once. Approval executes the
    /// ledger transfer and completes the agent; rejection or a verifier
    /// failure fails the agent. No automatic retry on either path.
    pub async fn verify(
        &self,
        user_id: UserId,
        transaction_id: TransactionId,
    ) -> Result<VerifyOutcome, ApplicationError> {
        let agent_id = self
            .transactions
            .find_by_id(&transaction_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| ApplicationError::NotFound(format!("transaction {transaction_id}")))?
            .agent_id;

        let lock = self.lock_for(agent_id).await;
        let _guard = lock.lock().await;

        // Reload under the lock so a concurrent verification cannot slip in.
        let mut transaction = self
            .transactions
            .find_by_id(&transaction_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| ApplicationError::NotFound(format!("transaction {transaction_id}")))?;
        let mut agent = self.load_owned_agent(user_id, agent_id).await?;

        if transaction.status.is_verified() || agent.state != AgentState::AwaitingVerification {
            let detail = if transaction.status.is_verified() {
                format!("transaction {transaction_id} already verified")
            } else {
                format!("agent {agent_id} is not awaiting verification")
            };
            // `lock_for` above re-created bookkeeping for a finished agent.
            if agent.state.is_terminal() {
                drop(_guard);
                self.release(agent_id).await;
            }
            return Err(ApplicationError::Domain(DomainError::InvariantViolation(detail)));
        }

        match self.verifier.verify(&agent, &transaction).await {
            Ok(Verdict::Approved) => {
                let outcome = lifecycle::apply(agent.state, &LifecycleEvent::VerificationAccepted)
                    .map_err(|error| ApplicationError::Domain(error.into()))?;

                let transfer_hash = self
                    .wallet
                    .execute_transfer(
                        &agent.wallet_address,
                        &transaction.merchant_wallet,
                        transaction.amount,
                    )
                    .await
                    .map_err(|error| ApplicationError::Integration(error.to_string()))?;

                transaction.mark_approved().map_err(ApplicationError::from)?;
                transaction.mark_executed(transfer_hash.clone()).map_err(ApplicationError::from)?;

                agent.transition_to(outcome.to).map_err(ApplicationError::from)?;
                agent.trust_score =
                    trust::apply_event(agent.trust_score, TrustEvent::SuccessfulTransaction);
                if transaction.savings_percentage().is_some_and(|s| s > Decimal::ZERO) {
                    agent.trust_score =
                        trust::apply_event(agent.trust_score, TrustEvent::PriceSaving);
                }
                self.steps
                    .save_step(agent, transaction.clone())
                    .await
                    .map_err(persistence)?;
                self.release(agent_id).await;

                tracing::info!(
                    agent_id = %agent_id,
                    transaction_id = %transaction_id,
                    transfer_hash = %transfer_hash,
                    "transaction executed"
                );
                Ok(VerifyOutcome::Executed { transaction_id, transfer_hash })
            }
            Ok(Verdict::Rejected { reason }) => {
                self.fail_verification(&mut agent, &mut transaction, &reason).await?;
                tracing::warn!(
                    agent_id = %agent_id,
                    transaction_id = %transaction_id,
                    reason = %reason,
                    "transaction rejected"
                );
                Ok(VerifyOutcome::Rejected { transaction_id, reason })
            }
            Err(error) => {
                // Verifier failure is surfaced, never absorbed.
                let reason = format!("verification failure: {error}");
                self.fail_verification(&mut agent, &mut transaction, &reason).await?;
                tracing::error!(
                    agent_id = %agent_id,
                    transaction_id = %transaction_id,
                    error = %error,
                    "transaction verifier failed"
                );
                Err(ApplicationError::Verification(reason))
            }
        }
    }

    async fn fail_verification(
        &self,
        agent: &mut Agent,
        transaction: &mut Transaction,
        reason: &str,
    ) -> Result<(), ApplicationError> {
        let outcome = lifecycle::apply(agent.state, &LifecycleEvent::VerificationRejected)
            .map_err(|error| ApplicationError::Domain(error.into()))?;

        transaction.mark_rejected(reason).map_err(ApplicationError::from)?;
        agent.transition_to(outcome.to).map_err(ApplicationError::from)?;
        agent.failure_reason = Some(reason.to_string());
        agent.trust_score = trust::apply_event(agent.trust_score, TrustEvent::FailedTransaction);
        self.steps
            .save_step(agent.clone(), transaction.clone())
            .await
            .map_err(persistence)?;
        self.release(agent.id).await;
        Ok(())
    }

    async fn lock_for(&self, agent_id: AgentId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(agent_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Drops the per-agent bookkeeping once the agent can no longer change.
    async fn release(&self, agent_id: AgentId) {
        self.locks.lock().await.remove(&agent_id);
        if let Some(handle) = self.tasks.lock().await.remove(&agent_id) {
            handle.abort();
        }
    }

    async fn load_owned_agent(
        &self,
        user_id: UserId,
        agent_id: AgentId,
    ) -> Result<Agent, ApplicationError> {
        let agent = self
            .agents
            .find_by_id(&agent_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| ApplicationError::NotFound(format!("agent {agent_id}")))?;
        if agent.user_id != user_id {
            return Err(ApplicationError::Unauthorized(format!(
                "agent {agent_id} does not belong to the caller"
            )));
        }
        Ok(agent)
    }
}

/// Body of the spawned shopping task. Takes the per-agent lock so the
/// candidate-selection transition is serialized against any concurrent
/// operation on the same agent, and drops its own bookkeeping entries when
/// the step left the agent in a terminal state.
async fn run_shopping_task(
    agents: Arc<dyn AgentRepository>,
    steps: Arc<dyn LifecycleStepStore>,
    offers: Arc<dyn OfferSource>,
    lock: Arc<Mutex<()>>,
    locks: LockMap,
    tasks: TaskMap,
    agent_id: AgentId,
) {
    let guard = lock.lock().await;
    match advance_shopping(&agents, &steps, &offers, agent_id).await {
        Ok(Some(state)) if state.is_terminal() => {
            drop(guard);
            locks.lock().await.remove(&agent_id);
            tasks.lock().await.remove(&agent_id);
        }
        Ok(_) => {}
        Err(error) => {
            tracing::error!(agent_id = %agent_id, error = %error, "shopping task error");
        }
    }
}

/// Returns the state the agent was left in, or `None` when the step was
/// skipped because the agent was gone or no longer shopping.
async fn advance_shopping(
    agents: &Arc<dyn AgentRepository>,
    steps: &Arc<dyn LifecycleStepStore>,
    offers: &Arc<dyn OfferSource>,
    agent_id: AgentId,
) -> Result<Option<AgentState>, ApplicationError> {
    let Some(mut agent) = agents.find_by_id(&agent_id).await.map_err(persistence)? else {
        return Ok(None);
    };
    // Cancelled or already advanced while the task was queued behind the lock.
    if agent.state != AgentState::Shopping {
        return Ok(None);
    }

    let constraints = agent.constraints.clone().ok_or_else(|| {
        ApplicationError::Domain(DomainError::InvariantViolation(
            "shopping agent has no constraint set".to_string(),
        ))
    })?;

    match shopper::select_candidate(&constraints, &agent.allowed_merchants, &offers.offers()) {
        Some(offer) => {
            let transaction = Transaction::propose(
                agent.id,
                offer.price,
                offer.merchant,
                offer.merchant_wallet,
                offer.market_average_price,
            );

            let outcome = lifecycle::apply(agent.state, &LifecycleEvent::CandidateSelected)
                .map_err(|error| ApplicationError::Domain(error.into()))?;
            agent.transition_to(outcome.to).map_err(ApplicationError::from)?;
            agent.latest_transaction_id = Some(transaction.id);
            let state = agent.state;
            steps.save_step(agent, transaction.clone()).await.map_err(persistence)?;

            tracing::info!(
                agent_id = %agent_id,
                transaction_id = %transaction.id,
                merchant = %transaction.merchant,
                amount = %transaction.amount,
                "purchase candidate proposed"
            );
            Ok(Some(state))
        }
        None => {
            let outcome = lifecycle::apply(agent.state, &LifecycleEvent::TaskFaulted)
                .map_err(|error| ApplicationError::Domain(error.into()))?;
            agent.transition_to(outcome.to).map_err(ApplicationError::from)?;
            agent.failure_reason =
                Some("no offer satisfied the constraint set".to_string());
            let state = agent.state;
            agents.save(agent).await.map_err(persistence)?;

            tracing::warn!(agent_id = %agent_id, "no qualifying offer, agent failed");
            Ok(Some(state))
        }
    }
}

fn transaction_view(transaction: Transaction) -> TransactionView {
    TransactionView {
        id: transaction.id,
        amount: transaction.amount,
        merchant: transaction.merchant,
        status: transaction.status,
        transfer_hash: transaction.transfer_hash,
        rejection_reason: transaction.rejection_reason,
    }
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use trusty_core::domain::agent::{Agent, AgentState};
    use trusty_core::domain::constraint::{ConstraintSet, ConstraintSource};
    use trusty_core::domain::transaction::{Transaction, TransactionStatus};
    use trusty_core::domain::user::{User, UserId};
    use trusty_core::errors::{ApplicationError, DomainError};
    use trusty_db::repositories::{
        AgentRepository, InMemoryAgentRepository, InMemoryLifecycleStepStore,
        InMemoryTransactionRepository, InMemoryUserRepository, UserRepository,
    };

    use crate::extractor::{StaticExtractor, UnavailableExtractor};
    use crate::shopper::CatalogOfferSource;
    use crate::verifier::{PolicyVerifier, TransactionVerifier, Verdict, VerifierError};
    use crate::wallet::MockBridgeWallet;

    use super::{AgentTaskCoordinator, VerifyOutcome};

    struct BrokenVerifier;

    #[async_trait]
    impl TransactionVerifier for BrokenVerifier {
        async fn verify(
            &self,
            _agent: &Agent,
            _transaction: &Transaction,
        ) -> Result<Verdict, VerifierError> {
            Err(VerifierError::Unavailable("ledger timeout".to_string()))
        }
    }

    struct Harness {
        users: Arc<InMemoryUserRepository>,
        agents: Arc<InMemoryAgentRepository>,
        transactions: Arc<InMemoryTransactionRepository>,
        coordinator: AgentTaskCoordinator,
        user_id: UserId,
    }

    fn electronics_constraints() -> ConstraintSet {
        ConstraintSet {
            max_price: Decimal::new(500, 0),
            categories: vec!["electronics".to_string()],
            preferences: Default::default(),
        }
    }

    async fn harness(
        extractor: Arc<dyn crate::extractor::ConstraintExtractor>,
        verifier: Arc<dyn TransactionVerifier>,
    ) -> Harness {
        let users = Arc::new(InMemoryUserRepository::default());
        let agents = Arc::new(InMemoryAgentRepository::default());
        let transactions = Arc::new(InMemoryTransactionRepository::default());

        let user = User::new("alice", "alice@example.com", "$argon2id$stub", "0x00aa");
        let user_id = user.id;
        users.save(user).await.expect("save user");

        let coordinator = AgentTaskCoordinator::new(
            users.clone(),
            agents.clone(),
            transactions.clone(),
            Arc::new(InMemoryLifecycleStepStore::new(agents.clone(), transactions.clone())),
            extractor,
            verifier,
            Arc::new(MockBridgeWallet),
            Arc::new(CatalogOfferSource::default()),
        );

        Harness { users, agents, transactions, coordinator, user_id }
    }

    async fn default_harness() -> Harness {
        harness(
            Arc::new(StaticExtractor::new(electronics_constraints())),
            Arc::new(PolicyVerifier),
        )
        .await
    }

    #[tokio::test]
    async fn setup_with_extractor_success_attaches_extracted_set() {
        let h = default_harness().await;

        let agent =
            h.coordinator.setup(h.user_id, "a 4k monitor under $500", None).await.expect("setup");

        assert_eq!(agent.state, AgentState::ConstraintsResolved);
        assert_eq!(agent.constraints, Some(electronics_constraints()));
        assert_eq!(agent.constraint_source, Some(ConstraintSource::Extracted));
    }

    #[tokio::test]
    async fn setup_with_extractor_failure_falls_back_and_never_fails() {
        let h = harness(Arc::new(UnavailableExtractor), Arc::new(PolicyVerifier)).await;

        let agent = h.coordinator.setup(h.user_id, "anything at all", None).await.expect("setup");

        assert_eq!(agent.state, AgentState::ConstraintsResolved);
        assert_eq!(agent.constraints, Some(ConstraintSet::fallback()));
        assert_eq!(agent.constraint_source, Some(ConstraintSource::Fallback));
    }

    #[tokio::test]
    async fn setup_for_unknown_user_is_not_found() {
        let h = default_harness().await;
        let error = h
            .coordinator
            .setup(UserId::generate(), "anything", None)
            .await
            .expect_err("unknown user");
        assert!(matches!(error, ApplicationError::NotFound(_)));
    }

    #[tokio::test]
    async fn shop_on_created_agent_is_invalid_state_and_leaves_agent_unchanged() {
        let h = default_harness().await;

        // Bypass setup to get an agent still in Created.
        let agent = Agent::new(h.user_id, Decimal::new(1_000, 0), "0x00aa");
        h.agents.save(agent.clone()).await.expect("seed agent");

        let error = h.coordinator.shop(h.user_id, agent.id).await.expect_err("invalid state");
        assert!(matches!(error, ApplicationError::Domain(DomainError::Lifecycle(_))));

        let reloaded = h.agents.find_by_id(&agent.id).await.expect("find").expect("exists");
        assert_eq!(reloaded.state, AgentState::Created);
    }

    #[tokio::test]
    async fn happy_path_completes_and_status_is_idempotent() {
        let h = default_harness().await;

        let agent = h.coordinator.setup(h.user_id, "a monitor", None).await.expect("setup");
        let ack = h.coordinator.shop(h.user_id, agent.id).await.expect("shop");
        assert_eq!(ack.state, AgentState::Shopping);

        h.coordinator.await_shopping(agent.id).await.expect("await shopping");

        let status = h.coordinator.status(h.user_id, agent.id).await.expect("status");
        assert_eq!(status.state, AgentState::AwaitingVerification);
        let proposal = status.transaction.expect("a proposed transaction");
        assert_eq!(proposal.status, TransactionStatus::Proposed);
        // cheapest electronics offer in the default catalog
        assert_eq!(proposal.merchant, "Amazon");

        let outcome = h.coordinator.verify(h.user_id, proposal.id).await.expect("verify");
        let VerifyOutcome::Executed { transaction_id, transfer_hash } = outcome else {
            panic!("expected execution");
        };
        assert_eq!(transaction_id, proposal.id);
        assert!(transfer_hash.starts_with("0x"));

        let first = h.coordinator.status(h.user_id, agent.id).await.expect("status");
        assert_eq!(first.state, AgentState::Completed);
        // +5 successful transaction, +2 price saving (450 below 470 average)
        assert_eq!(first.trust_score, 57);
        let first_tx = first.transaction.expect("executed transaction");
        assert_eq!(first_tx.status, TransactionStatus::Executed);

        let second = h.coordinator.status(h.user_id, agent.id).await.expect("status again");
        assert_eq!(second.transaction.expect("same transaction").id, first_tx.id);
    }

    #[tokio::test]
    async fn observed_states_are_monotone_through_the_lifecycle() {
        let h = default_harness().await;

        let agent = h.coordinator.setup(h.user_id, "a monitor", None).await.expect("setup");
        let mut observed = vec![agent.state];

        h.coordinator.shop(h.user_id, agent.id).await.expect("shop");
        observed.push(h.coordinator.status(h.user_id, agent.id).await.expect("status").state);

        h.coordinator.await_shopping(agent.id).await.expect("await");
        let status = h.coordinator.status(h.user_id, agent.id).await.expect("status");
        observed.push(status.state);

        let proposal = status.transaction.expect("proposal");
        h.coordinator.verify(h.user_id, proposal.id).await.expect("verify");
        observed.push(h.coordinator.status(h.user_id, agent.id).await.expect("status").state);

        for pair in observed.windows(2) {
            assert!(
                pair[0].order() <= pair[1].order(),
                "state regression: {:?} -> {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[tokio::test]
    async fn rejected_verification_fails_agent_and_blocks_reshopping() {
        // Budget of 100 makes every catalog proposal fail the budget check.
        let h = default_harness().await;

        let agent = h
            .coordinator
            .setup(h.user_id, "a monitor", Some(Decimal::new(100, 0)))
            .await
            .expect("setup");
        h.coordinator.shop(h.user_id, agent.id).await.expect("shop");
        h.coordinator.await_shopping(agent.id).await.expect("await");

        let status = h.coordinator.status(h.user_id, agent.id).await.expect("status");
        let proposal = status.transaction.expect("proposal");

        let outcome = h.coordinator.verify(h.user_id, proposal.id).await.expect("verify");
        let VerifyOutcome::Rejected { reason, .. } = outcome else {
            panic!("expected rejection");
        };
        assert!(reason.contains("budget_check"));

        let failed = h.coordinator.status(h.user_id, agent.id).await.expect("status");
        assert_eq!(failed.state, AgentState::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some(reason.as_str()));
        // -10 failed transaction from the default 50
        assert_eq!(failed.trust_score, 40);

        let error = h.coordinator.shop(h.user_id, agent.id).await.expect_err("no re-shopping");
        assert!(matches!(error, ApplicationError::Domain(_)));
        let still_failed = h.coordinator.status(h.user_id, agent.id).await.expect("status");
        assert_eq!(still_failed.state, AgentState::Failed);
    }

    #[tokio::test]
    async fn verifier_failure_is_surfaced_and_fails_the_agent() {
        let h = harness(
            Arc::new(StaticExtractor::new(electronics_constraints())),
            Arc::new(BrokenVerifier),
        )
        .await;

        let agent = h.coordinator.setup(h.user_id, "a monitor", None).await.expect("setup");
        h.coordinator.shop(h.user_id, agent.id).await.expect("shop");
        h.coordinator.await_shopping(agent.id).await.expect("await");

        let proposal = h
            .coordinator
            .status(h.user_id, agent.id)
            .await
            .expect("status")
            .transaction
            .expect("proposal");

        let error = h.coordinator.verify(h.user_id, proposal.id).await.expect_err("surfaced");
        assert!(matches!(error, ApplicationError::Verification(_)));

        let status = h.coordinator.status(h.user_id, agent.id).await.expect("status");
        assert_eq!(status.state, AgentState::Failed);
        let rejected = status.transaction.expect("transaction");
        assert_eq!(rejected.status, TransactionStatus::Rejected);
    }

    #[tokio::test]
    async fn transaction_is_verified_at_most_once() {
        let h = default_harness().await;

        let agent = h.coordinator.setup(h.user_id, "a monitor", None).await.expect("setup");
        h.coordinator.shop(h.user_id, agent.id).await.expect("shop");
        h.coordinator.await_shopping(agent.id).await.expect("await");
        let proposal = h
            .coordinator
            .status(h.user_id, agent.id)
            .await
            .expect("status")
            .transaction
            .expect("proposal");

        h.coordinator.verify(h.user_id, proposal.id).await.expect("first verification");
        let error = h
            .coordinator
            .verify(h.user_id, proposal.id)
            .await
            .expect_err("second verification must fail");
        assert!(matches!(error, ApplicationError::Domain(DomainError::InvariantViolation(_))));
    }

    #[tokio::test]
    async fn concurrent_shop_calls_create_exactly_one_transaction() {
        let h = default_harness().await;
        let agent = h.coordinator.setup(h.user_id, "a monitor", None).await.expect("setup");

        let (first, second) = tokio::join!(
            h.coordinator.shop(h.user_id, agent.id),
            h.coordinator.shop(h.user_id, agent.id),
        );
        assert!(
            first.is_ok() != second.is_ok(),
            "exactly one concurrent shop call may win"
        );

        h.coordinator.await_shopping(agent.id).await.expect("await");
        assert_eq!(h.transactions.count_for_agent(&agent.id).await, 1);
    }

    #[tokio::test]
    async fn cancel_faults_a_shopping_agent() {
        let h = default_harness().await;

        // Seed an agent parked in Shopping with no live task.
        let user = h.users.find_by_id(&h.user_id).await.expect("query").expect("user");
        let mut agent = Agent::new(user.id, Decimal::new(1_000, 0), user.wallet_address);
        agent
            .attach_constraints(electronics_constraints(), ConstraintSource::Extracted)
            .expect("attach");
        agent.transition_to(AgentState::Shopping).expect("shopping");
        h.agents.save(agent.clone()).await.expect("seed");

        h.coordinator.cancel_shopping(h.user_id, agent.id).await.expect("cancel");

        let status = h.coordinator.status(h.user_id, agent.id).await.expect("status");
        assert_eq!(status.state, AgentState::Failed);
        assert_eq!(status.failure_reason.as_deref(), Some("shopping cancelled"));
    }

    #[tokio::test]
    async fn status_for_foreign_agent_is_unauthorized() {
        let h = default_harness().await;
        let agent = h.coordinator.setup(h.user_id, "a monitor", None).await.expect("setup");

        let intruder = User::new("mallory", "m@example.com", "$argon2id$stub", "0x00bb");
        let intruder_id = intruder.id;
        h.users.save(intruder).await.expect("save intruder");

        let error =
            h.coordinator.status(intruder_id, agent.id).await.expect_err("not the owner");
        assert!(matches!(error, ApplicationError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn unsatisfiable_constraints_fault_the_agent() {
        let h = harness(
            Arc::new(StaticExtractor::new(ConstraintSet {
                max_price: Decimal::new(1, 0),
                categories: vec!["yachts".to_string()],
                preferences: Default::default(),
            })),
            Arc::new(PolicyVerifier),
        )
        .await;

        let agent = h.coordinator.setup(h.user_id, "a yacht for $1", None).await.expect("setup");
        h.coordinator.shop(h.user_id, agent.id).await.expect("shop");
        h.coordinator.await_shopping(agent.id).await.expect("await");

        let status = h.coordinator.status(h.user_id, agent.id).await.expect("status");
        assert_eq!(status.state, AgentState::Failed);
        assert_eq!(
            status.failure_reason.as_deref(),
            Some("no offer satisfied the constraint set")
        );
        assert!(status.transaction.is_none());

        // The failed agent no longer occupies lock or task slots.
        assert!(h.coordinator.locks.lock().await.is_empty());
        assert!(h.coordinator.tasks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn terminal_agents_release_their_task_bookkeeping() {
        let h = default_harness().await;

        let agent = h.coordinator.setup(h.user_id, "a monitor", None).await.expect("setup");
        h.coordinator.shop(h.user_id, agent.id).await.expect("shop");
        assert!(h.coordinator.locks.lock().await.contains_key(&agent.id));

        h.coordinator.await_shopping(agent.id).await.expect("await");
        let proposal = h
            .coordinator
            .status(h.user_id, agent.id)
            .await
            .expect("status")
            .transaction
            .expect("proposal");
        h.coordinator.verify(h.user_id, proposal.id).await.expect("verify");

        assert!(h.coordinator.locks.lock().await.is_empty());
        assert!(h.coordinator.tasks.lock().await.is_empty());

        // A late verify attempt recreates no lasting entries either.
        h.coordinator.verify(h.user_id, proposal.id).await.expect_err("already verified");
        assert!(h.coordinator.locks.lock().await.is_empty());
    }
}
