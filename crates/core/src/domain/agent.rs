use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::constraint::{ConstraintSet, ConstraintSource};
use crate::domain::transaction::TransactionId;
use crate::domain::user::UserId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle states of one shopping task, in lifecycle order. `Failed` is
/// terminal and reachable from every non-terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Created,
    ConstraintsResolved,
    Shopping,
    AwaitingVerification,
    Completed,
    Failed,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::ConstraintsResolved => "constraints_resolved",
            Self::Shopping => "shopping",
            Self::AwaitingVerification => "awaiting_verification",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "created" => Some(Self::Created),
            "constraints_resolved" => Some(Self::ConstraintsResolved),
            "shopping" => Some(Self::Shopping),
            "awaiting_verification" => Some(Self::AwaitingVerification),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Position in the lifecycle order. `Failed` sorts last so that a
    /// sequence of observed states is monotone even across failure.
    pub fn order(&self) -> u8 {
        match self {
            Self::Created => 0,
            Self::ConstraintsResolved => 1,
            Self::Shopping => 2,
            Self::AwaitingVerification => 3,
            Self::Completed => 4,
            Self::Failed => 5,
        }
    }
}

/// One user-bound shopping task instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub user_id: UserId,
    pub state: AgentState,
    pub constraints: Option<ConstraintSet>,
    pub constraint_source: Option<ConstraintSource>,
    pub max_budget: Decimal,
    pub allowed_merchants: Vec<String>,
    pub wallet_address: String,
    pub trust_score: i32,
    pub failure_reason: Option<String>,
    pub latest_transaction_id: Option<TransactionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const DEFAULT_TRUST_SCORE: i32 = 50;
pub const DEFAULT_ALLOWED_MERCHANTS: [&str; 3] = ["Amazon", "BestBuy", "Walmart"];

impl Agent {
    pub fn new(user_id: UserId, max_budget: Decimal, wallet_address: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: AgentId::generate(),
            user_id,
            state: AgentState::Created,
            constraints: None,
            constraint_source: None,
            max_budget,
            allowed_merchants: DEFAULT_ALLOWED_MERCHANTS.iter().map(ToString::to_string).collect(),
            wallet_address: wallet_address.into(),
            trust_score: DEFAULT_TRUST_SCORE,
            failure_reason: None,
            latest_transaction_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn can_transition_to(&self, next: AgentState) -> bool {
        matches!(
            (&self.state, next),
            (AgentState::Created, AgentState::ConstraintsResolved)
                | (AgentState::ConstraintsResolved, AgentState::Shopping)
                | (AgentState::Shopping, AgentState::AwaitingVerification)
                | (AgentState::AwaitingVerification, AgentState::Completed)
                | (AgentState::AwaitingVerification, AgentState::Failed)
                | (AgentState::Created, AgentState::Failed)
                | (AgentState::ConstraintsResolved, AgentState::Failed)
                | (AgentState::Shopping, AgentState::Failed)
        )
    }

    pub fn transition_to(&mut self, next: AgentState) -> Result<(), DomainError> {
        if !self.can_transition_to(next) {
            return Err(DomainError::InvalidAgentTransition { from: self.state, to: next });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Attach the resolved constraint set and advance out of `Created`.
    /// Exactly one constraint set per agent: a second attach is an invariant
    /// violation regardless of state.
    pub fn attach_constraints(
        &mut self,
        constraints: ConstraintSet,
        source: ConstraintSource,
    ) -> Result<(), DomainError> {
        if self.constraints.is_some() {
            return Err(DomainError::InvariantViolation(
                "constraint set already attached".to_string(),
            ));
        }
        self.transition_to(AgentState::ConstraintsResolved)?;
        self.constraints = Some(constraints);
        self.constraint_source = Some(source);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::constraint::{ConstraintSet, ConstraintSource};
    use crate::domain::user::UserId;
    use crate::errors::DomainError;

    use super::{Agent, AgentState, DEFAULT_TRUST_SCORE};

    fn agent() -> Agent {
        Agent::new(UserId::generate(), Decimal::new(1_000, 0), "0xabc")
    }

    #[test]
    fn new_agent_starts_created_with_default_trust() {
        let agent = agent();
        assert_eq!(agent.state, AgentState::Created);
        assert_eq!(agent.trust_score, DEFAULT_TRUST_SCORE);
        assert!(agent.constraints.is_none());
    }

    #[test]
    fn allows_full_lifecycle_path() {
        let mut agent = agent();
        agent
            .attach_constraints(ConstraintSet::fallback(), ConstraintSource::Fallback)
            .expect("created -> constraints_resolved");
        agent.transition_to(AgentState::Shopping).expect("-> shopping");
        agent.transition_to(AgentState::AwaitingVerification).expect("-> awaiting");
        agent.transition_to(AgentState::Completed).expect("-> completed");
        assert!(agent.state.is_terminal());
    }

    #[test]
    fn blocks_shopping_before_constraints() {
        let mut agent = agent();
        let error = agent
            .transition_to(AgentState::Shopping)
            .expect_err("created -> shopping should fail");
        assert!(matches!(error, DomainError::InvalidAgentTransition { .. }));
        assert_eq!(agent.state, AgentState::Created);
    }

    #[test]
    fn terminal_states_accept_nothing() {
        let mut agent = agent();
        agent
            .attach_constraints(ConstraintSet::fallback(), ConstraintSource::Fallback)
            .expect("attach");
        agent.transition_to(AgentState::Shopping).expect("shopping");
        agent.transition_to(AgentState::Failed).expect("failed");

        for next in [
            AgentState::Created,
            AgentState::ConstraintsResolved,
            AgentState::Shopping,
            AgentState::AwaitingVerification,
            AgentState::Completed,
        ] {
            assert!(!agent.can_transition_to(next), "failed must not re-enter {next:?}");
        }
    }

    #[test]
    fn second_constraint_attach_is_rejected() {
        let mut agent = agent();
        agent
            .attach_constraints(ConstraintSet::fallback(), ConstraintSource::Extracted)
            .expect("first attach");
        let error = agent
            .attach_constraints(ConstraintSet::fallback(), ConstraintSource::Fallback)
            .expect_err("second attach must fail");
        assert!(matches!(error, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn lifecycle_order_is_monotone() {
        let path = [
            AgentState::Created,
            AgentState::ConstraintsResolved,
            AgentState::Shopping,
            AgentState::AwaitingVerification,
            AgentState::Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].order() < pair[1].order());
        }
        assert!(AgentState::Failed.order() > AgentState::AwaitingVerification.order());
    }

    #[test]
    fn state_round_trips_through_strings() {
        for state in [
            AgentState::Created,
            AgentState::ConstraintsResolved,
            AgentState::Shopping,
            AgentState::AwaitingVerification,
            AgentState::Completed,
            AgentState::Failed,
        ] {
            assert_eq!(AgentState::parse(state.as_str()), Some(state));
        }
        assert_eq!(AgentState::parse("dormant"), None);
    }
}
