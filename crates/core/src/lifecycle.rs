//! Event-driven lifecycle engine for agent shopping tasks.
//!
//! The coordinator applies events against the current state and receives the
//! next state plus the side-effect actions it must perform before the
//! transition is considered durable. Terminal states accept no events, which
//! is what makes observed state sequences monotone.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::agent::AgentState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    /// Constraint extraction finished, either with the extractor's set or the
    /// fallback set. Extraction failure never produces a distinct event.
    ConstraintsSettled,
    ShoppingStarted,
    CandidateSelected,
    VerificationAccepted,
    VerificationRejected,
    /// Shopping task fault or cancellation.
    TaskFaulted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleAction {
    AttachConstraints,
    SelectCandidate,
    CreateTransaction,
    ExecuteTransfer,
    RecordTrustEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub from: AgentState,
    pub to: AgentState,
    pub event: LifecycleEvent,
    pub actions: Vec<LifecycleAction>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LifecycleTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: AgentState, event: LifecycleEvent },
}

/// Apply one event to the current state.
pub fn apply(
    current: AgentState,
    event: &LifecycleEvent,
) -> Result<TransitionOutcome, LifecycleTransitionError> {
    use AgentState::{
        AwaitingVerification, Completed, ConstraintsResolved, Created, Failed, Shopping,
    };
    use LifecycleAction::{
        AttachConstraints, CreateTransaction, ExecuteTransfer, RecordTrustEvent, SelectCandidate,
    };
    use LifecycleEvent::{
        CandidateSelected, ConstraintsSettled, ShoppingStarted, TaskFaulted, VerificationAccepted,
        VerificationRejected,
    };

    let (to, actions) = match (current, event) {
        (Created, ConstraintsSettled) => (ConstraintsResolved, vec![AttachConstraints]),
        (ConstraintsResolved, ShoppingStarted) => (Shopping, vec![SelectCandidate]),
        (Shopping, CandidateSelected) => (AwaitingVerification, vec![CreateTransaction]),
        (AwaitingVerification, VerificationAccepted) => {
            (Completed, vec![ExecuteTransfer, RecordTrustEvent])
        }
        (AwaitingVerification, VerificationRejected) => (Failed, vec![RecordTrustEvent]),
        (Completed | Failed, _) => {
            return Err(LifecycleTransitionError::InvalidTransition {
                state: current,
                event: event.clone(),
            });
        }
        (_, TaskFaulted) => (Failed, Vec::new()),
        _ => {
            return Err(LifecycleTransitionError::InvalidTransition {
                state: current,
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: current, to, event: event.clone(), actions })
}

#[cfg(test)]
mod tests {
    use crate::domain::agent::AgentState;

    use super::{apply, LifecycleAction, LifecycleEvent, LifecycleTransitionError};

    #[test]
    fn happy_path_reaches_completed() {
        let mut state = AgentState::Created;
        let events = [
            LifecycleEvent::ConstraintsSettled,
            LifecycleEvent::ShoppingStarted,
            LifecycleEvent::CandidateSelected,
            LifecycleEvent::VerificationAccepted,
        ];
        for event in &events {
            state = apply(state, event).expect("transition should succeed").to;
        }
        assert_eq!(state, AgentState::Completed);
    }

    #[test]
    fn candidate_selection_creates_transaction() {
        let outcome = apply(AgentState::Shopping, &LifecycleEvent::CandidateSelected)
            .expect("shopping -> awaiting_verification");
        assert_eq!(outcome.to, AgentState::AwaitingVerification);
        assert_eq!(outcome.actions, vec![LifecycleAction::CreateTransaction]);
    }

    #[test]
    fn rejection_fails_the_agent() {
        let outcome = apply(AgentState::AwaitingVerification, &LifecycleEvent::VerificationRejected)
            .expect("awaiting -> failed");
        assert_eq!(outcome.to, AgentState::Failed);
        assert!(outcome.actions.contains(&LifecycleAction::RecordTrustEvent));
    }

    #[test]
    fn shopping_before_constraints_is_invalid() {
        let error = apply(AgentState::Created, &LifecycleEvent::ShoppingStarted)
            .expect_err("created cannot start shopping");
        assert!(matches!(
            error,
            LifecycleTransitionError::InvalidTransition {
                state: AgentState::Created,
                event: LifecycleEvent::ShoppingStarted,
            }
        ));
    }

    #[test]
    fn fault_reaches_failed_from_every_non_terminal_state() {
        for state in [
            AgentState::Created,
            AgentState::ConstraintsResolved,
            AgentState::Shopping,
            AgentState::AwaitingVerification,
        ] {
            let outcome =
                apply(state, &LifecycleEvent::TaskFaulted).expect("fault must be accepted");
            assert_eq!(outcome.to, AgentState::Failed);
        }
    }

    #[test]
    fn terminal_states_reject_all_events() {
        let events = [
            LifecycleEvent::ConstraintsSettled,
            LifecycleEvent::ShoppingStarted,
            LifecycleEvent::CandidateSelected,
            LifecycleEvent::VerificationAccepted,
            LifecycleEvent::VerificationRejected,
            LifecycleEvent::TaskFaulted,
        ];
        for state in [AgentState::Completed, AgentState::Failed] {
            for event in &events {
                assert!(apply(state, event).is_err(), "{state:?} must reject {event:?}");
            }
        }
    }

    #[test]
    fn replay_is_deterministic_for_same_event_sequence() {
        let events = [
            LifecycleEvent::ConstraintsSettled,
            LifecycleEvent::ShoppingStarted,
            LifecycleEvent::CandidateSelected,
            LifecycleEvent::VerificationAccepted,
        ];

        let run = || {
            let mut state = AgentState::Created;
            let mut actions = Vec::new();
            for event in &events {
                let outcome = apply(state, event).expect("deterministic run");
                actions.push(outcome.actions);
                state = outcome.to;
            }
            (state, actions)
        };

        assert_eq!(run(), run());
    }
}
