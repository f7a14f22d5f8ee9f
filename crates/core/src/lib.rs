pub mod config;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod trust;
pub mod verification;

pub use domain::agent::{Agent, AgentId, AgentState};
pub use domain::constraint::{ConstraintSet, ConstraintSource};
pub use domain::transaction::{Transaction, TransactionId, TransactionStatus};
pub use domain::user::{User, UserId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use lifecycle::{LifecycleAction, LifecycleEvent, LifecycleTransitionError, TransitionOutcome};
pub use trust::TrustEvent;
pub use verification::{PolicyDecision, SafetyCheck};
