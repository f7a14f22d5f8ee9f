//! Transaction verification capability.

use async_trait::async_trait;
use thiserror::Error;

use trusty_core::domain::agent::Agent;
use trusty_core::domain::transaction::Transaction;
use trusty_core::verification;

/// Verifier infrastructure failure. Unlike extraction, this is surfaced:
/// the coordinator fails the agent task.
#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("verifier unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Approved,
    Rejected { reason: String },
}

#[async_trait]
pub trait TransactionVerifier: Send + Sync {
    async fn verify(
        &self,
        agent: &Agent,
        transaction: &Transaction,
    ) -> Result<Verdict, VerifierError>;
}

/// Applies the deterministic safety policy: budget ceiling, merchant
/// allowlist and the market price band.
#[derive(Default)]
pub struct PolicyVerifier;

#[async_trait]
impl TransactionVerifier for PolicyVerifier {
    async fn verify(
        &self,
        agent: &Agent,
        transaction: &Transaction,
    ) -> Result<Verdict, VerifierError> {
        let decision = verification::evaluate(agent, transaction);
        match decision.reason() {
            None => Ok(Verdict::Approved),
            Some(reason) => Ok(Verdict::Rejected { reason }),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use trusty_core::domain::agent::Agent;
    use trusty_core::domain::transaction::Transaction;
    use trusty_core::domain::user::UserId;

    use super::{PolicyVerifier, TransactionVerifier, Verdict};

    #[tokio::test]
    async fn policy_verifier_approves_safe_transactions() {
        let agent = Agent::new(UserId::generate(), Decimal::new(1_000, 0), "0xaa");
        let transaction =
            Transaction::propose(agent.id, Decimal::new(150, 0), "Amazon", "0xbb", None);

        let verdict = PolicyVerifier.verify(&agent, &transaction).await.expect("verify");
        assert_eq!(verdict, Verdict::Approved);
    }

    #[tokio::test]
    async fn policy_verifier_rejects_with_named_checks() {
        let agent = Agent::new(UserId::generate(), Decimal::new(100, 0), "0xaa");
        let transaction =
            Transaction::propose(agent.id, Decimal::new(150, 0), "ShadyShop", "0xbb", None);

        let verdict = PolicyVerifier.verify(&agent, &transaction).await.expect("verify");
        match verdict {
            Verdict::Rejected { reason } => {
                assert!(reason.contains("budget_check"));
                assert!(reason.contains("merchant_check"));
            }
            Verdict::Approved => panic!("unsafe transaction must be rejected"),
        }
    }
}
