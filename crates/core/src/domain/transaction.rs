use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::agent::AgentId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub Uuid);

impl TransactionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Produced by the shopping task, not yet verified.
    Proposed,
    /// Verifier accepted; transfer not yet executed.
    Approved,
    /// Transfer executed on the ledger.
    Executed,
    /// Verifier rejected or errored. Terminal.
    Rejected,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Approved => "approved",
            Self::Executed => "executed",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "proposed" => Some(Self::Proposed),
            "approved" => Some(Self::Approved),
            "executed" => Some(Self::Executed),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_verified(&self) -> bool {
        !matches!(self, Self::Proposed)
    }
}

/// A proposed purchase awaiting verification. Associated with exactly one
/// agent and verified at most once.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub agent_id: AgentId,
    pub amount: Decimal,
    pub merchant: String,
    pub merchant_wallet: String,
    pub market_average_price: Option<Decimal>,
    pub status: TransactionStatus,
    pub transfer_hash: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn propose(
        agent_id: AgentId,
        amount: Decimal,
        merchant: impl Into<String>,
        merchant_wallet: impl Into<String>,
        market_average_price: Option<Decimal>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            agent_id,
            amount,
            merchant: merchant.into(),
            merchant_wallet: merchant_wallet.into(),
            market_average_price,
            status: TransactionStatus::Proposed,
            transfer_hash: None,
            rejection_reason: None,
            created_at: Utc::now(),
            verified_at: None,
        }
    }

    pub fn mark_approved(&mut self) -> Result<(), DomainError> {
        self.verify_once()?;
        self.status = TransactionStatus::Approved;
        Ok(())
    }

    pub fn mark_executed(&mut self, transfer_hash: impl Into<String>) -> Result<(), DomainError> {
        if self.status != TransactionStatus::Approved {
            return Err(DomainError::InvariantViolation(format!(
                "cannot execute transaction in status {}",
                self.status.as_str()
            )));
        }
        self.status = TransactionStatus::Executed;
        self.transfer_hash = Some(transfer_hash.into());
        Ok(())
    }

    pub fn mark_rejected(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.verify_once()?;
        self.status = TransactionStatus::Rejected;
        self.rejection_reason = Some(reason.into());
        Ok(())
    }

    fn verify_once(&mut self) -> Result<(), DomainError> {
        if self.status.is_verified() {
            return Err(DomainError::InvariantViolation(format!(
                "transaction {} already verified",
                self.id
            )));
        }
        self.verified_at = Some(Utc::now());
        Ok(())
    }

    /// Percentage saved against the market average, when market data exists.
    pub fn savings_percentage(&self) -> Option<Decimal> {
        let average = self.market_average_price?;
        if average.is_zero() {
            return None;
        }
        Some((average - self.amount) / average * Decimal::new(100, 0))
    }
}
