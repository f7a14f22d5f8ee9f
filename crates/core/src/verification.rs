//! Deterministic safety checks applied to a proposed transaction before the
//! ledger transfer is allowed to execute.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::agent::Agent;
use crate::domain::transaction::Transaction;

/// A transaction may deviate from the market average by at most this much.
pub const PRICE_TOLERANCE_PCT: i64 = 15;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyCheck {
    Budget,
    Merchant,
    Price,
}

impl SafetyCheck {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Budget => "budget_check",
            Self::Merchant => "merchant_check",
            Self::Price => "price_check",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub approved: bool,
    pub failed_checks: Vec<SafetyCheck>,
}

impl PolicyDecision {
    /// Rejection reason naming the failed checks, `None` when approved.
    pub fn reason(&self) -> Option<String> {
        if self.approved {
            return None;
        }
        let names: Vec<&str> = self.failed_checks.iter().map(SafetyCheck::as_str).collect();
        Some(format!("failed checks: {}", names.join(", ")))
    }
}

/// Evaluate all safety checks; approval requires every check to pass.
pub fn evaluate(agent: &Agent, transaction: &Transaction) -> PolicyDecision {
    let mut failed_checks = Vec::new();

    if transaction.amount > agent.max_budget {
        failed_checks.push(SafetyCheck::Budget);
    }
    if !agent.allowed_merchants.iter().any(|m| m == &transaction.merchant) {
        failed_checks.push(SafetyCheck::Merchant);
    }
    if !price_reasonable(transaction) {
        failed_checks.push(SafetyCheck::Price);
    }

    PolicyDecision { approved: failed_checks.is_empty(), failed_checks }
}

/// Absent market data passes; otherwise the amount must sit within the
/// tolerance band around the market average.
fn price_reasonable(transaction: &Transaction) -> bool {
    let Some(average) = transaction.market_average_price else {
        return true;
    };
    if average.is_zero() {
        return true;
    }
    let diff_pct = (transaction.amount - average) / average * Decimal::new(100, 0);
    diff_pct.abs() <= Decimal::new(PRICE_TOLERANCE_PCT, 0)
}
