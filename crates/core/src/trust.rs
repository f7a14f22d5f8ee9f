//! Trust score adjustments driven by verification outcomes.

use serde::{Deserialize, Serialize};

pub const MIN_TRUST_SCORE: i32 = 0;
pub const MAX_TRUST_SCORE: i32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustEvent {
    SuccessfulTransaction,
    FailedTransaction,
    PriceSaving,
    SuspiciousActivity,
}

impl TrustEvent {
    pub fn impact(&self) -> i32 {
        match self {
            Self::SuccessfulTransaction => 5,
            Self::FailedTransaction => -10,
            Self::PriceSaving => 2,
            Self::SuspiciousActivity => -15,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuccessfulTransaction => "successful_transaction",
            Self::FailedTransaction => "failed_transaction",
            Self::PriceSaving => "price_saving",
            Self::SuspiciousActivity => "suspicious_activity",
        }
    }
}

/// New score after applying the event, clamped to the valid range.
pub fn apply_event(current: i32, event: TrustEvent) -> i32 {
    (current + event.impact()).clamp(MIN_TRUST_SCORE, MAX_TRUST_SCORE)
}

#[cfg(test)]
mod tests {
    use super::{apply_event, TrustEvent, MAX_TRUST_SCORE, MIN_TRUST_SCORE};

    #[test]
    fn successful_transaction_raises_score() {
        assert_eq!(apply_event(50, TrustEvent::SuccessfulTransaction), 55);
    }

    #[test]
    fn failed_transaction_lowers_score() {
        assert_eq!(apply_event(50, TrustEvent::FailedTransaction), 40);
    }

    #[test]
    fn score_clamps_at_upper_bound() {
        assert_eq!(apply_event(98, TrustEvent::SuccessfulTransaction), MAX_TRUST_SCORE);
    }

    #[test]
    fn score_clamps_at_lower_bound() {
        assert_eq!(apply_event(5, TrustEvent::SuspiciousActivity), MIN_TRUST_SCORE);
    }
}
