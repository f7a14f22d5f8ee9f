use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Structured purchase criteria for one agent. Either extracted from the
/// user's free-text requirements or the fixed fallback set; immutable once
/// attached to an agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSet {
    pub max_price: Decimal,
    pub categories: Vec<String>,
    #[serde(default)]
    pub preferences: BTreeMap<String, String>,
}

/// Where an agent's constraint set came from. Extraction failure is absorbed
/// into the fallback path, so the source is the only trace of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintSource {
    Extracted,
    Fallback,
}

impl ConstraintSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extracted => "extracted",
            Self::Fallback => "fallback",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "extracted" => Some(Self::Extracted),
            "fallback" => Some(Self::Fallback),
            _ => None,
        }
    }
}

impl ConstraintSet {
    /// The fixed default used when constraint extraction fails.
    pub fn fallback() -> Self {
        Self {
            max_price: Decimal::new(500, 0),
            categories: vec!["general".to_string()],
            preferences: BTreeMap::new(),
        }
    }

    pub fn allows_category(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c.eq_ignore_ascii_case(category))
            || self.categories.iter().any(|c| c == "general")
    }
}
