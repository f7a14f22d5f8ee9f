//! Candidate selection against a resolved constraint set.
//!
//! The decision rule is deliberately plain: from the offers the source knows
//! about, keep those inside the constraint set and the merchant allowlist,
//! then take the cheapest. Real marketplace intelligence lives behind the
//! `OfferSource` seam.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use trusty_core::domain::constraint::ConstraintSet;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub merchant: String,
    pub merchant_wallet: String,
    pub category: String,
    pub price: Decimal,
    pub market_average_price: Option<Decimal>,
}

pub trait OfferSource: Send + Sync {
    fn offers(&self) -> Vec<Offer>;
}

/// Fixed catalog spanning the default merchant allowlist.
pub struct CatalogOfferSource {
    catalog: Vec<Offer>,
}

impl Default for CatalogOfferSource {
    fn default() -> Self {
        let offer = |merchant: &str, wallet: &str, category: &str, price: i64, avg: i64| Offer {
            merchant: merchant.to_string(),
            merchant_wallet: wallet.to_string(),
            category: category.to_string(),
            price: Decimal::new(price, 0),
            market_average_price: Some(Decimal::new(avg, 0)),
        };
        Self {
            catalog: vec![
                offer("Amazon", "0x00000000000000000000000000000000000000a1", "electronics", 450, 470),
                offer("BestBuy", "0x00000000000000000000000000000000000000b2", "electronics", 480, 470),
                offer("Walmart", "0x00000000000000000000000000000000000000c3", "general", 120, 125),
                offer("Amazon", "0x00000000000000000000000000000000000000a1", "furniture", 310, 330),
            ],
        }
    }
}

impl CatalogOfferSource {
    pub fn new(catalog: Vec<Offer>) -> Self {
        Self { catalog }
    }
}

impl OfferSource for CatalogOfferSource {
    fn offers(&self) -> Vec<Offer> {
        self.catalog.clone()
    }
}

/// Cheapest offer satisfying the constraint set and the merchant allowlist,
/// or `None` when nothing qualifies.
pub fn select_candidate(
    constraints: &ConstraintSet,
    allowed_merchants: &[String],
    offers: &[Offer],
) -> Option<Offer> {
    offers
        .iter()
        .filter(|offer| constraints.allows_category(&offer.category))
        .filter(|offer| offer.price <= constraints.max_price)
        .filter(|offer| allowed_merchants.iter().any(|m| m == &offer.merchant))
        .min_by_key(|offer| offer.price)
        .cloned()
}
