//! Agent runtime - constraint extraction and the shopping task coordinator.
//!
//! This crate owns the control flow of one shopping request:
//!
//! 1. **Constraint extraction** (`extractor`) - free text becomes a
//!    `ConstraintSet`, falling back to the fixed default when the LLM is
//!    unavailable or returns garbage.
//! 2. **Candidate selection** (`shopper`) - a deterministic pick against the
//!    constraint set from a pluggable offer source.
//! 3. **Verification** (`verifier`) - safety-policy verdict over a proposed
//!    transaction.
//! 4. **Ledger execution** (`wallet`) - wallet derivation and transfers.
//!
//! The `coordinator` module ties these together and is the only writer of
//! agent lifecycle state.
//!
//! # Safety principle
//!
//! The LLM is strictly a translator from free text to structured constraints.
//! It never approves transactions, never touches the ledger, and its failures
//! never fail an agent.

pub mod coordinator;
pub mod extractor;
pub mod llm;
pub mod shopper;
pub mod verifier;
pub mod wallet;

pub use coordinator::{AgentStatusView, AgentTaskCoordinator, ShopAck, VerifyOutcome};
pub use extractor::{ConstraintExtractor, ExtractionError, LlmConstraintExtractor};
pub use llm::{LlmClient, OpenAiChatClient};
pub use shopper::{CatalogOfferSource, Offer, OfferSource};
pub use verifier::{PolicyVerifier, TransactionVerifier, Verdict, VerifierError};
pub use wallet::{MockBridgeWallet, WalletError, WalletService};
