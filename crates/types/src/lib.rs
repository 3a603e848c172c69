//! Shared type definitions for Ghostgate.
//!
//! This crate holds the vocabulary that the gate, dispatcher, and ledger
//! exchange. No business logic, just types and their construction rules.

pub mod confirmation;
pub mod error;
pub mod ids;
pub mod suggestion;

pub use confirmation::ConfirmationMetrics;
pub use error::SuggestionError;
pub use ids::{ContextId, IntentId, SuggestionId, TokenId};
pub use suggestion::{
    ActionDescriptor, ActionKind, Evidence, Provenance, Suggestion, SuggestionBuilder,
};
