//! Forensic Ledger: the append-only, hash-chained record of every dispatch
//! attempt made through the authorization gate.
//!
//! ## Guarantees
//!
//! - **Append-only**: [`ForensicLedger::append`] is the only mutating
//!   operation. There is no update or delete.
//! - **Hash chain**: each entry's BLAKE3 hash covers its sequence, every
//!   recorded field, and the previous entry's hash. The first entry links to
//!   [`GENESIS_HASH`].
//! - **Single writer**: appends are serialized, so sequence numbers and chain
//!   links never interleave.
//! - **Tamper evidence**: [`ForensicLedger::verify_chain`] recomputes every
//!   hash; a store whose chain fails verification cannot be opened.

pub mod compliance;
pub mod entry;
pub mod error;
pub mod ledger;
pub mod store;

pub use compliance::{ComplianceRecord, ComplianceReport};
pub use entry::{EntryDraft, ExecutionOutcome, ForensicEntry, GENESIS_HASH};
pub use error::LedgerError;
pub use ledger::{verify_entries, ChainVerification, ExportIter, ForensicLedger, LedgerExport};
pub use store::{JsonlStore, LedgerStore, MemoryStore};

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::Duration;

    use ghostgate_types::{
        ActionDescriptor, ConfirmationMetrics, Evidence, IntentId, Provenance, SuggestionId,
    };

    use crate::entry::{EntryDraft, ExecutionOutcome};

    pub(crate) fn draft(outcome: ExecutionOutcome) -> EntryDraft {
        EntryDraft {
            intent_id: IntentId::new(),
            suggestion_id: SuggestionId::new(),
            action: ActionDescriptor::new("apply_gain").with_param("db", -3.5),
            evidence: Evidence::new("lufs", -9.1, -14.0, "master bus is too hot"),
            confidence: 0.83,
            provenance: Provenance::new("loudness-v2"),
            confirmation: ConfirmationMetrics::new(
                Duration::from_millis(452),
                Duration::from_millis(400),
            ),
            outcome,
        }
    }
}
