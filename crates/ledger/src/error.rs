use thiserror::Error;

/// Errors specific to the Forensic Ledger.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The stored chain no longer verifies. Audit trust is gone; nothing
    /// may be appended on top of it and it is never repaired automatically.
    #[error("ledger corruption at sequence {sequence}: {reason}")]
    Corruption { sequence: u64, reason: String },

    #[error("ledger storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("malformed ledger record on line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    /// A float with no JSON form was offered for sealing. Nothing was
    /// persisted.
    #[error("cannot record non-finite {field}: {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl LedgerError {
    pub fn is_corruption(&self) -> bool {
        matches!(self, LedgerError::Corruption { .. })
    }
}
