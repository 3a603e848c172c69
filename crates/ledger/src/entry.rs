use chrono::{DateTime, Utc};
use ghostgate_types::{
    ActionDescriptor, ConfirmationMetrics, Evidence, IntentId, Provenance, SuggestionId,
};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// `prev_hash` of the first entry in every chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

const HASH_DOMAIN: &[u8] = b"ghostgate-forensic-v1:";

/// What the execution bridge reported for a dispatch attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success { result: String },
    Failure { error: String },
}

impl ExecutionOutcome {
    pub fn success(result: impl Into<String>) -> Self {
        Self::Success {
            result: result.into(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The opaque result or error descriptor.
    pub fn descriptor(&self) -> &str {
        match self {
            Self::Success { result } => result,
            Self::Failure { error } => error,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Failure { .. } => "failure",
        }
    }
}

/// The caller-supplied fields of a ForensicEntry.
///
/// Sequence, timestamp, and both hashes are assigned by the ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub intent_id: IntentId,
    pub suggestion_id: SuggestionId,
    pub action: ActionDescriptor,
    pub evidence: Evidence,
    pub confidence: f64,
    pub provenance: Provenance,
    pub confirmation: ConfirmationMetrics,
    pub outcome: ExecutionOutcome,
}

impl EntryDraft {
    /// NaN and the infinities all serialize as JSON `null`, which would hash
    /// alike and never parse back, so they are refused before sealing.
    fn ensure_finite(&self) -> Result<(), LedgerError> {
        let floats = [
            ("evidence.current_value", self.evidence.current_value),
            ("evidence.target_value", self.evidence.target_value),
            ("confidence", self.confidence),
        ];
        match floats.into_iter().find(|(_, value)| !value.is_finite()) {
            Some((field, value)) => Err(LedgerError::NonFinite { field, value }),
            None => Ok(()),
        }
    }
}

/// A sealed record of one dispatch attempt.
///
/// Fields are public for reading and serialization; the ledger never hands
/// out a mutable reference into its storage, and any out-of-band change is
/// caught by [`ForensicEntry::verify_hash`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForensicEntry {
    pub sequence: u64,
    pub intent_id: IntentId,
    pub suggestion_id: SuggestionId,
    pub action: ActionDescriptor,
    pub evidence: Evidence,
    pub confidence: f64,
    pub provenance: Provenance,
    pub confirmation: ConfirmationMetrics,
    pub outcome: ExecutionOutcome,
    pub recorded_at: DateTime<Utc>,
    pub prev_hash: String,
    pub entry_hash: String,
}

/// Borrowed view of everything covered by the entry hash.
#[derive(Serialize)]
struct HashMaterial<'a> {
    sequence: u64,
    intent_id: &'a IntentId,
    suggestion_id: &'a SuggestionId,
    action: &'a ActionDescriptor,
    evidence: &'a Evidence,
    confidence: f64,
    provenance: &'a Provenance,
    confirmation: &'a ConfirmationMetrics,
    outcome: &'a ExecutionOutcome,
    recorded_at: &'a DateTime<Utc>,
    prev_hash: &'a str,
}

impl ForensicEntry {
    /// Seal a draft at the given position in the chain.
    pub(crate) fn seal(
        draft: EntryDraft,
        sequence: u64,
        prev_hash: String,
        recorded_at: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        draft.ensure_finite()?;
        let mut entry = Self {
            sequence,
            intent_id: draft.intent_id,
            suggestion_id: draft.suggestion_id,
            action: draft.action,
            evidence: draft.evidence,
            confidence: draft.confidence,
            provenance: draft.provenance,
            confirmation: draft.confirmation,
            outcome: draft.outcome,
            recorded_at,
            prev_hash,
            entry_hash: String::new(),
        };
        entry.entry_hash = entry.compute_hash()?;
        Ok(entry)
    }

    /// Recompute the BLAKE3 content hash from the entry's fields.
    pub fn compute_hash(&self) -> Result<String, LedgerError> {
        let material = HashMaterial {
            sequence: self.sequence,
            intent_id: &self.intent_id,
            suggestion_id: &self.suggestion_id,
            action: &self.action,
            evidence: &self.evidence,
            confidence: self.confidence,
            provenance: &self.provenance,
            confirmation: &self.confirmation,
            outcome: &self.outcome,
            recorded_at: &self.recorded_at,
            prev_hash: &self.prev_hash,
        };
        let bytes = serde_json::to_vec(&material)
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;

        let mut hasher = blake3::Hasher::new();
        hasher.update(HASH_DOMAIN);
        hasher.update(&bytes);
        Ok(hasher.finalize().to_hex().to_string())
    }

    /// Whether the stored hash matches the entry's current fields.
    pub fn verify_hash(&self) -> bool {
        self.compute_hash()
            .map(|hash| hash == self.entry_hash)
            .unwrap_or(false)
    }

    /// BLAKE3 digest of the result or error descriptor.
    pub fn result_hash(&self) -> String {
        blake3::hash(self.outcome.descriptor().as_bytes())
            .to_hex()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::draft;

    #[test]
    fn sealed_entry_verifies() {
        let entry = ForensicEntry::seal(
            draft(ExecutionOutcome::success("ok:1")),
            1,
            GENESIS_HASH.to_string(),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(entry.entry_hash.len(), 64);
        assert!(entry.verify_hash());
    }

    #[test]
    fn any_field_change_breaks_hash() {
        let entry = ForensicEntry::seal(
            draft(ExecutionOutcome::success("ok:1")),
            1,
            GENESIS_HASH.to_string(),
            Utc::now(),
        )
        .unwrap();

        let mut held = entry.clone();
        held.confirmation.held_ms = 401;
        assert!(!held.verify_hash());

        let mut outcome = entry.clone();
        outcome.outcome = ExecutionOutcome::failure("nope");
        assert!(!outcome.verify_hash());

        let mut rationale = entry;
        rationale.evidence.rationale.push('!');
        assert!(!rationale.verify_hash());
    }

    #[test]
    fn hash_survives_json_round_trip() {
        let entry = ForensicEntry::seal(
            draft(ExecutionOutcome::success("ok:1")),
            7,
            GENESIS_HASH.to_string(),
            Utc::now(),
        )
        .unwrap();

        let line = serde_json::to_string(&entry).unwrap();
        let restored: ForensicEntry = serde_json::from_str(&line).unwrap();
        assert!(restored.verify_hash());
        assert_eq!(restored, entry);
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(ExecutionOutcome::failure("timeout")).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["error"], "timeout");
    }
}
