//! Flat, self-describing records for external audit.

use std::ops::RangeBounds;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::ForensicEntry;
use crate::ledger::ForensicLedger;

/// One ledger entry flattened for compliance tooling.
///
/// Carries no executable content: parameters are rendered as text and the
/// outcome descriptor is accompanied by its BLAKE3 digest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComplianceRecord {
    pub sequence: u64,
    pub intent_id: String,
    pub suggestion_id: String,

    // What
    pub action_kind: String,
    pub action_parameters: String,
    pub outcome: String,
    pub descriptor: String,
    pub result_hash: String,

    // Why
    pub metric: String,
    pub current_value: f64,
    pub target_value: f64,
    pub rationale: String,
    pub confidence: f64,
    pub provenance: String,

    // Who decided
    pub held_ms: u64,
    pub required_ms: u64,

    // When
    pub recorded_at: DateTime<Utc>,

    pub entry_hash: String,
    pub prev_hash: String,
}

impl From<&ForensicEntry> for ComplianceRecord {
    fn from(entry: &ForensicEntry) -> Self {
        Self {
            sequence: entry.sequence,
            intent_id: entry.intent_id.to_string(),
            suggestion_id: entry.suggestion_id.to_string(),
            action_kind: entry.action.kind.to_string(),
            action_parameters: entry.action.render_parameters(),
            outcome: entry.outcome.label().to_string(),
            descriptor: entry.outcome.descriptor().to_string(),
            result_hash: entry.result_hash(),
            metric: entry.evidence.metric.clone(),
            current_value: entry.evidence.current_value,
            target_value: entry.evidence.target_value,
            rationale: entry.evidence.rationale.clone(),
            confidence: entry.confidence,
            provenance: entry.provenance.to_string(),
            held_ms: entry.confirmation.held_ms,
            required_ms: entry.confirmation.required_ms,
            recorded_at: entry.recorded_at,
            entry_hash: entry.entry_hash.clone(),
            prev_hash: entry.prev_hash.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub generated_at: DateTime<Utc>,
    /// Verification result of the whole chain the records were taken from.
    pub chain_valid: bool,
    pub records: Vec<ComplianceRecord>,
}

impl ComplianceReport {
    /// Report on a range of a live ledger. Validity covers the whole chain,
    /// not just the exported range.
    pub fn from_ledger(ledger: &ForensicLedger, range: impl RangeBounds<u64>) -> Self {
        let export = ledger.export(range);
        Self {
            generated_at: Utc::now(),
            chain_valid: ledger.verify_chain(),
            records: export.iter().map(|e| ComplianceRecord::from(&e)).collect(),
        }
    }

    /// Build a report from entries already selected by the caller.
    pub fn from_entries<'a>(
        chain_valid: bool,
        entries: impl IntoIterator<Item = &'a ForensicEntry>,
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            chain_valid,
            records: entries.into_iter().map(ComplianceRecord::from).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ComplianceRecord> {
        self.records.iter().filter(|r| r.outcome == "failure")
    }
}
