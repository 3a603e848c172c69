use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

use chrono::Utc;
use ghostgate_types::IntentId;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::entry::{EntryDraft, ForensicEntry, GENESIS_HASH};
use crate::error::LedgerError;
use crate::store::{LedgerStore, MemoryStore};

/// Result of walking a hash chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    /// Whether the chain is valid
    pub valid: bool,

    /// Total number of entries checked
    pub total_entries: usize,

    /// Number of entries verified before the first failure
    pub verified_entries: usize,

    /// Sequence number of the first invalid entry (if any)
    pub first_invalid: Option<u64>,

    /// What was wrong with it
    pub message: Option<String>,
}

impl ChainVerification {
    fn ok(total: usize) -> Self {
        Self {
            valid: true,
            total_entries: total,
            verified_entries: total,
            first_invalid: None,
            message: None,
        }
    }

    fn broken(total: usize, verified: usize, sequence: u64, message: String) -> Self {
        Self {
            valid: false,
            total_entries: total,
            verified_entries: verified,
            first_invalid: Some(sequence),
            message: Some(message),
        }
    }

    fn into_error(self) -> Option<LedgerError> {
        if self.valid {
            return None;
        }
        Some(LedgerError::Corruption {
            sequence: self.first_invalid.unwrap_or_default(),
            reason: self.message.unwrap_or_default(),
        })
    }
}

/// Verify a sequence of entries as a complete chain starting at genesis.
///
/// Checks, per entry: sequence continuity from 1, `prev_hash` linkage, and
/// that the stored content hash matches a fresh recomputation.
pub fn verify_entries(entries: &[ForensicEntry]) -> ChainVerification {
    let total = entries.len();
    let mut expected_prev = GENESIS_HASH;

    for (index, entry) in entries.iter().enumerate() {
        let expected_sequence = index as u64 + 1;
        if entry.sequence != expected_sequence {
            return ChainVerification::broken(
                total,
                index,
                entry.sequence,
                format!(
                    "sequence gap: expected {expected_sequence}, found {}",
                    entry.sequence
                ),
            );
        }
        if entry.prev_hash != expected_prev {
            return ChainVerification::broken(
                total,
                index,
                entry.sequence,
                format!(
                    "broken chain link (expected prev {expected_prev}, got {})",
                    entry.prev_hash
                ),
            );
        }
        if !entry.verify_hash() {
            return ChainVerification::broken(
                total,
                index,
                entry.sequence,
                "content hash mismatch".to_string(),
            );
        }
        expected_prev = entry.entry_hash.as_str();
    }

    ChainVerification::ok(total)
}

/// Append-only, hash-chained record of every dispatch attempt.
///
/// Appends go through a single writer lock that also guards the backing
/// store; an entry is pushed in memory only after the store accepted it.
/// Readers never block on a slow store.
pub struct ForensicLedger {
    writer: Mutex<Box<dyn LedgerStore>>,
    entries: Arc<RwLock<Vec<ForensicEntry>>>,
}

impl ForensicLedger {
    /// Empty ledger backed by a [`MemoryStore`].
    pub fn new() -> Self {
        Self {
            writer: Mutex::new(Box::new(MemoryStore::new())),
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Open a ledger over existing storage.
    ///
    /// The stored chain is verified before any append is accepted. A chain
    /// that fails verification is refused with [`LedgerError::Corruption`].
    pub fn open(store: impl LedgerStore + 'static) -> Result<Self, LedgerError> {
        let mut store: Box<dyn LedgerStore> = Box::new(store);
        let entries = store.load()?;

        let verification = verify_entries(&entries);
        if let Some(err) = verification.into_error() {
            error!(error = %err, "refusing to open corrupted forensic ledger");
            return Err(err);
        }

        info!(entries = entries.len(), "forensic ledger opened");
        Ok(Self {
            writer: Mutex::new(store),
            entries: Arc::new(RwLock::new(entries)),
        })
    }

    /// Seal and append a new entry. The only mutating operation.
    pub fn append(&self, draft: EntryDraft) -> Result<ForensicEntry, LedgerError> {
        let mut store = self.writer.lock();

        let (sequence, prev_hash) = {
            let entries = self.entries.read();
            match entries.last() {
                Some(last) => (last.sequence + 1, last.entry_hash.clone()),
                None => (1, GENESIS_HASH.to_string()),
            }
        };

        let entry = ForensicEntry::seal(draft, sequence, prev_hash, Utc::now())?;
        store.persist(&entry)?;
        self.entries.write().push(entry.clone());

        debug!(
            sequence,
            intent_id = %entry.intent_id,
            outcome = entry.outcome.label(),
            hash = %entry.entry_hash,
            "forensic entry sealed"
        );
        Ok(entry)
    }

    /// Recompute every hash and check every link.
    pub fn verify(&self) -> ChainVerification {
        let verification = verify_entries(&self.entries.read());
        if !verification.valid {
            error!(
                first_invalid = ?verification.first_invalid,
                message = ?verification.message,
                "forensic ledger failed verification"
            );
        }
        verification
    }

    pub fn verify_chain(&self) -> bool {
        self.verify().valid
    }

    /// Lazy, read-only view over a sequence-number range.
    ///
    /// Entries appended after this call are not part of the export.
    pub fn export(&self, range: impl RangeBounds<u64>) -> LedgerExport {
        let len = self.entries.read().len() as u64;

        let start = match range.start_bound() {
            Bound::Included(&n) => n,
            Bound::Excluded(&n) => n.saturating_add(1),
            Bound::Unbounded => 1,
        }
        .max(1);
        let end = match range.end_bound() {
            Bound::Included(&n) => n,
            Bound::Excluded(&n) => n.saturating_sub(1),
            Bound::Unbounded => len,
        }
        .min(len);

        LedgerExport {
            entries: Arc::clone(&self.entries),
            start,
            end,
        }
    }

    pub fn entry(&self, sequence: u64) -> Option<ForensicEntry> {
        let index = usize::try_from(sequence.checked_sub(1)?).ok()?;
        self.entries.read().get(index).cloned()
    }

    pub fn entries_for(&self, intent_id: &IntentId) -> Vec<ForensicEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| &e.intent_id == intent_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Hash of the newest entry, or the genesis hash for an empty ledger.
    pub fn head_hash(&self) -> String {
        self.entries
            .read()
            .last()
            .map(|e| e.entry_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string())
    }
}

impl Default for ForensicLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ForensicLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForensicLedger")
            .field("len", &self.len())
            .field("head_hash", &self.head_hash())
            .finish()
    }
}

/// A fixed sequence range over the ledger.
///
/// Iterating yields owned copies. Each call to [`LedgerExport::iter`] starts
/// again from the beginning of the range.
#[derive(Clone)]
pub struct LedgerExport {
    entries: Arc<RwLock<Vec<ForensicEntry>>>,
    start: u64,
    end: u64,
}

impl LedgerExport {
    pub fn iter(&self) -> ExportIter {
        ExportIter {
            entries: Arc::clone(&self.entries),
            next: self.start,
            end: self.end,
        }
    }

    /// Number of entries in the range.
    pub fn len(&self) -> usize {
        if self.end < self.start {
            0
        } else {
            (self.end - self.start + 1) as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn first_sequence(&self) -> u64 {
        self.start
    }

    pub fn last_sequence(&self) -> u64 {
        self.end
    }
}

impl std::fmt::Debug for LedgerExport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerExport")
            .field("start", &self.start)
            .field("end", &self.end)
            .finish()
    }
}

impl IntoIterator for LedgerExport {
    type Item = ForensicEntry;
    type IntoIter = ExportIter;

    fn into_iter(self) -> ExportIter {
        ExportIter {
            entries: self.entries,
            next: self.start,
            end: self.end,
        }
    }
}

impl IntoIterator for &LedgerExport {
    type Item = ForensicEntry;
    type IntoIter = ExportIter;

    fn into_iter(self) -> ExportIter {
        self.iter()
    }
}

pub struct ExportIter {
    entries: Arc<RwLock<Vec<ForensicEntry>>>,
    next: u64,
    end: u64,
}

impl Iterator for ExportIter {
    type Item = ForensicEntry;

    fn next(&mut self) -> Option<ForensicEntry> {
        if self.next > self.end {
            return None;
        }
        let index = usize::try_from(self.next - 1).ok()?;
        let entry = self.entries.read().get(index).cloned()?;
        self.next += 1;
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.next > self.end {
            0
        } else {
            (self.end - self.next + 1) as usize
        };
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ExecutionOutcome;
    use crate::store::JsonlStore;
    use crate::test_support::draft;
    use proptest::prelude::*;
    use std::io::Write;

    fn ledger_with(n: usize) -> ForensicLedger {
        let ledger = ForensicLedger::new();
        for i in 0..n {
            ledger
                .append(draft(ExecutionOutcome::success(format!("ok:{}", i + 1))))
                .unwrap();
        }
        ledger
    }

    #[test]
    fn first_entry_links_to_genesis() {
        let ledger = ForensicLedger::new();
        assert_eq!(ledger.head_hash(), GENESIS_HASH);

        let entry = ledger
            .append(draft(ExecutionOutcome::success("ok:1")))
            .unwrap();
        assert_eq!(entry.sequence, 1);
        assert_eq!(entry.prev_hash, GENESIS_HASH);
        assert_eq!(ledger.head_hash(), entry.entry_hash);
    }

    #[test]
    fn sequences_are_contiguous_and_linked() {
        let ledger = ledger_with(5);
        assert_eq!(ledger.len(), 5);

        let all: Vec<_> = ledger.export(..).into_iter().collect();
        for pair in all.windows(2) {
            assert_eq!(pair[1].sequence, pair[0].sequence + 1);
            assert_eq!(pair[1].prev_hash, pair[0].entry_hash);
        }
        assert!(ledger.verify_chain());
    }

    #[test]
    fn in_memory_tamper_is_detected() {
        let ledger = ledger_with(3);
        assert!(ledger.verify_chain());

        ledger.entries.write()[1].outcome = ExecutionOutcome::failure("rewritten");

        let verification = ledger.verify();
        assert!(!verification.valid);
        assert_eq!(verification.first_invalid, Some(2));
        assert_eq!(verification.verified_entries, 1);
    }

    #[test]
    fn rehashed_tamper_breaks_the_next_link() {
        let ledger = ledger_with(3);
        {
            let mut entries = ledger.entries.write();
            entries[0].confidence = 0.99;
            entries[0].entry_hash = entries[0].compute_hash().unwrap();
        }

        let verification = ledger.verify();
        assert_eq!(verification.first_invalid, Some(2));
        assert!(verification
            .message
            .unwrap()
            .contains("broken chain link"));
    }

    #[test]
    fn export_is_restartable_and_bounded_at_creation() {
        let ledger = ledger_with(4);
        let export = ledger.export(2..=3);
        assert_eq!(export.len(), 2);

        ledger
            .append(draft(ExecutionOutcome::success("late")))
            .unwrap();

        let first: Vec<u64> = export.iter().map(|e| e.sequence).collect();
        let second: Vec<u64> = export.iter().map(|e| e.sequence).collect();
        assert_eq!(first, vec![2, 3]);
        assert_eq!(first, second);

        let open_ended = ledger.export(4..);
        ledger
            .append(draft(ExecutionOutcome::success("later")))
            .unwrap();
        assert_eq!(open_ended.iter().count(), 2);
    }

    #[test]
    fn export_out_of_range_is_empty() {
        let ledger = ledger_with(2);
        assert!(ledger.export(10..).is_empty());
        assert_eq!(ledger.export(10..).iter().count(), 0);
        assert_eq!(ledger.export(0..=1).first_sequence(), 1);
    }

    #[test]
    fn query_helpers() {
        let ledger = ForensicLedger::new();
        let first = draft(ExecutionOutcome::failure("timeout"));
        let intent = first.intent_id;
        ledger.append(first).unwrap();
        ledger
            .append(draft(ExecutionOutcome::success("ok")))
            .unwrap();

        assert_eq!(ledger.entries_for(&intent).len(), 1);
        assert_eq!(ledger.entry(2).unwrap().outcome.label(), "success");
        assert!(ledger.entry(0).is_none());
        assert!(ledger.entry(3).is_none());
    }

    #[test]
    fn reopened_jsonl_ledger_continues_the_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");

        let head = {
            let ledger = ForensicLedger::open(JsonlStore::new(&path)).unwrap();
            ledger
                .append(draft(ExecutionOutcome::success("ok:1")))
                .unwrap();
            ledger
                .append(draft(ExecutionOutcome::failure("bridge down")))
                .unwrap();
            ledger.head_hash()
        };

        let reopened = ForensicLedger::open(JsonlStore::new(&path)).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.head_hash(), head);

        let third = reopened
            .append(draft(ExecutionOutcome::success("ok:3")))
            .unwrap();
        assert_eq!(third.sequence, 3);
        assert_eq!(third.prev_hash, head);
    }

    #[test]
    fn tampered_file_is_refused_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        {
            let ledger = ForensicLedger::open(JsonlStore::new(&path)).unwrap();
            ledger
                .append(draft(ExecutionOutcome::success("ok:1")))
                .unwrap();
            ledger
                .append(draft(ExecutionOutcome::success("ok:2")))
                .unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let tampered = contents.replacen("ok:2", "ok:9", 1);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(tampered.as_bytes()).unwrap();

        let err = ForensicLedger::open(JsonlStore::new(&path)).unwrap_err();
        match err {
            LedgerError::Corruption { sequence, .. } => assert_eq!(sequence, 2),
            other => panic!("expected corruption, got {other:?}"),
        }
    }

    #[test]
    fn non_finite_draft_is_refused_before_persisting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let ledger = ForensicLedger::open(JsonlStore::new(&path)).unwrap();
        ledger
            .append(draft(ExecutionOutcome::success("ok:1")))
            .unwrap();
        let head = ledger.head_hash();

        let mut silent = draft(ExecutionOutcome::success("ok:2"));
        silent.evidence.current_value = f64::NEG_INFINITY;
        match ledger.append(silent).unwrap_err() {
            LedgerError::NonFinite { field, value } => {
                assert_eq!(field, "evidence.current_value");
                assert_eq!(value, f64::NEG_INFINITY);
            }
            other => panic!("expected non-finite refusal, got {other:?}"),
        }

        let mut unsure = draft(ExecutionOutcome::success("ok:2"));
        unsure.confidence = f64::NAN;
        assert!(matches!(
            ledger.append(unsure),
            Err(LedgerError::NonFinite {
                field: "confidence",
                ..
            })
        ));

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.head_hash(), head);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(!contents.contains("null"));

        let reopened = ForensicLedger::open(JsonlStore::new(&path)).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.head_hash(), head);
    }

    #[test]
    fn failed_persist_does_not_commit() {
        struct Refusing;
        impl LedgerStore for Refusing {
            fn load(&mut self) -> Result<Vec<ForensicEntry>, LedgerError> {
                Ok(Vec::new())
            }
            fn persist(&mut self, _: &ForensicEntry) -> Result<(), LedgerError> {
                Err(LedgerError::Storage(std::io::Error::other("disk full")))
            }
        }

        let ledger = ForensicLedger::open(Refusing).unwrap();
        assert!(ledger
            .append(draft(ExecutionOutcome::success("ok")))
            .is_err());
        assert!(ledger.is_empty());
        assert_eq!(ledger.head_hash(), GENESIS_HASH);
    }

    #[test]
    fn concurrent_appends_never_interleave() {
        let ledger = Arc::new(ForensicLedger::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        ledger
                            .append(draft(ExecutionOutcome::success("ok")))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ledger.len(), 80);
        assert!(ledger.verify_chain());
    }

    proptest! {
        #[test]
        fn any_single_field_change_is_detected(
            len in 1usize..8,
            pick in any::<prop::sample::Index>(),
            field in 0u8..4,
        ) {
            let ledger = ledger_with(len);
            let victim = pick.index(len);
            {
                let mut entries = ledger.entries.write();
                let entry = &mut entries[victim];
                match field {
                    0 => entry.confirmation.held_ms += 1,
                    1 => entry.evidence.current_value += 1.0,
                    2 => entry.outcome = ExecutionOutcome::failure("forged"),
                    _ => entry.provenance.0.push('x'),
                }
            }

            let verification = ledger.verify();
            prop_assert!(!verification.valid);
            prop_assert_eq!(verification.first_invalid, Some(victim as u64 + 1));
        }
    }
}
