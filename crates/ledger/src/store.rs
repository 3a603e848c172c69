//! Storage backends behind the ledger's single writer.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::entry::ForensicEntry;
use crate::error::LedgerError;

/// Durable medium for sealed entries.
///
/// Stores only ever see fully sealed entries, in sequence order. They expose
/// no update or delete operation.
pub trait LedgerStore: Send {
    /// Read every persisted entry, oldest first.
    fn load(&mut self) -> Result<Vec<ForensicEntry>, LedgerError>;

    /// Durably append one sealed entry.
    fn persist(&mut self, entry: &ForensicEntry) -> Result<(), LedgerError>;
}

/// In-memory store for tests and short-lived sessions.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: Vec<ForensicEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with pre-existing entries (e.g. a snapshot to re-open).
    pub fn from_entries(entries: Vec<ForensicEntry>) -> Self {
        Self { entries }
    }
}

impl LedgerStore for MemoryStore {
    fn load(&mut self) -> Result<Vec<ForensicEntry>, LedgerError> {
        Ok(self.entries.clone())
    }

    fn persist(&mut self, entry: &ForensicEntry) -> Result<(), LedgerError> {
        self.entries.push(entry.clone());
        Ok(())
    }
}

/// Append-only JSON-lines file: one sealed entry per line.
#[derive(Debug, Clone)]
pub struct JsonlStore {
    path: PathBuf,
}

impl JsonlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all entries from the file without opening a ledger on them.
    ///
    /// A missing file reads as an empty chain.
    pub fn read_all(&self) -> Result<Vec<ForensicEntry>, LedgerError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut entries = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: ForensicEntry =
                serde_json::from_str(&line).map_err(|e| LedgerError::Malformed {
                    line: index + 1,
                    reason: e.to_string(),
                })?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

impl LedgerStore for JsonlStore {
    fn load(&mut self) -> Result<Vec<ForensicEntry>, LedgerError> {
        self.read_all()
    }

    fn persist(&mut self, entry: &ForensicEntry) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut line =
            serde_json::to_string(entry).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }
}
