//! Command implementations

pub mod demo;
pub mod export;
pub mod verify;

use std::path::Path;

use ghostgate_ledger::{ForensicEntry, JsonlStore};

use crate::error::{CliError, CliResult};

/// Read every entry of a JSONL ledger without opening it for writing.
pub(crate) fn read_ledger(path: &Path) -> CliResult<Vec<ForensicEntry>> {
    if !path.exists() {
        return Err(CliError::InvalidInput(format!(
            "ledger not found: {}",
            path.display()
        )));
    }
    Ok(JsonlStore::new(path).read_all()?)
}
