//! `ghostgate verify`

use std::path::Path;

use ghostgate_ledger::verify_entries;
use tracing::info;

use super::read_ledger;
use crate::error::{CliError, CliResult};
use crate::output::{print_error, print_json, print_success, short_hash, OutputFormat};

pub fn execute(path: &Path, format: OutputFormat) -> CliResult<()> {
    let entries = read_ledger(path)?;
    let verification = verify_entries(&entries);
    info!(
        path = %path.display(),
        entries = verification.total_entries,
        valid = verification.valid,
        "ledger verified"
    );

    match format {
        OutputFormat::Json => print_json(&verification)?,
        OutputFormat::Table if verification.valid => {
            let head = entries
                .last()
                .map(|e| short_hash(&e.entry_hash))
                .unwrap_or_else(|| "genesis".to_string());
            print_success(&format!(
                "Chain valid: {} entries, head {}",
                verification.total_entries, head
            ));
        }
        OutputFormat::Table => {
            print_error(&format!(
                "Chain invalid: {} of {} entries verified",
                verification.verified_entries, verification.total_entries
            ));
        }
    }

    if verification.valid {
        Ok(())
    } else {
        Err(CliError::ChainInvalid {
            sequence: verification.first_invalid.unwrap_or_default(),
            reason: verification.message.unwrap_or_default(),
        })
    }
}
