//! `ghostgate export`

use std::path::Path;

use ghostgate_ledger::{verify_entries, ComplianceReport};

use super::read_ledger;
use crate::error::{CliError, CliResult};
use crate::output::{print_records, print_warning, OutputFormat};

/// Print a compliance report for `from..=to`.
///
/// A corrupted chain is still exported, flagged `chain_valid: false`, so an
/// auditor can see what the file claims.
pub fn execute(
    path: &Path,
    from: Option<u64>,
    to: Option<u64>,
    format: OutputFormat,
) -> CliResult<()> {
    let from = from.unwrap_or(1);
    let to = to.unwrap_or(u64::MAX);
    if from > to {
        return Err(CliError::InvalidInput(format!(
            "empty range: --from {from} is after --to {to}"
        )));
    }

    let entries = read_ledger(path)?;
    let chain_valid = verify_entries(&entries).valid;
    let selected = entries
        .iter()
        .filter(|e| (from..=to).contains(&e.sequence));
    let report = ComplianceReport::from_entries(chain_valid, selected);

    if !chain_valid && format == OutputFormat::Table {
        print_warning("chain failed verification; records below are unverified");
    }
    print_records(&report, &report.records, format)
}
