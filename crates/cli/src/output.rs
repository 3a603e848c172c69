//! Output formatting utilities

use colored::*;
use ghostgate_ledger::ComplianceRecord;
use serde::Serialize;
use tabled::{Table, Tabled};

use crate::error::CliResult;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed table format
    #[default]
    Table,
    /// JSON format
    Json,
}

/// One ledger entry as a table row.
#[derive(Debug, Serialize, Tabled)]
pub struct EntryRow {
    #[tabled(rename = "SEQ")]
    pub sequence: u64,
    #[tabled(rename = "ACTION")]
    pub action: String,
    #[tabled(rename = "OUTCOME")]
    pub outcome: String,
    #[tabled(rename = "RESULT")]
    pub descriptor: String,
    #[tabled(rename = "HELD")]
    pub held: String,
    #[tabled(rename = "WHY")]
    pub why: String,
    #[tabled(rename = "HASH")]
    pub hash: String,
}

impl From<&ComplianceRecord> for EntryRow {
    fn from(record: &ComplianceRecord) -> Self {
        Self {
            sequence: record.sequence,
            action: format!("{}({})", record.action_kind, record.action_parameters),
            outcome: record.outcome.clone(),
            descriptor: record.descriptor.clone(),
            held: format!("{}/{}ms", record.held_ms, record.required_ms),
            why: format!(
                "{} {} -> {}",
                record.metric, record.current_value, record.target_value
            ),
            hash: short_hash(&record.entry_hash),
        }
    }
}

pub fn short_hash(hash: &str) -> String {
    hash.chars().take(12).collect()
}

/// Print records as a table, or the whole value as JSON.
pub fn print_records<T: Serialize>(
    value: &T,
    records: &[ComplianceRecord],
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Table => {
            if records.is_empty() {
                println!("{}", "No entries".dimmed());
            } else {
                let rows: Vec<EntryRow> = records.iter().map(EntryRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }
        OutputFormat::Json => print_json(value)?,
    }
    Ok(())
}

pub fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}
