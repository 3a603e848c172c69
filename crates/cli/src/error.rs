//! CLI error types

use ghostgate_kernel::{ConfigError, GateError, KernelError};
use ghostgate_ledger::LedgerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration file could not be used
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// The ledger failed verification
    #[error("Ledger chain invalid at sequence {sequence}: {reason}")]
    ChainInvalid { sequence: u64, reason: String },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Gate error: {0}")]
    Gate(#[from] GateError),

    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML error: {0}")]
    TomlWrite(#[from] toml::ser::Error),
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
