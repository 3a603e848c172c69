//! CLI configuration

use std::path::{Path, PathBuf};

use ghostgate_kernel::{DispatchConfig, GateConfig, KernelConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CliError, CliResult};

/// Effective configuration: kernel settings plus CLI defaults.
///
/// Read from `$XDG_CONFIG_HOME/ghostgate/config.toml` (or the platform
/// equivalent) unless a path is given. A missing default file means defaults;
/// a missing explicit file is an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Ledger used by `demo` when `--ledger` is not given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_path: Option<PathBuf>,

    pub gate: GateConfig,
    pub dispatch: DispatchConfig,
}

impl CliConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ghostgate").join("config.toml"))
    }

    /// Load from an explicit path, or the default location.
    pub fn load(path: Option<&Path>) -> CliResult<Self> {
        let config = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(CliError::Config(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                Self::from_file(path)?
            }
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.kernel().validate()?;
        Ok(config)
    }

    pub fn kernel(&self) -> KernelConfig {
        KernelConfig {
            gate: self.gate.clone(),
            dispatch: self.dispatch.clone(),
        }
    }

    fn from_file(path: &Path) -> CliResult<Self> {
        debug!(path = %path.display(), "loading configuration");
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn to_toml(&self) -> CliResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
