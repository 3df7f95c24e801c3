//! Aggregate agent configuration, loadable from TOML.
//!
//! Every subsystem keeps its own config struct next to its code; this module
//! only composes them and handles the file format. All fields default, so a
//! partial (or absent) file is fine.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dialog::DialogConfig;
use crate::error::{AgentResult, OntologyError};
use crate::perception::EnsembleConfig;

/// Top-level configuration for one agent process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub dialog: DialogConfig,
    pub ensemble: EnsembleConfig,
}

impl AgentConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> AgentResult<Self> {
        toml::from_str(text).map_err(|e| {
            OntologyError::File {
                message: format!("config: {e}"),
            }
            .into()
        })
    }

    /// Load a configuration file, falling back to defaults when the file
    /// does not exist.
    pub fn load_or_default(path: &Path) -> AgentResult<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| OntologyError::File {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml_str(&text)
    }
}
