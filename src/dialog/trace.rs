//! Per-dialog trace and the training artifacts induced from it.
//!
//! A completed, confirmed dialog yields two things for offline learning: new
//! (utterance, logical-form) training pairs for the upstream parser, and the
//! raw trace (turns, per-role utterance sets, re-ask counters) for
//! aggregation. Both are emitted as JSON; nothing in-crate consumes them.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AgentResult, DialogError};

use super::actions::Role;

/// Who produced a dialog turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Agent,
}

/// One recorded turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub speaker: Speaker,
    pub text: String,
}

/// An induced (utterance, logical form) training pair for the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingPair {
    pub utterance: String,
    pub logical_form: String,
}

/// The full record of one dialog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DialogTrace {
    pub turns: Vec<TurnRecord>,
    /// Every utterance the user supplied while a given role was in focus.
    pub role_utterances: BTreeMap<Role, Vec<String>>,
    /// How many turns produced no usable evidence and forced a re-ask.
    pub reasks: u32,
    /// The confirmed role values, by role name, once the dialog terminates.
    pub confirmed: BTreeMap<Role, String>,
    /// Training pairs induced at dialog end.
    pub induced_pairs: Vec<TrainingPair>,
}

impl DialogTrace {
    pub fn record(&mut self, speaker: Speaker, text: impl Into<String>) {
        self.turns.push(TurnRecord {
            speaker,
            text: text.into(),
        });
    }

    pub fn record_role_utterance(&mut self, role: Role, text: impl Into<String>) {
        self.role_utterances.entry(role).or_default().push(text.into());
    }

    /// Write the trace as pretty JSON.
    pub fn write(&self, path: &Path) -> AgentResult<()> {
        let json = serde_json::to_vec_pretty(self).map_err(|e| DialogError::Trace {
            message: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(|e| DialogError::Trace {
            message: format!("{}: {e}", path.display()),
        })?;
        Ok(())
    }
}
