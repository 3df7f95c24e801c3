//! Persistence of the ensemble's learned state.
//!
//! Three artifacts live in the source directory: the predicate roster and the
//! accumulated label set as JSON (human-inspectable, append-friendly), and the
//! trained classifier rows as one bincode blob. A restore installs the trained
//! rows directly instead of refitting.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AgentResult, PerceptionError};

use super::features::FeatureBank;
use super::{EnsembleConfig, Label, PerceptionEnsemble, PredicateBank};

const PREDICATES_FILE: &str = "predicates.json";
const LABELS_FILE: &str = "labels.json";
const CLASSIFIERS_FILE: &str = "classifiers.bin";

/// A point-in-time copy of the ensemble's learned state.
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub predicates: Vec<String>,
    pub labels: Vec<Label>,
    /// Trained rows by predicate index; untrained predicates are absent.
    pub banks: BTreeMap<usize, PredicateBank>,
}

impl Snapshot {
    /// Capture the current learned state of an ensemble.
    pub fn capture(ensemble: &PerceptionEnsemble) -> Self {
        let predicates = ensemble.predicate_names();
        let banks = (0..predicates.len())
            .filter_map(|pidx| ensemble.bank(pidx).map(|b| (pidx, (*b).clone())))
            .collect();
        Self {
            predicates,
            labels: ensemble.label_set(),
            banks,
        }
    }

    /// Commit the snapshot to a source directory.
    pub fn write(&self, dir: &Path) -> AgentResult<()> {
        std::fs::create_dir_all(dir).map_err(|e| snapshot_err(dir, e))?;

        let predicates = serde_json::to_vec_pretty(&self.predicates)
            .map_err(|e| snapshot_err(dir, e))?;
        std::fs::write(dir.join(PREDICATES_FILE), predicates)
            .map_err(|e| snapshot_err(dir, e))?;

        let labels =
            serde_json::to_vec_pretty(&self.labels).map_err(|e| snapshot_err(dir, e))?;
        std::fs::write(dir.join(LABELS_FILE), labels).map_err(|e| snapshot_err(dir, e))?;

        let banks = bincode::serialize(&self.banks).map_err(|e| snapshot_err(dir, e))?;
        std::fs::write(dir.join(CLASSIFIERS_FILE), banks).map_err(|e| snapshot_err(dir, e))?;

        tracing::info!(
            dir = %dir.display(),
            predicates = self.predicates.len(),
            labels = self.labels.len(),
            trained = self.banks.len(),
            "committed ensemble snapshot"
        );
        Ok(())
    }

    /// Read a snapshot back from a source directory. Returns `None` when no
    /// snapshot has been committed there yet.
    pub fn read(dir: &Path) -> AgentResult<Option<Self>> {
        let pred_path = dir.join(PREDICATES_FILE);
        if !pred_path.is_file() {
            return Ok(None);
        }

        let predicates: Vec<String> = serde_json::from_slice(
            &std::fs::read(&pred_path).map_err(|e| snapshot_err(dir, e))?,
        )
        .map_err(|e| snapshot_err(dir, e))?;

        let labels: Vec<Label> = serde_json::from_slice(
            &std::fs::read(dir.join(LABELS_FILE)).map_err(|e| snapshot_err(dir, e))?,
        )
        .map_err(|e| snapshot_err(dir, e))?;

        let banks: BTreeMap<usize, PredicateBank> = bincode::deserialize(
            &std::fs::read(dir.join(CLASSIFIERS_FILE)).map_err(|e| snapshot_err(dir, e))?,
        )
        .map_err(|e| snapshot_err(dir, e))?;

        Ok(Some(Self {
            predicates,
            labels,
            banks,
        }))
    }

    /// Rebuild an ensemble from this snapshot, installing the trained rows
    /// without refitting anything.
    pub fn restore(self, features: FeatureBank, config: EnsembleConfig) -> PerceptionEnsemble {
        let ensemble =
            PerceptionEnsemble::from_parts(features, self.predicates, self.labels, config);
        for (pidx, bank) in self.banks {
            ensemble.install_bank(pidx, bank);
        }
        ensemble
    }
}

fn snapshot_err(dir: &Path, e: impl std::fmt::Display) -> PerceptionError {
    PerceptionError::Snapshot {
        message: format!("{}: {e}", dir.display()),
    }
}
