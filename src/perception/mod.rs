//! Multimodal perception ensemble: per-predicate classifier banks fused by
//! inter-context agreement.
//!
//! Every perceptual predicate owns one bank of binary classifiers, one per
//! sensing [`Context`](features::Context). A query fuses the per-context votes
//! with kappa-derived weights into a single `(pos, neg)` confidence pair.
//! Human labels always dominate classifier output, and labels arriving from a
//! live dialog retrain exactly the predicates they touch.
//!
//! The trained bank is process-wide shared state. Retraining replaces a
//! predicate's whole row atomically (an `Arc` swap in a concurrent table), so
//! a reader never observes a stale classifier next to a fresh kappa.

pub mod classifier;
pub mod features;
pub mod kappa;
pub mod snapshot;

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{AgentResult, PerceptionError};

use classifier::{FitConfig, MarginClassifier};
use features::FeatureBank;
use kappa::{kappa, leave_one_object_out};

/// One ground-truth annotation. Multiple labels per (predicate, object) are
/// legal and resolved by Laplace-smoothed majority, never overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub pidx: usize,
    pub oidx: u32,
    pub positive: bool,
}

/// Configuration for the perception ensemble.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// Classifier fitting hyperparameters.
    pub fit: FitConfig,
    /// Objects reserved for held-out evaluation: their labels are invisible
    /// to both label lookups and training.
    pub held_out: Vec<u32>,
}

/// One predicate's trained row: a classifier and a kappa per context, plus
/// the normalized fusion weights. Replaced wholesale on retraining.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredicateBank {
    pub classifiers: Vec<Option<MarginClassifier>>,
    pub kappas: Vec<f64>,
    pub weights: Vec<f64>,
}

/// The perception ensemble: predicate roster, label store, feature bank, and
/// the per-predicate classifier rows.
pub struct PerceptionEnsemble {
    features: FeatureBank,
    config: EnsembleConfig,
    held_out: HashSet<u32>,
    predicates: RwLock<Vec<String>>,
    labels: RwLock<Vec<Label>>,
    banks: DashMap<usize, Arc<PredicateBank>>,
}

impl PerceptionEnsemble {
    /// Create an ensemble over a feature bank with an initial predicate
    /// roster and label set, then train every predicate once.
    pub fn new(
        features: FeatureBank,
        predicates: Vec<String>,
        labels: Vec<Label>,
        config: EnsembleConfig,
    ) -> Self {
        let ensemble = Self::from_parts(features, predicates, labels, config);
        let all: Vec<usize> = (0..ensemble.predicate_count()).collect();
        ensemble.train(&all);
        ensemble
    }

    /// Assemble an ensemble without training; used by snapshot restore, which
    /// installs previously trained rows instead.
    pub(crate) fn from_parts(
        features: FeatureBank,
        predicates: Vec<String>,
        labels: Vec<Label>,
        config: EnsembleConfig,
    ) -> Self {
        let held_out = config.held_out.iter().copied().collect();
        Self {
            features,
            config,
            held_out,
            predicates: RwLock::new(predicates),
            labels: RwLock::new(labels),
            banks: DashMap::new(),
        }
    }

    /// The feature bank backing this ensemble.
    pub fn features(&self) -> &FeatureBank {
        &self.features
    }

    /// Number of predicates in the roster.
    pub fn predicate_count(&self) -> usize {
        self.predicates.read().expect("predicate roster poisoned").len()
    }

    /// A copy of the predicate roster.
    pub fn predicate_names(&self) -> Vec<String> {
        self.predicates.read().expect("predicate roster poisoned").clone()
    }

    /// Find a predicate's roster index by name.
    pub fn predicate_index(&self, name: &str) -> Option<usize> {
        self.predicates
            .read()
            .expect("predicate roster poisoned")
            .iter()
            .position(|p| p == name)
    }

    /// A copy of the accumulated label set.
    pub fn label_set(&self) -> Vec<Label> {
        self.labels.read().expect("label store poisoned").clone()
    }

    /// The fusion weights for a predicate, if it has a trained bank.
    pub fn weights(&self, pidx: usize) -> Option<Vec<f64>> {
        self.banks.get(&pidx).map(|b| b.weights.clone())
    }

    /// Snapshot of one predicate's trained row.
    pub fn bank(&self, pidx: usize) -> Option<Arc<PredicateBank>> {
        self.banks.get(&pidx).map(|b| Arc::clone(b.value()))
    }

    /// Install a previously trained row (snapshot restore).
    pub(crate) fn install_bank(&self, pidx: usize, bank: PredicateBank) {
        self.banks.insert(pidx, Arc::new(bank));
    }

    /// Query the ensemble: confidence that `predicate pidx` holds of object
    /// `oidx`, as a `(pos, neg)` pair.
    ///
    /// Resolution order: human labels (Laplace-smoothed class balance), then
    /// the trained classifier bank (kappa-weighted context votes), then the
    /// untrained 0.5/0.5 prior.
    pub fn run(&self, pidx: usize, oidx: u32) -> AgentResult<(f64, f64)> {
        if pidx >= self.predicate_count() {
            return Err(PerceptionError::UnknownPredicate { pidx }.into());
        }

        // Labels always dominate classifier output.
        if !self.held_out.contains(&oidx) {
            let labels = self.labels.read().expect("label store poisoned");
            let ls: Vec<bool> = labels
                .iter()
                .filter(|l| l.pidx == pidx && l.oidx == oidx)
                .map(|l| l.positive)
                .collect();
            drop(labels);
            if !ls.is_empty() {
                let pos_n = ls.iter().filter(|&&p| p).count();
                let neg_n = ls.len() - pos_n;
                let pos = (1 + pos_n) as f64 / (ls.len() + 2) as f64;
                let neg = (1 + neg_n) as f64 / (ls.len() + 2) as f64;
                return Ok((pos, neg));
            }
        }

        let Some(bank) = self.banks.get(&pidx).map(|b| Arc::clone(b.value())) else {
            // Untrained: equally uncertain either way.
            return Ok((0.5, 0.5));
        };

        if !self.features.has_object(oidx) {
            return Err(PerceptionError::UnknownObject { oidx }.into());
        }

        let mut pos = 0.0;
        let mut neg = 0.0;
        for ctx in 0..self.features.contexts().len() {
            let obs = self.features.observations(oidx, ctx);
            if obs.is_empty() {
                continue;
            }
            let share = bank.weights[ctx] / obs.len() as f64;
            for x in obs {
                let vote = match &bank.classifiers[ctx] {
                    Some(c) => c.predict(x),
                    // No classifier could be fit in this context: guess the
                    // majority class no.
                    None => -1,
                };
                if vote == 1 {
                    pos += share;
                } else {
                    neg += share;
                }
            }
        }
        Ok((pos, neg))
    }

    /// Train (or retrain) the classifier banks for the given predicates.
    ///
    /// A predicate whose visible labels span fewer than two distinct values
    /// has its bank removed, the designed "insufficient data" state, which
    /// `run` answers with the 0.5/0.5 prior.
    pub fn train(&self, pidxs: &[usize]) {
        let n_ctx = self.features.contexts().len();
        for &pidx in pidxs {
            let pairs = self.training_pairs(pidx);
            let has_both = pairs.iter().any(|&(_, l)| l == 1) && pairs.iter().any(|&(_, l)| l == -1);
            if !has_both {
                tracing::debug!(pidx, pairs = pairs.len(), "predicate lacks a +/- pair to fit");
                self.banks.remove(&pidx);
                continue;
            }

            let fitted: Vec<(Option<MarginClassifier>, f64)> = (0..n_ctx)
                .into_par_iter()
                .map(|ctx| {
                    let (xs, ys) = self.features.rows_for_context(ctx, &pairs);
                    let c = MarginClassifier::fit(&xs, &ys, &self.config.fit);
                    let cm = leave_one_object_out(&self.features, ctx, &pairs, &self.config.fit);
                    (c, kappa(&cm))
                })
                .collect();

            let (classifiers, kappas): (Vec<_>, Vec<_>) = fitted.into_iter().unzip();
            let weights = normalize_weights(&kappas);
            tracing::debug!(pidx, contexts = n_ctx, "trained classifier bank");
            self.banks
                .insert(pidx, Arc::new(PredicateBank { classifiers, kappas, weights }));
        }
    }

    /// Extend the roster with new predicates, append labels, and retrain
    /// exactly the touched predicates.
    ///
    /// This is the online path by which a live dialog's perceptual yes/no
    /// answers feed back into future queries. Mutation is serialized through
    /// the internal locks; each retrained row is swapped in atomically.
    pub fn update(
        &self,
        new_predicates: Vec<String>,
        pidxs: &[usize],
        oidxs: &[u32],
        labels: &[bool],
    ) -> AgentResult<()> {
        if pidxs.len() != oidxs.len() || oidxs.len() != labels.len() {
            return Err(PerceptionError::MismatchedUpdate {
                pidxs: pidxs.len(),
                oidxs: oidxs.len(),
                labels: labels.len(),
            }
            .into());
        }

        let roster_len = {
            let mut roster = self.predicates.write().expect("predicate roster poisoned");
            roster.extend(new_predicates);
            roster.len()
        };
        if let Some(&bad) = pidxs.iter().find(|&&p| p >= roster_len) {
            return Err(PerceptionError::UnknownPredicate { pidx: bad }.into());
        }

        let mut touched = Vec::new();
        {
            let mut store = self.labels.write().expect("label store poisoned");
            for ((&pidx, &oidx), &positive) in pidxs.iter().zip(oidxs).zip(labels) {
                if !touched.contains(&pidx) {
                    touched.push(pidx);
                }
                store.push(Label { pidx, oidx, positive });
            }
        }
        tracing::info!(
            new_labels = labels.len(),
            retrain = touched.len(),
            "online ensemble update"
        );
        self.train(&touched);
        Ok(())
    }

    /// The (object, ±1) training pairs for a predicate, excluding held-out
    /// objects. One pair per label, so repeated labels weigh repeatedly.
    fn training_pairs(&self, pidx: usize) -> Vec<(u32, i8)> {
        self.labels
            .read()
            .expect("label store poisoned")
            .iter()
            .filter(|l| l.pidx == pidx && !self.held_out.contains(&l.oidx))
            .map(|l| (l.oidx, if l.positive { 1 } else { -1 }))
            .collect()
    }
}

impl std::fmt::Debug for PerceptionEnsemble {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerceptionEnsemble")
            .field("predicates", &self.predicate_count())
            .field("contexts", &self.features.contexts().len())
            .field("trained_banks", &self.banks.len())
            .finish()
    }
}

/// Normalize kappas into fusion weights summing to 1, falling back to
/// uniform when every kappa is zero (or there are no contexts).
fn normalize_weights(kappas: &[f64]) -> Vec<f64> {
    let sum: f64 = kappas.iter().sum();
    if sum > 0.0 {
        kappas.iter().map(|k| k / sum).collect()
    } else if kappas.is_empty() {
        Vec::new()
    } else {
        vec![1.0 / kappas.len() as f64; kappas.len()]
    }
}
