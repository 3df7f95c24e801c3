//! Knowledge-base façade: one query surface over symbolic facts and learned
//! perceptual judgments.
//!
//! The grounder submits `(predicate, args)` queries and receives a
//! `(pos, neg)` confidence pair. Symbolic predicates resolve through the
//! static [`FactStore`] (crisp 1.0/0.0 answers); perceptual predicates route
//! to the [`PerceptionEnsemble`]. A predicate neither side can interpret is a
//! [`KbError::UnknownPredicate`], fatal for the single grounding branch that
//! asked, not for the dialog.

pub mod facts;

use std::sync::Arc;

use crate::error::{AgentResult, KbError};
use crate::ontology::{Ontology, PredCategory, PredId};
use crate::perception::PerceptionEnsemble;

use facts::FactStore;

/// Hybrid knowledge base: static facts plus the perception ensemble.
pub struct KnowledgeBase {
    ontology: Arc<Ontology>,
    facts: FactStore,
    perception: Arc<PerceptionEnsemble>,
}

impl KnowledgeBase {
    /// Assemble a knowledge base from its two arms.
    pub fn new(
        ontology: Arc<Ontology>,
        facts: FactStore,
        perception: Arc<PerceptionEnsemble>,
    ) -> Self {
        Self {
            ontology,
            facts,
            perception,
        }
    }

    /// The perception arm, for online label updates.
    pub fn perception(&self) -> &Arc<PerceptionEnsemble> {
        &self.perception
    }

    /// The ontology this knowledge base answers over.
    pub fn ontology(&self) -> &Arc<Ontology> {
        &self.ontology
    }

    /// Query whether `pred(args...)` holds, as a `(pos, neg)` confidence pair.
    ///
    /// Symbolic answers are crisp; perceptual answers carry ensemble
    /// confidence. The pair is positive-satisfied when `pos > neg`.
    pub fn query(&self, pred: PredId, args: &[PredId]) -> AgentResult<(f64, f64)> {
        let entry = self.ontology.entry(pred);
        match entry.category {
            PredCategory::Perceptual => self.query_perceptual(&entry.name, args),
            PredCategory::Symbolic => self.query_symbolic(&entry.name, args),
            PredCategory::Action | PredCategory::Entity => Err(KbError::UnknownPredicate {
                name: entry.name.clone(),
            }
            .into()),
        }
    }

    fn query_perceptual(&self, name: &str, args: &[PredId]) -> AgentResult<(f64, f64)> {
        // Perceptual predicates are unary over physical objects.
        let [arg] = args else {
            return Err(KbError::UnknownPredicate {
                name: name.to_string(),
            }
            .into());
        };
        let arg_name = self.ontology.name(*arg);
        let (Some(oidx), Some(pidx)) = (
            object_index(arg_name),
            self.perception.predicate_index(name),
        ) else {
            return Err(KbError::UnknownPredicate {
                name: name.to_string(),
            }
            .into());
        };
        let (pos, neg) = self.perception.run(pidx, oidx)?;
        tracing::debug!(pred = name, object = oidx, pos, neg, "perceptual KB query");
        Ok((pos, neg))
    }

    fn query_symbolic(&self, name: &str, args: &[PredId]) -> AgentResult<(f64, f64)> {
        let arg_names: Vec<String> = args
            .iter()
            .map(|a| self.ontology.name(*a).to_string())
            .collect();
        match self.facts.query(name, &arg_names) {
            Some(true) => Ok((1.0, 0.0)),
            Some(false) => Ok((0.0, 1.0)),
            None => Err(KbError::UnknownPredicate {
                name: name.to_string(),
            }
            .into()),
        }
    }
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("facts", &self.facts.len())
            .field("perception", &self.perception)
            .finish()
    }
}

/// Extract the object index from an `oidx_N` entity name.
pub fn object_index(name: &str) -> Option<u32> {
    name.strip_prefix("oidx_")?.parse().ok()
}
