// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # groundhog
//!
//! The decision-making core of a conversational embodied agent: it maps a
//! parsed natural-language command onto a confirmed symbolic action (`walk`,
//! `bring`, `move`) with typed arguments, clarifying through multi-turn
//! dialogue and resolving physical-world references through a learned
//! multimodal classifier ensemble.
//!
//! ## Architecture
//!
//! - **Grounding** (`ground`): evaluates logical-form trees against the
//!   knowledge base, enumerating weighted candidate groundings
//! - **Perception** (`perception`): per-predicate classifier banks fused by
//!   kappa-weighted inter-context agreement, retrainable online
//! - **Knowledge base** (`kb`): one query surface over static facts and
//!   perceptual judgments
//! - **Dialog** (`dialog`): belief-state controller: question policy,
//!   confirmation state machine, training-pair induction
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use groundhog::dialog::belief::ArgMax;
//! use groundhog::dialog::{BeliefController, DialogConfig};
//! use groundhog::io::KeyboardIo;
//! use groundhog::kb::{facts::FactStore, KnowledgeBase};
//! use groundhog::ontology::Ontology;
//! use groundhog::parser::LexiconParser;
//! use groundhog::perception::{features::FeatureBank, EnsembleConfig, PerceptionEnsemble};
//!
//! let ontology = Arc::new(Ontology::load("data/ontology.toml".as_ref()).unwrap());
//! let facts = FactStore::load("data/facts.txt".as_ref()).unwrap();
//! let features = FeatureBank::load("data/features.json".as_ref()).unwrap();
//! let perception = Arc::new(PerceptionEnsemble::new(
//!     features, vec!["cup".into()], Vec::new(), EnsembleConfig::default(),
//! ));
//! let kb = Arc::new(KnowledgeBase::new(ontology.clone(), facts, perception));
//! let parser = Box::new(LexiconParser::new(ontology.clone()));
//! let mut controller = BeliefController::new(
//!     ontology, kb, parser, Box::new(ArgMax), DialogConfig::default(),
//! ).unwrap();
//! let command = controller.run_dialog(&mut KeyboardIo).unwrap();
//! ```

pub mod config;
pub mod dialog;
pub mod error;
pub mod ground;
pub mod io;
pub mod kb;
pub mod lf;
pub mod ontology;
pub mod parser;
pub mod perception;
