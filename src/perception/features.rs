//! Sensing contexts and per-object observation vectors.
//!
//! A context is one (behavior, modality) pairing, e.g. ("grasp", "haptics").
//! The context roster is fixed at load time and shared by every predicate's
//! classifier bank. Each object carries zero or more raw observation vectors
//! per context; an object may have been explored several times.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AgentResult, PerceptionError};

/// One sensing channel: a behavior performed on the object and the modality
/// recorded while performing it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Context {
    pub behavior: String,
    pub modality: String,
}

impl std::fmt::Display for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.behavior, self.modality)
    }
}

/// On-disk shape of the feature file.
#[derive(Debug, Serialize, Deserialize)]
struct FeatureFile {
    behaviors: Vec<String>,
    modalities: Vec<String>,
    /// object id (as string key, JSON maps) → behavior → modality → observations.
    objects: BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<Vec<f64>>>>>,
}

/// The full feature bank: the static context roster plus every object's
/// observation vectors, indexed by context position.
#[derive(Debug, Clone)]
pub struct FeatureBank {
    contexts: Vec<Context>,
    /// oidx → per-context observation vectors (parallel to `contexts`).
    observations: BTreeMap<u32, Vec<Vec<Vec<f64>>>>,
}

impl FeatureBank {
    /// Build a bank from explicit parts. Context order follows the given
    /// behavior × modality order, restricted to pairs that actually occur.
    pub fn new(
        behaviors: &[String],
        modalities: &[String],
        raw: BTreeMap<u32, BTreeMap<String, BTreeMap<String, Vec<Vec<f64>>>>>,
    ) -> Self {
        let mut contexts = Vec::new();
        for b in behaviors {
            for m in modalities {
                let present = raw
                    .values()
                    .any(|per_b| per_b.get(b).is_some_and(|per_m| per_m.contains_key(m)));
                if present {
                    contexts.push(Context {
                        behavior: b.clone(),
                        modality: m.clone(),
                    });
                }
            }
        }

        let mut observations = BTreeMap::new();
        for (oidx, per_b) in raw {
            let per_context = contexts
                .iter()
                .map(|c| {
                    per_b
                        .get(&c.behavior)
                        .and_then(|per_m| per_m.get(&c.modality))
                        .cloned()
                        .unwrap_or_default()
                })
                .collect();
            observations.insert(oidx, per_context);
        }

        Self {
            contexts,
            observations,
        }
    }

    /// Load a bank from a JSON feature file.
    pub fn load(path: &Path) -> AgentResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| PerceptionError::FeatureFile {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_json_str(&text)
    }

    /// Parse a bank from JSON text.
    pub fn from_json_str(text: &str) -> AgentResult<Self> {
        let file: FeatureFile =
            serde_json::from_str(text).map_err(|e| PerceptionError::FeatureFile {
                message: e.to_string(),
            })?;
        let mut raw = BTreeMap::new();
        for (key, per_b) in file.objects {
            let oidx: u32 = key.parse().map_err(|_| PerceptionError::FeatureFile {
                message: format!("object key '{key}' is not an integer"),
            })?;
            raw.insert(oidx, per_b);
        }
        Ok(Self::new(&file.behaviors, &file.modalities, raw))
    }

    /// The static context roster.
    pub fn contexts(&self) -> &[Context] {
        &self.contexts
    }

    /// All known object indices, in ascending order.
    pub fn object_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.observations.keys().copied()
    }

    /// Whether feature vectors are loaded for an object.
    pub fn has_object(&self, oidx: u32) -> bool {
        self.observations.contains_key(&oidx)
    }

    /// The observation vectors for one object in one context. Empty when the
    /// object was never explored through that context.
    pub fn observations(&self, oidx: u32, ctx: usize) -> &[Vec<f64>] {
        self.observations
            .get(&oidx)
            .map(|per_ctx| per_ctx[ctx].as_slice())
            .unwrap_or(&[])
    }

    /// Flatten (object, ±1 label) pairs into per-observation training rows
    /// for one context.
    pub fn rows_for_context(&self, ctx: usize, pairs: &[(u32, i8)]) -> (Vec<Vec<f64>>, Vec<i8>) {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for &(oidx, label) in pairs {
            for obs in self.observations(oidx, ctx) {
                xs.push(obs.clone());
                ys.push(label);
            }
        }
        (xs, ys)
    }
}
