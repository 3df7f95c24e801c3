//! Static symbolic fact store.
//!
//! A closed-world set of ground atoms loaded once from a text file: one
//! `pred(arg, ...)` per line, `#` comments allowed. A query for a predicate
//! in the store's vocabulary is exact-match set membership; a predicate the
//! store has never seen cannot be interpreted at all, which the knowledge
//! base surfaces as a per-branch grounding failure.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::{AgentResult, KbError};

/// The fact store: a vocabulary of known predicates and the set of ground
/// atoms that hold.
#[derive(Debug, Clone, Default)]
pub struct FactStore {
    vocabulary: HashSet<String>,
    facts: HashSet<(String, Vec<String>)>,
    /// Predicate → arity, recorded from the first atom seen.
    arity: HashMap<String, usize>,
}

impl FactStore {
    /// An empty store that can answer no queries.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a store from facts text.
    pub fn from_text(text: &str) -> AgentResult<Self> {
        let mut store = Self::default();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (pred, args) = parse_atom(line).ok_or_else(|| KbError::FactFile {
                message: format!("line {}: malformed atom '{line}'", lineno + 1),
            })?;
            store.assert_fact(pred, args);
        }
        Ok(store)
    }

    /// Load a store from a facts file on disk.
    pub fn load(path: &Path) -> AgentResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| KbError::FactFile {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_text(&text)
    }

    /// Assert one ground atom, extending the vocabulary as needed.
    pub fn assert_fact(&mut self, pred: impl Into<String>, args: Vec<String>) {
        let pred = pred.into();
        self.vocabulary.insert(pred.clone());
        self.arity.entry(pred.clone()).or_insert(args.len());
        self.facts.insert((pred, args));
    }

    /// Query an atom. `Some(bool)` for predicates in the vocabulary (closed
    /// world: absence is falsity), `None` for predicates the store cannot
    /// interpret.
    pub fn query(&self, pred: &str, args: &[String]) -> Option<bool> {
        if !self.vocabulary.contains(pred) {
            return None;
        }
        let key = (pred.to_string(), args.to_vec());
        Some(self.facts.contains(&key))
    }

    /// Whether the predicate is in the store's vocabulary.
    pub fn knows(&self, pred: &str) -> bool {
        self.vocabulary.contains(pred)
    }

    /// Number of stored atoms.
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    /// Whether the store holds no atoms.
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

/// Parse `pred(arg, ...)` into its parts.
fn parse_atom(line: &str) -> Option<(String, Vec<String>)> {
    let open = line.find('(')?;
    let close = line.rfind(')')?;
    if close != line.len() - 1 || open == 0 {
        return None;
    }
    let pred = line[..open].trim();
    if pred.is_empty() || !pred.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    let args: Vec<String> = line[open + 1..close]
        .split(',')
        .map(|a| a.trim().to_string())
        .collect();
    if args.iter().any(|a| a.is_empty()) {
        return None;
    }
    Some((pred.to_string(), args))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FACTS: &str = "\
        # locations of people\n\
        at(dave, kitchen)\n\
        at(maria, office)\n\
        \n\
        possesses(dave, oidx_1)\n";

    #[test]
    fn parse_and_query() {
        let store = FactStore::from_text(FACTS).unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(
            store.query("at", &["dave".into(), "kitchen".into()]),
            Some(true)
        );
        assert_eq!(
            store.query("at", &["dave".into(), "office".into()]),
            Some(false)
        );
    }

    #[test]
    fn unknown_predicate_is_uninterpretable() {
        let store = FactStore::from_text(FACTS).unwrap();
        assert_eq!(store.query("near", &["dave".into()]), None);
        assert!(!store.knows("near"));
        assert!(store.knows("at"));
    }

    #[test]
    fn malformed_line_rejected() {
        for line in ["at(dave", "at dave, kitchen)", "(dave)", "at()", "at(,)"] {
            assert!(
                FactStore::from_text(line).is_err(),
                "'{line}' should be rejected"
            );
        }
    }

    #[test]
    fn asserted_facts_extend_vocabulary() {
        let mut store = FactStore::empty();
        assert_eq!(store.query("cup", &["oidx_3".into()]), None);
        store.assert_fact("cup", vec!["oidx_3".into()]);
        assert_eq!(store.query("cup", &["oidx_3".into()]), Some(true));
        assert_eq!(store.query("cup", &["oidx_4".into()]), Some(false));
    }
}
