//! The typed predicate vocabulary shared by the parser, grounder, and dialog.
//!
//! An [`Ontology`] is an immutable mapping from predicate name to a functional
//! type signature and a semantic category. It is loaded once (from TOML) and
//! read-only thereafter; every other subsystem refers to entries by [`PredId`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{AgentResult, OntologyError};

/// Index of a predicate in the ontology roster.
///
/// Stable for the lifetime of the loaded ontology; the roster never shrinks
/// or reorders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PredId(u32);

impl PredId {
    /// Create a `PredId` from a raw roster index.
    pub fn new(raw: u32) -> Self {
        PredId(raw)
    }

    /// The roster index as a `usize`.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for PredId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pred:{}", self.0)
    }
}

/// Atomic argument classes. Types partition predicates into the classes the
/// grounder enumerates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AtomType {
    /// Truth value (`t`).
    Truth,
    /// Executable action (`a`).
    Action,
    /// Location (`l`).
    Location,
    /// Item (`i`).
    Item,
    /// Person (`p`).
    Person,
}

impl AtomType {
    /// The single-letter surface form used in type expressions.
    pub fn letter(self) -> char {
        match self {
            AtomType::Truth => 't',
            AtomType::Action => 'a',
            AtomType::Location => 'l',
            AtomType::Item => 'i',
            AtomType::Person => 'p',
        }
    }

    fn from_letter(c: char) -> Option<Self> {
        match c {
            't' => Some(AtomType::Truth),
            'a' => Some(AtomType::Action),
            'l' => Some(AtomType::Location),
            'i' => Some(AtomType::Item),
            'p' => Some(AtomType::Person),
            _ => None,
        }
    }
}

impl std::fmt::Display for AtomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// A type expression: an atom, or a function from one type to another.
///
/// Written `<i,t>` for a one-argument predicate over items, `<i,<p,a>>` for a
/// two-argument action, and so on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SemType {
    Atom(AtomType),
    Func(Box<SemType>, Box<SemType>),
}

impl SemType {
    /// The atom a chain of applications eventually returns.
    ///
    /// `<i,<p,a>>` returns `a`; a bare atom returns itself.
    pub fn return_atom(&self) -> AtomType {
        match self {
            SemType::Atom(a) => *a,
            SemType::Func(_, ret) => ret.return_atom(),
        }
    }

    /// The argument atoms of a chain of applications, outermost first.
    ///
    /// `<i,<p,a>>` yields `[i, p]`; a bare atom yields nothing.
    pub fn argument_atoms(&self) -> Vec<AtomType> {
        let mut args = Vec::new();
        let mut cur = self;
        while let SemType::Func(arg, ret) = cur {
            if let SemType::Atom(a) = arg.as_ref() {
                args.push(*a);
            }
            cur = ret;
        }
        args
    }

    /// Parse a type expression from its surface form.
    pub fn parse(text: &str) -> AgentResult<Self> {
        let trimmed = text.trim();
        let (ty, rest) = Self::parse_inner(trimmed).ok_or_else(|| OntologyError::InvalidType {
            text: text.to_string(),
        })?;
        if !rest.is_empty() {
            return Err(OntologyError::InvalidType {
                text: text.to_string(),
            }
            .into());
        }
        Ok(ty)
    }

    fn parse_inner(text: &str) -> Option<(Self, &str)> {
        let mut chars = text.chars();
        match chars.next()? {
            '<' => {
                let (arg, rest) = Self::parse_inner(chars.as_str())?;
                let rest = rest.strip_prefix(',')?;
                let (ret, rest) = Self::parse_inner(rest)?;
                let rest = rest.strip_prefix('>')?;
                Some((SemType::Func(Box::new(arg), Box::new(ret)), rest))
            }
            c => {
                let atom = AtomType::from_letter(c)?;
                Some((SemType::Atom(atom), chars.as_str()))
            }
        }
    }
}

impl std::fmt::Display for SemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SemType::Atom(a) => write!(f, "{a}"),
            SemType::Func(arg, ret) => write!(f, "<{arg},{ret}>"),
        }
    }
}

/// Semantic category of an ontology entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredCategory {
    /// An executable action head (walk, bring, move).
    Action,
    /// A concrete world entity (a person, a location, an object).
    Entity,
    /// A predicate answered by the static fact store.
    Symbolic,
    /// A predicate answered by the perception ensemble.
    Perceptual,
}

/// One ontology entry: a named predicate with a type and a category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OntEntry {
    pub name: String,
    #[serde(rename = "type", with = "semtype_text")]
    pub ty: SemType,
    pub category: PredCategory,
}

/// TOML (de)serialization of `SemType` through its surface form.
mod semtype_text {
    use super::SemType;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ty: &SemType, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&ty.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<SemType, D::Error> {
        let text = String::deserialize(de)?;
        SemType::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Deserialize)]
struct OntologyFile {
    #[serde(rename = "predicates")]
    entries: Vec<OntEntry>,
}

/// Immutable typed predicate vocabulary.
#[derive(Debug, Clone)]
pub struct Ontology {
    entries: Vec<OntEntry>,
    name_to_id: HashMap<String, PredId>,
}

impl Ontology {
    /// Build an ontology from a list of entries. Errors on duplicate names.
    pub fn new(entries: Vec<OntEntry>) -> AgentResult<Self> {
        let mut name_to_id = HashMap::with_capacity(entries.len());
        for (idx, entry) in entries.iter().enumerate() {
            let id = PredId::new(idx as u32);
            if name_to_id.insert(entry.name.clone(), id).is_some() {
                return Err(OntologyError::DuplicatePredicate {
                    name: entry.name.clone(),
                }
                .into());
            }
        }
        Ok(Self {
            entries,
            name_to_id,
        })
    }

    /// Parse an ontology from TOML text.
    pub fn from_toml_str(text: &str) -> AgentResult<Self> {
        let file: OntologyFile = toml::from_str(text).map_err(|e| OntologyError::File {
            message: e.to_string(),
        })?;
        Self::new(file.entries)
    }

    /// Load an ontology from a TOML file on disk.
    pub fn load(path: &std::path::Path) -> AgentResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| OntologyError::File {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml_str(&text)
    }

    /// Look up an entry by id.
    pub fn entry(&self, id: PredId) -> &OntEntry {
        &self.entries[id.index()]
    }

    /// The name of an entry.
    pub fn name(&self, id: PredId) -> &str {
        &self.entries[id.index()].name
    }

    /// Look up a predicate id by name.
    pub fn lookup(&self, name: &str) -> Option<PredId> {
        self.name_to_id.get(name).copied()
    }

    /// Look up a predicate id by name, erroring on a miss.
    pub fn require(&self, name: &str) -> AgentResult<PredId> {
        self.lookup(name).ok_or_else(|| {
            OntologyError::UnknownPredicate {
                name: name.to_string(),
            }
            .into()
        })
    }

    /// All entries whose type is exactly the given atom.
    ///
    /// This is the domain a lambda abstraction of that atom type enumerates.
    pub fn entries_of_atom(&self, atom: AtomType) -> impl Iterator<Item = PredId> + '_ {
        self.entries.iter().enumerate().filter_map(move |(idx, e)| {
            (e.ty == SemType::Atom(atom)).then_some(PredId::new(idx as u32))
        })
    }

    /// All entries of a given semantic category.
    pub fn entries_of_category(&self, category: PredCategory) -> impl Iterator<Item = PredId> + '_ {
        self.entries.iter().enumerate().filter_map(move |(idx, e)| {
            (e.category == category).then_some(PredId::new(idx as u32))
        })
    }

    /// Iterate over all entry ids in roster order.
    pub fn ids(&self) -> impl Iterator<Item = PredId> + '_ {
        (0..self.entries.len() as u32).map(PredId::new)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ontology is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, ty: &str, category: PredCategory) -> OntEntry {
        OntEntry {
            name: name.into(),
            ty: SemType::parse(ty).unwrap(),
            category,
        }
    }

    #[test]
    fn parse_atom_types() {
        assert_eq!(SemType::parse("t").unwrap(), SemType::Atom(AtomType::Truth));
        assert_eq!(SemType::parse("i").unwrap(), SemType::Atom(AtomType::Item));
        assert!(SemType::parse("q").is_err());
    }

    #[test]
    fn parse_function_types() {
        let ty = SemType::parse("<i,t>").unwrap();
        assert_eq!(ty.return_atom(), AtomType::Truth);
        assert_eq!(ty.argument_atoms(), vec![AtomType::Item]);

        let ty = SemType::parse("<i,<p,a>>").unwrap();
        assert_eq!(ty.return_atom(), AtomType::Action);
        assert_eq!(ty.argument_atoms(), vec![AtomType::Item, AtomType::Person]);
    }

    #[test]
    fn type_display_round_trips() {
        for text in ["t", "<i,t>", "<i,<p,a>>", "<l,<l,<i,a>>>"] {
            let ty = SemType::parse(text).unwrap();
            assert_eq!(ty.to_string(), text);
        }
    }

    #[test]
    fn malformed_types_rejected() {
        for text in ["", "<i>", "<i,t", "i,t>", "<i,t>x"] {
            assert!(SemType::parse(text).is_err(), "{text} should not parse");
        }
    }

    #[test]
    fn lookup_and_entries_of_atom() {
        let ont = Ontology::new(vec![
            entry("cup", "<i,t>", PredCategory::Perceptual),
            entry("oidx_1", "i", PredCategory::Entity),
            entry("oidx_2", "i", PredCategory::Entity),
            entry("dave", "p", PredCategory::Entity),
        ])
        .unwrap();

        assert_eq!(ont.lookup("cup"), Some(PredId::new(0)));
        assert_eq!(ont.lookup("missing"), None);
        assert!(ont.require("missing").is_err());

        let items: Vec<_> = ont.entries_of_atom(AtomType::Item).collect();
        assert_eq!(items, vec![PredId::new(1), PredId::new(2)]);

        let people: Vec<_> = ont.entries_of_atom(AtomType::Person).collect();
        assert_eq!(people, vec![PredId::new(3)]);
    }

    #[test]
    fn duplicate_names_rejected() {
        let result = Ontology::new(vec![
            entry("cup", "<i,t>", PredCategory::Perceptual),
            entry("cup", "<i,t>", PredCategory::Symbolic),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn toml_round_trip() {
        let text = r#"
            [[predicates]]
            name = "cup"
            type = "<i,t>"
            category = "perceptual"

            [[predicates]]
            name = "dave"
            type = "p"
            category = "entity"
        "#;
        let ont = Ontology::from_toml_str(text).unwrap();
        assert_eq!(ont.len(), 2);
        let cup = ont.entry(ont.lookup("cup").unwrap());
        assert_eq!(cup.ty, SemType::parse("<i,t>").unwrap());
        assert_eq!(cup.category, PredCategory::Perceptual);
    }
}
