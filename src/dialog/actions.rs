//! The closed action catalog: each executable action's ordered role
//! signature.
//!
//! `walk` navigates to a goal; `bring` delivers an item to a person; `move`
//! relocates an item from a source to a goal. The catalog is validated
//! against the ontology at startup so a confirmed action can never drift out
//! of sync with its type signature.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{AgentResult, DialogError};
use crate::ontology::{AtomType, Ontology, PredCategory, SemType};

/// A semantic role in a command hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Action,
    Patient,
    Recipient,
    Source,
    Goal,
}

impl Role {
    /// Fixed priority order used to break question-policy ties.
    pub const PRIORITY: [Role; 5] = [
        Role::Action,
        Role::Patient,
        Role::Recipient,
        Role::Source,
        Role::Goal,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Role::Action => "action",
            Role::Patient => "patient",
            Role::Recipient => "recipient",
            Role::Source => "source",
            Role::Goal => "goal",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One action's ordered argument signature.
#[derive(Debug, Clone)]
pub struct ActionSchema {
    pub name: &'static str,
    /// Argument roles in application order, with their atom types.
    pub args: Vec<(Role, AtomType)>,
}

impl ActionSchema {
    /// The roles this action requires beyond `action` itself.
    pub fn required_roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.args.iter().map(|(r, _)| *r)
    }

    /// The atom type of one role, if the action takes it.
    pub fn atom_for(&self, role: Role) -> Option<AtomType> {
        self.args.iter().find(|(r, _)| *r == role).map(|(_, a)| *a)
    }
}

/// The closed set of executable actions.
#[derive(Debug, Clone)]
pub struct ActionCatalog {
    schemas: Vec<ActionSchema>,
}

impl ActionCatalog {
    /// The standard walk/bring/move catalog.
    pub fn standard() -> Self {
        Self {
            schemas: vec![
                ActionSchema {
                    name: "walk",
                    args: vec![(Role::Goal, AtomType::Location)],
                },
                ActionSchema {
                    name: "bring",
                    args: vec![
                        (Role::Patient, AtomType::Item),
                        (Role::Recipient, AtomType::Person),
                    ],
                },
                ActionSchema {
                    name: "move",
                    args: vec![
                        (Role::Patient, AtomType::Item),
                        (Role::Source, AtomType::Location),
                        (Role::Goal, AtomType::Location),
                    ],
                },
            ],
        }
    }

    /// Look up a schema by action name.
    pub fn schema(&self, name: &str) -> Option<&ActionSchema> {
        self.schemas.iter().find(|s| s.name == name)
    }

    /// All schemas.
    pub fn schemas(&self) -> &[ActionSchema] {
        &self.schemas
    }

    /// The atom types a role can take across all actions. Empty for `Action`.
    pub fn atoms_for_role(&self, role: Role) -> BTreeSet<AtomType> {
        let mut atoms = BTreeSet::new();
        for schema in &self.schemas {
            if let Some(a) = schema.atom_for(role) {
                atoms.insert(a);
            }
        }
        atoms
    }

    /// Check every catalog action against the ontology: it must exist, be an
    /// action-category entry, and its argument atoms must match the schema.
    pub fn validate(&self, ontology: &Ontology) -> AgentResult<()> {
        for schema in &self.schemas {
            let id = ontology.lookup(schema.name).ok_or(DialogError::UnknownAction {
                name: schema.name.to_string(),
            })?;
            let entry = ontology.entry(id);
            let expected: Vec<AtomType> = schema.args.iter().map(|(_, a)| *a).collect();
            let matches = entry.category == PredCategory::Action
                && entry.ty.return_atom() == AtomType::Action
                && entry.ty.argument_atoms() == expected
                && entry.ty != SemType::Atom(AtomType::Action);
            if !matches {
                return Err(DialogError::UnknownAction {
                    name: schema.name.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}
