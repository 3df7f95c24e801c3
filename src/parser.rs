//! The external-parser boundary, and a small lexicon-driven stand-in.
//!
//! The real system consumes a trained statistical parser as an oracle:
//! `parse(utterance, beam)` yields ranked (logical form, score) candidates,
//! possibly none. [`CommandParser`] is that boundary. [`LexiconParser`] is a
//! deliberately simple implementation (name-match tokens against the
//! ontology, canonicalize a few action verbs, assemble determiner phrases),
//! good enough to drive the keyboard demo and the integration tests. It is
//! not a grammar and does not try to be one.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;

use crate::lf::{Connective, Head, LogicalForm};
use crate::ontology::{AtomType, Ontology, PredCategory, PredId, SemType};

/// One ranked parse candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredParse {
    pub form: LogicalForm,
    pub score: f64,
}

/// The upstream parser, consumed as an oracle.
pub trait CommandParser: Send {
    /// Parse an utterance into ranked logical-form candidates. An empty
    /// result means the utterance is unparseable.
    fn parse(&self, utterance: &str, beam: usize) -> Vec<ScoredParse>;
}

/// Lexicon-driven stand-in parser.
pub struct LexiconParser {
    ontology: Arc<Ontology>,
    verb_synonyms: HashMap<&'static str, &'static str>,
    token_re: Regex,
}

impl LexiconParser {
    pub fn new(ontology: Arc<Ontology>) -> Self {
        let verb_synonyms = HashMap::from([
            ("go", "walk"),
            ("walk", "walk"),
            ("navigate", "walk"),
            ("bring", "bring"),
            ("fetch", "bring"),
            ("get", "bring"),
            ("deliver", "bring"),
            ("grab", "bring"),
            ("move", "move"),
            ("put", "move"),
            ("place", "move"),
            ("relocate", "move"),
        ]);
        Self {
            ontology,
            verb_synonyms,
            token_re: Regex::new(r"[a-z0-9_]+").expect("static token pattern"),
        }
    }

    fn tokenize(&self, utterance: &str) -> Vec<String> {
        let lower = utterance.to_lowercase();
        self.token_re
            .find_iter(&lower)
            .map(|m| m.as_str().to_string())
            .collect()
    }

    /// The action predicate named by a token, through verb canonicalization.
    fn action_for(&self, token: &str) -> Option<PredId> {
        let canonical = self.verb_synonyms.get(token)?;
        let id = self.ontology.lookup(canonical)?;
        (self.ontology.entry(id).category == PredCategory::Action).then_some(id)
    }

    /// An entity named directly by a token.
    fn entity_for(&self, token: &str) -> Option<PredId> {
        let id = self.ontology.lookup(token)?;
        let entry = self.ontology.entry(id);
        (entry.category == PredCategory::Entity).then_some(id)
    }

    /// A unary truth predicate named by a token, with its argument atom.
    fn unary_pred_for(&self, token: &str) -> Option<(PredId, AtomType)> {
        let id = self.ontology.lookup(token)?;
        let entry = self.ontology.entry(id);
        match &entry.ty {
            SemType::Func(arg, ret)
                if **ret == SemType::Atom(AtomType::Truth)
                    && matches!(
                        entry.category,
                        PredCategory::Perceptual | PredCategory::Symbolic
                    ) =>
            {
                match arg.as_ref() {
                    SemType::Atom(a) => Some((id, *a)),
                    SemType::Func(..) => None,
                }
            }
            _ => None,
        }
    }

    /// Build a referent logical form from one phrase's tokens.
    ///
    /// A token naming an entity wins outright; otherwise the phrase's unary
    /// predicates are conjoined under a determiner-selected quantifier
    /// (`the` → definite, anything else → indefinite).
    fn referent_from(&self, tokens: &[String]) -> Option<Referent> {
        if let Some(id) = tokens.iter().find_map(|t| self.entity_for(t)) {
            let atom = match &self.ontology.entry(id).ty {
                SemType::Atom(a) => *a,
                SemType::Func(..) => return None,
            };
            return Some(Referent {
                form: LogicalForm::Leaf(id),
                atom,
            });
        }

        let definite = tokens.iter().any(|t| t == "the");
        let preds: Vec<(PredId, AtomType)> =
            tokens.iter().filter_map(|t| self.unary_pred_for(t)).collect();
        let (_, atom) = *preds.first()?;

        let conjuncts: Vec<LogicalForm> = preds
            .iter()
            .map(|(id, _)| {
                LogicalForm::apply(Head::Pred(*id), vec![LogicalForm::Var("x".into())])
            })
            .collect();
        let body = if conjuncts.len() == 1 {
            conjuncts.into_iter().next().expect("one conjunct")
        } else {
            LogicalForm::apply(Head::Connective(Connective::And), conjuncts)
        };
        let quantifier = if definite { Connective::The } else { Connective::A };
        Some(Referent {
            form: LogicalForm::apply(
                Head::Connective(quantifier),
                vec![LogicalForm::lambda("x", atom, body)],
            ),
            atom,
        })
    }
}

/// A parsed referent phrase with its entity class.
struct Referent {
    form: LogicalForm,
    atom: AtomType,
}

/// One phrase: the preposition introducing it (if any) and its tokens.
fn split_phrases(tokens: &[String], action_pos: usize) -> Vec<(Option<String>, Vec<String>)> {
    let mut phrases = vec![(None, Vec::new())];
    for token in tokens.iter().skip(action_pos + 1) {
        if token == "to" || token == "from" {
            phrases.push((Some(token.clone()), Vec::new()));
        } else {
            phrases.last_mut().expect("seeded with one phrase").1.push(token.clone());
        }
    }
    phrases
}

impl CommandParser for LexiconParser {
    fn parse(&self, utterance: &str, beam: usize) -> Vec<ScoredParse> {
        if beam == 0 {
            return Vec::new();
        }
        let tokens = self.tokenize(utterance);
        if tokens.is_empty() {
            return Vec::new();
        }

        let action = tokens
            .iter()
            .enumerate()
            .find_map(|(i, t)| self.action_for(t).map(|id| (i, id)));

        let Some((action_pos, action_id)) = action else {
            // No verb: treat the whole utterance as one referent phrase.
            return self
                .referent_from(&tokens)
                .map(|r| vec![ScoredParse { form: r.form, score: 1.0 }])
                .unwrap_or_default();
        };

        // Fill the action's argument slots from the phrases, matching on
        // entity class and preferring `from` phrases for the earlier of two
        // location slots.
        let arg_atoms = self.ontology.entry(action_id).ty.argument_atoms();
        let phrases = split_phrases(&tokens, action_pos);
        let mut referents: Vec<(Option<String>, Referent)> = phrases
            .into_iter()
            .filter_map(|(prep, ts)| self.referent_from(&ts).map(|r| (prep, r)))
            .collect();

        let location_slots = arg_atoms
            .iter()
            .filter(|a| **a == AtomType::Location)
            .count();
        let mut seen_locations = 0usize;
        let mut slots: Vec<Option<LogicalForm>> = vec![None; arg_atoms.len()];
        for (slot, atom) in arg_atoms.iter().enumerate() {
            if *atom == AtomType::Location {
                seen_locations += 1;
            }
            // With two location slots the earlier one is the source and
            // claims the `from` phrase.
            let is_source_slot =
                *atom == AtomType::Location && location_slots == 2 && seen_locations == 1;
            let wanted_prep = if is_source_slot { Some("from") } else { None };
            let pick = referents.iter().position(|(prep, r)| {
                r.atom == *atom
                    && match wanted_prep {
                        Some(p) => prep.as_deref() == Some(p),
                        None => prep.as_deref() != Some("from"),
                    }
            });
            if let Some(i) = pick {
                slots[slot] = Some(referents.remove(i).1.form);
            }
        }

        if slots.iter().all(Option::is_some) {
            let args = slots.into_iter().map(|s| s.expect("checked")).collect();
            return vec![ScoredParse {
                form: LogicalForm::apply(Head::Pred(action_id), args),
                score: 1.0,
            }];
        }

        // Partial command: surface the action alone and let the dialog
        // clarify the missing roles.
        vec![ScoredParse {
            form: LogicalForm::Leaf(action_id),
            score: 0.5,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::OntEntry;

    fn test_ontology() -> Arc<Ontology> {
        let entry = |name: &str, ty: &str, category| OntEntry {
            name: name.into(),
            ty: SemType::parse(ty).unwrap(),
            category,
        };
        Arc::new(
            Ontology::new(vec![
                entry("walk", "<l,a>", PredCategory::Action),
                entry("bring", "<i,<p,a>>", PredCategory::Action),
                entry("move", "<i,<l,<l,a>>>", PredCategory::Action),
                entry("cup", "<i,t>", PredCategory::Perceptual),
                entry("red", "<i,t>", PredCategory::Perceptual),
                entry("oidx_1", "i", PredCategory::Entity),
                entry("dave", "p", PredCategory::Entity),
                entry("kitchen", "l", PredCategory::Entity),
                entry("office", "l", PredCategory::Entity),
            ])
            .unwrap(),
        )
    }

    fn parse_one(text: &str) -> String {
        let ont = test_ontology();
        let parser = LexiconParser::new(ont.clone());
        let parses = parser.parse(text, 1);
        assert_eq!(parses.len(), 1, "expected one parse for '{text}'");
        parses[0].form.render(&ont)
    }

    #[test]
    fn full_bring_command() {
        assert_eq!(
            parse_one("bring the cup to dave"),
            "bring(the(lambda x:i.(cup(x))),dave)"
        );
    }

    #[test]
    fn adjectives_conjoin_under_the_determiner() {
        assert_eq!(
            parse_one("bring the red cup to dave"),
            "bring(the(lambda x:i.(and(red(x),cup(x)))),dave)"
        );
        assert_eq!(
            parse_one("bring a red cup to dave"),
            "bring(a(lambda x:i.(and(red(x),cup(x)))),dave)"
        );
    }

    #[test]
    fn verb_synonyms_canonicalize() {
        assert_eq!(parse_one("go to the kitchen"), "walk(kitchen)");
        assert_eq!(
            parse_one("fetch a cup to dave"),
            "bring(a(lambda x:i.(cup(x))),dave)"
        );
    }

    #[test]
    fn move_routes_source_and_goal_by_preposition() {
        assert_eq!(
            parse_one("move the cup from the kitchen to the office"),
            "move(the(lambda x:i.(cup(x))),kitchen,office)"
        );
    }

    #[test]
    fn partial_command_surfaces_the_action_alone() {
        let ont = test_ontology();
        let parser = LexiconParser::new(ont.clone());
        let parses = parser.parse("bring the cup", 1);
        assert_eq!(parses.len(), 1);
        assert_eq!(parses[0].form, LogicalForm::Leaf(ont.lookup("bring").unwrap()));
        assert!(parses[0].score < 1.0);
    }

    #[test]
    fn bare_referent_answers() {
        assert_eq!(parse_one("the red cup"), "the(lambda x:i.(and(red(x),cup(x))))");
        assert_eq!(parse_one("dave"), "dave");
        assert_eq!(parse_one("the kitchen"), "kitchen");
    }

    #[test]
    fn unparseable_utterances_yield_nothing() {
        let parser = LexiconParser::new(test_ontology());
        assert!(parser.parse("", 1).is_empty());
        assert!(parser.parse("quux blorble", 1).is_empty());
        assert!(parser.parse("bring the cup to dave", 0).is_empty());
    }

    #[test]
    fn direct_object_reference() {
        assert_eq!(
            parse_one("bring oidx_1 to dave"),
            "bring(oidx_1,dave)"
        );
    }
}
