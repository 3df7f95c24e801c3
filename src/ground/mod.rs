//! The semantic grounding interpreter.
//!
//! Recursively evaluates a closed logical-form tree against the knowledge
//! base, producing every consistent grounding with an attached confidence.
//! Lambda abstractions enumerate the ontology entries of their variable's
//! type through an explicit binding-context stack (owned by the current call
//! frame, pushed and popped around the body); special forms (`and`, `or`,
//! `equals`, `the`, `a`) have interpreter-defined semantics; every other
//! truth-typed predicate becomes a knowledge-base query.
//!
//! An unsatisfiable tree grounds to an empty set; that is the caller's
//! signal that the utterance is ungroundable, not an error. A query the
//! knowledge base cannot interpret kills only the one enumeration branch
//! that asked.

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, AgentResult, GroundError};
use crate::kb::KnowledgeBase;
use crate::lf::{Connective, Head, LogicalForm};
use crate::ontology::{AtomType, Ontology, PredId, SemType};

/// The resolved outcome of one grounding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// A truth-value outcome.
    Bool(bool),
    /// A concrete referent.
    Entity(PredId),
    /// A grounded subtree (actions and other non-truth applications).
    Form(LogicalForm),
}

impl Value {
    /// Whether this outcome fails to satisfy its context.
    pub fn is_false(&self) -> bool {
        matches!(self, Value::Bool(false))
    }

    /// The referent, when the outcome is one.
    pub fn as_entity(&self) -> Option<PredId> {
        match self {
            Value::Entity(id) => Some(*id),
            _ => None,
        }
    }
}

/// One consistent resolution of a tree: the lambda assignments made on the
/// way (outermost first), the resolved outcome, and its confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grounding {
    pub bindings: Vec<PredId>,
    pub value: Value,
    pub confidence: f64,
}

impl Grounding {
    fn closed(value: Value, confidence: f64) -> Self {
        Self {
            bindings: Vec::new(),
            value,
            confidence,
        }
    }
}

/// One binding-context frame: a variable assigned to an ontology entry.
#[derive(Debug, Clone)]
struct Binding {
    name: String,
    value: PredId,
}

/// The grounding interpreter. Stateless with respect to any one dialog;
/// cheap to construct per call site.
pub struct GroundingInterpreter<'a> {
    ontology: &'a Ontology,
    kb: &'a KnowledgeBase,
}

impl<'a> GroundingInterpreter<'a> {
    pub fn new(ontology: &'a Ontology, kb: &'a KnowledgeBase) -> Self {
        Self { ontology, kb }
    }

    /// Ground a closed tree, enumerating every consistent resolution.
    ///
    /// An empty result set means the tree is unsatisfiable against the
    /// current knowledge base.
    pub fn ground(&self, tree: &LogicalForm) -> AgentResult<Vec<Grounding>> {
        if let Some(name) = tree.first_free_var(&mut Vec::new()) {
            return Err(GroundError::OpenTree { name }.into());
        }
        let mut ctx = Vec::new();
        let groundings = self.eval(tree, &mut ctx)?;
        tracing::debug!(groundings = groundings.len(), "grounded tree");
        Ok(groundings)
    }

    fn eval(&self, tree: &LogicalForm, ctx: &mut Vec<Binding>) -> AgentResult<Vec<Grounding>> {
        match tree {
            LogicalForm::Leaf(id) => Ok(vec![Grounding::closed(Value::Entity(*id), 1.0)]),

            LogicalForm::Var(name) => {
                let value = self.resolve(name, ctx)?;
                Ok(vec![Grounding::closed(Value::Entity(value), 1.0)])
            }

            LogicalForm::Lambda { var, ty, body } => self.eval_lambda(var, *ty, body, ctx),

            LogicalForm::Apply { head, args } => match head {
                Head::Connective(c) => self.eval_connective(*c, args, ctx),
                Head::Pred(id) => self.eval_predicate(*id, args, ctx),
                // A bound variable in head position: substitute its
                // assignment as the effective predicate, without re-binding.
                Head::Var(name) => {
                    let pred = self.resolve(name, ctx)?;
                    self.eval_predicate(pred, args, ctx)
                }
            },
        }
    }

    fn resolve(&self, name: &str, ctx: &[Binding]) -> AgentResult<PredId> {
        ctx.iter()
            .rev()
            .find(|b| b.name == name)
            .map(|b| b.value)
            .ok_or_else(|| {
                GroundError::OpenTree {
                    name: name.to_string(),
                }
                .into()
            })
    }

    /// Enumerate the variable's type domain exhaustively, keeping every
    /// sub-result whose outcome is not false.
    fn eval_lambda(
        &self,
        var: &str,
        ty: AtomType,
        body: &LogicalForm,
        ctx: &mut Vec<Binding>,
    ) -> AgentResult<Vec<Grounding>> {
        let mut out = Vec::new();
        for candidate in self.ontology.entries_of_atom(ty) {
            ctx.push(Binding {
                name: var.to_string(),
                value: candidate,
            });
            let result = self.eval(body, ctx);
            ctx.pop();
            for sub in result? {
                if sub.value.is_false() {
                    continue;
                }
                let mut bindings = Vec::with_capacity(1 + sub.bindings.len());
                bindings.push(candidate);
                bindings.extend(sub.bindings);
                out.push(Grounding {
                    bindings,
                    value: sub.value,
                    confidence: sub.confidence,
                });
            }
        }
        Ok(out)
    }

    fn eval_connective(
        &self,
        c: Connective,
        args: &[LogicalForm],
        ctx: &mut Vec<Binding>,
    ) -> AgentResult<Vec<Grounding>> {
        match c {
            Connective::Equals | Connective::And => {
                let sets = self.eval_children(args, ctx)?;
                let mut out = Vec::new();
                for_each_combo(&sets, |combo| {
                    let Some(first) = combo.first() else { return };
                    if combo.iter().any(|g| g.value != first.value) {
                        return;
                    }
                    let value = match c {
                        Connective::Equals => Value::Bool(true),
                        // `and` passes the common value through, so entity
                        // groundings from nested `the`/`a` survive conjunction.
                        _ => {
                            if first.value.is_false() {
                                return;
                            }
                            first.value.clone()
                        }
                    };
                    out.push(combine(combo, value));
                });
                Ok(out)
            }

            Connective::Or => {
                // The first child (left to right) with any satisfying
                // grounding decides the disjunction.
                for arg in args {
                    let set = self.eval(arg, ctx)?;
                    let satisfying: Vec<Grounding> =
                        set.into_iter().filter(|g| !g.value.is_false()).collect();
                    if !satisfying.is_empty() {
                        return Ok(satisfying);
                    }
                }
                Ok(Vec::new())
            }

            Connective::The => {
                let Some(child) = args.first() else {
                    return Ok(Vec::new());
                };
                let set = self.eval(child, ctx)?;
                let mut witnesses = set.into_iter().filter(|g| !g.value.is_false());
                match (witnesses.next(), witnesses.next()) {
                    // Definite reference requires a unique witness.
                    (Some(only), None) => Ok(quantifier_witness(only).into_iter().collect()),
                    _ => Ok(Vec::new()),
                }
                .and_then(check_arity)
            }

            Connective::A => {
                // Indefinite reference: the first witness in iteration order,
                // and enumeration stops there.
                let Some(child) = args.first() else {
                    return Ok(Vec::new());
                };
                let set = self.eval(child, ctx)?;
                let first = set.into_iter().find(|g| !g.value.is_false());
                match first {
                    Some(g) => Ok(quantifier_witness(g).into_iter().collect()),
                    None => Ok(Vec::new()),
                }
                .and_then(check_arity)
            }
        }
    }

    fn eval_predicate(
        &self,
        pred: PredId,
        args: &[LogicalForm],
        ctx: &mut Vec<Binding>,
    ) -> AgentResult<Vec<Grounding>> {
        let sets = self.eval_children(args, ctx)?;
        let entry = self.ontology.entry(pred);
        let mut out = Vec::new();

        if entry.ty.return_atom() == AtomType::Truth && entry.ty != SemType::Atom(AtomType::Truth)
        {
            // A knowledge-base query: resolve every child combination to
            // concrete arguments and ask. An uninterpretable query discards
            // this one branch and the enumeration continues.
            for_each_combo(&sets, |combo| {
                let Some(arg_ids) = combo
                    .iter()
                    .map(|g| g.value.as_entity())
                    .collect::<Option<Vec<PredId>>>()
                else {
                    return;
                };
                let child_conf: f64 = combo.iter().map(|g| g.confidence).product();
                match self.kb.query(pred, &arg_ids) {
                    Ok((pos, neg)) => {
                        let satisfied = pos > neg;
                        let confidence = if satisfied { pos } else { neg };
                        out.push(Grounding::closed(
                            Value::Bool(satisfied),
                            confidence * child_conf,
                        ));
                    }
                    Err(AgentError::Kb(e)) => {
                        tracing::debug!(error = %e, pred = entry.name, "branch discarded");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, pred = entry.name, "branch discarded");
                    }
                }
            });
        } else {
            // Actions and other non-truth applications pass up the node with
            // grounded children substituted in.
            for_each_combo(&sets, |combo| {
                let Some(children) = combo
                    .iter()
                    .map(|g| match &g.value {
                        Value::Entity(id) => Some(LogicalForm::Leaf(*id)),
                        Value::Form(lf) => Some(lf.clone()),
                        Value::Bool(_) => None,
                    })
                    .collect::<Option<Vec<LogicalForm>>>()
                else {
                    return;
                };
                let confidence: f64 = combo.iter().map(|g| g.confidence).product();
                out.push(Grounding::closed(
                    Value::Form(LogicalForm::apply(Head::Pred(pred), children)),
                    confidence,
                ));
            });
        }

        Ok(out)
    }

    fn eval_children(
        &self,
        args: &[LogicalForm],
        ctx: &mut Vec<Binding>,
    ) -> AgentResult<Vec<Vec<Grounding>>> {
        args.iter().map(|a| self.eval(a, ctx)).collect()
    }
}

/// Turn a satisfying quantifier child grounding into its witness grounding.
///
/// The witness is the child's outermost lambda assignment; assignments below
/// that level are dropped. A child with no bindings (not lambda-headed) has
/// no witness to extract.
fn quantifier_witness(g: Grounding) -> Option<Grounding> {
    match g.bindings.len() {
        0 => None,
        1 => Some(Grounding::closed(Value::Entity(g.bindings[0]), g.confidence)),
        // Deeper nesting is flagged by `check_arity` below.
        _ => Some(Grounding {
            bindings: g.bindings,
            value: g.value,
            confidence: g.confidence,
        }),
    }
}

/// Reject quantifier results that carry more than one binding: multi-level
/// nested quantification is an explicit unsupported case.
fn check_arity(groundings: Vec<Grounding>) -> AgentResult<Vec<Grounding>> {
    if let Some(g) = groundings.iter().find(|g| g.bindings.len() > 1) {
        return Err(GroundError::NestedQuantifier {
            arity: g.bindings.len(),
        }
        .into());
    }
    Ok(groundings)
}

/// Merge one cartesian combination: concatenated bindings, product confidence.
fn combine(combo: &[&Grounding], value: Value) -> Grounding {
    Grounding {
        bindings: combo.iter().flat_map(|g| g.bindings.iter().copied()).collect(),
        value,
        confidence: combo.iter().map(|g| g.confidence).product(),
    }
}

/// Visit the cartesian product of the children's grounding sets. An empty
/// child set short-circuits to no combinations at all.
fn for_each_combo(sets: &[Vec<Grounding>], mut f: impl FnMut(&[&Grounding])) {
    if sets.is_empty() {
        f(&[]);
        return;
    }
    if sets.iter().any(|s| s.is_empty()) {
        return;
    }
    let mut idxs = vec![0usize; sets.len()];
    loop {
        let combo: Vec<&Grounding> = idxs.iter().zip(sets).map(|(&i, s)| &s[i]).collect();
        f(&combo);

        // Odometer step; done when every index has cycled back to zero.
        let mut pos = sets.len();
        loop {
            if pos == 0 {
                return;
            }
            pos -= 1;
            idxs[pos] += 1;
            if idxs[pos] < sets[pos].len() {
                break;
            }
            idxs[pos] = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::kb::facts::FactStore;
    use crate::ontology::{OntEntry, PredCategory};
    use crate::perception::features::FeatureBank;
    use crate::perception::{EnsembleConfig, PerceptionEnsemble};

    fn test_ontology() -> Arc<Ontology> {
        let entry = |name: &str, ty: &str, category| OntEntry {
            name: name.into(),
            ty: SemType::parse(ty).unwrap(),
            category,
        };
        Arc::new(
            Ontology::new(vec![
                entry("cup", "<i,t>", PredCategory::Symbolic),
                entry("red", "<i,t>", PredCategory::Symbolic),
                entry("florp", "<i,t>", PredCategory::Symbolic),
                entry("at", "<p,<l,t>>", PredCategory::Symbolic),
                entry("oidx_1", "i", PredCategory::Entity),
                entry("oidx_2", "i", PredCategory::Entity),
                entry("dave", "p", PredCategory::Entity),
                entry("maria", "p", PredCategory::Entity),
                entry("kitchen", "l", PredCategory::Entity),
                entry("bring", "<i,<p,a>>", PredCategory::Action),
            ])
            .unwrap(),
        )
    }

    fn empty_perception() -> Arc<PerceptionEnsemble> {
        let bank = FeatureBank::new(&[], &[], Default::default());
        Arc::new(PerceptionEnsemble::new(
            bank,
            Vec::new(),
            Vec::new(),
            EnsembleConfig::default(),
        ))
    }

    fn kb_with(facts: &str) -> (Arc<Ontology>, KnowledgeBase) {
        let ont = test_ontology();
        let store = FactStore::from_text(facts).unwrap();
        let kb = KnowledgeBase::new(ont.clone(), store, empty_perception());
        (ont, kb)
    }

    fn ground(text: &str, facts: &str) -> AgentResult<Vec<Grounding>> {
        let (ont, kb) = kb_with(facts);
        let lf = LogicalForm::parse(text, &ont)?;
        GroundingInterpreter::new(&ont, &kb).ground(&lf)
    }

    #[test]
    fn conjunction_of_held_facts_grounds_once() {
        let gs = ground(
            "and(cup(oidx_1),red(oidx_1))",
            "cup(oidx_1)\nred(oidx_1)\n",
        )
        .unwrap();
        assert_eq!(gs.len(), 1);
        assert_eq!(gs[0].value, Value::Bool(true));
        assert!((gs[0].confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn conjunction_with_failed_fact_is_empty() {
        let gs = ground("and(cup(oidx_1),red(oidx_1))", "cup(oidx_1)\nred(oidx_2)\n").unwrap();
        assert!(gs.is_empty());
    }

    #[test]
    fn equals_of_identical_entities() {
        let gs = ground("equals(oidx_1,oidx_1)", "cup(oidx_1)\n").unwrap();
        assert_eq!(gs.len(), 1);
        assert_eq!(gs[0].value, Value::Bool(true));

        let gs = ground("equals(oidx_1,oidx_2)", "cup(oidx_1)\n").unwrap();
        assert!(gs.is_empty());
    }

    #[test]
    fn the_requires_a_unique_witness() {
        let ont_facts = "cup(oidx_1)\n";
        let gs = ground("the(lambda x:i.(cup(x)))", ont_facts).unwrap();
        assert_eq!(gs.len(), 1);
        let (ont, _) = kb_with(ont_facts);
        assert_eq!(gs[0].value.as_entity(), ont.lookup("oidx_1"));
        assert!(gs[0].bindings.is_empty());

        // Zero witnesses: empty.
        let gs = ground("the(lambda x:i.(red(x)))", "cup(oidx_1)\nred(kitchen)\n").unwrap();
        assert!(gs.is_empty());

        // Two witnesses: uniqueness fails, empty.
        let gs = ground("the(lambda x:i.(cup(x)))", "cup(oidx_1)\ncup(oidx_2)\n").unwrap();
        assert!(gs.is_empty());
    }

    #[test]
    fn a_returns_one_witness_deterministically() {
        let facts = "cup(oidx_1)\ncup(oidx_2)\n";
        let first = ground("a(lambda x:i.(cup(x)))", facts).unwrap();
        assert_eq!(first.len(), 1);
        for _ in 0..5 {
            let again = ground("a(lambda x:i.(cup(x)))", facts).unwrap();
            assert_eq!(again, first);
        }
        let (ont, _) = kb_with(facts);
        // Roster order: oidx_1 precedes oidx_2.
        assert_eq!(first[0].value.as_entity(), ont.lookup("oidx_1"));
    }

    #[test]
    fn or_takes_the_first_satisfied_child() {
        let gs = ground("or(cup(oidx_2),red(oidx_1))", "cup(oidx_1)\nred(oidx_1)\n").unwrap();
        assert_eq!(gs.len(), 1);
        assert_eq!(gs[0].value, Value::Bool(true));

        let gs = ground("or(cup(oidx_2),red(oidx_2))", "cup(oidx_1)\nred(oidx_1)\n").unwrap();
        assert!(gs.is_empty());
    }

    #[test]
    fn unknown_predicate_discards_branch_not_enumeration() {
        // `florp` is not in the fact store's vocabulary: each candidate's
        // branch dies quietly and the whole set comes back empty.
        let gs = ground("a(lambda x:i.(florp(x)))", "cup(oidx_1)\n").unwrap();
        assert!(gs.is_empty());

        // The surviving disjunct still grounds.
        let gs = ground("or(florp(oidx_1),cup(oidx_1))", "cup(oidx_1)\n").unwrap();
        assert_eq!(gs.len(), 1);
        assert_eq!(gs[0].value, Value::Bool(true));
    }

    #[test]
    fn nested_quantification_is_rejected_loudly() {
        let facts = "at(dave, kitchen)\n";
        let (ont, kb) = kb_with(facts);
        let lf = LogicalForm::parse(
            "the(lambda x:p.(lambda y:l.(at(x,y))))",
            &ont,
        )
        .unwrap();
        let err = GroundingInterpreter::new(&ont, &kb).ground(&lf).unwrap_err();
        assert!(matches!(
            err,
            AgentError::Ground(GroundError::NestedQuantifier { arity: 2 })
        ));
    }

    #[test]
    fn open_tree_rejected_at_top_level() {
        let (ont, kb) = kb_with("cup(oidx_1)\n");
        let open = LogicalForm::apply(
            Head::Pred(ont.lookup("cup").unwrap()),
            vec![LogicalForm::Var("x".into())],
        );
        let err = GroundingInterpreter::new(&ont, &kb).ground(&open).unwrap_err();
        assert!(matches!(err, AgentError::Ground(GroundError::OpenTree { .. })));
    }

    #[test]
    fn action_application_passes_grounded_tree_up() {
        let facts = "cup(oidx_1)\n";
        let (ont, kb) = kb_with(facts);
        let lf = LogicalForm::parse("bring(the(lambda x:i.(cup(x))),dave)", &ont).unwrap();
        let gs = GroundingInterpreter::new(&ont, &kb).ground(&lf).unwrap();
        assert_eq!(gs.len(), 1);
        match &gs[0].value {
            Value::Form(form) => {
                assert_eq!(form.render(&ont), "bring(oidx_1,dave)");
            }
            other => panic!("expected grounded action form, got {other:?}"),
        }
        assert!((gs[0].confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn ambiguous_patient_empties_the_but_not_a() {
        let facts = "cup(oidx_1)\ncup(oidx_2)\n";
        let (ont, kb) = kb_with(facts);
        let interp = GroundingInterpreter::new(&ont, &kb);

        let the = LogicalForm::parse("bring(the(lambda x:i.(cup(x))),dave)", &ont).unwrap();
        assert!(interp.ground(&the).unwrap().is_empty());

        let a = LogicalForm::parse("bring(a(lambda x:i.(cup(x))),dave)", &ont).unwrap();
        let gs = interp.ground(&a).unwrap();
        assert_eq!(gs.len(), 1);
        match &gs[0].value {
            Value::Form(form) => assert_eq!(form.render(&ont), "bring(oidx_1,dave)"),
            other => panic!("expected action form, got {other:?}"),
        }
    }

    #[test]
    fn lambda_enumeration_collects_all_satisfying_candidates() {
        // Without a quantifier, the raw lambda keeps every satisfying binding.
        let gs = ground("lambda x:i.(cup(x))", "cup(oidx_1)\ncup(oidx_2)\n").unwrap();
        assert_eq!(gs.len(), 2);
        assert!(gs.iter().all(|g| g.bindings.len() == 1));
        assert!(gs.iter().all(|g| g.value == Value::Bool(true)));
    }
}
