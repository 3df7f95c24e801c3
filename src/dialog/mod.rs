//! The belief-state dialog controller.
//!
//! One controller owns one dialog: it consumes parser output, grounds it,
//! folds the groundings into per-role belief counts, decides the single best
//! clarifying question to ask next, and declares the command confirmed once
//! every required role clears the acceptance threshold. On confirmation it
//! emits the action for execution plus the trace artifacts used for offline
//! learning (induced parser pairs, perceptual labels).
//!
//! The controller is strictly sequential within a dialog; concurrent dialogs
//! each own their controller and share only the perception ensemble behind
//! the knowledge base.

pub mod actions;
pub mod belief;
pub mod trace;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AgentResult, DialogError};
use crate::ground::{Grounding, GroundingInterpreter, Value};
use crate::io::{substitute_referents, AgentIo};
use crate::kb::{object_index, KnowledgeBase};
use crate::lf::{Head, LogicalForm};
use crate::ontology::{Ontology, PredCategory, PredId, SemType};
use crate::parser::CommandParser;

use actions::{ActionCatalog, Role};
use belief::{BeliefState, Candidate, SelectionStrategy};
use trace::{DialogTrace, Speaker, TrainingPair};

/// Configuration for one dialog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogConfig {
    /// A role is settled once its sampled confidence reaches this.
    pub threshold_to_accept_role: f64,
    /// How many parses to request from the upstream parser.
    pub parse_beam: usize,
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            threshold_to_accept_role: 0.9,
            parse_beam: 1,
        }
    }
}

/// Dialog lifecycle. `Confirmed` is the only terminal state in scope;
/// abandonment is the I/O layer's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogState {
    Collecting,
    Confirmed,
}

/// The single question the controller wants answered next.
#[derive(Debug, Clone, PartialEq)]
pub enum Question {
    /// Clarify one role.
    AskRole(Role),
    /// Yes/no confirmation bundling every relevant role's sampled value.
    Confirm(Vec<(Role, PredId)>),
    /// No usable hypothesis at all: ask for a full restatement.
    Restate,
}

/// The confirmed command: the action and its required role values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedCommand {
    pub action: PredId,
    pub roles: BTreeMap<Role, PredId>,
}

/// Orchestrates one clarification dialog over a shared knowledge base.
pub struct BeliefController {
    ontology: Arc<Ontology>,
    kb: Arc<KnowledgeBase>,
    parser: Box<dyn CommandParser>,
    strategy: Box<dyn SelectionStrategy>,
    catalog: ActionCatalog,
    config: DialogConfig,
    belief: BeliefState,
    confirmed: BTreeMap<Role, PredId>,
    state: DialogState,
    pending: Option<Question>,
    trace: DialogTrace,
    /// Perceptual predicates mentioned by grounded utterances; they become
    /// labels for the confirmed patient object.
    perceptual_mentions: Vec<PredId>,
}

impl BeliefController {
    /// Start a fresh dialog. Validates the action catalog against the
    /// ontology so role extraction can never drift from the type system.
    pub fn new(
        ontology: Arc<Ontology>,
        kb: Arc<KnowledgeBase>,
        parser: Box<dyn CommandParser>,
        strategy: Box<dyn SelectionStrategy>,
        config: DialogConfig,
    ) -> AgentResult<Self> {
        let catalog = ActionCatalog::standard();
        catalog.validate(&ontology)?;
        let belief = BeliefState::new(&ontology, &catalog);
        Ok(Self {
            ontology,
            kb,
            parser,
            strategy,
            catalog,
            config,
            belief,
            confirmed: BTreeMap::new(),
            state: DialogState::Collecting,
            pending: None,
            trace: DialogTrace::default(),
            perceptual_mentions: Vec::new(),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DialogState {
        self.state
    }

    /// The belief state, for inspection.
    pub fn belief(&self) -> &BeliefState {
        &self.belief
    }

    /// The dialog trace accumulated so far.
    pub fn trace(&self) -> &DialogTrace {
        &self.trace
    }

    // -----------------------------------------------------------------------
    // Per-turn protocol
    // -----------------------------------------------------------------------

    /// Fold one user utterance into the belief state, routed by whatever
    /// question was pending. Ungroundable input changes nothing and is
    /// counted as a re-ask, never an error.
    pub fn observe_utterance(&mut self, text: &str) -> AgentResult<()> {
        self.trace.record(Speaker::User, text);
        match self.pending.take() {
            Some(Question::Confirm(bundle)) => self.observe_confirmation(&bundle, text),
            Some(Question::AskRole(role)) => {
                self.trace.record_role_utterance(role, text);
                self.observe_role_answer(role, text);
            }
            Some(Question::Restate) | None => self.observe_command(text),
        }
        Ok(())
    }

    /// Decide the next question and remember it as pending so the next
    /// utterance is routed as its answer.
    pub fn next_question(&mut self) -> Question {
        let (action_candidate, action_conf) = self.sample_role(Role::Action);
        let Some(action_id) = action_candidate else {
            // No action hypothesis at all.
            self.pending = Some(Question::Restate);
            return Question::Restate;
        };

        let required: Vec<Role> = {
            let schema = self
                .catalog
                .schema(self.ontology.name(action_id))
                .expect("belief candidates are drawn from the catalog");
            schema.required_roles().collect()
        };
        let mut relevant: Vec<(Role, Candidate, f64)> =
            vec![(Role::Action, Some(action_id), action_conf)];
        for role in required {
            let (candidate, conf) = self.sample_role(role);
            relevant.push((role, candidate, conf));
        }

        let threshold = self.config.threshold_to_accept_role;
        let needs_clarification: Vec<(Role, f64)> = relevant
            .iter()
            .filter(|(_, candidate, conf)| candidate.is_none() || *conf < threshold)
            .map(|(role, candidate, conf)| {
                (*role, if candidate.is_none() { 0.0 } else { *conf })
            })
            .collect();

        let question = if needs_clarification.is_empty() {
            let bundle = relevant
                .into_iter()
                .map(|(role, candidate, _)| {
                    (role, candidate.expect("no unfilled role passed the filter"))
                })
                .collect();
            Question::Confirm(bundle)
        } else {
            // The least-confident role is asked about; ties break by the
            // fixed priority order (which the iteration follows).
            let mut best: Option<(Role, f64)> = None;
            for role in Role::PRIORITY {
                if let Some(&(_, conf)) = needs_clarification.iter().find(|(r, _)| *r == role) {
                    if best.is_none_or(|(_, b)| conf < b) {
                        best = Some((role, conf));
                    }
                }
            }
            Question::AskRole(best.expect("needs_clarification is non-empty").0)
        };

        self.pending = Some(question.clone());
        question
    }

    /// Emit the confirmed command, checking state invariants loudly, and
    /// finish the trace (confirmed values + induced training pairs).
    pub fn finalize(&mut self) -> AgentResult<ConfirmedCommand> {
        if self.state != DialogState::Confirmed {
            return Err(DialogError::NotConfirmed.into());
        }
        let action = *self
            .confirmed
            .get(&Role::Action)
            .ok_or_else(|| DialogError::UnfilledRole {
                role: Role::Action.name().to_string(),
            })?;
        let action_name = self.ontology.name(action).to_string();
        let schema = self
            .catalog
            .schema(&action_name)
            .ok_or(DialogError::UnknownAction { name: action_name })?;

        let mut roles = BTreeMap::new();
        for role in schema.required_roles() {
            let value = *self
                .confirmed
                .get(&role)
                .ok_or_else(|| DialogError::UnfilledRole {
                    role: role.name().to_string(),
                })?;
            roles.insert(role, value);
        }

        let command = ConfirmedCommand { action, roles };
        for (role, value) in
            std::iter::once((Role::Action, action)).chain(command.roles.iter().map(|(r, v)| (*r, *v)))
        {
            self.trace
                .confirmed
                .insert(role, self.ontology.name(value).to_string());
        }
        self.trace.induced_pairs = self.induce_pairs(&command);
        tracing::info!(
            action = self.ontology.name(action),
            turns = self.trace.turns.len(),
            reasks = self.trace.reasks,
            "dialog confirmed"
        );
        Ok(command)
    }

    /// Run the whole dialog loop against an I/O backend: ask, listen, update,
    /// until confirmed; then perform the action and push label feedback into
    /// the perception ensemble.
    pub fn run_dialog(&mut self, io: &mut dyn AgentIo) -> AgentResult<ConfirmedCommand> {
        self.say(io, "What should I do?");
        let mut last_question: Option<Question> = None;
        loop {
            let utterance = io.listen()?;
            self.observe_utterance(&utterance)?;
            if self.state == DialogState::Confirmed {
                break;
            }
            let mut question = self.next_question();
            // A repeated patient question means the spoken answer went
            // nowhere; offer the pointing channel instead.
            if question == Question::AskRole(Role::Patient)
                && last_question.as_ref() == Some(&question)
                && self.point_for_patient(io)?
            {
                question = self.next_question();
            }
            self.ask(io, &question);
            last_question = Some(question);
        }
        let command = self.finalize()?;

        let mut role_values: BTreeMap<Role, String> = BTreeMap::new();
        for (role, value) in &command.roles {
            role_values.insert(*role, self.ontology.name(*value).to_string());
        }
        let action_name = self.ontology.name(command.action).to_string();
        io.perform(&action_name, &role_values)?;
        self.apply_label_feedback(&command)?;
        Ok(command)
    }

    // -----------------------------------------------------------------------
    // Evidence folding
    // -----------------------------------------------------------------------

    fn observe_command(&mut self, text: &str) {
        self.trace.record_role_utterance(Role::Action, text);
        let groundings = self.ground_utterance(text);
        let mut contributed = false;
        for g in &groundings {
            let findings = self.command_findings(&g.value);
            if findings.is_empty() {
                continue;
            }
            contributed = true;
            let credit = g.confidence / findings.len() as f64;
            for (role, value) in findings {
                self.belief.add(role, Some(value), credit);
            }
        }
        if !contributed {
            self.trace.reasks += 1;
        }
    }

    fn observe_role_answer(&mut self, role: Role, text: &str) {
        let groundings = self.ground_utterance(text);
        let mut contributed = false;
        for g in &groundings {
            let findings = self.role_findings(role, &g.value);
            if findings.is_empty() {
                continue;
            }
            contributed = true;
            let credit = g.confidence / findings.len() as f64;
            for (found_role, value) in findings {
                self.belief.add(found_role, Some(value), credit);
            }
        }
        if !contributed {
            self.trace.reasks += 1;
        }
    }

    fn observe_confirmation(&mut self, bundle: &[(Role, PredId)], text: &str) {
        match yes_no(text) {
            Some(true) => {
                // Terminal for every bundled role: confidence forced to 1.
                for (role, value) in bundle {
                    self.confirmed.insert(*role, *value);
                }
                self.state = DialogState::Confirmed;
            }
            Some(false) => {
                // Withdraw the shared credit, split evenly across the bundle.
                let credit = 1.0 / bundle.len() as f64;
                for (role, value) in bundle {
                    self.belief.subtract(*role, Some(*value), credit);
                }
                self.trace.reasks += 1;
            }
            None => {
                // Neither yes nor no: treat it as a fresh restatement.
                self.observe_command(text);
            }
        }
    }

    /// Parse and ground one utterance; the resulting grounding set is sorted
    /// by confidence and normalized to sum to one (uniform when the raw sum
    /// is zero). Empty when unparseable, unsatisfiable, or when grounding
    /// fails; all three are just "no evidence this turn".
    fn ground_utterance(&mut self, text: &str) -> Vec<Grounding> {
        let parses = self.parser.parse(text, self.config.parse_beam.max(1));
        let Some(top) = parses.into_iter().next() else {
            tracing::debug!(utterance = text, "unparseable utterance");
            return Vec::new();
        };
        self.collect_perceptual_mentions(&top.form);

        let interpreter = GroundingInterpreter::new(&self.ontology, &self.kb);
        let raw = match interpreter.ground(&top.form) {
            Ok(gs) => gs,
            Err(e) => {
                tracing::warn!(error = %e, utterance = text, "grounding failed");
                return Vec::new();
            }
        };
        normalize_groundings(raw)
    }

    /// Role evidence in a fresh command: an action application contributes
    /// its head plus every concrete argument, routed by the action's
    /// signature; a bare action reference contributes the head alone.
    fn command_findings(&self, value: &Value) -> Vec<(Role, PredId)> {
        match value {
            Value::Form(LogicalForm::Apply {
                head: Head::Pred(p),
                args,
            }) => {
                let Some(schema) = self.catalog.schema(self.ontology.name(*p)) else {
                    return Vec::new();
                };
                let mut findings = vec![(Role::Action, *p)];
                for ((role, _), arg) in schema.args.iter().zip(args) {
                    if let LogicalForm::Leaf(id) = arg {
                        findings.push((*role, *id));
                    }
                }
                findings
            }
            Value::Entity(id) => self
                .action_entity(*id)
                .map(|a| vec![(Role::Action, a)])
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Role evidence in a targeted answer: counts route only to the focused
    /// role (extracted from a full command form if the user restated one).
    fn role_findings(&self, role: Role, value: &Value) -> Vec<(Role, PredId)> {
        match (role, value) {
            (Role::Action, Value::Entity(id)) => self
                .action_entity(*id)
                .map(|a| vec![(Role::Action, a)])
                .unwrap_or_default(),
            (Role::Action, Value::Form(LogicalForm::Apply { head: Head::Pred(p), .. })) => {
                self.action_entity(*p)
                    .map(|a| vec![(Role::Action, a)])
                    .unwrap_or_default()
            }
            (_, Value::Entity(id)) => {
                let atoms = self.catalog.atoms_for_role(role);
                let matches = atoms
                    .iter()
                    .any(|a| self.ontology.entry(*id).ty == SemType::Atom(*a));
                if matches {
                    vec![(role, *id)]
                } else {
                    Vec::new()
                }
            }
            (_, Value::Form(LogicalForm::Apply { head: Head::Pred(p), args })) => {
                let Some(schema) = self.catalog.schema(self.ontology.name(*p)) else {
                    return Vec::new();
                };
                for ((slot_role, _), arg) in schema.args.iter().zip(args) {
                    if *slot_role == role {
                        if let LogicalForm::Leaf(id) = arg {
                            return vec![(role, *id)];
                        }
                    }
                }
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn action_entity(&self, id: PredId) -> Option<PredId> {
        let entry = self.ontology.entry(id);
        (entry.category == PredCategory::Action
            && self.catalog.schema(&entry.name).is_some())
        .then_some(id)
    }

    /// Ask the user to point out the patient among the objects the feature
    /// bank knows. Pointing evidence is as strong as a clean spoken answer.
    fn point_for_patient(&mut self, io: &mut dyn AgentIo) -> AgentResult<bool> {
        let candidates: Vec<u32> = self.kb.perception().features().object_ids().collect();
        if candidates.is_empty() {
            return Ok(false);
        }
        self.say(io, "Could you point to the object you mean?");
        let Some(oidx) = io.get_pointed_object(&candidates)? else {
            return Ok(false);
        };
        let Some(id) = self.ontology.lookup(&format!("oidx_{oidx}")) else {
            tracing::warn!(oidx, "pointed object has no ontology entry");
            return Ok(false);
        };
        self.trace
            .record(Speaker::User, format!("<points to oidx_{oidx}>"));
        self.belief.add(Role::Patient, Some(id), 1.0);
        Ok(true)
    }

    fn sample_role(&mut self, role: Role) -> (Candidate, f64) {
        if let Some(&value) = self.confirmed.get(&role) {
            return (Some(value), 1.0);
        }
        self.belief.sample(role, self.strategy.as_mut())
    }

    fn collect_perceptual_mentions(&mut self, form: &LogicalForm) {
        match form {
            LogicalForm::Leaf(id) => {
                if self.ontology.entry(*id).category == PredCategory::Perceptual {
                    self.perceptual_mentions.push(*id);
                }
            }
            LogicalForm::Var(_) => {}
            LogicalForm::Lambda { body, .. } => self.collect_perceptual_mentions(body),
            LogicalForm::Apply { head, args } => {
                if let Head::Pred(id) = head {
                    if self.ontology.entry(*id).category == PredCategory::Perceptual {
                        self.perceptual_mentions.push(*id);
                    }
                }
                for arg in args {
                    self.collect_perceptual_mentions(arg);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Induced training artifacts
    // -----------------------------------------------------------------------

    /// Pair every role-focused utterance with the role's confirmed value
    /// rendered as a closed logical form; command-focused utterances pair
    /// with the full action application.
    fn induce_pairs(&self, command: &ConfirmedCommand) -> Vec<TrainingPair> {
        let mut pairs = Vec::new();

        let schema = self
            .catalog
            .schema(self.ontology.name(command.action))
            .expect("finalize validated the action");
        let args: Vec<LogicalForm> = schema
            .required_roles()
            .filter_map(|role| command.roles.get(&role).map(|&v| LogicalForm::Leaf(v)))
            .collect();
        let full = LogicalForm::apply(Head::Pred(command.action), args).render(&self.ontology);

        for (role, utterances) in &self.trace.role_utterances {
            let rendered = if *role == Role::Action {
                full.clone()
            } else if let Some(&value) = command.roles.get(role) {
                LogicalForm::Leaf(value).render(&self.ontology)
            } else {
                continue;
            };
            for utterance in utterances {
                pairs.push(TrainingPair {
                    utterance: utterance.clone(),
                    logical_form: rendered.clone(),
                });
            }
        }
        pairs
    }

    /// Perceptual labels induced by the confirmed dialog: every perceptual
    /// predicate mentioned on the way now labels the confirmed patient
    /// object positively.
    pub fn induced_labels(&self, command: &ConfirmedCommand) -> Vec<(String, u32, bool)> {
        let Some(oidx) = command
            .roles
            .get(&Role::Patient)
            .and_then(|&p| object_index(self.ontology.name(p)))
        else {
            return Vec::new();
        };
        let mut seen = Vec::new();
        let mut labels = Vec::new();
        for &mention in &self.perceptual_mentions {
            if seen.contains(&mention) {
                continue;
            }
            seen.push(mention);
            labels.push((self.ontology.name(mention).to_string(), oidx, true));
        }
        labels
    }

    /// Push induced labels through the ensemble's online update, retraining
    /// only the touched predicates.
    pub fn apply_label_feedback(&self, command: &ConfirmedCommand) -> AgentResult<()> {
        let induced = self.induced_labels(command);
        if induced.is_empty() {
            return Ok(());
        }
        let ensemble = self.kb.perception();
        let roster_len = ensemble.predicate_count();
        let mut new_predicates = Vec::new();
        let mut pidxs = Vec::new();
        let mut oidxs = Vec::new();
        let mut labels = Vec::new();
        for (name, oidx, positive) in induced {
            let pidx = match ensemble.predicate_index(&name) {
                Some(i) => i,
                None => {
                    let i = roster_len + new_predicates.len();
                    new_predicates.push(name);
                    i
                }
            };
            pidxs.push(pidx);
            oidxs.push(oidx);
            labels.push(positive);
        }
        ensemble.update(new_predicates, &pidxs, &oidxs, &labels)
    }

    // -----------------------------------------------------------------------
    // Output
    // -----------------------------------------------------------------------

    fn say(&mut self, io: &mut dyn AgentIo, text: &str) {
        self.trace.record(Speaker::Agent, text);
        io.say(text);
    }

    fn ask(&mut self, io: &mut dyn AgentIo, question: &Question) {
        match question {
            Question::AskRole(role) => {
                let text = match role {
                    Role::Action => "What action should I take?",
                    Role::Patient => "What object should I act on?",
                    Role::Recipient => "Who should receive the item?",
                    Role::Source => "Where should I take the item from?",
                    Role::Goal => "Where should I go?",
                };
                self.say(io, text);
            }
            Question::Restate => {
                self.say(io, "Sorry; could you restate what you would like me to do?");
            }
            Question::Confirm(bundle) => {
                let action = bundle
                    .iter()
                    .find(|(role, _)| *role == Role::Action)
                    .map(|(_, id)| self.ontology.name(*id))
                    .unwrap_or_default();
                let template = match action {
                    "walk" => "You want me to go to <goal>somewhere</goal>?",
                    "bring" => {
                        "You want me to deliver <patient>something</patient> to \
                         <recipient>someone</recipient>?"
                    }
                    _ => {
                        "You want me to move <patient>something</patient> from \
                         <source>here</source> to <goal>there</goal>?"
                    }
                };
                let mut role_values = BTreeMap::new();
                for (role, value) in bundle {
                    role_values.insert(*role, self.ontology.name(*value).to_string());
                }
                self.trace
                    .record(Speaker::Agent, substitute_referents(template, &role_values));
                io.say_with_referents(template, &role_values);
            }
        }
    }
}

/// Detect a yes/no answer lexically.
fn yes_no(text: &str) -> Option<bool> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let yes = ["yes", "yeah", "yep", "correct", "right", "sure"];
    let no = ["no", "nope", "wrong", "incorrect"];
    let has_yes = words.iter().any(|w| yes.contains(w));
    let has_no = words.iter().any(|w| no.contains(w));
    match (has_yes, has_no) {
        (true, false) => Some(true),
        (false, true) => Some(false),
        _ => None,
    }
}

/// Sort a grounding set by descending confidence and normalize the
/// confidences to sum to one (uniform split when the raw sum is zero).
fn normalize_groundings(mut groundings: Vec<Grounding>) -> Vec<Grounding> {
    if groundings.is_empty() {
        return groundings;
    }
    groundings.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let sum: f64 = groundings.iter().map(|g| g.confidence).sum();
    if sum > 0.0 {
        for g in &mut groundings {
            g.confidence /= sum;
        }
    } else {
        let uniform = 1.0 / groundings.len() as f64;
        for g in &mut groundings {
            g.confidence = uniform;
        }
    }
    groundings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::facts::FactStore;
    use crate::ontology::OntEntry;
    use crate::parser::LexiconParser;
    use crate::perception::features::FeatureBank;
    use crate::perception::{EnsembleConfig, PerceptionEnsemble};
    use super::belief::ArgMax;

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
                entry("cup", "<i,t>", PredCategory::Symbolic),
                entry("red", "<i,t>", PredCategory::Symbolic),
                entry("oidx_1", "i", PredCategory::Entity),
                entry("oidx_3", "i", PredCategory::Entity),
                entry("dave", "p", PredCategory::Entity),
                entry("maria", "p", PredCategory::Entity),
                entry("kitchen", "l", PredCategory::Entity),
                entry("office", "l", PredCategory::Entity),
            ])
            .unwrap(),
        )
    }

    fn controller_with_facts(facts: &str) -> BeliefController {
        let ontology = test_ontology();
        let perception = Arc::new(PerceptionEnsemble::new(
            FeatureBank::new(&[], &[], Default::default()),
            Vec::new(),
            Vec::new(),
            EnsembleConfig::default(),
        ));
        let kb = Arc::new(KnowledgeBase::new(
            ontology.clone(),
            FactStore::from_text(facts).unwrap(),
            perception,
        ));
        let parser = Box::new(LexiconParser::new(ontology.clone()));
        BeliefController::new(
            ontology,
            kb,
            parser,
            Box::new(ArgMax),
            DialogConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn unambiguous_command_goes_straight_to_confirmation() {
        let mut ctl = controller_with_facts("cup(oidx_3)\n");
        ctl.observe_utterance("bring the cup to dave").unwrap();

        let question = ctl.next_question();
        let ont = ctl.ontology.clone();
        match question {
            Question::Confirm(bundle) => {
                let by_role: BTreeMap<Role, PredId> = bundle.into_iter().collect();
                assert_eq!(by_role[&Role::Action], ont.lookup("bring").unwrap());
                assert_eq!(by_role[&Role::Patient], ont.lookup("oidx_3").unwrap());
                assert_eq!(by_role[&Role::Recipient], ont.lookup("dave").unwrap());
            }
            other => panic!("expected a bundled confirmation, got {other:?}"),
        }
    }

    #[test]
    fn yes_confirms_and_finalizes() {
        let mut ctl = controller_with_facts("cup(oidx_3)\n");
        ctl.observe_utterance("bring the cup to dave").unwrap();
        ctl.next_question();
        ctl.observe_utterance("yes").unwrap();

        assert_eq!(ctl.state(), DialogState::Confirmed);
        let command = ctl.finalize().unwrap();
        let ont = ctl.ontology.clone();
        assert_eq!(command.action, ont.lookup("bring").unwrap());
        assert_eq!(command.roles[&Role::Patient], ont.lookup("oidx_3").unwrap());
        assert_eq!(command.roles[&Role::Recipient], ont.lookup("dave").unwrap());
    }

    #[test]
    fn no_denies_the_bundle_and_continues() {
        let mut ctl = controller_with_facts("cup(oidx_3)\n");
        ctl.observe_utterance("bring the cup to dave").unwrap();
        ctl.next_question();
        ctl.observe_utterance("no").unwrap();

        assert_eq!(ctl.state(), DialogState::Collecting);
        assert_eq!(ctl.trace().reasks, 1);
        // Counts stay non-negative after arbitrary further denials.
        for _ in 0..5 {
            ctl.next_question();
            ctl.observe_utterance("no").unwrap();
        }
        for role in Role::PRIORITY {
            for (candidate, _) in ctl.belief().distribution(role) {
                assert!(ctl.belief().count(role, candidate) >= 0.0);
            }
        }
    }

    #[test]
    fn partial_command_asks_for_the_least_confident_role() {
        let mut ctl = controller_with_facts("cup(oidx_3)\n");
        ctl.observe_utterance("bring the cup").unwrap();
        // Only the bare action groundable: patient and recipient are open.
        let question = ctl.next_question();
        assert_eq!(question, Question::AskRole(Role::Patient));

        ctl.observe_utterance("the cup").unwrap();
        let question = ctl.next_question();
        assert_eq!(question, Question::AskRole(Role::Recipient));

        ctl.observe_utterance("dave").unwrap();
        match ctl.next_question() {
            Question::Confirm(_) => {}
            other => panic!("expected confirmation, got {other:?}"),
        }
        ctl.observe_utterance("yes").unwrap();
        assert_eq!(ctl.state(), DialogState::Confirmed);
    }

    #[test]
    fn gibberish_restates_without_changing_belief() {
        let mut ctl = controller_with_facts("cup(oidx_3)\n");
        ctl.observe_utterance("wibble wobble").unwrap();
        assert_eq!(ctl.trace().reasks, 1);
        assert_eq!(ctl.next_question(), Question::Restate);
    }

    #[test]
    fn ambiguous_definite_reference_is_no_evidence() {
        // Two cups: `the cup` fails uniqueness, so the command contributes
        // nothing and the controller restates.
        let mut ctl = controller_with_facts("cup(oidx_1)\ncup(oidx_3)\n");
        ctl.observe_utterance("bring the cup to dave").unwrap();
        assert_eq!(ctl.trace().reasks, 1);
        assert_eq!(ctl.next_question(), Question::Restate);
    }

    #[test]
    fn indefinite_reference_picks_a_witness() {
        let mut ctl = controller_with_facts("cup(oidx_1)\ncup(oidx_3)\n");
        ctl.observe_utterance("bring a cup to dave").unwrap();
        let ont = ctl.ontology.clone();
        match ctl.next_question() {
            Question::Confirm(bundle) => {
                let by_role: BTreeMap<Role, PredId> = bundle.into_iter().collect();
                // Deterministically the first cup in roster order.
                assert_eq!(by_role[&Role::Patient], ont.lookup("oidx_1").unwrap());
            }
            other => panic!("expected confirmation, got {other:?}"),
        }
    }

    #[test]
    fn finalize_before_confirmation_is_an_error() {
        let mut ctl = controller_with_facts("cup(oidx_3)\n");
        assert!(ctl.finalize().is_err());
    }

    #[test]
    fn walk_command_requires_only_goal() {
        let mut ctl = controller_with_facts("cup(oidx_3)\n");
        ctl.observe_utterance("go to the kitchen").unwrap();
        let ont = ctl.ontology.clone();
        match ctl.next_question() {
            Question::Confirm(bundle) => {
                let by_role: BTreeMap<Role, PredId> = bundle.into_iter().collect();
                assert_eq!(by_role[&Role::Action], ont.lookup("walk").unwrap());
                assert_eq!(by_role[&Role::Goal], ont.lookup("kitchen").unwrap());
                assert_eq!(by_role.len(), 2);
            }
            other => panic!("expected confirmation, got {other:?}"),
        }
        ctl.observe_utterance("yes").unwrap();
        let command = ctl.finalize().unwrap();
        assert_eq!(command.roles.len(), 1);
    }

    #[test]
    fn induced_pairs_cover_role_focused_utterances() {
        let mut ctl = controller_with_facts("cup(oidx_3)\n");
        ctl.observe_utterance("bring the cup").unwrap();
        ctl.next_question();
        ctl.observe_utterance("the cup").unwrap();
        ctl.next_question();
        ctl.observe_utterance("dave").unwrap();
        ctl.next_question();
        ctl.observe_utterance("yes").unwrap();
        let _command = ctl.finalize().unwrap();

        let pairs = &ctl.trace().induced_pairs;
        assert!(pairs.contains(&TrainingPair {
            utterance: "bring the cup".into(),
            logical_form: "bring(oidx_3,dave)".into(),
        }));
        assert!(pairs.contains(&TrainingPair {
            utterance: "the cup".into(),
            logical_form: "oidx_3".into(),
        }));
        assert!(pairs.contains(&TrainingPair {
            utterance: "dave".into(),
            logical_form: "dave".into(),
        }));
    }

    #[test]
    fn yes_no_detection() {
        assert_eq!(yes_no("yes"), Some(true));
        assert_eq!(yes_no("Yeah, that's right"), Some(true));
        assert_eq!(yes_no("no"), Some(false));
        assert_eq!(yes_no("Nope."), Some(false));
        assert_eq!(yes_no("bring the cup"), None);
        assert_eq!(yes_no("yes and no"), None);
    }

    #[test]
    fn normalization_splits_uniformly_on_zero_mass() {
        let gs = vec![
            Grounding {
                bindings: Vec::new(),
                value: Value::Bool(true),
                confidence: 0.0,
            },
            Grounding {
                bindings: Vec::new(),
                value: Value::Bool(true),
                confidence: 0.0,
            },
        ];
        let normalized = normalize_groundings(gs);
        assert!(normalized.iter().all(|g| (g.confidence - 0.5).abs() < 1e-9));
    }
}
