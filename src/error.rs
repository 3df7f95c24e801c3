//! Rich diagnostic error types for the groundhog dialog core.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so users know exactly what
//! went wrong and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the groundhog agent.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, source spans) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum AgentError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Ontology(#[from] OntologyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Lf(#[from] LfError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ground(#[from] GroundError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Perception(#[from] PerceptionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Kb(#[from] KbError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Dialog(#[from] DialogError),
}

// ---------------------------------------------------------------------------
// Ontology errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum OntologyError {
    #[error("unknown predicate: {name}")]
    #[diagnostic(
        code(groundhog::ontology::unknown_predicate),
        help(
            "The predicate is not part of the loaded ontology. \
             Check the spelling, or add an entry to the ontology file."
        )
    )]
    UnknownPredicate { name: String },

    #[error("duplicate predicate: {name}")]
    #[diagnostic(
        code(groundhog::ontology::duplicate_predicate),
        help("Every ontology entry must have a unique name. Remove the duplicate.")
    )]
    DuplicatePredicate { name: String },

    #[error("invalid type expression: {text}")]
    #[diagnostic(
        code(groundhog::ontology::invalid_type),
        help(
            "Type expressions are atoms (t, a, l, i, p) or functions like <i,t> \
             and <i,<p,a>>. Check for balanced angle brackets and a single comma \
             per function level."
        )
    )]
    InvalidType { text: String },

    #[error("ontology file error: {message}")]
    #[diagnostic(
        code(groundhog::ontology::file),
        help("The ontology TOML file could not be read or parsed.")
    )]
    File { message: String },
}

// ---------------------------------------------------------------------------
// Logical-form errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum LfError {
    #[error("logical form parse error at byte {offset}: {message}")]
    #[diagnostic(
        code(groundhog::lf::parse),
        help(
            "Logical forms use the functional notation \
             `a(lambda x:i.(cup(x)))`. Check for balanced parentheses and that \
             every predicate name appears in the ontology."
        )
    )]
    Parse { offset: usize, message: String },

    #[error("free variable reference: {name}")]
    #[diagnostic(
        code(groundhog::lf::free_variable),
        help(
            "Every lambda reference must resolve to an enclosing abstraction. \
             Only closed trees are accepted by the interpreter's top level."
        )
    )]
    FreeVariable { name: String },
}

// ---------------------------------------------------------------------------
// Grounding errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GroundError {
    #[error("tree is not closed: free reference to {name}")]
    #[diagnostic(
        code(groundhog::ground::open_tree),
        help("The public grounding entry point only accepts closed logical forms.")
    )]
    OpenTree { name: String },

    #[error("nested quantification is not supported ({arity} bindings under one quantifier)")]
    #[diagnostic(
        code(groundhog::ground::nested_quantifier),
        help(
            "`the` and `a` are only defined over a single lambda abstraction. \
             Rewrite the form so quantifiers do not nest."
        )
    )]
    NestedQuantifier { arity: usize },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Kb(#[from] KbError),
}

// ---------------------------------------------------------------------------
// Perception errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PerceptionError {
    #[error("unknown perceptual predicate index: {pidx}")]
    #[diagnostic(
        code(groundhog::perception::unknown_predicate),
        help(
            "The predicate index is out of range for the ensemble's roster. \
             Register the predicate through `update` before querying it."
        )
    )]
    UnknownPredicate { pidx: usize },

    #[error("unknown object index: {oidx}")]
    #[diagnostic(
        code(groundhog::perception::unknown_object),
        help(
            "No feature vectors are loaded for this object. Check the feature \
             file and the object index."
        )
    )]
    UnknownObject { oidx: u32 },

    #[error("mismatched update arguments: {pidxs} predicate indices, {oidxs} object indices, {labels} labels")]
    #[diagnostic(
        code(groundhog::perception::mismatched_update),
        help("`update` takes parallel lists: one predicate index and one object index per label.")
    )]
    MismatchedUpdate {
        pidxs: usize,
        oidxs: usize,
        labels: usize,
    },

    #[error("feature file error: {message}")]
    #[diagnostic(
        code(groundhog::perception::feature_file),
        help("The JSON feature file could not be read or parsed.")
    )]
    FeatureFile { message: String },

    #[error("snapshot error: {message}")]
    #[diagnostic(
        code(groundhog::perception::snapshot),
        help(
            "Reading or writing the classifier snapshot failed. Check that the \
             source directory exists and is writable, and that the snapshot was \
             produced by a compatible version."
        )
    )]
    Snapshot { message: String },
}

// ---------------------------------------------------------------------------
// Knowledge-base errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum KbError {
    #[error("predicate {name} cannot be interpreted by the knowledge base")]
    #[diagnostic(
        code(groundhog::kb::unknown_predicate),
        help(
            "The predicate is neither in the static fact store's vocabulary nor \
             a perceptual predicate over a known object. This discards one \
             grounding branch, not the whole enumeration."
        )
    )]
    UnknownPredicate { name: String },

    #[error("fact file error: {message}")]
    #[diagnostic(
        code(groundhog::kb::fact_file),
        help(
            "The static facts file could not be read. Each line must be a \
             ground atom like `cup(oidx_3)` or a comment starting with `#`."
        )
    )]
    FactFile { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Perception(#[from] PerceptionError),
}

// ---------------------------------------------------------------------------
// Dialog errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum DialogError {
    #[error("dialog confirmed with unfilled required role: {role}")]
    #[diagnostic(
        code(groundhog::dialog::unfilled_role),
        help(
            "Reaching the confirmed state with a missing required role is a \
             programming fault in the belief controller, not a recoverable \
             runtime condition. Please file a bug report."
        )
    )]
    UnfilledRole { role: String },

    #[error("confirmed action {name} is not in the action catalog")]
    #[diagnostic(
        code(groundhog::dialog::unknown_action),
        help(
            "Only `walk`, `bring`, and `move` are executable. An unknown \
             confirmed action indicates ontology/catalog drift."
        )
    )]
    UnknownAction { name: String },

    #[error("finalize called before the dialog was confirmed")]
    #[diagnostic(
        code(groundhog::dialog::not_confirmed),
        help("Only a dialog in the confirmed state can emit a command. Keep observing utterances until it confirms.")
    )]
    NotConfirmed,

    #[error("input channel closed")]
    #[diagnostic(
        code(groundhog::dialog::input_closed),
        help("The I/O backend returned end-of-input before the dialog was confirmed.")
    )]
    InputClosed,

    #[error("dialog trace error: {message}")]
    #[diagnostic(
        code(groundhog::dialog::trace),
        help("Writing the dialog trace or induced training pairs failed. Check the output directory.")
    )]
    Trace { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ground(#[from] GroundError),
}

/// Convenience alias for functions returning groundhog results.
pub type AgentResult<T> = std::result::Result<T, AgentError>;
