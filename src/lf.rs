//! Logical-form trees: the typed meaning representation handed over by the
//! parser and evaluated by the grounder.
//!
//! A tree is either a leaf predicate, a lambda abstraction binding a typed
//! variable over a body, a reference to a bound variable, or an application of
//! a head (a special form, a predicate, or a bound variable) to children.
//! Only *closed* trees (no free variable references) are accepted by the
//! interpreter's top level.
//!
//! The module also provides the textual notation used by fact files, induced
//! training pairs, and the CLI: `bring(a(lambda x:i.(cup(x))), dave)`.

use serde::{Deserialize, Serialize};

use crate::error::{AgentResult, LfError};
use crate::ontology::{AtomType, Ontology, PredId};

/// Special forms with interpreter-defined semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Connective {
    And,
    Or,
    Equals,
    /// Definite reference: exactly one witness.
    The,
    /// Indefinite reference: the first witness, deterministically.
    A,
}

impl Connective {
    /// The reserved surface name of this form.
    pub fn name(self) -> &'static str {
        match self {
            Connective::And => "and",
            Connective::Or => "or",
            Connective::Equals => "equals",
            Connective::The => "the",
            Connective::A => "a",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "and" => Some(Connective::And),
            "or" => Some(Connective::Or),
            "equals" => Some(Connective::Equals),
            "the" => Some(Connective::The),
            "a" => Some(Connective::A),
            _ => None,
        }
    }
}

/// The head of an application node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Head {
    Connective(Connective),
    Pred(PredId),
    /// A bound variable in head position; the grounder substitutes its
    /// assignment as the effective predicate.
    Var(String),
}

/// A logical-form tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalForm {
    /// A bare predicate reference.
    Leaf(PredId),
    /// A lambda abstraction binding `var` of atomic type `ty` over `body`.
    Lambda {
        var: String,
        ty: AtomType,
        body: Box<LogicalForm>,
    },
    /// An occurrence of a bound variable.
    Var(String),
    /// A head applied to ordered children.
    Apply { head: Head, args: Vec<LogicalForm> },
}

impl LogicalForm {
    /// Convenience constructor for an application node.
    pub fn apply(head: Head, args: Vec<LogicalForm>) -> Self {
        LogicalForm::Apply { head, args }
    }

    /// Convenience constructor for a lambda abstraction.
    pub fn lambda(var: impl Into<String>, ty: AtomType, body: LogicalForm) -> Self {
        LogicalForm::Lambda {
            var: var.into(),
            ty,
            body: Box::new(body),
        }
    }

    /// Whether the tree has no free variable references.
    pub fn is_closed(&self) -> bool {
        self.first_free_var(&mut Vec::new()).is_none()
    }

    /// The first free variable found, if any.
    pub fn first_free_var(&self, scope: &mut Vec<String>) -> Option<String> {
        match self {
            LogicalForm::Leaf(_) => None,
            LogicalForm::Var(name) => {
                (!scope.iter().any(|s| s == name)).then(|| name.clone())
            }
            LogicalForm::Lambda { var, body, .. } => {
                scope.push(var.clone());
                let free = body.first_free_var(scope);
                scope.pop();
                free
            }
            LogicalForm::Apply { head, args } => {
                if let Head::Var(name) = head {
                    if !scope.iter().any(|s| s == name) {
                        return Some(name.clone());
                    }
                }
                args.iter().find_map(|a| a.first_free_var(scope))
            }
        }
    }

    /// Render the tree in the functional text notation.
    pub fn render(&self, ontology: &Ontology) -> String {
        let mut out = String::new();
        self.render_into(ontology, &mut out);
        out
    }

    fn render_into(&self, ontology: &Ontology, out: &mut String) {
        match self {
            LogicalForm::Leaf(id) => out.push_str(ontology.name(*id)),
            LogicalForm::Var(name) => out.push_str(name),
            LogicalForm::Lambda { var, ty, body } => {
                out.push_str("lambda ");
                out.push_str(var);
                out.push(':');
                out.push(ty.letter());
                out.push_str(".(");
                body.render_into(ontology, out);
                out.push(')');
            }
            LogicalForm::Apply { head, args } => {
                match head {
                    Head::Connective(c) => out.push_str(c.name()),
                    Head::Pred(id) => out.push_str(ontology.name(*id)),
                    Head::Var(name) => out.push_str(name),
                }
                out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    arg.render_into(ontology, out);
                }
                out.push(')');
            }
        }
    }

    /// Parse a tree from the functional text notation.
    pub fn parse(text: &str, ontology: &Ontology) -> AgentResult<Self> {
        let mut parser = LfParser {
            text,
            pos: 0,
            ontology,
            scope: Vec::new(),
        };
        let form = parser.form()?;
        parser.skip_ws();
        if parser.pos != text.len() {
            return Err(parser.err("trailing input"));
        }
        Ok(form)
    }
}

// ---------------------------------------------------------------------------
// Text parser
// ---------------------------------------------------------------------------

struct LfParser<'a> {
    text: &'a str,
    pos: usize,
    ontology: &'a Ontology,
    scope: Vec<String>,
}

impl<'a> LfParser<'a> {
    fn err(&self, message: &str) -> crate::error::AgentError {
        LfError::Parse {
            offset: self.pos,
            message: message.to_string(),
        }
        .into()
    }

    fn skip_ws(&mut self) {
        let rest = &self.text[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, c: char) -> AgentResult<()> {
        self.skip_ws();
        if self.text[self.pos..].starts_with(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            Err(self.err(&format!("expected '{c}'")))
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.text[self.pos..].chars().next()
    }

    fn ident(&mut self) -> AgentResult<String> {
        self.skip_ws();
        let rest = &self.text[self.pos..];
        let end = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if end == 0 {
            return Err(self.err("expected identifier"));
        }
        self.pos += end;
        Ok(rest[..end].to_string())
    }

    fn form(&mut self) -> AgentResult<LogicalForm> {
        let name = self.ident()?;

        if name == "lambda" {
            let var = self.ident()?;
            self.eat(':')?;
            let ty_name = self.ident()?;
            let ty = match ty_name.as_str() {
                "t" => AtomType::Truth,
                "a" => AtomType::Action,
                "l" => AtomType::Location,
                "i" => AtomType::Item,
                "p" => AtomType::Person,
                _ => return Err(self.err(&format!("unknown atom type '{ty_name}'"))),
            };
            self.eat('.')?;
            self.eat('(')?;
            self.scope.push(var.clone());
            let body = self.form()?;
            self.scope.pop();
            self.eat(')')?;
            return Ok(LogicalForm::lambda(var, ty, body));
        }

        let applied = self.peek() == Some('(');
        if applied {
            self.eat('(')?;
            let mut args = vec![self.form()?];
            while self.peek() == Some(',') {
                self.eat(',')?;
                args.push(self.form()?);
            }
            self.eat(')')?;
            let head = self.head(&name)?;
            return Ok(LogicalForm::apply(head, args));
        }

        // Bare name: a bound variable, or a leaf predicate.
        if self.scope.iter().any(|s| s == &name) {
            return Ok(LogicalForm::Var(name));
        }
        match self.ontology.lookup(&name) {
            Some(id) => Ok(LogicalForm::Leaf(id)),
            None => Err(self.err(&format!("unknown predicate '{name}'"))),
        }
    }

    fn head(&mut self, name: &str) -> AgentResult<Head> {
        if self.scope.iter().any(|s| s == name) {
            return Ok(Head::Var(name.to_string()));
        }
        if let Some(c) = Connective::from_name(name) {
            return Ok(Head::Connective(c));
        }
        match self.ontology.lookup(name) {
            Some(id) => Ok(Head::Pred(id)),
            None => Err(self.err(&format!("unknown predicate '{name}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::{OntEntry, PredCategory, SemType};

    fn test_ontology() -> Ontology {
        let entry = |name: &str, ty: &str, category| OntEntry {
            name: name.into(),
            ty: SemType::parse(ty).unwrap(),
            category,
        };
        Ontology::new(vec![
            entry("cup", "<i,t>", PredCategory::Perceptual),
            entry("red", "<i,t>", PredCategory::Perceptual),
            entry("oidx_1", "i", PredCategory::Entity),
            entry("dave", "p", PredCategory::Entity),
            entry("bring", "<i,<p,a>>", PredCategory::Action),
        ])
        .unwrap()
    }

    #[test]
    fn parse_leaf() {
        let ont = test_ontology();
        let lf = LogicalForm::parse("dave", &ont).unwrap();
        assert_eq!(lf, LogicalForm::Leaf(ont.lookup("dave").unwrap()));
        assert!(lf.is_closed());
    }

    #[test]
    fn parse_application() {
        let ont = test_ontology();
        let lf = LogicalForm::parse("cup(oidx_1)", &ont).unwrap();
        let expected = LogicalForm::apply(
            Head::Pred(ont.lookup("cup").unwrap()),
            vec![LogicalForm::Leaf(ont.lookup("oidx_1").unwrap())],
        );
        assert_eq!(lf, expected);
    }

    #[test]
    fn parse_quantified_lambda() {
        let ont = test_ontology();
        let lf = LogicalForm::parse("a(lambda x:i.(cup(x)))", &ont).unwrap();
        match &lf {
            LogicalForm::Apply { head, args } => {
                assert_eq!(*head, Head::Connective(Connective::A));
                assert!(matches!(
                    &args[0],
                    LogicalForm::Lambda { var, ty, .. } if var == "x" && *ty == AtomType::Item
                ));
            }
            other => panic!("unexpected parse: {other:?}"),
        }
        assert!(lf.is_closed());
    }

    #[test]
    fn parse_full_command() {
        let ont = test_ontology();
        let text = "bring(the(lambda x:i.(and(red(x),cup(x)))),dave)";
        let lf = LogicalForm::parse(text, &ont).unwrap();
        assert!(lf.is_closed());
        assert_eq!(lf.render(&ont), text);
    }

    #[test]
    fn render_round_trips() {
        let ont = test_ontology();
        for text in [
            "cup(oidx_1)",
            "a(lambda x:i.(cup(x)))",
            "the(lambda y:i.(red(y)))",
            "equals(oidx_1,oidx_1)",
        ] {
            let lf = LogicalForm::parse(text, &ont).unwrap();
            assert_eq!(lf.render(&ont), text);
        }
    }

    #[test]
    fn free_variable_detected() {
        let ont = test_ontology();
        // `x` is only bound inside the lambda; a bare reference is rejected
        // by the parser outright.
        assert!(LogicalForm::parse("cup(x)", &ont).is_err());

        // A hand-built open tree is flagged by the closure check.
        let open = LogicalForm::apply(
            Head::Pred(ont.lookup("cup").unwrap()),
            vec![LogicalForm::Var("x".into())],
        );
        assert!(!open.is_closed());
        assert_eq!(open.first_free_var(&mut Vec::new()), Some("x".into()));
    }

    #[test]
    fn variable_in_head_position() {
        let ont = test_ontology();
        let lf = LogicalForm::parse("lambda f:t.(f(oidx_1))", &ont).unwrap();
        match lf {
            LogicalForm::Lambda { body, .. } => match *body {
                LogicalForm::Apply { head, .. } => assert_eq!(head, Head::Var("f".into())),
                other => panic!("unexpected body: {other:?}"),
            },
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn unknown_predicate_rejected() {
        let ont = test_ontology();
        let err = LogicalForm::parse("florp(oidx_1)", &ont).unwrap_err();
        assert!(format!("{err}").contains("florp"));
    }

    #[test]
    fn trailing_input_rejected() {
        let ont = test_ontology();
        assert!(LogicalForm::parse("cup(oidx_1))", &ont).is_err());
    }
}
