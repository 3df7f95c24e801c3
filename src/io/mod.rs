//! Physical I/O boundary: speech, pointing, and actuation are external
//! collaborators consumed through one trait.
//!
//! [`KeyboardIo`] drives a single non-embodied agent from a terminal;
//! [`ScriptedIo`] replays canned answers for tests. Templated output carries
//! role-tagged spans (`"deliver <patient>this</patient>"`) that are replaced
//! by the concrete role values, discarding the filler text.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::io::{BufRead, Write};

use crate::dialog::actions::Role;
use crate::error::{AgentResult, DialogError};

/// The agent's connection to the outside world.
pub trait AgentIo {
    /// Say a plain string to the user.
    fn say(&mut self, text: &str);

    /// Say a templated string with role-tagged spans substituted by the
    /// given role values.
    fn say_with_referents(&mut self, template: &str, role_values: &BTreeMap<Role, String>) {
        self.say(&substitute_referents(template, role_values));
    }

    /// Block for the user's next utterance.
    fn listen(&mut self) -> AgentResult<String>;

    /// Ask the user to point out one of the candidate objects. `None` means
    /// the user declined ("none of these").
    fn get_pointed_object(&mut self, candidates: &[u32]) -> AgentResult<Option<u32>>;

    /// Execute a confirmed command.
    fn perform(&mut self, action: &str, role_values: &BTreeMap<Role, String>) -> AgentResult<()>;
}

/// Replace `<role>filler</role>` spans with the role's value.
pub fn substitute_referents(template: &str, role_values: &BTreeMap<Role, String>) -> String {
    let mut text = template.to_string();
    for (role, value) in role_values {
        let open = format!("<{}>", role.name());
        let close = format!("</{}>", role.name());
        if let (Some(start), Some(end)) = (text.find(&open), text.find(&close)) {
            if start < end {
                let mut replaced = String::with_capacity(text.len());
                replaced.push_str(&text[..start]);
                replaced.push_str(value);
                replaced.push_str(&text[end + close.len()..]);
                text = replaced;
            }
        }
    }
    text
}

/// Render a confirmed command the way the robot would narrate it.
pub fn describe_action(
    action: &str,
    role_values: &BTreeMap<Role, String>,
) -> AgentResult<String> {
    let get = |role: Role| -> AgentResult<&String> {
        role_values.get(&role).ok_or_else(|| {
            DialogError::UnfilledRole {
                role: role.name().to_string(),
            }
            .into()
        })
    };
    match action {
        "walk" => Ok(format!("Navigate to location {}", get(Role::Goal)?)),
        "bring" => Ok(format!(
            "Pick up item {} and deliver it to person {}",
            get(Role::Patient)?,
            get(Role::Recipient)?
        )),
        "move" => Ok(format!(
            "Move item {} from {} to {}",
            get(Role::Patient)?,
            get(Role::Source)?,
            get(Role::Goal)?
        )),
        other => Err(DialogError::UnknownAction {
            name: other.to_string(),
        }
        .into()),
    }
}

// ---------------------------------------------------------------------------
// Keyboard I/O
// ---------------------------------------------------------------------------

/// Terminal-backed I/O for a single local user.
#[derive(Debug, Default)]
pub struct KeyboardIo;

impl AgentIo for KeyboardIo {
    fn say(&mut self, text: &str) {
        println!("AGENT: {text}");
    }

    fn listen(&mut self) -> AgentResult<String> {
        let stdin = std::io::stdin();
        loop {
            print!("YOU: ");
            let _ = std::io::stdout().flush();
            let mut line = String::new();
            let read = stdin
                .lock()
                .read_line(&mut line)
                .map_err(|_| DialogError::InputClosed)?;
            if read == 0 {
                return Err(DialogError::InputClosed.into());
            }
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(trimmed.to_string());
            }
        }
    }

    fn get_pointed_object(&mut self, candidates: &[u32]) -> AgentResult<Option<u32>> {
        self.say(&format!("Point to one of the objects {candidates:?} (or say 'none'):"));
        loop {
            let answer = self.listen()?;
            if answer.contains("none") || answer.contains("all") {
                return Ok(None);
            }
            if let Ok(oidx) = answer.parse::<u32>() {
                if candidates.contains(&oidx) {
                    return Ok(Some(oidx));
                }
            }
        }
    }

    fn perform(&mut self, action: &str, role_values: &BTreeMap<Role, String>) -> AgentResult<()> {
        let description = describe_action(action, role_values)?;
        println!("ROBOT ACTION: {description}");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scripted I/O
// ---------------------------------------------------------------------------

/// Replays a fixed sequence of user answers and records everything said and
/// performed; the test harness I/O.
#[derive(Debug, Default)]
pub struct ScriptedIo {
    inputs: VecDeque<String>,
    pub said: Vec<String>,
    pub performed: Vec<String>,
    pub pointed: Option<u32>,
}

impl ScriptedIo {
    pub fn new<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }
}

impl AgentIo for ScriptedIo {
    fn say(&mut self, text: &str) {
        self.said.push(text.to_string());
    }

    fn listen(&mut self) -> AgentResult<String> {
        self.inputs
            .pop_front()
            .ok_or_else(|| DialogError::InputClosed.into())
    }

    fn get_pointed_object(&mut self, _candidates: &[u32]) -> AgentResult<Option<u32>> {
        Ok(self.pointed)
    }

    fn perform(&mut self, action: &str, role_values: &BTreeMap<Role, String>) -> AgentResult<()> {
        self.performed.push(describe_action(action, role_values)?);
        Ok(())
    }
}
