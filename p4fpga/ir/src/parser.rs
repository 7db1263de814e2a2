//! Parse and deparse graphs.
use crate::{Field, Path};
use p4fpga_utils::{GetName, Id};
use serde::{Deserialize, Serialize};

/// Name of the state every parser starts in.
pub const START: &str = "start";
/// Built-in terminal state for successfully parsed packets.
pub const ACCEPT: &str = "accept";
/// Built-in terminal state for dropped packets.
pub const REJECT: &str = "reject";

/// A parser block: a set of states connected by transitions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserDecl {
    pub name: Id,
    #[serde(default)]
    pub params: Vec<Field>,
    pub states: Vec<ParserState>,
}

impl ParserDecl {
    pub fn state(&self, name: Id) -> Option<&ParserState> {
        self.states.iter().find(|s| s.name == name)
    }
}

impl GetName for ParserDecl {
    fn name(&self) -> Id {
        self.name
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserState {
    pub name: Id,
    /// Headers extracted, in order, when the state is entered.
    #[serde(default)]
    pub extracts: Vec<Path>,
    pub transition: Transition,
}

/// How a parser state picks its successor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    /// `transition next;`
    Direct { next: Id },
    /// `transition select(keys) { cases }`
    Select {
        keys: Vec<Path>,
        cases: Vec<SelectCase>,
    },
}

impl Transition {
    /// Names of every state this transition may move to. Arms after the
    /// first default arm can never be taken.
    pub fn targets(&self) -> Vec<Id> {
        match self {
            Transition::Direct { next } => vec![*next],
            Transition::Select { cases, .. } => {
                let live = cases
                    .iter()
                    .position(|c| c.is_default())
                    .map_or(cases.len(), |idx| idx + 1);
                cases[..live].iter().map(|c| c.next).collect()
            }
        }
    }
}

/// One arm of a select. An arm without a value is the `default` arm.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectCase {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<u64>,
    pub next: Id,
}

impl SelectCase {
    pub fn is_default(&self) -> bool {
        self.value.is_none()
    }
}

/// A deparser block: the headers emitted, in order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeparserDecl {
    pub name: Id,
    #[serde(default)]
    pub params: Vec<Field>,
    #[serde(default)]
    pub emits: Vec<Path>,
}

impl GetName for DeparserDecl {
    fn name(&self) -> Id {
        self.name
    }
}
