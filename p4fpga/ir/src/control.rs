//! Match-action control blocks.
use crate::{Expr, Field, Path};
use p4fpga_utils::{GetName, Id};
use serde::{Deserialize, Serialize};

/// The action every table implicitly knows about.
pub const NO_ACTION: &str = "NoAction";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlDecl {
    pub name: Id,
    #[serde(default)]
    pub params: Vec<Field>,
    #[serde(default)]
    pub actions: Vec<ActionDecl>,
    #[serde(default)]
    pub tables: Vec<TableDecl>,
    /// Stateful register arrays, `register<bit<width>>(size) name;`.
    #[serde(default)]
    pub registers: Vec<RegisterDecl>,
    /// Body of the `apply` block.
    #[serde(default)]
    pub apply: Vec<Stmt>,
}

impl ControlDecl {
    pub fn table(&self, name: Id) -> Option<&TableDecl> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn action(&self, name: Id) -> Option<&ActionDecl> {
        self.actions.iter().find(|a| a.name == name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterDecl {
    pub name: Id,
    /// Width of one cell.
    pub width: u64,
    /// Number of cells.
    pub size: u64,
}

impl GetName for ControlDecl {
    fn name(&self) -> Id {
        self.name
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDecl {
    pub name: Id,
    /// Action data supplied by the control plane.
    #[serde(default)]
    pub params: Vec<Field>,
    #[serde(default)]
    pub body: Vec<ActionStmt>,
}

/// Primitive statements allowed in action bodies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionStmt {
    Assign { dst: Path, src: Expr },
    SetValid { path: Path },
    SetInvalid { path: Path },
    Drop,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Ternary,
    Lpm,
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchKind::Exact => write!(f, "exact"),
            MatchKind::Ternary => write!(f, "ternary"),
            MatchKind::Lpm => write!(f, "lpm"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyElement {
    pub field: Path,
    pub match_kind: MatchKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDecl {
    pub name: Id,
    #[serde(default)]
    pub keys: Vec<KeyElement>,
    pub actions: Vec<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_action: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl GetName for TableDecl {
    fn name(&self) -> Id {
        self.name
    }
}

/// Statements of an `apply` block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stmt {
    /// `table.apply();`
    Apply { table: Id },
    If {
        cond: Expr,
        #[serde(default)]
        then: Vec<Stmt>,
        #[serde(default)]
        otherwise: Vec<Stmt>,
    },
}
