//! Type declarations of an elaborated program.
use p4fpga_utils::{GetName, Id};
use serde::{Deserialize, Serialize};

/// The type of a field, parameter or expression.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Type {
    /// Unsigned bit string: `bit<width>`.
    Bits { width: u64 },
    /// Signed integer: `int<width>`.
    Int { width: u64 },
    /// Boolean.
    Bool,
    /// A reference to a declared header, struct or header union.
    Named { name: Id },
}

impl Type {
    pub fn bits(width: u64) -> Self {
        Type::Bits { width }
    }

    pub fn named<S: Into<Id>>(name: S) -> Self {
        Type::Named { name: name.into() }
    }

    /// The declared type this type refers to, if any.
    pub fn decl_name(&self) -> Option<Id> {
        match self {
            Type::Named { name } => Some(*name),
            _ => None,
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Bits { width } => write!(f, "bit<{}>", width),
            Type::Int { width } => write!(f, "int<{}>", width),
            Type::Bool => write!(f, "bool"),
            Type::Named { name } => write!(f, "{}", name),
        }
    }
}

/// A named, typed member of a declaration. Also used for block and action
/// parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: Id,
    #[serde(rename = "type")]
    pub ty: Type,
}

impl Field {
    pub fn new<S: Into<Id>>(name: S, ty: Type) -> Self {
        Field {
            name: name.into(),
            ty,
        }
    }
}

/// The flavor of an aggregate type declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclKind {
    Header,
    Struct,
    HeaderUnion,
}

impl std::fmt::Display for DeclKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeclKind::Header => write!(f, "header"),
            DeclKind::Struct => write!(f, "struct"),
            DeclKind::HeaderUnion => write!(f, "header_union"),
        }
    }
}

/// A header, struct or header union declaration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDecl {
    pub name: Id,
    pub kind: DeclKind,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl TypeDecl {
    /// Find the member named `name`.
    pub fn field(&self, name: Id) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_header(&self) -> bool {
        self.kind == DeclKind::Header
    }
}

impl GetName for TypeDecl {
    fn name(&self) -> Id {
        self.name
    }
}
