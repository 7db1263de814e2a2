use crate::{ControlDecl, DeparserDecl, ParserDecl, TypeDecl};
use p4fpga_utils::Id;
use serde::{Deserialize, Serialize};

/// Every declaration of an elaborated program.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub types: Vec<TypeDecl>,
    #[serde(default)]
    pub parsers: Vec<ParserDecl>,
    #[serde(default)]
    pub controls: Vec<ControlDecl>,
    #[serde(default)]
    pub deparsers: Vec<DeparserDecl>,
}

impl Program {
    pub fn parser(&self, name: Id) -> Option<&ParserDecl> {
        self.parsers.iter().find(|p| p.name == name)
    }

    pub fn control(&self, name: Id) -> Option<&ControlDecl> {
        self.controls.iter().find(|c| c.name == name)
    }

    pub fn deparser(&self, name: Id) -> Option<&DeparserDecl> {
        self.deparsers.iter().find(|d| d.name == name)
    }
}

/// The package instantiation that wires blocks into a pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainBlock {
    /// Package type being instantiated, e.g. `V1Switch`.
    #[serde(default = "MainBlock::default_package")]
    pub package: Id,
    pub parser: Id,
    /// Match-action controls in pipeline order.
    #[serde(default)]
    pub pipeline: Vec<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deparser: Option<Id>,
}

impl MainBlock {
    fn default_package() -> Id {
        Id::from("V1Switch")
    }
}

/// The evaluated top-level of a program.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToplevelBlock {
    pub program: Program,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<MainBlock>,
}

impl ToplevelBlock {
    /// Name the package instance must be bound to.
    pub const MAIN: &'static str = "main";

    pub fn get_program(&self) -> &Program {
        &self.program
    }

    pub fn get_main(&self) -> Option<&MainBlock> {
        self.main.as_ref()
    }
}
