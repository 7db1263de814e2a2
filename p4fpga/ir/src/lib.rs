//! Elaborated program representation consumed by the [P4FPGA] backend.
//!
//! The front end (parsing, type checking, midend passes) is an external
//! collaborator. It hands the backend a fully elaborated program as JSON
//! together with its analysis results: a [ReferenceMap] that resolves names
//! to declarations and a [TypeMap] that resolves declared types.
//!
//! [P4FPGA]: https://p4fpga.github.io

mod control;
mod expr;
mod parser;
mod path;
mod printer;
mod reference_map;
mod structure;
mod toplevel;
mod type_map;

/// Loading elaborated programs from the front end's JSON dump.
pub mod from_json;

pub use control::{
    ActionDecl, ActionStmt, ControlDecl, KeyElement, MatchKind,
    RegisterDecl, Stmt, TableDecl, NO_ACTION,
};
pub use expr::{BinOp, Expr};
pub use p4fpga_utils::{GetName, Id};
pub use parser::{
    ACCEPT, DeparserDecl, ParserDecl, ParserState, REJECT, START, SelectCase,
    Transition,
};
pub use path::Path;
pub use printer::{CanonicalPrinter, Printer};
pub use reference_map::{Declaration, ReferenceMap};
pub use structure::{DeclKind, Field, Type, TypeDecl};
pub use toplevel::{MainBlock, Program, ToplevelBlock};
pub use type_map::TypeMap;
