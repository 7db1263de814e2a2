//! Every BSV type the generated code declares, in one namespace.
use crate::bsv::{ArtifactKind, BsvProgram, CodeBuilder};
use crate::type_factory::{Layout, TypeFactory};
use linked_hash_map::LinkedHashMap;
use p4fpga_ir::{DeclKind, Type, TypeMap};
use p4fpga_utils::{Error, FpgaResult, Id};
use std::collections::HashSet;

use super::scope::bsv_ident;

/// Why a type exists in the generated code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeOrigin {
    /// Declared in the P4 program.
    Declared(DeclKind),
    /// The per-packet metadata record threaded through the pipeline.
    Metadata,
    /// Packet token plus metadata sent to, or returned from, a stage.
    Request,
    /// States of the parser or deparser state machine.
    States(ArtifactKind),
    /// Action data of one action.
    ActionParams,
    /// Lookup key of a table.
    TableKey,
    /// Result of a table lookup.
    TableResponse,
    /// Tagged union of the actions a table may select.
    TableActions,
    /// Interface of a generated module, or the control plane interface of
    /// the whole program.
    Interface(ArtifactKind),
}

/// The shape of a BSV type declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeShape {
    /// `(type, member)` pairs.
    Struct(Vec<(String, String)>),
    /// `(type, tag)` pairs; `void` for tags without payload.
    Union(Vec<(String, String)>),
    Enum(Vec<String>),
    /// Method prototypes.
    Interface(Vec<String>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BsvTypeDecl {
    pub name: String,
    pub origin: TypeOrigin,
    pub shape: TypeShape,
}

impl BsvTypeDecl {
    pub fn new(name: String, origin: TypeOrigin, shape: TypeShape) -> Self {
        BsvTypeDecl {
            name,
            origin,
            shape,
        }
    }

    /// The BSV translation of a declared P4 type.
    fn declared(layout: &Layout, tf: &TypeFactory) -> Self {
        let shape = match layout.kind {
            DeclKind::HeaderUnion => TypeShape::Union(
                layout
                    .fields
                    .iter()
                    .map(|f| {
                        (tf.bsv_type(&f.ty), crate::bsv::camel_case(f.name.as_str()))
                    })
                    .collect(),
            ),
            DeclKind::Header | DeclKind::Struct => TypeShape::Struct(
                layout
                    .fields
                    .iter()
                    .map(|f| (tf.bsv_type(&f.ty), bsv_ident(f.name.as_str())))
                    .collect(),
            ),
        };
        BsvTypeDecl::new(
            layout.bsv_name.clone(),
            TypeOrigin::Declared(layout.kind),
            shape,
        )
    }

    /// The artifact this declaration is emitted into. Packages only import
    /// packages declared before them: StructGenerated, then
    /// APITypeDefGenerated, then UnionGenerated, so every declaration lands
    /// in the first package that can see all the types it mentions.
    pub fn artifact(&self) -> ArtifactKind {
        match self.origin {
            TypeOrigin::Declared(_)
            | TypeOrigin::Metadata
            | TypeOrigin::Request => ArtifactKind::Struct,
            TypeOrigin::States(kind) | TypeOrigin::Interface(kind) => kind,
            TypeOrigin::ActionParams | TypeOrigin::TableKey => ArtifactKind::ApiTypeDef,
            TypeOrigin::TableActions | TypeOrigin::TableResponse => {
                ArtifactKind::Union
            }
        }
    }

    pub fn emit(&self, b: &mut CodeBuilder) {
        match &self.shape {
            TypeShape::Struct(members) => {
                b.append_line("typedef struct {");
                b.increase_indent();
                if members.is_empty() {
                    b.append_line("Bit#(0) unused;");
                }
                for (ty, name) in members {
                    b.append_fmt(format_args!("{} {};", ty, name));
                }
                b.decrease_indent();
                b.append_fmt(format_args!(
                    "}} {} deriving (Bits, Eq, FShow);",
                    self.name
                ));
            }
            TypeShape::Union(members) => {
                b.append_line("typedef union tagged {");
                b.increase_indent();
                for (ty, tag) in members {
                    b.append_fmt(format_args!("{} {};", ty, tag));
                }
                b.decrease_indent();
                b.append_fmt(format_args!(
                    "}} {} deriving (Bits, Eq, FShow);",
                    self.name
                ));
            }
            TypeShape::Enum(tags) => {
                b.append_fmt(format_args!(
                    "typedef enum {{ {} }} {} deriving (Bits, Eq, FShow);",
                    tags.join(", "),
                    self.name
                ));
            }
            TypeShape::Interface(methods) => {
                b.block(&format!("interface {};", self.name), "endinterface", |b| {
                    for method in methods {
                        b.append_fmt(format_args!("{};", method));
                    }
                });
            }
        }
        b.newline();
    }
}

/// Type declarations keyed by BSV name. Two declarations may never share a
/// name, whatever artifact they end up in.
#[derive(Clone, Debug, Default)]
pub struct TypeDeclSet {
    decls: LinkedHashMap<String, BsvTypeDecl>,
}

impl TypeDeclSet {
    pub fn insert(&mut self, decl: BsvTypeDecl) -> FpgaResult<()> {
        if let Some(prev) = self.decls.get(&decl.name) {
            return Err(Error::already_bound(
                Id::from(decl.name.as_str()),
                "type",
            )
            .with_post_msg(Some(format!(
                "generated for {:?} and {:?}",
                prev.origin, decl.origin
            ))));
        }
        self.decls.insert(decl.name.clone(), decl);
        Ok(())
    }

    /// Add the BSV translation of every declared type reachable from
    /// `roots`, dependencies first. Unreachable declarations are dropped.
    pub fn insert_declared(
        &mut self,
        roots: impl IntoIterator<Item = Id>,
        type_map: &TypeMap,
        tf: &TypeFactory,
    ) -> FpgaResult<()> {
        let live = reachable(roots, type_map);
        for layout in tf.layouts() {
            if live.contains(&layout.name) {
                self.insert(BsvTypeDecl::declared(layout, tf))?;
            } else {
                log::debug!("Eliminating unused type `{}`", layout.name);
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&BsvTypeDecl> {
        self.decls.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.decls.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BsvTypeDecl> {
        self.decls.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.decls.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Write every declaration into the builder of its artifact.
    pub fn emit(&self, bsv: &mut BsvProgram) {
        for decl in self.iter() {
            decl.emit(bsv.builder(decl.artifact()));
        }
    }
}

/// Names of declared types transitively used by `roots`.
fn reachable(roots: impl IntoIterator<Item = Id>, type_map: &TypeMap) -> HashSet<Id> {
    let mut live = HashSet::new();
    let mut work = roots.into_iter().collect::<Vec<_>>();
    while let Some(name) = work.pop() {
        if !live.insert(name) {
            continue;
        }
        if let Some(decl) = type_map.get(name) {
            work.extend(decl.fields.iter().filter_map(|f| match &f.ty {
                Type::Named { name } => Some(*name),
                _ => None,
            }));
        }
    }
    live
}
