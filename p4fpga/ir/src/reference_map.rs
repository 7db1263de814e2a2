use crate::{DeclKind, Field, Program, Type};
use p4fpga_utils::Id;
use std::collections::HashMap;

/// What a name refers to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Declaration {
    Type(DeclKind),
    Parser,
    Control,
    Deparser,
    Table,
    Action,
    /// A block or action parameter of the given type.
    Param(Type),
}

/// Resolves names to declarations. Blocks (parsers, controls, deparsers) and
/// actions open their own scope; anything not found in a scope is looked up
/// among the global declarations.
#[derive(Clone, Debug, Default)]
pub struct ReferenceMap {
    globals: HashMap<Id, Declaration>,
    scopes: HashMap<Id, HashMap<Id, Declaration>>,
}

impl ReferenceMap {
    /// Name of the scope holding the parameters of `action` in `control`.
    pub fn action_scope(control: Id, action: Id) -> Id {
        Id::from(format!("{}.{}", control, action))
    }

    pub fn build(program: &Program) -> Self {
        let mut rm = ReferenceMap::default();
        for decl in &program.types {
            rm.bind_global(decl.name, Declaration::Type(decl.kind));
        }
        for parser in &program.parsers {
            rm.bind_global(parser.name, Declaration::Parser);
            rm.bind_params(parser.name, &parser.params);
        }
        for control in &program.controls {
            rm.bind_global(control.name, Declaration::Control);
            rm.bind_params(control.name, &control.params);
            for table in &control.tables {
                rm.bind(control.name, table.name, Declaration::Table);
            }
            for action in &control.actions {
                rm.bind(control.name, action.name, Declaration::Action);
                rm.bind_params(
                    Self::action_scope(control.name, action.name),
                    &action.params,
                );
            }
        }
        for deparser in &program.deparsers {
            rm.bind_global(deparser.name, Declaration::Deparser);
            rm.bind_params(deparser.name, &deparser.params);
        }
        rm
    }

    fn bind_global(&mut self, name: Id, decl: Declaration) {
        if self.globals.insert(name, decl).is_some() {
            log::warn!("`{}` declared twice at the top level", name);
        }
    }

    fn bind(&mut self, scope: Id, name: Id, decl: Declaration) {
        let prev = self.scopes.entry(scope).or_default().insert(name, decl);
        if prev.is_some() {
            log::warn!("`{}` declared twice in `{}`", name, scope);
        }
    }

    fn bind_params(&mut self, scope: Id, params: &[Field]) {
        // Make sure the scope exists even without parameters.
        self.scopes.entry(scope).or_default();
        for param in params {
            self.bind(scope, param.name, Declaration::Param(param.ty.clone()));
        }
    }

    /// Resolve `name` in `scopes` (innermost first), then globally.
    pub fn resolve(&self, scopes: &[Id], name: Id) -> Option<&Declaration> {
        scopes
            .iter()
            .find_map(|s| self.scopes.get(s).and_then(|decls| decls.get(&name)))
            .or_else(|| self.globals.get(&name))
    }

    /// Type of the parameter `name` visible from `scopes`.
    pub fn param_type(&self, scopes: &[Id], name: Id) -> Option<&Type> {
        match self.resolve(scopes, name)? {
            Declaration::Param(ty) => Some(ty),
            _ => None,
        }
    }

    pub fn has_scope(&self, scope: Id) -> bool {
        self.scopes.contains_key(&scope)
    }
}
