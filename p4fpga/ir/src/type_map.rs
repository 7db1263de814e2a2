use crate::{Program, Type, TypeDecl};
use itertools::Itertools;
use linked_hash_map::LinkedHashMap;
use p4fpga_utils::{Error, FpgaResult, Id};
use std::collections::HashSet;

/// The declared type universe of a program, in declaration order.
#[derive(Clone, Debug, Default)]
pub struct TypeMap {
    decls: LinkedHashMap<Id, TypeDecl>,
}

impl TypeMap {
    pub fn build(program: &Program) -> Self {
        let mut decls = LinkedHashMap::new();
        for decl in &program.types {
            if decls.insert(decl.name, decl.clone()).is_some() {
                log::warn!("type `{}` declared twice, keeping the last", decl.name);
            }
        }
        TypeMap { decls }
    }

    /// Check that the universe is closed (every named field type is
    /// declared) and that no type contains itself.
    pub fn validate(&self) -> FpgaResult<()> {
        let mut done = HashSet::new();
        for name in self.decls.keys() {
            self.validate_decl(*name, &mut Vec::new(), &mut done)?;
        }
        Ok(())
    }

    fn validate_decl(
        &self,
        name: Id,
        stack: &mut Vec<Id>,
        done: &mut HashSet<Id>,
    ) -> FpgaResult<()> {
        if done.contains(&name) {
            return Ok(());
        }
        if stack.contains(&name) {
            return Err(Error::malformed_structure(format!(
                "Type `{}` contains itself: {}",
                name,
                stack.iter().chain([&name]).join(" -> ")
            )));
        }
        let Some(decl) = self.get(name) else {
            return Err(Error::undefined(name, "type").with_post_msg(
                stack
                    .last()
                    .map(|user| format!("referenced by type `{}`", user)),
            ));
        };
        stack.push(name);
        for field in &decl.fields {
            if let Some(inner) = field.ty.decl_name() {
                self.validate_decl(inner, stack, done)?;
            }
        }
        stack.pop();
        done.insert(name);
        Ok(())
    }

    pub fn get(&self, name: Id) -> Option<&TypeDecl> {
        self.decls.get(&name)
    }

    pub fn contains(&self, name: Id) -> bool {
        self.decls.contains_key(&name)
    }

    /// All declarations in declaration order.
    pub fn decls(&self) -> impl Iterator<Item = &TypeDecl> {
        self.decls.values()
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Walk `members` starting from a value of type `root`, returning the
    /// type of each step. `None` if some step selects a member that does
    /// not exist.
    pub fn lookup_steps<'a>(
        &'a self,
        root: &'a Type,
        members: &[Id],
    ) -> Option<Vec<&'a Type>> {
        let mut steps = Vec::with_capacity(members.len());
        let mut cur = root;
        for member in members {
            let decl = self.get(cur.decl_name()?)?;
            cur = &decl.field(*member)?.ty;
            steps.push(cur);
        }
        Some(steps)
    }

    /// Type of `root.members...`.
    pub fn lookup<'a>(
        &'a self,
        root: &'a Type,
        members: &[Id],
    ) -> Option<&'a Type> {
        let steps = self.lookup_steps(root, members)?;
        Some(steps.last().copied().unwrap_or(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DeclKind, Field};

    fn program() -> Program {
        Program {
            types: vec![
                TypeDecl {
                    name: Id::from("ethernet_t"),
                    kind: DeclKind::Header,
                    fields: vec![
                        Field::new("dstAddr", Type::bits(48)),
                        Field::new("etherType", Type::bits(16)),
                    ],
                },
                TypeDecl {
                    name: Id::from("headers_t"),
                    kind: DeclKind::Struct,
                    fields: vec![Field::new(
                        "ethernet",
                        Type::named("ethernet_t"),
                    )],
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn lookup_member_path() {
        let tm = TypeMap::build(&program());
        let root = Type::named("headers_t");
        let ty = tm.lookup(&root, &[Id::from("ethernet"), Id::from("etherType")]);
        assert_eq!(ty, Some(&Type::bits(16)));
        assert_eq!(tm.lookup(&root, &[]), Some(&root));
        assert_eq!(tm.lookup(&root, &[Id::from("ipv4")]), None);
        // Selecting a member of a bit string is not a path.
        assert_eq!(
            tm.lookup(&Type::bits(8), &[Id::from("ethernet")]),
            None
        );
    }

    #[test]
    fn validates_closed_universe() {
        assert!(TypeMap::build(&program()).validate().is_ok());

        let mut typo = program();
        typo.types[0]
            .fields
            .push(Field::new("vlan", Type::named("typo_t")));
        let err = TypeMap::build(&typo).validate().unwrap_err();
        assert!(err.to_string().contains("typo_t"));
        assert!(err.to_string().contains("ethernet_t"));
    }

    #[test]
    fn rejects_self_containing_types() {
        let mut cyclic = program();
        cyclic.types.push(TypeDecl {
            name: Id::from("s_t"),
            kind: DeclKind::Struct,
            fields: vec![Field::new("inner", Type::named("s_t"))],
        });
        let err = TypeMap::build(&cyclic).validate().unwrap_err();
        assert!(err.to_string().contains("`s_t` contains itself"));
    }
}
