//! Translation of declared P4 types into hardware layouts.
//!
//! The factory is built once per compilation run from the front end's
//! [TypeMap] and then shared by reference with every component that needs
//! bit widths, field offsets or BSV type names.
use crate::bsv::camel_case;
use linked_hash_map::LinkedHashMap;
use p4fpga_ir::{DeclKind, Type, TypeMap};
use p4fpga_utils::{Id, bits_needed_for};

/// Position of one member inside its enclosing layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldLayout {
    pub name: Id,
    pub ty: Type,
    pub width: u64,
    /// Offset of the least significant bit. The first declared field
    /// occupies the most significant bits, as on the wire.
    pub offset: u64,
}

/// Hardware layout of a declared type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    pub name: Id,
    /// Name of the corresponding BSV type.
    pub bsv_name: String,
    pub kind: DeclKind,
    /// Total width in bits, including the tag of a union.
    pub width: u64,
    /// Width of the discriminant for header unions, zero otherwise.
    pub tag_width: u64,
    pub fields: Vec<FieldLayout>,
}

impl Layout {
    pub fn field(&self, name: Id) -> Option<&FieldLayout> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Layouts for every declared type of a program.
#[derive(Debug, Default)]
pub struct TypeFactory {
    layouts: LinkedHashMap<Id, Layout>,
}

impl TypeFactory {
    pub fn new(type_map: &TypeMap) -> Self {
        let mut factory = TypeFactory::default();
        for decl in type_map.decls() {
            factory.ensure(decl.name, type_map, &mut Vec::new());
        }
        log::debug!("Type factory holds {} layouts", factory.layouts.len());
        factory
    }

    /// Compute the layout of `name` (and everything it contains) if it has
    /// not been computed yet. Returns its width.
    fn ensure(
        &mut self,
        name: Id,
        type_map: &TypeMap,
        stack: &mut Vec<Id>,
    ) -> u64 {
        if let Some(layout) = self.layouts.get(&name) {
            return layout.width;
        }
        if stack.contains(&name) {
            panic!("Type `{}` contains itself", name);
        }
        let decl = type_map
            .get(name)
            .unwrap_or_else(|| panic!("Type `{}` is not declared", name));

        stack.push(name);
        let widths = decl
            .fields
            .iter()
            .map(|f| match &f.ty {
                Type::Bits { width } | Type::Int { width } => *width,
                Type::Bool => 1,
                Type::Named { name } => self.ensure(*name, type_map, stack),
            })
            .collect::<Vec<_>>();
        stack.pop();

        let (width, tag_width, fields) = match decl.kind {
            DeclKind::HeaderUnion => {
                let tag_width = bits_needed_for(decl.fields.len() as u64);
                let widest = widths.iter().copied().max().unwrap_or(0);
                let fields = decl
                    .fields
                    .iter()
                    .zip(&widths)
                    .map(|(f, w)| FieldLayout {
                        name: f.name,
                        ty: f.ty.clone(),
                        width: *w,
                        offset: 0,
                    })
                    .collect();
                (tag_width + widest, tag_width, fields)
            }
            DeclKind::Header | DeclKind::Struct => {
                let total: u64 = widths.iter().sum();
                let mut consumed = 0;
                let fields = decl
                    .fields
                    .iter()
                    .zip(&widths)
                    .map(|(f, w)| {
                        consumed += w;
                        FieldLayout {
                            name: f.name,
                            ty: f.ty.clone(),
                            width: *w,
                            offset: total - consumed,
                        }
                    })
                    .collect();
                (total, 0, fields)
            }
        };

        self.layouts.insert(
            name,
            Layout {
                name,
                bsv_name: Self::bsv_name(name),
                kind: decl.kind,
                width,
                tag_width,
                fields,
            },
        );
        width
    }

    /// The layout of a declared type. Asking for a type that the type map
    /// does not declare is a bug in the caller.
    pub fn layout(&self, name: Id) -> &Layout {
        self.layouts
            .get(&name)
            .unwrap_or_else(|| panic!("No layout for undeclared type `{}`", name))
    }

    pub fn get(&self, name: Id) -> Option<&Layout> {
        self.layouts.get(&name)
    }

    /// Every layout, dependencies before their users.
    pub fn layouts(&self) -> impl Iterator<Item = &Layout> {
        self.layouts.values()
    }

    pub fn width(&self, ty: &Type) -> u64 {
        match ty {
            Type::Bits { width } | Type::Int { width } => *width,
            Type::Bool => 1,
            Type::Named { name } => self.layout(*name).width,
        }
    }

    /// The BSV spelling of `ty`.
    pub fn bsv_type(&self, ty: &Type) -> String {
        match ty {
            Type::Bits { width } => format!("Bit#({})", width),
            Type::Int { width } => format!("Int#({})", width),
            Type::Bool => "Bool".to_string(),
            Type::Named { name } => self.layout(*name).bsv_name.clone(),
        }
    }

    /// BSV type name for the P4 type `name`.
    pub fn bsv_name(name: Id) -> String {
        camel_case(name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p4fpga_ir::{Field, Program, TypeDecl};

    fn type_map() -> TypeMap {
        let program = Program {
            types: vec![
                TypeDecl {
                    name: Id::from("ethernet_t"),
                    kind: DeclKind::Header,
                    fields: vec![
                        Field::new("dstAddr", Type::bits(48)),
                        Field::new("srcAddr", Type::bits(48)),
                        Field::new("etherType", Type::bits(16)),
                    ],
                },
                TypeDecl {
                    name: Id::from("ip_u"),
                    kind: DeclKind::HeaderUnion,
                    fields: vec![
                        Field::new("v4", Type::named("ipv4_t")),
                        Field::new("v6", Type::named("ipv6_t")),
                        Field::new("other", Type::named("ethernet_t")),
                    ],
                },
                TypeDecl {
                    name: Id::from("ipv4_t"),
                    kind: DeclKind::Header,
                    fields: vec![Field::new("dstAddr", Type::bits(32))],
                },
                TypeDecl {
                    name: Id::from("ipv6_t"),
                    kind: DeclKind::Header,
                    fields: vec![
                        Field::new("dstAddr", Type::bits(128)),
                        Field::new("valid", Type::Bool),
                    ],
                },
            ],
            ..Default::default()
        };
        TypeMap::build(&program)
    }

    #[test]
    fn header_offsets_are_msb_first() {
        let tf = TypeFactory::new(&type_map());
        let eth = tf.layout(Id::from("ethernet_t"));
        assert_eq!(eth.width, 112);
        assert_eq!(eth.bsv_name, "EthernetT");
        let offsets = eth.fields.iter().map(|f| f.offset).collect::<Vec<_>>();
        assert_eq!(offsets, vec![64, 16, 0]);
    }

    #[test]
    fn union_has_tag_and_widest_member() {
        let tf = TypeFactory::new(&type_map());
        let u = tf.layout(Id::from("ip_u"));
        assert_eq!(u.tag_width, 2);
        assert_eq!(u.width, 2 + 129);
        assert!(u.fields.iter().all(|f| f.offset == 0));
        // Forward references are resolved before their users.
        let order = tf.layouts().map(|l| l.name.as_str()).collect::<Vec<_>>();
        let pos = |n| order.iter().position(|x| *x == n).unwrap();
        assert!(pos("ipv6_t") < pos("ip_u"));
    }

    #[test]
    fn bsv_spelling() {
        let tf = TypeFactory::new(&type_map());
        assert_eq!(tf.bsv_type(&Type::bits(9)), "Bit#(9)");
        assert_eq!(tf.bsv_type(&Type::Int { width: 32 }), "Int#(32)");
        assert_eq!(tf.bsv_type(&Type::named("ipv4_t")), "Ipv4T");
        assert_eq!(tf.width(&Type::Bool), 1);
    }

    #[test]
    #[should_panic(expected = "undeclared type `vlan_t`")]
    fn undeclared_type_is_a_bug() {
        let tf = TypeFactory::new(&type_map());
        tf.layout(Id::from("vlan_t"));
    }
}
