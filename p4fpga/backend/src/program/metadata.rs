//! The per-packet metadata record.
//!
//! Every block parameter of the pipeline is flattened into one BSV struct
//! that travels with the packet: parameters of struct type contribute one
//! member per field (named `<struct>$<field>`), everything else one member
//! named after the type or parameter. Header members are wrapped in
//! `Maybe` so their validity travels with them.
use super::scope::{Context, bsv_ident, struct_member_name};
use super::types::{BsvTypeDecl, TypeOrigin, TypeShape};
use linked_hash_map::LinkedHashMap;
use p4fpga_ir::{DeclKind, Field, Type};
use p4fpga_utils::{Error, FpgaResult, Id};

/// Name of the BSV metadata struct.
pub const METADATA_TYPE: &str = "PipelineMetadata";
/// Name of the BSV struct sent to a pipeline stage.
pub const REQUEST_TYPE: &str = "MetadataRequest";
/// Name of the BSV struct returned by a pipeline stage.
pub const RESPONSE_TYPE: &str = "MetadataResponse";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataMember {
    pub name: String,
    pub ty: Type,
    pub header: bool,
}

#[derive(Clone, Debug, Default)]
pub struct MetadataLayout {
    members: LinkedHashMap<String, MetadataMember>,
}

impl MetadataLayout {
    /// Collect the members for the given block parameter lists.
    pub fn build<'a>(
        params: impl IntoIterator<Item = &'a [Field]>,
        ctx: Context<'_>,
    ) -> FpgaResult<Self> {
        let mut layout = MetadataLayout::default();
        for param in params.into_iter().flatten() {
            ctx.check_type(&param.ty)?;
            match ctx.decl_kind(&param.ty) {
                Some(DeclKind::Struct) => {
                    let Some(name) = param.ty.decl_name() else {
                        continue;
                    };
                    let decl = ctx
                        .type_map
                        .get(name)
                        .ok_or_else(|| Error::undefined(name, "type"))?;
                    for field in &decl.fields {
                        layout.add(
                            struct_member_name(name, field.name),
                            &field.ty,
                            ctx,
                        )?;
                    }
                }
                Some(_) => {
                    let name = param.ty.decl_name().unwrap_or_default();
                    layout.add(bsv_ident(name.as_str()), &param.ty, ctx)?;
                }
                None => layout.add(bsv_ident(param.name.as_str()), &param.ty, ctx)?,
            }
        }
        layout.add("dropped".to_string(), &Type::Bool, ctx)?;
        Ok(layout)
    }

    fn add(&mut self, name: String, ty: &Type, ctx: Context<'_>) -> FpgaResult<()> {
        if let Some(prev) = self.members.get(&name) {
            if &prev.ty != ty {
                return Err(Error::malformed_structure(format!(
                    "metadata member `{}` is bound to both `{}` and `{}`",
                    name, prev.ty, ty
                )));
            }
            return Ok(());
        }
        let member = MetadataMember {
            name: name.clone(),
            ty: ty.clone(),
            header: ctx.is_header(ty),
        };
        self.members.insert(name, member);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&MetadataMember> {
        self.members.get(name)
    }

    pub fn members(&self) -> impl Iterator<Item = &MetadataMember> {
        self.members.values()
    }

    /// Declared types the record refers to.
    pub fn type_roots(&self) -> impl Iterator<Item = Id> + '_ {
        self.members().filter_map(|m| m.ty.decl_name())
    }

    /// Declarations of the metadata record and the stage request/response
    /// pair.
    pub fn type_decls(&self, ctx: Context<'_>) -> Vec<BsvTypeDecl> {
        let members = self
            .members()
            .map(|m| {
                let ty = ctx.type_factory.bsv_type(&m.ty);
                let ty = if m.header { format!("Maybe#({})", ty) } else { ty };
                (ty, m.name.clone())
            })
            .collect();
        let carrier = || {
            TypeShape::Struct(vec![
                ("PacketInstance".to_string(), "pkt".to_string()),
                (METADATA_TYPE.to_string(), "meta".to_string()),
            ])
        };
        vec![
            BsvTypeDecl::new(
                METADATA_TYPE.to_string(),
                TypeOrigin::Metadata,
                TypeShape::Struct(members),
            ),
            BsvTypeDecl::new(REQUEST_TYPE.to_string(), TypeOrigin::Request, carrier()),
            BsvTypeDecl::new(
                RESPONSE_TYPE.to_string(),
                TypeOrigin::Request,
                carrier(),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_factory::TypeFactory;
    use p4fpga_ir::{Program, ReferenceMap, TypeDecl, TypeMap};
    use p4fpga_utils::ErrorKind;

    #[test]
    fn flattens_struct_parameters() {
        let program = Program {
            types: vec![
                TypeDecl {
                    name: Id::from("ethernet_t"),
                    kind: DeclKind::Header,
                    fields: vec![Field::new("etherType", Type::bits(16))],
                },
                TypeDecl {
                    name: Id::from("headers_t"),
                    kind: DeclKind::Struct,
                    fields: vec![Field::new("ethernet", Type::named("ethernet_t"))],
                },
            ],
            ..Program::default()
        };
        let tm = TypeMap::build(&program);
        let rm = ReferenceMap::build(&program);
        let tf = TypeFactory::new(&tm);
        let ctx = Context {
            ref_map: &rm,
            type_map: &tm,
            type_factory: &tf,
        };
        let parser_params = vec![Field::new("hdr", Type::named("headers_t"))];
        let control_params = vec![
            Field::new("headers", Type::named("headers_t")),
            Field::new("port", Type::bits(9)),
        ];
        let layout = MetadataLayout::build(
            [parser_params.as_slice(), control_params.as_slice()],
            ctx,
        )
        .unwrap();
        let names = layout.members().map(|m| m.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["headers_t$ethernet", "port", "dropped"]);
        assert!(layout.get("headers_t$ethernet").unwrap().header);

        let decls = layout.type_decls(ctx);
        assert_eq!(decls[0].name, METADATA_TYPE);
        let TypeShape::Struct(members) = &decls[0].shape else {
            panic!("metadata is a struct");
        };
        assert_eq!(members[0].0, "Maybe#(EthernetT)");

        let unknown = vec![Field::new("hdr", Type::named("missing_t"))];
        let err = MetadataLayout::build([unknown.as_slice()], ctx).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::Undefined { name, .. } if *name == "missing_t"
        ));
    }
}
