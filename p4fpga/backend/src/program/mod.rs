//! The hardware-oriented program model.
//!
//! [FpgaProgram::build] checks the elaborated program and lowers it into a
//! parser automaton, a deparser automaton, a pipeline of controls and the
//! set of type declarations they use. [FpgaProgram::emit] then walks that
//! model once and fills every artifact, so all artifacts agree on names.
mod control;
mod deparser;
mod metadata;
mod parser;
mod scope;
mod types;

pub use control::{
    ActionModel, ControlModel, DEFAULT_TABLE_SIZE, FlowNode, KeyField, TableModel,
};
pub use deparser::{DeparseState, DeparserModel};
pub use metadata::{METADATA_TYPE, MetadataLayout, MetadataMember};
pub use parser::{Extract, NextState, ParseState, ParseTransition, ParserModel};
pub use scope::Context;
pub use types::{BsvTypeDecl, TypeDeclSet, TypeOrigin, TypeShape};

use crate::bsv::{ArtifactKind, BsvProgram, CodeBuilder, CppProgram, camel_case};
use crate::type_factory::TypeFactory;
use itertools::Itertools;
use p4fpga_ir::{MainBlock, Program, ReferenceMap, TypeMap};
use p4fpga_utils::{Error, FpgaResult, math::bytes_for};
use std::iter;

#[derive(Clone, Debug)]
pub struct FpgaProgram {
    /// Name of the control plane interface.
    api: String,
    metadata: MetadataLayout,
    parser: ParserModel,
    deparser: DeparserModel,
    pipeline: Vec<ControlModel>,
    types: TypeDeclSet,
}

impl FpgaProgram {
    pub fn build(
        program: &Program,
        main: &MainBlock,
        ref_map: &ReferenceMap,
        type_map: &TypeMap,
        type_factory: &TypeFactory,
    ) -> FpgaResult<Self> {
        let ctx = Context {
            ref_map,
            type_map,
            type_factory,
        };
        let parser_decl = program
            .parser(main.parser)
            .ok_or_else(|| Error::undefined(main.parser, "parser"))?;
        let deparser_decl = main
            .deparser
            .map(|name| {
                program
                    .deparser(name)
                    .ok_or_else(|| Error::undefined(name, "deparser"))
            })
            .transpose()?;
        let control_decls = main
            .pipeline
            .iter()
            .map(|name| {
                program
                    .control(*name)
                    .ok_or_else(|| Error::undefined(*name, "control"))
            })
            .collect::<FpgaResult<Vec<_>>>()?;

        let params = iter::once(parser_decl.params.as_slice())
            .chain(control_decls.iter().map(|c| c.params.as_slice()))
            .chain(deparser_decl.iter().map(|d| d.params.as_slice()));
        let metadata = MetadataLayout::build(params, ctx)?;
        let parser = ParserModel::build(parser_decl, ctx)?;
        let deparser = DeparserModel::build(deparser_decl, &parser, ctx)?;
        let pipeline = control_decls
            .iter()
            .map(|decl| ControlModel::build(decl, ctx))
            .collect::<FpgaResult<Vec<_>>>()?;
        let api = format!("{}API", camel_case(main.package.as_str()));

        let mut types = TypeDeclSet::default();
        let roots = metadata
            .type_roots()
            .chain(parser.type_roots())
            .chain(deparser.type_roots())
            .chain(pipeline.iter().flat_map(|c| c.type_roots()))
            .collect::<Vec<_>>();
        types.insert_declared(roots, type_map, type_factory)?;
        for decl in metadata.type_decls(ctx) {
            types.insert(decl)?;
        }
        for decl in parser.type_decls(METADATA_TYPE) {
            types.insert(decl)?;
        }
        for decl in deparser.type_decls(METADATA_TYPE) {
            types.insert(decl)?;
        }
        for control in &pipeline {
            for decl in control.type_decls() {
                types.insert(decl)?;
            }
        }
        let methods = pipeline
            .iter()
            .flat_map(|c| c.tables())
            .flat_map(|t| t.api_methods())
            .map(|(_, proto)| proto)
            .collect();
        types.insert(BsvTypeDecl::new(
            api.clone(),
            TypeOrigin::Interface(ArtifactKind::ApiDecl),
            TypeShape::Interface(methods),
        ))?;

        log::info!(
            "Built program model: {} parser states, {} deparser states, {} controls, {} tables, {} types",
            parser.states().count(),
            deparser.states.len(),
            pipeline.len(),
            pipeline.iter().map(|c| c.tables().len()).sum::<usize>(),
            types.len()
        );
        Ok(FpgaProgram {
            api,
            metadata,
            parser,
            deparser,
            pipeline,
            types,
        })
    }

    pub fn types(&self) -> &TypeDeclSet {
        &self.types
    }

    pub fn parser(&self) -> &ParserModel {
        &self.parser
    }

    pub fn deparser(&self) -> &DeparserModel {
        &self.deparser
    }

    pub fn pipeline(&self) -> &[ControlModel] {
        &self.pipeline
    }

    pub fn metadata(&self) -> &MetadataLayout {
        &self.metadata
    }

    pub fn api_name(&self) -> &str {
        &self.api
    }

    /// Every table of the pipeline, in pipeline order.
    pub fn tables(&self) -> impl Iterator<Item = &TableModel> {
        self.pipeline.iter().flat_map(|c| c.tables())
    }

    /// `name`, which must be declared by the model.
    fn declared<'a>(&self, name: &'a str) -> &'a str {
        assert!(
            self.types.contains(name),
            "`{}` is emitted but not declared by the program model",
            name
        );
        name
    }

    /// Fill every artifact from the model.
    pub fn emit(&self, bsv: &mut BsvProgram, cpp: &mut CppProgram) {
        self.types.emit(bsv);

        let meta = self.declared(METADATA_TYPE);
        let b = bsv.struct_builder();
        b.block(
            &format!("instance DefaultValue#({});", meta),
            "endinstance",
            |b| b.append_line("defaultValue = unpack(0);"),
        );

        self.parser.emit(bsv.parser_builder(), meta);
        self.deparser.emit(bsv.deparser_builder(), meta);
        for control in &self.pipeline {
            self.declared(&control.module);
            control.emit(bsv.control_builder(), meta);
        }
        self.emit_api_def(bsv.api_def_builder());
        self.emit_simulation(cpp.sim_builder());
    }

    fn emit_api_def(&self, b: &mut CodeBuilder) {
        let api = self.declared(&self.api);
        let args = self
            .pipeline
            .iter()
            .map(|c| format!("{} {}", self.declared(&c.module), c.instance()))
            .join(", ");
        let open = if args.is_empty() {
            format!("module mk{0}({0});", api)
        } else {
            format!("module mk{0}#({1})({0});", api, args)
        };
        b.block(&open, "endmodule", |b| {
            for control in &self.pipeline {
                for table in control.tables() {
                    for (name, _) in table.api_methods() {
                        b.append_fmt(format_args!(
                            "method {0} = {1}.{0};",
                            name,
                            control.instance()
                        ));
                    }
                }
            }
        });
    }

    /// The software model of every match table: entries keyed by the packed
    /// key bytes, holding the packed response bytes.
    fn emit_simulation(&self, b: &mut CodeBuilder) {
        b.append_line("typedef std::map<std::vector<uint8_t>, std::vector<uint8_t>> MatchTable;");
        b.newline();
        b.block(
            "extern \"C\" unsigned matchtable_model_tables() {",
            "}",
            |b| b.append_fmt(format_args!("return {};", self.tables().count())),
        );
        for table in self.tables() {
            let key_bytes = bytes_for(table.key_struct_width());
            let rsp_bytes = bytes_for(table.action_width);
            b.newline();
            b.append_fmt(format_args!(
                "// {}.{}: {} key bytes, {} response bytes, {} entries",
                table.control, table.name, key_bytes, rsp_bytes, table.size
            ));
            b.append_fmt(format_args!("static MatchTable {}_entries;", table.name));
            b.newline();
            b.block(
                &format!(
                    "extern \"C\" bool matchtable_read_{}(const uint8_t *key, uint8_t *data) {{",
                    table.name
                ),
                "}",
                |b| {
                    b.append_fmt(format_args!(
                        "auto it = {0}_entries.find(std::vector<uint8_t>(key, key + {1}));",
                        table.name, key_bytes
                    ));
                    b.append_fmt(format_args!(
                        "if (it == {}_entries.end())",
                        table.name
                    ));
                    b.append_line("    return false;");
                    b.append_line("std::memcpy(data, it->second.data(), it->second.size());");
                    b.append_line("return true;");
                },
            );
            b.newline();
            b.block(
                &format!(
                    "extern \"C\" void matchtable_write_{}(const uint8_t *key, const uint8_t *data) {{",
                    table.name
                ),
                "}",
                |b| {
                    b.append_fmt(format_args!(
                        "if ({}_entries.size() >= {})",
                        table.name, table.size
                    ));
                    b.append_line("    return;");
                    b.append_fmt(format_args!(
                        "{0}_entries[std::vector<uint8_t>(key, key + {1})] = std::vector<uint8_t>(data, data + {2});",
                        table.name, key_bytes, rsp_bytes
                    ));
                },
            );
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use p4fpga_ir::{ToplevelBlock, from_json::parse_toplevel};

    pub(crate) const ROUTER: &str = include_str!("../../tests/fixtures/router.json");

    /// An elaborated program together with its analysis results.
    pub(crate) struct Fixture {
        pub top: ToplevelBlock,
        pub ref_map: ReferenceMap,
        pub type_map: TypeMap,
        pub type_factory: TypeFactory,
    }

    impl Fixture {
        pub fn new(json: &str) -> Self {
            let top = parse_toplevel(json).unwrap();
            let ref_map = ReferenceMap::build(&top.program);
            let type_map = TypeMap::build(&top.program);
            let type_factory = TypeFactory::new(&type_map);
            Fixture {
                top,
                ref_map,
                type_map,
                type_factory,
            }
        }

        pub fn ctx(&self) -> Context<'_> {
            Context {
                ref_map: &self.ref_map,
                type_map: &self.type_map,
                type_factory: &self.type_factory,
            }
        }

        pub fn build(&self) -> FpgaResult<FpgaProgram> {
            let main = self.top.get_main().unwrap();
            FpgaProgram::build(
                &self.top.program,
                main,
                &self.ref_map,
                &self.type_map,
                &self.type_factory,
            )
        }
    }

    #[test]
    fn builds_router() {
        let fx = Fixture::new(ROUTER);
        let program = fx.build().unwrap();
        assert_eq!(program.api_name(), "V1SwitchAPI");
        assert_eq!(program.parser().states().count(), 3);
        assert_eq!(program.deparser().states.len(), 2);
        let tables = program.tables().map(|t| t.name.as_str()).collect::<Vec<_>>();
        assert_eq!(tables, vec!["ipv4_lpm", "forward", "send_frame"]);
        for name in [
            "EthernetT",
            "Ipv4T",
            "PipelineMetadata",
            "MetadataRequest",
            "Ipv4LpmReqT",
            "Ipv4LpmRspT",
            "Ipv4LpmActionT",
            "IngressSetNhopParamT",
            "EgressRewriteMacParamT",
            "ParserState",
            "DeparserState",
        ] {
            assert!(program.types().contains(name), "missing {}", name);
        }
        // flattened into the metadata record
        assert!(!program.types().contains("HeadersT"));
        assert!(!program.types().contains("MetadataT"));
        assert!(!program.types().contains("VlanTagT"));
    }

    #[test]
    fn emits_consistent_names() {
        let fx = Fixture::new(ROUTER);
        let program = fx.build().unwrap();
        let mut bsv = BsvProgram::new();
        let mut cpp = CppProgram::new();
        program.emit(&mut bsv, &mut cpp);
        for decl in program.types().iter() {
            let kind = decl.artifact();
            let text = bsv
                .builders()
                .find(|b| b.kind() == kind)
                .map(|b| b.serialize())
                .unwrap();
            assert!(text.contains(&decl.name), "{} lacks `{}`", kind, decl.name);
        }
        let api = bsv.api_def_builder().serialize();
        assert!(api.contains(
            "module mkV1SwitchAPI#(Ingress ingress, Egress egress)(V1SwitchAPI);"
        ));
        assert!(api.contains("method send_frame_set_default = egress.send_frame_set_default;"));
        let sim = cpp.sim_builder().serialize();
        assert!(sim.contains("extern \"C\" bool matchtable_read_ipv4_lpm("));
        assert!(sim.contains("extern \"C\" void matchtable_write_forward("));
    }

    #[test]
    fn conflicting_struct_names_fail() {
        // `metadata_t` becomes `pipeline_metadata`, spelled `PipelineMetadata`
        let json = ROUTER.replace("metadata_t", "pipeline_metadata");
        let fx = Fixture::new(&json);
        let err = fx.build().unwrap_err();
        assert!(err.to_string().contains("PipelineMetadata"), "{}", err);
    }
}
