//! The deparser automaton: one state per emitted header.
use super::parser::ParserModel;
use super::scope::{Context, Scope};
use super::types::{BsvTypeDecl, TypeOrigin, TypeShape};
use crate::bsv::{ArtifactKind, CodeBuilder, camel_case};
use p4fpga_ir::{DeparserDecl, Path};
use p4fpga_utils::{Error, FpgaResult, Id};

/// Name of the BSV enum of deparser states.
pub const DEPARSER_STATE_TYPE: &str = "DeparserState";

/// Name of the deparser module's interface.
pub const DEPARSER_INTERFACE: &str = "Deparser";

const IDLE: &str = "StateDeparseIdle";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeparseState {
    pub path: Path,
    pub header: Id,
    pub member: String,
    pub width: u64,
    /// Enum tag of the state.
    pub tag: String,
}

#[derive(Clone, Debug)]
pub struct DeparserModel {
    pub name: Option<Id>,
    pub states: Vec<DeparseState>,
}

impl DeparserModel {
    /// Use the declared emit order if there is a deparser, and the order in
    /// which the parser first extracts headers otherwise.
    pub fn build(
        decl: Option<&DeparserDecl>,
        parser: &ParserModel,
        ctx: Context<'_>,
    ) -> FpgaResult<Self> {
        let Some(decl) = decl else {
            let states = parser
                .extraction_order()
                .into_iter()
                .map(|e| DeparseState {
                    tag: Self::tag(&e.path),
                    path: e.path.clone(),
                    header: e.header,
                    member: e.member.clone(),
                    width: e.width,
                })
                .collect();
            return Ok(DeparserModel { name: None, states });
        };

        let extracted = parser.extraction_order();
        let scope = Scope::block(ctx, decl.name);
        let mut states: Vec<DeparseState> = Vec::with_capacity(decl.emits.len());
        for path in &decl.emits {
            let (field, header) = scope.resolve_header(path)?;
            let member = field.member.unwrap_or_default();
            if states.iter().any(|s| s.member == member) {
                return Err(Error::malformed_structure(format!(
                    "deparser `{}` emits `{}` twice",
                    decl.name, path
                )));
            }
            if !extracted.iter().any(|e| e.member == member) {
                log::warn!(
                    "Deparser `{}` emits `{}`, which the parser never extracts",
                    decl.name,
                    path
                );
            }
            states.push(DeparseState {
                tag: Self::tag(path),
                path: path.clone(),
                header,
                member,
                width: ctx.type_factory.width(&field.ty),
            });
        }
        Ok(DeparserModel {
            name: Some(decl.name),
            states,
        })
    }

    fn tag(path: &Path) -> String {
        format!("StateDeparse{}", camel_case(&path.join("_")))
    }

    pub fn type_roots(&self) -> impl Iterator<Item = Id> + '_ {
        self.states.iter().map(|s| s.header)
    }

    /// The state enum and the interface of the deparser module.
    pub fn type_decls(&self, meta_type: &str) -> Vec<BsvTypeDecl> {
        let tags = std::iter::once(IDLE.to_string())
            .chain(self.states.iter().map(|s| s.tag.clone()))
            .collect();
        vec![
            BsvTypeDecl::new(
                DEPARSER_STATE_TYPE.to_string(),
                TypeOrigin::States(ArtifactKind::Deparser),
                TypeShape::Enum(tags),
            ),
            BsvTypeDecl::new(
                DEPARSER_INTERFACE.to_string(),
                TypeOrigin::Interface(ArtifactKind::Deparser),
                TypeShape::Interface(vec![
                    format!("interface Put#({}) metaIn", meta_type),
                    format!("interface Get#(Bit#({})) dataOut", self.word_width()),
                ]),
            ),
        ]
    }

    fn word_width(&self) -> u64 {
        self.states.iter().map(|s| s.width).max().unwrap_or(0).max(8)
    }

    pub fn emit(&self, b: &mut CodeBuilder, meta_type: &str) {
        let word = self.word_width();
        let open = format!("module mk{0}({0});", DEPARSER_INTERFACE);
        b.block(&open, "endmodule", |b| {
            b.append_fmt(format_args!(
                "Reg#({}) deparse_state <- mkReg({});",
                DEPARSER_STATE_TYPE, IDLE
            ));
            b.append_fmt(format_args!("FIFOF#({}) meta_in_ff <- mkFIFOF;", meta_type));
            b.append_fmt(format_args!("FIFOF#(Bit#({})) data_out_ff <- mkFIFOF;", word));
            b.newline();
            b.block(
                &format!("rule rl_deparse_idle (deparse_state == {} && meta_in_ff.notEmpty);", IDLE),
                "endrule",
                |b| match self.states.first() {
                    Some(first) => b.append_fmt(format_args!("deparse_state <= {};", first.tag)),
                    None => b.append_line("meta_in_ff.deq;"),
                },
            );
            for (i, state) in self.states.iter().enumerate() {
                b.newline();
                b.block(
                    &format!(
                        "rule rl_deparse_{} (deparse_state == {});",
                        state.path.join("_"),
                        state.tag
                    ),
                    "endrule",
                    |b| {
                        b.append_fmt(format_args!(
                            "if (meta_in_ff.first.{} matches tagged Valid .h)",
                            state.member
                        ));
                        b.append_line("    data_out_ff.enq(zeroExtend(pack(h)));");
                        match self.states.get(i + 1) {
                            Some(next) => {
                                b.append_fmt(format_args!("deparse_state <= {};", next.tag))
                            }
                            None => {
                                b.append_line("meta_in_ff.deq;");
                                b.append_fmt(format_args!("deparse_state <= {};", IDLE));
                            }
                        }
                    },
                );
            }
            b.newline();
            b.append_line("interface metaIn = toPut(meta_in_ff);");
            b.append_line("interface dataOut = toGet(data_out_ff);");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{Fixture, ROUTER};
    use super::*;

    #[test]
    fn declared_emit_order_wins() {
        let fx = Fixture::new(ROUTER);
        let main = fx.top.get_main().unwrap();
        let parser =
            ParserModel::build(fx.top.program.parser(main.parser).unwrap(), fx.ctx()).unwrap();
        let decl = fx.top.program.deparser(Id::from("DeparserImpl"));
        let model = DeparserModel::build(decl, &parser, fx.ctx()).unwrap();
        let tags = model.states.iter().map(|s| s.tag.as_str()).collect::<Vec<_>>();
        assert_eq!(tags, vec!["StateDeparseHdrEthernet", "StateDeparseHdrIpv4"]);

        let mut b = CodeBuilder::new(ArtifactKind::Deparser);
        model.emit(&mut b, "PipelineMetadata");
        assert!(b.serialize().contains(
            "if (meta_in_ff.first.headers_t$ipv4 matches tagged Valid .h)"
        ));
    }

    #[test]
    fn falls_back_to_parser_order() {
        let fx = Fixture::new(ROUTER);
        let main = fx.top.get_main().unwrap();
        let parser =
            ParserModel::build(fx.top.program.parser(main.parser).unwrap(), fx.ctx()).unwrap();
        let model = DeparserModel::build(None, &parser, fx.ctx()).unwrap();
        assert_eq!(model.name, None);
        assert_eq!(model.states.len(), 2);
        assert_eq!(model.states[0].member, "headers_t$ethernet");
    }
}
