//! The parser automaton.
use super::scope::{Context, Scope, bsv_ident};
use super::types::{BsvTypeDecl, TypeOrigin, TypeShape};
use crate::bsv::{ArtifactKind, CodeBuilder, camel_case};
use linked_hash_map::LinkedHashMap;
use p4fpga_ir::{ACCEPT, ParserDecl, Path, REJECT, START, Transition, Type};
use p4fpga_utils::{Error, FpgaResult, Id};
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::{Bfs, Reversed};
use std::collections::{HashSet, VecDeque};

/// Name of the BSV enum of parser states.
pub const PARSER_STATE_TYPE: &str = "ParserState";

/// Name of the parser module's interface.
pub const PARSER_INTERFACE: &str = "Parser";

/// Width of the parser's input word when no state extracts anything.
const MIN_WORD_WIDTH: u64 = 8;

/// Where a transition leads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NextState {
    State(Id),
    Accept,
    Reject,
}

impl NextState {
    fn from_name(name: Id) -> Self {
        if name == ACCEPT {
            NextState::Accept
        } else if name == REJECT {
            NextState::Reject
        } else {
            NextState::State(name)
        }
    }

    /// The enum tag of the state.
    pub fn tag(&self) -> String {
        match self {
            NextState::State(name) => state_tag(*name),
            NextState::Accept => state_tag(Id::from(ACCEPT)),
            NextState::Reject => state_tag(Id::from(REJECT)),
        }
    }
}

fn state_tag(name: Id) -> String {
    format!("State{}", camel_case(name.as_str()))
}

/// One header extracted on entry to a state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Extract {
    pub path: Path,
    /// P4 type of the header.
    pub header: Id,
    pub bsv_type: String,
    /// Local variable holding the header inside the state's rule.
    pub var: String,
    /// Metadata member the header is stored in.
    pub member: String,
    pub width: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectKey {
    pub path: Path,
    /// BSV expression for the key inside the state's rule.
    pub access: String,
    pub width: u64,
}

/// A select arm. `value: None` is the default arm.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseTransition {
    pub value: Option<u64>,
    pub mask: Option<u64>,
    pub next: NextState,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseState {
    pub name: Id,
    pub extracts: Vec<Extract>,
    pub keys: Vec<SelectKey>,
    pub key_width: u64,
    /// Arms in priority order; the last one is always a default.
    pub transitions: Vec<ParseTransition>,
}

impl ParseState {
    pub fn extract_width(&self) -> u64 {
        self.extracts.iter().map(|e| e.width).sum()
    }
}

#[derive(Clone, Debug)]
pub struct ParserModel {
    pub name: Id,
    states: LinkedHashMap<Id, ParseState>,
}

impl ParserModel {
    pub fn build(decl: &ParserDecl, ctx: Context<'_>) -> FpgaResult<Self> {
        let mut declared = HashSet::new();
        for state in &decl.states {
            if state.name == ACCEPT || state.name == REJECT {
                return Err(Error::malformed_structure(format!(
                    "parser `{}` redeclares the built-in state `{}`",
                    decl.name, state.name
                )));
            }
            if !declared.insert(state.name) {
                return Err(Error::already_bound(state.name, "parser state")
                    .with_post_msg(Some(format!("in parser `{}`", decl.name))));
            }
        }
        let start = Id::from(START);
        if !declared.contains(&start) {
            return Err(Error::undefined(start, "parser state")
                .with_post_msg(Some(format!("in parser `{}`", decl.name))));
        }

        let mut graph = DiGraphMap::<Id, ()>::new();
        let accept = graph.add_node(Id::from(ACCEPT));
        let reject = graph.add_node(Id::from(REJECT));
        for state in &decl.states {
            graph.add_node(state.name);
            for target in state.transition.targets() {
                if !declared.contains(&target) && target != accept && target != reject {
                    return Err(Error::undefined(target, "parser state")
                        .with_post_msg(Some(format!(
                            "target of `{}` in parser `{}`",
                            state.name, decl.name
                        ))));
                }
                graph.add_edge(state.name, target, ());
            }
            if matches!(&state.transition, Transition::Select { cases, .. } if !cases.iter().any(|c| c.is_default()))
            {
                graph.add_edge(state.name, reject, ());
            }
        }

        let mut reachable = HashSet::new();
        let mut bfs = Bfs::new(&graph, start);
        while let Some(node) = bfs.next(&graph) {
            reachable.insert(node);
        }
        let mut terminating = HashSet::new();
        for terminal in [accept, reject] {
            let reversed = Reversed(&graph);
            let mut bfs = Bfs::new(reversed, terminal);
            while let Some(node) = bfs.next(reversed) {
                terminating.insert(node);
            }
        }

        let scope = Scope::block(ctx, decl.name);
        let mut states = LinkedHashMap::new();
        for state in &decl.states {
            if !reachable.contains(&state.name) {
                log::warn!(
                    "Dropping state `{}` of parser `{}`: unreachable from `{}`",
                    state.name,
                    decl.name,
                    START
                );
                continue;
            }
            if !terminating.contains(&state.name) {
                return Err(Error::malformed_structure(format!(
                    "state `{}` of parser `{}` can never reach `{}` or `{}`",
                    state.name, decl.name, ACCEPT, REJECT
                )));
            }
            states.insert(state.name, Self::build_state(state, &scope, ctx)?);
        }

        log::debug!("Parser `{}` has {} states", decl.name, states.len());
        Ok(ParserModel {
            name: decl.name,
            states,
        })
    }

    fn build_state(
        state: &p4fpga_ir::ParserState,
        scope: &Scope<'_>,
        ctx: Context<'_>,
    ) -> FpgaResult<ParseState> {
        let extracts = state
            .extracts
            .iter()
            .map(|path| {
                let (field, header) = scope.resolve_header(path)?;
                Ok(Extract {
                    path: path.clone(),
                    header,
                    bsv_type: ctx.type_factory.bsv_type(&field.ty),
                    var: bsv_ident(&path.join("_")),
                    member: field.member.unwrap_or_default(),
                    width: ctx.type_factory.width(&field.ty),
                })
            })
            .collect::<FpgaResult<Vec<_>>>()?;

        let (keys, transitions) = match &state.transition {
            Transition::Direct { next } => (
                vec![],
                vec![ParseTransition {
                    value: None,
                    mask: None,
                    next: NextState::from_name(*next),
                }],
            ),
            Transition::Select { keys, cases } => {
                if keys.is_empty() {
                    return Err(Error::malformed_structure(format!(
                        "select without keys in state `{}`",
                        state.name
                    )));
                }
                let keys = keys
                    .iter()
                    .map(|path| {
                        let (field, width) = scope.resolve_scalar(path)?;
                        let local = extracts.iter().find(|e| {
                            field.member_is_header
                                && field.member.as_deref() == Some(e.member.as_str())
                        });
                        let mut access = match local {
                            Some(e) => field
                                .rest
                                .iter()
                                .fold(e.var.clone(), |acc, sel| format!("{}.{}", acc, sel)),
                            None => field.bsv_access(),
                        };
                        if field.ty == Type::Bool {
                            access = format!("pack({})", access);
                        }
                        Ok(SelectKey {
                            path: path.clone(),
                            access,
                            width,
                        })
                    })
                    .collect::<FpgaResult<Vec<_>>>()?;
                let key_width: u64 = keys.iter().map(|k| k.width).sum();
                let fits = |v: u64| key_width >= 64 || v >> key_width == 0;
                let mut transitions = Vec::with_capacity(cases.len() + 1);
                for case in cases {
                    for v in case.value.iter().chain(&case.mask) {
                        if !fits(*v) {
                            return Err(Error::malformed_structure(format!(
                                "select value {:#x} in state `{}` does not fit in {} bits",
                                v, state.name, key_width
                            )));
                        }
                    }
                    transitions.push(ParseTransition {
                        value: case.value,
                        mask: case.mask,
                        next: NextState::from_name(case.next),
                    });
                    if case.is_default() {
                        break;
                    }
                }
                if !cases.iter().any(|c| c.is_default()) {
                    transitions.push(ParseTransition {
                        value: None,
                        mask: None,
                        next: NextState::Reject,
                    });
                }
                (keys, transitions)
            }
        };

        Ok(ParseState {
            name: state.name,
            key_width: keys.iter().map(|k| k.width).sum(),
            extracts,
            keys,
            transitions,
        })
    }

    pub fn states(&self) -> impl Iterator<Item = &ParseState> {
        self.states.values()
    }

    pub fn state(&self, name: Id) -> Option<&ParseState> {
        self.states.get(&name)
    }

    /// Headers in the order they are first extracted, walking the automaton
    /// breadth first from the start state.
    pub fn extraction_order(&self) -> Vec<&Extract> {
        let mut order: Vec<&Extract> = vec![];
        let mut seen = HashSet::new();
        let mut work = VecDeque::from([Id::from(START)]);
        while let Some(name) = work.pop_front() {
            if !seen.insert(name) {
                continue;
            }
            let Some(state) = self.states.get(&name) else {
                continue;
            };
            for extract in &state.extracts {
                if !order.iter().any(|e| e.member == extract.member) {
                    order.push(extract);
                }
            }
            work.extend(state.transitions.iter().filter_map(|t| match t.next {
                NextState::State(next) => Some(next),
                _ => None,
            }));
        }
        order
    }

    /// Declared types the parser extracts.
    pub fn type_roots(&self) -> impl Iterator<Item = Id> + '_ {
        self.states().flat_map(|s| s.extracts.iter().map(|e| e.header))
    }

    /// The state enum and the interface of the parser module.
    pub fn type_decls(&self, meta_type: &str) -> Vec<BsvTypeDecl> {
        let mut tags = self
            .states
            .keys()
            .map(|name| state_tag(*name))
            .collect::<Vec<_>>();
        tags.push(NextState::Accept.tag());
        tags.push(NextState::Reject.tag());
        vec![
            BsvTypeDecl::new(
                PARSER_STATE_TYPE.to_string(),
                TypeOrigin::States(ArtifactKind::Parser),
                TypeShape::Enum(tags),
            ),
            BsvTypeDecl::new(
                PARSER_INTERFACE.to_string(),
                TypeOrigin::Interface(ArtifactKind::Parser),
                TypeShape::Interface(vec![
                    format!("interface Put#(Bit#({})) frameIn", self.word_width()),
                    format!("interface Get#({}) meta", meta_type),
                ]),
            ),
        ]
    }

    fn word_width(&self) -> u64 {
        self.states()
            .map(|s| s.extract_width())
            .max()
            .unwrap_or(0)
            .max(MIN_WORD_WIDTH)
    }

    /// Append the parser module. Its state enum and interface are emitted
    /// with the other type declarations.
    pub fn emit(&self, b: &mut CodeBuilder, meta_type: &str) {
        let word = self.word_width();
        let open = format!("module mk{0}({0});", PARSER_INTERFACE);
        b.block(&open, "endmodule", |b| {
            b.append_fmt(format_args!(
                "Reg#({}) parse_state <- mkReg({});",
                PARSER_STATE_TYPE,
                state_tag(Id::from(START))
            ));
            b.append_fmt(format_args!(
                "Reg#({}) meta_r <- mkReg(defaultValue);",
                meta_type
            ));
            b.append_fmt(format_args!(
                "FIFOF#(Bit#({})) data_in_ff <- mkFIFOF;",
                word
            ));
            b.append_fmt(format_args!(
                "FIFOF#({}) meta_out_ff <- mkFIFOF;",
                meta_type
            ));
            for state in self.states() {
                b.newline();
                Self::emit_state(b, state, word, meta_type);
            }
            b.newline();
            b.block(
                &format!("rule rl_accept (parse_state == {});", NextState::Accept.tag()),
                "endrule",
                |b| {
                    b.append_line("meta_out_ff.enq(meta_r);");
                    b.append_line("meta_r <= defaultValue;");
                    b.append_fmt(format_args!(
                        "parse_state <= {};",
                        state_tag(Id::from(START))
                    ));
                },
            );
            b.newline();
            b.block(
                &format!("rule rl_reject (parse_state == {});", NextState::Reject.tag()),
                "endrule",
                |b| {
                    b.append_line("meta_r <= defaultValue;");
                    b.append_fmt(format_args!(
                        "parse_state <= {};",
                        state_tag(Id::from(START))
                    ));
                },
            );
            b.newline();
            b.append_line("interface frameIn = toPut(data_in_ff);");
            b.append_line("interface meta = toGet(meta_out_ff);");
        });
    }

    fn emit_state(b: &mut CodeBuilder, state: &ParseState, word: u64, meta_type: &str) {
        b.block(
            &format!(
                "rule rl_parse_{} (parse_state == {});",
                bsv_ident(state.name.as_str()),
                state_tag(state.name)
            ),
            "endrule",
            |b| {
                b.append_fmt(format_args!("{} meta = meta_r;", meta_type));
                if !state.extracts.is_empty() {
                    b.append_line("let data <- toGet(data_in_ff).get;");
                }
                let mut offset = 0;
                for e in &state.extracts {
                    if e.width == 0 {
                        b.append_fmt(format_args!("{} {} = unpack(0);", e.bsv_type, e.var));
                    } else {
                        let hi = word - 1 - offset;
                        let lo = word - offset - e.width;
                        b.append_fmt(format_args!(
                            "{} {} = unpack(data[{}:{}]);",
                            e.bsv_type, e.var, hi, lo
                        ));
                    }
                    b.append_fmt(format_args!(
                        "meta.{} = tagged Valid {};",
                        e.member, e.var
                    ));
                    offset += e.width;
                }
                if !state.keys.is_empty() {
                    let keys = state.keys.iter().map(|k| k.access.as_str()).collect::<Vec<_>>();
                    b.append_fmt(format_args!(
                        "Bit#({}) key = {{{}}};",
                        state.key_width,
                        keys.join(", ")
                    ));
                }
                for (i, t) in state.transitions.iter().enumerate() {
                    let cond = t.value.map(|v| match t.mask {
                        Some(m) => format!(
                            "(key & {w}'h{:x}) == {w}'h{:x}",
                            m,
                            v & m,
                            w = state.key_width
                        ),
                        None => format!("key == {}'h{:x}", state.key_width, v),
                    });
                    let set = format!("parse_state <= {};", t.next.tag());
                    match (i, cond) {
                        (0, Some(c)) => b.append_fmt(format_args!("if ({}) {}", c, set)),
                        (_, Some(c)) => b.append_fmt(format_args!("else if ({}) {}", c, set)),
                        (0, None) => b.append_line(&set),
                        (_, None) => b.append_fmt(format_args!("else {}", set)),
                    }
                }
                b.append_line("meta_r <= meta;");
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::Fixture;
    use super::*;

    const HEADERS: &str = r#"
        "types": [
            { "name": "ethernet_t", "kind": "header", "fields": [
                { "name": "etherType", "type": { "kind": "bits", "width": 16 } } ] },
            { "name": "ipv4_t", "kind": "header", "fields": [
                { "name": "protocol", "type": { "kind": "bits", "width": 8 } } ] },
            { "name": "pad_t", "kind": "header", "fields": [] },
            { "name": "headers_t", "kind": "struct", "fields": [
                { "name": "ethernet", "type": { "kind": "named", "name": "ethernet_t" } },
                { "name": "ipv4", "type": { "kind": "named", "name": "ipv4_t" } },
                { "name": "pad", "type": { "kind": "named", "name": "pad_t" } } ] }
        ]"#;

    fn parser_json(states: &str) -> String {
        format!(
            r#"{{ "program": {{ {}, "parsers": [ {{ "name": "P",
                "params": [ {{ "name": "hdr", "type": {{ "kind": "named", "name": "headers_t" }} }} ],
                "states": {} }} ] }},
              "main": {{ "parser": "P" }} }}"#,
            HEADERS, states
        )
    }

    fn build(states: &str) -> FpgaResult<ParserModel> {
        let fx = Fixture::new(&parser_json(states));
        let decl = fx.top.program.parser(Id::from("P")).unwrap();
        ParserModel::build(decl, fx.ctx())
    }

    #[test]
    fn synthesizes_default_reject() {
        let model = build(
            r#"[ { "name": "start", "extracts": ["hdr.ethernet"],
                   "transition": { "kind": "select", "keys": ["hdr.ethernet.etherType"],
                     "cases": [ { "value": 2048, "next": "parse_ipv4" } ] } },
                 { "name": "parse_ipv4", "extracts": ["hdr.ipv4"],
                   "transition": { "kind": "direct", "next": "accept" } } ]"#,
        )
        .unwrap();
        let start = model.state(Id::from("start")).unwrap();
        assert_eq!(start.key_width, 16);
        assert_eq!(start.keys[0].access, "hdr_ethernet.etherType");
        assert_eq!(
            start.transitions.last(),
            Some(&ParseTransition {
                value: None,
                mask: None,
                next: NextState::Reject
            })
        );
        let order = model
            .extraction_order()
            .iter()
            .map(|e| e.member.clone())
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["headers_t$ethernet", "headers_t$ipv4"]);
    }

    #[test]
    fn emits_rule_per_state() {
        let model = build(
            r#"[ { "name": "start", "extracts": ["hdr.ethernet"],
                   "transition": { "kind": "direct", "next": "accept" } } ]"#,
        )
        .unwrap();
        let mut b = CodeBuilder::new(ArtifactKind::Parser);
        model.emit(&mut b, "PipelineMetadata");
        let text = b.serialize();
        assert!(text.contains("rule rl_parse_start (parse_state == StateStart);"));
        assert!(text.contains("EthernetT hdr_ethernet = unpack(data[15:0]);"));
        assert!(text.contains("meta.headers_t$ethernet = tagged Valid hdr_ethernet;"));
        assert!(text.contains("rule rl_reject (parse_state == StateReject);"));
    }

    #[test]
    fn drops_unreachable_states() {
        let model = build(
            r#"[ { "name": "start", "transition": { "kind": "direct", "next": "accept" } },
                 { "name": "orphan", "transition": { "kind": "direct", "next": "accept" } } ]"#,
        )
        .unwrap();
        assert!(model.state(Id::from("orphan")).is_none());
        assert_eq!(model.states().count(), 1);
    }

    #[test]
    fn empty_headers_take_no_bits() {
        let model = build(
            r#"[ { "name": "start", "extracts": ["hdr.ethernet", "hdr.pad"],
                   "transition": { "kind": "direct", "next": "accept" } } ]"#,
        )
        .unwrap();
        let mut b = CodeBuilder::new(ArtifactKind::Parser);
        model.emit(&mut b, "PipelineMetadata");
        let text = b.serialize();
        assert!(text.contains("EthernetT hdr_ethernet = unpack(data[15:0]);"));
        assert!(text.contains("PadT hdr_pad = unpack(0);"));
    }

    #[test]
    fn arms_after_default_are_dead() {
        let model = build(
            r#"[ { "name": "start", "extracts": ["hdr.ethernet"],
                   "transition": { "kind": "select", "keys": ["hdr.ethernet.etherType"],
                     "cases": [ { "next": "accept" }, { "value": 1, "next": "spin" } ] } },
                 { "name": "spin", "transition": { "kind": "direct", "next": "spin" } } ]"#,
        )
        .unwrap();
        assert!(model.state(Id::from("spin")).is_none());
        let start = model.state(Id::from("start")).unwrap();
        assert_eq!(start.transitions.len(), 1);
    }

    #[test]
    fn rejects_cycles_without_exit() {
        let err = build(
            r#"[ { "name": "start", "transition": { "kind": "direct", "next": "loop" } },
                 { "name": "loop", "transition": { "kind": "direct", "next": "start" } } ]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("can never reach"));
    }

    #[test]
    fn rejects_missing_start_and_bad_targets() {
        let err = build(
            r#"[ { "name": "begin", "transition": { "kind": "direct", "next": "accept" } } ]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("start"));

        let err = build(
            r#"[ { "name": "start", "transition": { "kind": "direct", "next": "nowhere" } } ]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn rejects_values_wider_than_key() {
        let err = build(
            r#"[ { "name": "start", "extracts": ["hdr.ethernet"],
                   "transition": { "kind": "select", "keys": ["hdr.ethernet.etherType"],
                     "cases": [ { "value": 65536, "next": "accept" } ] } } ]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("does not fit"));
    }

    #[test]
    fn extracts_must_be_headers() {
        let err = build(
            r#"[ { "name": "start", "extracts": ["hdr.ethernet.etherType"],
                   "transition": { "kind": "direct", "next": "accept" } } ]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("is not a header"));
    }
}
