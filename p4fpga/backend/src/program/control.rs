//! Match-action controls.
//!
//! Every applied table becomes a match-table module that looks the packet
//! up and hands it, together with the action data of the hit entry, to one
//! basic block per action. Basic blocks execute the action body and return
//! the packet to the control's pipeline module, which decides what to do
//! next: the `apply` block is flattened into a dispatch tree and every table
//! remembers its continuation, i.e. what follows it in the enclosing
//! statement lists.
use super::metadata::{REQUEST_TYPE, RESPONSE_TYPE};
use super::scope::{Context, Scope, bsv_ident};
use super::types::{BsvTypeDecl, TypeOrigin, TypeShape};
use crate::bsv::{ArtifactKind, CodeBuilder, camel_case};
use itertools::Itertools;
use linked_hash_map::LinkedHashMap;
use p4fpga_ir::{ControlDecl, MatchKind, NO_ACTION, Path, RegisterDecl, Stmt, TableDecl};
use p4fpga_utils::{Error, FpgaResult, Id, NameGenerator, bits_needed_for};

/// Number of entries assumed for tables that do not declare a size.
pub const DEFAULT_TABLE_SIZE: u64 = 1024;

/// One field of a table's lookup key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyField {
    pub path: Path,
    /// Member of the key struct.
    pub member: String,
    pub bsv_type: String,
    /// BSV expression reading the field from the packet metadata.
    pub access: String,
    pub width: u64,
    pub match_kind: MatchKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionModel {
    pub name: Id,
    /// Interface name of the basic block; the module is `mk<module>`.
    pub module: String,
    /// Tag in the action unions of the tables using this action.
    pub tag: String,
    pub param_type: Option<String>,
    /// `(bsv type, name, width)` of each parameter.
    pub params: Vec<(String, String, u64)>,
    /// Lowered body, one BSV statement per line.
    pub body: Vec<String>,
    /// Declared types among the parameter types.
    pub type_roots: Vec<Id>,
}

impl ActionModel {
    fn build(control: &ControlDecl, name: Id, ctx: Context<'_>) -> FpgaResult<Self> {
        let module = format!("{}{}", camel_case(control.name.as_str()), camel_case(name.as_str()));
        let Some(decl) = control.action(name) else {
            // The built-in action does nothing.
            return Ok(ActionModel {
                name,
                module,
                tag: camel_case(name.as_str()),
                param_type: None,
                params: vec![],
                body: vec![],
                type_roots: vec![],
            });
        };
        for p in &decl.params {
            ctx.check_type(&p.ty)?;
        }
        let scope = Scope::action(ctx, control.name, name);
        let mut body = vec![];
        for stmt in &decl.body {
            body.extend(scope.lower_action_stmt(stmt)?);
        }
        let params = decl
            .params
            .iter()
            .map(|p| {
                (
                    ctx.type_factory.bsv_type(&p.ty),
                    bsv_ident(p.name.as_str()),
                    ctx.type_factory.width(&p.ty),
                )
            })
            .collect::<Vec<_>>();
        Ok(ActionModel {
            name,
            param_type: (!params.is_empty()).then(|| format!("{}ParamT", module)),
            module,
            tag: camel_case(name.as_str()),
            params,
            body,
            type_roots: decl.params.iter().filter_map(|p| p.ty.decl_name()).collect(),
        })
    }

    pub fn param_width(&self) -> u64 {
        self.params.iter().map(|p| p.2).sum()
    }

    /// What the basic block receives from its table.
    pub fn request_type(&self) -> String {
        match &self.param_type {
            Some(p) => format!("Tuple2#({}, {})", REQUEST_TYPE, p),
            None => REQUEST_TYPE.to_string(),
        }
    }

    fn type_decls(&self) -> Vec<BsvTypeDecl> {
        let mut decls = vec![];
        if let Some(param_type) = &self.param_type {
            decls.push(BsvTypeDecl::new(
                param_type.clone(),
                TypeOrigin::ActionParams,
                TypeShape::Struct(
                    self.params
                        .iter()
                        .map(|(ty, name, _)| (ty.clone(), name.clone()))
                        .collect(),
                ),
            ));
        }
        decls.push(BsvTypeDecl::new(
            self.module.clone(),
            TypeOrigin::Interface(ArtifactKind::Control),
            TypeShape::Interface(vec![format!(
                "interface Server#({}, {}) prev_control_state",
                self.request_type(),
                RESPONSE_TYPE
            )]),
        ));
        decls
    }

    fn emit(&self, b: &mut CodeBuilder, meta_type: &str) {
        b.block(&format!("module mk{0}({0});", self.module), "endmodule", |b| {
            b.append_fmt(format_args!("FIFOF#({}) rx_ff <- mkFIFOF;", self.request_type()));
            b.append_fmt(format_args!("FIFOF#({}) tx_ff <- mkFIFOF;", RESPONSE_TYPE));
            b.newline();
            b.block("rule rl_exec;", "endrule", |b| {
                if self.param_type.is_some() {
                    b.append_line("match {.req, .params} <- toGet(rx_ff).get;");
                } else {
                    b.append_line("let req <- toGet(rx_ff).get;");
                }
                b.append_line("let pkt = req.pkt;");
                b.append_fmt(format_args!("{} meta = req.meta;", meta_type));
                for line in &self.body {
                    b.append_line(line);
                }
                b.append_fmt(format_args!(
                    "tx_ff.enq({} {{pkt: pkt, meta: meta}});",
                    RESPONSE_TYPE
                ));
            });
            b.newline();
            b.append_line("interface prev_control_state = toServer(rx_ff, tx_ff);");
        });
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableModel {
    pub name: Id,
    pub control: Id,
    /// Interface name of the match-table module.
    pub module: String,
    pub keys: Vec<KeyField>,
    /// Actions in declaration order.
    pub actions: Vec<Id>,
    pub default_action: Id,
    pub size: u64,
    /// `None` for tables without keys, which always run the default action.
    pub key_type: Option<String>,
    pub rsp_type: String,
    pub action_type: String,
    /// Width of the action union: tag plus the widest parameter struct.
    pub action_width: u64,
}

impl TableModel {
    fn build(
        control: &ControlDecl,
        decl: &TableDecl,
        scope: &Scope<'_>,
        ctx: Context<'_>,
    ) -> FpgaResult<Self> {
        let no_action = Id::from(NO_ACTION);
        let mut actions = decl.actions.clone();
        for (idx, action) in actions.iter().enumerate() {
            if actions[..idx].contains(action) {
                return Err(Error::malformed_structure(format!(
                    "table `{}` lists action `{}` twice",
                    decl.name, action
                )));
            }
            if *action != no_action && control.action(*action).is_none() {
                return Err(Error::undefined(*action, "action").with_post_msg(Some(
                    format!("referenced by table `{}`", decl.name),
                )));
            }
        }
        let default_action = decl.default_action.unwrap_or(no_action);
        if !actions.contains(&default_action) {
            if default_action != no_action {
                return Err(Error::malformed_structure(format!(
                    "default action `{}` of table `{}` is not one of its actions",
                    default_action, decl.name
                )));
            }
            actions.push(no_action);
        }

        let mut keys: Vec<KeyField> = Vec::with_capacity(decl.keys.len());
        for key in &decl.keys {
            let (field, width) = scope.resolve_scalar(&key.field)?;
            let selected = if key.field.members().is_empty() {
                key.field.segments()
            } else {
                key.field.members()
            };
            let member = bsv_ident(&selected.iter().join("_"));
            if keys.iter().any(|k| k.member == member) {
                return Err(Error::malformed_structure(format!(
                    "table `{}` matches on `{}` twice",
                    decl.name, key.field
                )));
            }
            keys.push(KeyField {
                path: key.field.clone(),
                member,
                bsv_type: ctx.type_factory.bsv_type(&field.ty),
                access: field.bsv_access(),
                width,
                match_kind: key.match_kind,
            });
        }

        let module = camel_case(decl.name.as_str());
        Ok(TableModel {
            name: decl.name,
            control: control.name,
            key_type: (!keys.is_empty()).then(|| format!("{}ReqT", module)),
            rsp_type: format!("{}RspT", module),
            action_type: format!("{}ActionT", module),
            module,
            keys,
            actions,
            default_action,
            size: decl.size.unwrap_or(DEFAULT_TABLE_SIZE),
            action_width: 0,
        })
    }

    /// Bits matched per lookup.
    pub fn key_width(&self) -> u64 {
        self.keys.iter().map(|k| k.width).fold(0, u64::saturating_add)
    }

    /// `(sram, tcam)` bits for all entries, `None` on overflow. Ternary
    /// keys live in TCAM as value and mask; the action data always lives
    /// in SRAM.
    pub fn memory_bits(&self) -> Option<(u64, u64)> {
        let key_width = self.keys.iter().try_fold(0u64, |acc, k| acc.checked_add(k.width))?;
        match self.match_kind() {
            MatchKind::Ternary => Some((
                self.size.checked_mul(self.action_width)?,
                self.size.checked_mul(key_width)?.checked_mul(2)?,
            )),
            MatchKind::Exact | MatchKind::Lpm => Some((
                self.size.checked_mul(key_width.checked_add(self.action_width)?)?,
                0,
            )),
        }
    }

    /// Width of the key struct; ternary fields carry a mask.
    pub fn key_struct_width(&self) -> u64 {
        self.keys
            .iter()
            .map(|k| match k.match_kind {
                MatchKind::Ternary => 2 * k.width,
                _ => k.width,
            })
            .sum()
    }

    /// The most demanding match kind of the key.
    pub fn match_kind(&self) -> MatchKind {
        let kinds = self.keys.iter().map(|k| k.match_kind).collect::<Vec<_>>();
        if kinds.contains(&MatchKind::Ternary) {
            MatchKind::Ternary
        } else if kinds.contains(&MatchKind::Lpm) {
            MatchKind::Lpm
        } else {
            MatchKind::Exact
        }
    }

    /// Control plane methods of this table as `(name, prototype)` pairs.
    pub fn api_methods(&self) -> Vec<(String, String)> {
        let name = bsv_ident(self.name.as_str());
        let mut methods = vec![];
        if let Some(key_type) = &self.key_type {
            methods.push((
                format!("{}_add_entry", name),
                format!(
                    "method Action {}_add_entry({} key, {} value)",
                    name, key_type, self.rsp_type
                ),
            ));
        }
        methods.push((
            format!("{}_set_default", name),
            format!(
                "method Action {}_set_default({} value)",
                name, self.action_type
            ),
        ));
        methods
    }

    fn type_decls(&self, actions: &LinkedHashMap<Id, ActionModel>) -> Vec<BsvTypeDecl> {
        let mut decls = vec![];
        if let Some(key_type) = &self.key_type {
            let mut members = vec![];
            for k in &self.keys {
                members.push((k.bsv_type.clone(), k.member.clone()));
                if k.match_kind == MatchKind::Ternary {
                    members.push((k.bsv_type.clone(), format!("{}_mask", k.member)));
                }
            }
            decls.push(BsvTypeDecl::new(
                key_type.clone(),
                TypeOrigin::TableKey,
                TypeShape::Struct(members),
            ));
        }
        let tags = self
            .actions
            .iter()
            .filter_map(|a| actions.get(a))
            .map(|a| {
                let ty = a.param_type.clone().unwrap_or_else(|| "void".to_string());
                (ty, a.tag.clone())
            })
            .collect();
        decls.push(BsvTypeDecl::new(
            self.action_type.clone(),
            TypeOrigin::TableActions,
            TypeShape::Union(tags),
        ));
        decls.push(BsvTypeDecl::new(
            self.rsp_type.clone(),
            TypeOrigin::TableResponse,
            TypeShape::Struct(vec![(self.action_type.clone(), "act".to_string())]),
        ));

        let mut methods = vec![format!(
            "interface Server#({}, {}) prev_control_state_0",
            REQUEST_TYPE, RESPONSE_TYPE
        )];
        for (i, action) in self.actions.iter().filter_map(|a| actions.get(a)).enumerate() {
            methods.push(format!(
                "interface Client#({}, {}) next_control_state_{}",
                action.request_type(),
                RESPONSE_TYPE,
                i
            ));
        }
        if let Some(key_type) = &self.key_type {
            methods.push(format!(
                "method Action add_entry({} key, {} value)",
                key_type, self.rsp_type
            ));
        }
        methods.push(format!("method Action set_default({} value)", self.action_type));
        decls.push(BsvTypeDecl::new(
            self.module.clone(),
            TypeOrigin::Interface(ArtifactKind::Control),
            TypeShape::Interface(methods),
        ));
        decls
    }

    fn emit(&self, b: &mut CodeBuilder, actions: &LinkedHashMap<Id, ActionModel>) {
        let actions = self
            .actions
            .iter()
            .filter_map(|a| actions.get(a))
            .collect::<Vec<_>>();
        b.block(&format!("module mk{0}({0});", self.module), "endmodule", |b| {
            if let Some(key_type) = &self.key_type {
                let constructor = match self.match_kind() {
                    MatchKind::Exact => "mkExactMatchTable",
                    MatchKind::Ternary => "mkTernaryMatchTable",
                    MatchKind::Lpm => "mkLpmMatchTable",
                };
                b.append_fmt(format_args!(
                    "MatchTable#({}, SizeOf#({}), SizeOf#({})) matchTable <- {}(\"{}\");",
                    self.size, key_type, self.rsp_type, constructor, self.name
                ));
            }
            let default_init = match actions.iter().find(|a| a.name == self.default_action) {
                Some(a) if a.param_type.is_some() => format!("tagged {} unpack(0)", a.tag),
                Some(a) => format!("tagged {}", a.tag),
                None => "unpack(0)".to_string(),
            };
            b.append_fmt(format_args!(
                "Reg#({}) default_action <- mkReg({});",
                self.action_type, default_init
            ));
            b.append_fmt(format_args!("FIFOF#({}) req_ff <- mkFIFOF;", REQUEST_TYPE));
            b.append_fmt(format_args!("FIFOF#({}) rsp_ff <- mkFIFOF;", RESPONSE_TYPE));
            if self.key_type.is_some() {
                b.append_fmt(format_args!("FIFOF#({}) pending_ff <- mkFIFOF;", REQUEST_TYPE));
            }
            for (i, action) in actions.iter().enumerate() {
                b.append_fmt(format_args!(
                    "FIFOF#({}) bb_req_ff_{} <- mkFIFOF;",
                    action.request_type(),
                    i
                ));
                b.append_fmt(format_args!(
                    "FIFOF#({}) bb_rsp_ff_{} <- mkFIFOF;",
                    RESPONSE_TYPE, i
                ));
            }

            if let Some(key_type) = &self.key_type {
                b.newline();
                b.block("rule rl_lookup;", "endrule", |b| {
                    b.append_line("let req <- toGet(req_ff).get;");
                    b.append_line("let meta = req.meta;");
                    let mut inits = vec![];
                    for k in &self.keys {
                        inits.push(format!("{}: {}", k.member, k.access));
                        if k.match_kind == MatchKind::Ternary {
                            inits.push(format!("{}_mask: '1", k.member));
                        }
                    }
                    b.append_fmt(format_args!(
                        "{0} key = {0} {{ {1} }};",
                        key_type,
                        inits.join(", ")
                    ));
                    b.append_line("matchTable.lookupPort.request.put(pack(key));");
                    b.append_line("pending_ff.enq(req);");
                });
            }

            b.newline();
            b.block("rule rl_execute;", "endrule", |b| {
                if self.key_type.is_some() {
                    b.append_line("let req <- toGet(pending_ff).get;");
                    b.append_line("let rsp <- matchTable.lookupPort.response.get;");
                    b.append_fmt(format_args!("{} act = default_action;", self.action_type));
                    b.block("if (rsp matches tagged Valid .data) begin", "end", |b| {
                        b.append_fmt(format_args!("{} entry = unpack(data);", self.rsp_type));
                        b.append_line("act = entry.act;");
                    });
                } else {
                    b.append_line("let req <- toGet(req_ff).get;");
                    b.append_fmt(format_args!("{} act = default_action;", self.action_type));
                }
                b.block("case (act) matches", "endcase", |b| {
                    for (i, action) in actions.iter().enumerate() {
                        if action.param_type.is_some() {
                            b.append_fmt(format_args!(
                                "tagged {} .params: bb_req_ff_{}.enq(tuple2(req, params));",
                                action.tag, i
                            ));
                        } else {
                            b.append_fmt(format_args!(
                                "tagged {}: bb_req_ff_{}.enq(req);",
                                action.tag, i
                            ));
                        }
                    }
                });
            });

            for i in 0..actions.len() {
                b.newline();
                b.block(&format!("rule rl_bb_response_{};", i), "endrule", |b| {
                    b.append_fmt(format_args!("let v <- toGet(bb_rsp_ff_{}).get;", i));
                    b.append_line("rsp_ff.enq(v);");
                });
            }

            b.newline();
            b.append_line("interface prev_control_state_0 = toServer(req_ff, rsp_ff);");
            for i in 0..actions.len() {
                b.append_fmt(format_args!(
                    "interface next_control_state_{0} = toClient(bb_req_ff_{0}, bb_rsp_ff_{0});",
                    i
                ));
            }
            if let Some(key_type) = &self.key_type {
                b.block(
                    &format!(
                        "method Action add_entry({} key, {} value);",
                        key_type, self.rsp_type
                    ),
                    "endmethod",
                    |b| b.append_line("matchTable.add_entry.put(tuple2(pack(key), pack(value)));"),
                );
            }
            b.block(
                &format!("method Action set_default({} value);", self.action_type),
                "endmethod",
                |b| b.append_line("default_action <= value;"),
            );
        });
    }
}

/// A node of the dispatch tree built from an `apply` block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowNode {
    Table(Id),
    Cond {
        /// The lowered condition.
        expr: String,
        then: Vec<FlowNode>,
        otherwise: Vec<FlowNode>,
    },
}

#[derive(Clone, Debug)]
pub struct ControlModel {
    pub name: Id,
    /// Interface name of the pipeline module.
    pub module: String,
    tables: Vec<TableModel>,
    actions: LinkedHashMap<Id, ActionModel>,
    flow: Vec<FlowNode>,
    continuations: LinkedHashMap<Id, Vec<FlowNode>>,
    registers: Vec<RegisterDecl>,
}

impl ControlModel {
    pub fn build(decl: &ControlDecl, ctx: Context<'_>) -> FpgaResult<Self> {
        let scope = Scope::block(ctx, decl.name);
        let mut applied = vec![];
        let flow = Self::lower(&decl.apply, decl, &scope, &mut applied)?;

        for table in &decl.tables {
            if !applied.contains(&table.name) {
                log::warn!(
                    "Dropping table `{}` of control `{}`: it is never applied",
                    table.name,
                    decl.name
                );
            }
        }

        let mut tables = vec![];
        let mut actions: LinkedHashMap<Id, ActionModel> = LinkedHashMap::new();
        for name in &applied {
            let Some(table) = decl.table(*name) else {
                continue;
            };
            let mut model = TableModel::build(decl, table, &scope, ctx)?;
            for action in &model.actions {
                if !actions.contains_key(action) {
                    actions.insert(*action, ActionModel::build(decl, *action, ctx)?);
                }
            }
            let widest = model
                .actions
                .iter()
                .filter_map(|a| actions.get(a))
                .map(|a| a.param_width())
                .max()
                .unwrap_or(0);
            model.action_width = bits_needed_for(model.actions.len() as u64) + widest;
            if model.memory_bits().is_none() {
                return Err(Error::malformed_structure(format!(
                    "table `{}` with {} entries needs more than 2^64 bits of memory",
                    model.name, model.size
                )));
            }
            tables.push(model);
        }
        for action in &decl.actions {
            if !actions.contains_key(&action.name) {
                log::debug!(
                    "Action `{}` of control `{}` is not used by any applied table",
                    action.name,
                    decl.name
                );
            }
        }

        let mut continuations = LinkedHashMap::new();
        Self::continuations(&flow, &[], &mut continuations);

        let registers = Self::check_registers(decl, &tables)?;

        log::debug!(
            "Control `{}` has {} tables and {} actions",
            decl.name,
            tables.len(),
            actions.len()
        );
        Ok(ControlModel {
            name: decl.name,
            module: camel_case(decl.name.as_str()),
            tables,
            actions,
            flow,
            continuations,
            registers,
        })
    }

    /// Register arrays of the control. Their instances share the module
    /// namespace with the table instances.
    fn check_registers(
        decl: &ControlDecl,
        tables: &[TableModel],
    ) -> FpgaResult<Vec<RegisterDecl>> {
        let mut seen: Vec<String> =
            tables.iter().map(|t| bsv_ident(t.name.as_str())).collect();
        for reg in &decl.registers {
            if reg.width == 0 || reg.size == 0 {
                return Err(Error::malformed_structure(format!(
                    "register `{}` of control `{}` has no cells",
                    reg.name, decl.name
                )));
            }
            let inst = bsv_ident(reg.name.as_str());
            if seen.contains(&inst) {
                return Err(Error::already_bound(reg.name, "register").with_post_msg(
                    Some(format!("in control `{}`", decl.name)),
                ));
            }
            seen.push(inst);
        }
        Ok(decl.registers.clone())
    }

    fn lower(
        stmts: &[Stmt],
        decl: &ControlDecl,
        scope: &Scope<'_>,
        applied: &mut Vec<Id>,
    ) -> FpgaResult<Vec<FlowNode>> {
        let mut nodes = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            match stmt {
                Stmt::Apply { table } => {
                    if decl.table(*table).is_none() {
                        return Err(Error::undefined(*table, "table").with_post_msg(Some(
                            format!("applied in control `{}`", decl.name),
                        )));
                    }
                    if applied.contains(table) {
                        return Err(Error::malformed_structure(format!(
                            "table `{}` is applied more than once in control `{}`",
                            table, decl.name
                        )));
                    }
                    applied.push(*table);
                    nodes.push(FlowNode::Table(*table));
                }
                Stmt::If {
                    cond,
                    then,
                    otherwise,
                } => nodes.push(FlowNode::Cond {
                    expr: scope.lower_expr(cond)?,
                    then: Self::lower(then, decl, scope, applied)?,
                    otherwise: Self::lower(otherwise, decl, scope, applied)?,
                }),
            }
        }
        Ok(nodes)
    }

    /// Record, for every table in `nodes`, what runs after it: the rest of
    /// `nodes` followed by `after`.
    fn continuations(
        nodes: &[FlowNode],
        after: &[FlowNode],
        out: &mut LinkedHashMap<Id, Vec<FlowNode>>,
    ) {
        for (i, node) in nodes.iter().enumerate() {
            let rest = nodes[i + 1..]
                .iter()
                .chain(after)
                .cloned()
                .collect::<Vec<_>>();
            match node {
                FlowNode::Table(table) => {
                    out.insert(*table, rest);
                }
                FlowNode::Cond {
                    then, otherwise, ..
                } => {
                    Self::continuations(then, &rest, out);
                    Self::continuations(otherwise, &rest, out);
                }
            }
        }
    }

    /// Tables in the order they are first applied.
    pub fn tables(&self) -> &[TableModel] {
        &self.tables
    }

    pub fn actions(&self) -> impl Iterator<Item = &ActionModel> {
        self.actions.values()
    }

    pub fn flow(&self) -> &[FlowNode] {
        &self.flow
    }

    pub fn continuation(&self, table: Id) -> Option<&[FlowNode]> {
        self.continuations.get(&table).map(|c| c.as_slice())
    }

    /// Declared types used as action data.
    pub fn type_roots(&self) -> impl Iterator<Item = Id> + '_ {
        self.actions().flat_map(|a| a.type_roots.iter().copied())
    }

    pub fn type_decls(&self) -> Vec<BsvTypeDecl> {
        let mut decls = vec![];
        for action in self.actions() {
            decls.extend(action.type_decls());
        }
        for table in &self.tables {
            decls.extend(table.type_decls(&self.actions));
        }
        let mut methods = vec![format!("interface PipeOut#({}) eventPktSend", REQUEST_TYPE)];
        for table in &self.tables {
            methods.extend(table.api_methods().into_iter().map(|(_, proto)| proto));
        }
        decls.push(BsvTypeDecl::new(
            self.module.clone(),
            TypeOrigin::Interface(ArtifactKind::Control),
            TypeShape::Interface(methods),
        ));
        decls
    }

    /// Instance name of the control in modules that use it.
    pub fn instance(&self) -> String {
        bsv_ident(&self.module)
    }

    pub fn emit(&self, b: &mut CodeBuilder, meta_type: &str) {
        for table in &self.tables {
            table.emit(b, &self.actions);
            b.newline();
        }
        for action in self.actions() {
            action.emit(b, meta_type);
            b.newline();
        }

        let open = format!(
            "module mk{0}#(Vector#(numClients, Client#({1}, {2})) mdc)({0});",
            self.module, REQUEST_TYPE, RESPONSE_TYPE
        );
        b.block(&open, "endmodule", |b| {
            b.append_fmt(format_args!("FIFOF#({}) default_req_ff <- mkFIFOF;", REQUEST_TYPE));
            b.append_fmt(format_args!("FIFOF#({}) default_rsp_ff <- mkFIFOF;", RESPONSE_TYPE));
            for table in &self.tables {
                b.append_fmt(format_args!(
                    "FIFOF#({}) {}_req_ff <- mkFIFOF;",
                    REQUEST_TYPE, table.name
                ));
                b.append_fmt(format_args!(
                    "FIFOF#({}) {}_rsp_ff <- mkFIFOF;",
                    RESPONSE_TYPE, table.name
                ));
            }
            b.append_fmt(format_args!("FIFOF#({}) currPacketFifo <- mkFIFOF;", REQUEST_TYPE));
            b.append_fmt(format_args!(
                "Vector#(numClients, Server#({}, {})) mds = replicate(toServer(default_req_ff, default_rsp_ff));",
                REQUEST_TYPE, RESPONSE_TYPE
            ));
            b.append_line("mkConnection(mds, mdc);");
            for reg in &self.registers {
                b.append_fmt(format_args!(
                    "RegisterIfc#({}, {}) {} <- mkP4Register(nil);",
                    reg.size,
                    reg.width,
                    bsv_ident(reg.name.as_str())
                ));
            }

            let mut namegen = NameGenerator::with_prev_defined_names(
                self.registers
                    .iter()
                    .map(|r| Id::from(bsv_ident(r.name.as_str())))
                    .chain(self.tables.iter().map(|t| Id::from(bsv_ident(t.name.as_str()))))
                    .collect(),
            );
            for table in &self.tables {
                let inst = bsv_ident(table.name.as_str());
                b.append_fmt(format_args!("{} {} <- mk{}();", table.module, inst, table.module));
                b.append_fmt(format_args!(
                    "mkConnection(toClient({0}_req_ff, {0}_rsp_ff), {1}.prev_control_state_0);",
                    table.name, inst
                ));
                b.append_line("// Basic Blocks");
                let actions = table.actions.iter().filter_map(|a| self.actions.get(a));
                for (i, action) in actions.enumerate() {
                    let bb = bsv_ident(namegen.gen_name(action.name).as_str());
                    b.append_fmt(format_args!("{} {} <- mk{}();", action.module, bb, action.module));
                    b.append_fmt(format_args!(
                        "mkConnection({}.next_control_state_{}, {}.prev_control_state);",
                        inst, i, bb
                    ));
                }
            }

            b.newline();
            b.block("rule default_next_state (default_req_ff.notEmpty);", "endrule", |b| {
                b.append_line("default_req_ff.deq;");
                b.append_line("let _req = default_req_ff.first;");
                b.append_line("let pkt = _req.pkt;");
                b.append_fmt(format_args!("{} meta = _req.meta;", meta_type));
                Self::dispatch(b, &self.flow);
            });
            for table in &self.tables {
                b.newline();
                b.block(
                    &format!("rule {0}_next_state ({0}_rsp_ff.notEmpty);", table.name),
                    "endrule",
                    |b| {
                        b.append_fmt(format_args!("{}_rsp_ff.deq;", table.name));
                        b.append_fmt(format_args!("let _rsp = {}_rsp_ff.first;", table.name));
                        b.append_line("let pkt = _rsp.pkt;");
                        b.append_fmt(format_args!("{} meta = _rsp.meta;", meta_type));
                        Self::dispatch(b, self.continuation(table.name).unwrap_or_default());
                    },
                );
            }

            b.newline();
            b.append_line("interface eventPktSend = toPipeOut(currPacketFifo);");
            for table in &self.tables {
                let inst = bsv_ident(table.name.as_str());
                let prefix = format!("{}_", inst);
                for (name, _) in table.api_methods() {
                    let local = name.strip_prefix(&prefix).unwrap_or(&name);
                    b.append_fmt(format_args!("method {} = {}.{};", name, inst, local));
                }
            }
        });
    }

    /// Send the packet to the first table of `nodes`, or out of the control
    /// if there is none.
    fn dispatch(b: &mut CodeBuilder, nodes: &[FlowNode]) {
        match nodes.split_first() {
            None => {
                b.append_fmt(format_args!(
                    "{0} req = {0} {{pkt: pkt, meta: meta}};",
                    REQUEST_TYPE
                ));
                b.append_line("currPacketFifo.enq(req);");
            }
            Some((FlowNode::Table(table), _)) => {
                b.append_fmt(format_args!(
                    "{0} req = {0} {{pkt: pkt, meta: meta}};",
                    REQUEST_TYPE
                ));
                b.append_fmt(format_args!("{}_req_ff.enq(req);", table));
            }
            Some((
                FlowNode::Cond {
                    expr,
                    then,
                    otherwise,
                },
                rest,
            )) => {
                let then = then.iter().chain(rest).cloned().collect::<Vec<_>>();
                let otherwise = otherwise.iter().chain(rest).cloned().collect::<Vec<_>>();
                b.block(&format!("if ({}) begin", expr), "end", |b| Self::dispatch(b, &then));
                b.block("else begin", "end", |b| Self::dispatch(b, &otherwise));
            }
        }
    }
}
