//! Implements a formatter for elaborated programs that prints them back as
//! P4-16 source. The printing operation does not mutate the program.
use crate::{
    ActionDecl, ActionStmt, ControlDecl, DeclKind, DeparserDecl, Field,
    ParserDecl, ParserState, Program, Stmt, TableDecl, Transition, TypeDecl,
};
use itertools::Itertools;
use std::io;

/// Serialize a program to its canonical textual form.
pub trait CanonicalPrinter {
    fn print(&self, program: &Program, f: &mut dyn io::Write) -> io::Result<()>;
}

/// Printer for the elaborated program.
#[derive(Default)]
pub struct Printer;

impl CanonicalPrinter for Printer {
    fn print(&self, program: &Program, f: &mut dyn io::Write) -> io::Result<()> {
        Printer::write_program(program, f)
    }
}

impl Printer {
    fn format_params(params: &[Field]) -> String {
        params
            .iter()
            .map(|p| format!("inout {} {}", p.ty, p.name))
            .join(", ")
    }

    /// Prints out every declaration of the program.
    pub fn write_program<F: io::Write + ?Sized>(
        program: &Program,
        f: &mut F,
    ) -> io::Result<()> {
        writeln!(f, "#include <core.p4>")?;
        writeln!(f)?;
        for decl in &program.types {
            Self::write_type_decl(decl, f)?;
            writeln!(f)?;
        }
        for parser in &program.parsers {
            Self::write_parser(parser, f)?;
            writeln!(f)?;
        }
        for control in &program.controls {
            Self::write_control(control, f)?;
            writeln!(f)?;
        }
        for deparser in &program.deparsers {
            Self::write_deparser(deparser, f)?;
            writeln!(f)?;
        }
        Ok(())
    }

    pub fn write_type_decl<F: io::Write + ?Sized>(
        decl: &TypeDecl,
        f: &mut F,
    ) -> io::Result<()> {
        let keyword = match decl.kind {
            DeclKind::Header => "header",
            DeclKind::Struct => "struct",
            DeclKind::HeaderUnion => "header_union",
        };
        writeln!(f, "{} {} {{", keyword, decl.name)?;
        for field in &decl.fields {
            writeln!(f, "    {} {};", field.ty, field.name)?;
        }
        writeln!(f, "}}")
    }

    pub fn write_parser<F: io::Write + ?Sized>(
        parser: &ParserDecl,
        f: &mut F,
    ) -> io::Result<()> {
        let params = Self::format_params(&parser.params);
        let sep = if params.is_empty() { "" } else { ", " };
        writeln!(f, "parser {}(packet_in packet{}{}) {{", parser.name, sep, params)?;
        for state in &parser.states {
            Self::write_state(state, 4, f)?;
        }
        writeln!(f, "}}")
    }

    fn write_state<F: io::Write + ?Sized>(
        state: &ParserState,
        indent: usize,
        f: &mut F,
    ) -> io::Result<()> {
        let pad = " ".repeat(indent);
        writeln!(f, "{}state {} {{", pad, state.name)?;
        for extract in &state.extracts {
            writeln!(f, "{}    packet.extract({});", pad, extract)?;
        }
        match &state.transition {
            Transition::Direct { next } => {
                writeln!(f, "{}    transition {};", pad, next)?
            }
            Transition::Select { keys, cases } => {
                writeln!(
                    f,
                    "{}    transition select({}) {{",
                    pad,
                    keys.iter().join(", ")
                )?;
                for case in cases {
                    let label = match (case.value, case.mask) {
                        (None, _) => "default".to_string(),
                        (Some(v), None) => format!("{:#x}", v),
                        (Some(v), Some(m)) => format!("{:#x} &&& {:#x}", v, m),
                    };
                    writeln!(f, "{}        {}: {};", pad, label, case.next)?;
                }
                writeln!(f, "{}    }}", pad)?;
            }
        }
        writeln!(f, "{}}}", pad)
    }

    pub fn write_control<F: io::Write + ?Sized>(
        control: &ControlDecl,
        f: &mut F,
    ) -> io::Result<()> {
        writeln!(
            f,
            "control {}({}) {{",
            control.name,
            Self::format_params(&control.params)
        )?;
        for reg in &control.registers {
            writeln!(f, "    register<bit<{}>>({}) {};", reg.width, reg.size, reg.name)?;
        }
        for action in &control.actions {
            Self::write_action(action, f)?;
        }
        for table in &control.tables {
            Self::write_table(table, f)?;
        }
        writeln!(f, "    apply {{")?;
        Self::write_stmts(&control.apply, 8, f)?;
        writeln!(f, "    }}")?;
        writeln!(f, "}}")
    }

    fn write_action<F: io::Write + ?Sized>(
        action: &ActionDecl,
        f: &mut F,
    ) -> io::Result<()> {
        let params = action
            .params
            .iter()
            .map(|p| format!("{} {}", p.ty, p.name))
            .join(", ");
        writeln!(f, "    action {}({}) {{", action.name, params)?;
        for stmt in &action.body {
            match stmt {
                ActionStmt::Assign { dst, src } => {
                    writeln!(f, "        {} = {};", dst, src)?
                }
                ActionStmt::SetValid { path } => {
                    writeln!(f, "        {}.setValid();", path)?
                }
                ActionStmt::SetInvalid { path } => {
                    writeln!(f, "        {}.setInvalid();", path)?
                }
                ActionStmt::Drop => writeln!(f, "        mark_to_drop();")?,
            }
        }
        writeln!(f, "    }}")
    }

    fn write_table<F: io::Write + ?Sized>(
        table: &TableDecl,
        f: &mut F,
    ) -> io::Result<()> {
        writeln!(f, "    table {} {{", table.name)?;
        if !table.keys.is_empty() {
            writeln!(f, "        key = {{")?;
            for key in &table.keys {
                writeln!(f, "            {}: {};", key.field, key.match_kind)?;
            }
            writeln!(f, "        }}")?;
        }
        writeln!(f, "        actions = {{")?;
        for action in &table.actions {
            writeln!(f, "            {};", action)?;
        }
        writeln!(f, "        }}")?;
        if let Some(default) = table.default_action {
            writeln!(f, "        default_action = {}();", default)?;
        }
        if let Some(size) = table.size {
            writeln!(f, "        size = {};", size)?;
        }
        writeln!(f, "    }}")
    }

    fn write_stmts<F: io::Write + ?Sized>(
        stmts: &[Stmt],
        indent: usize,
        f: &mut F,
    ) -> io::Result<()> {
        let pad = " ".repeat(indent);
        for stmt in stmts {
            match stmt {
                Stmt::Apply { table } => {
                    writeln!(f, "{}{}.apply();", pad, table)?
                }
                Stmt::If {
                    cond,
                    then,
                    otherwise,
                } => {
                    writeln!(f, "{}if ({}) {{", pad, cond)?;
                    Self::write_stmts(then, indent + 4, f)?;
                    if otherwise.is_empty() {
                        writeln!(f, "{}}}", pad)?;
                    } else {
                        writeln!(f, "{}}} else {{", pad)?;
                        Self::write_stmts(otherwise, indent + 4, f)?;
                        writeln!(f, "{}}}", pad)?;
                    }
                }
            }
        }
        Ok(())
    }

    pub fn write_deparser<F: io::Write + ?Sized>(
        deparser: &DeparserDecl,
        f: &mut F,
    ) -> io::Result<()> {
        let params = Self::format_params(&deparser.params);
        let sep = if params.is_empty() { "" } else { ", " };
        writeln!(
            f,
            "control {}(packet_out packet{}{}) {{",
            deparser.name, sep, params
        )?;
        writeln!(f, "    apply {{")?;
        for emit in &deparser.emits {
            writeln!(f, "        packet.emit({});", emit)?;
        }
        writeln!(f, "    }}")?;
        writeln!(f, "}}")
    }
}
