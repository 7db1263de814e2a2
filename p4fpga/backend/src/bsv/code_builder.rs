use super::ArtifactKind;
use std::fmt;

const INDENT: &str = "    ";

/// An append-only text buffer for one artifact. Everything is appended
/// while the program model is emitted; afterwards [CodeBuilder::serialize]
/// hands out the text as often as needed.
#[derive(Clone, Debug)]
pub struct CodeBuilder {
    kind: ArtifactKind,
    buf: String,
    indent: usize,
}

impl CodeBuilder {
    /// A builder that already holds the banner and import list for `kind`.
    pub fn new(kind: ArtifactKind) -> Self {
        let mut builder = CodeBuilder {
            kind,
            buf: String::new(),
            indent: 0,
        };
        builder.append_fmt(format_args!(
            "// {} -- generated by p4fpga, do not edit.",
            kind.file_name()
        ));
        builder.newline();
        for import in kind.imports() {
            if kind.is_bsv() {
                builder.append_fmt(format_args!("import {}::*;", import));
            } else {
                builder.append_fmt(format_args!("#include <{}>", import));
            }
        }
        builder.newline();
        builder
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// Append `text` verbatim.
    pub fn append(&mut self, text: &str) {
        self.buf.push_str(text);
    }

    /// Append `line` at the current indentation, followed by a newline.
    pub fn append_line(&mut self, line: &str) {
        if !line.is_empty() {
            for _ in 0..self.indent {
                self.buf.push_str(INDENT);
            }
            self.buf.push_str(line);
        }
        self.buf.push('\n');
    }

    /// Like [CodeBuilder::append_line] for formatted text.
    pub fn append_fmt(&mut self, args: fmt::Arguments<'_>) {
        self.append_line(&fmt::format(args));
    }

    pub fn newline(&mut self) {
        self.buf.push('\n');
    }

    pub fn increase_indent(&mut self) {
        self.indent += 1;
    }

    pub fn decrease_indent(&mut self) {
        debug_assert!(self.indent > 0, "unbalanced indentation in {}", self.kind);
        self.indent = self.indent.saturating_sub(1);
    }

    /// Append `open`, the indented body produced by `body`, then `close`.
    pub fn block<F>(&mut self, open: &str, close: &str, body: F)
    where
        F: FnOnce(&mut Self),
    {
        self.append_line(open);
        self.increase_indent();
        body(self);
        self.decrease_indent();
        self.append_line(close);
    }

    /// The text of this artifact.
    pub fn serialize(&self) -> String {
        self.buf.clone()
    }
}
