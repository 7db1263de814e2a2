use crate::Path;
use serde::{Deserialize, Serialize};

/// Binary operators that survive elaboration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    BitAnd,
    BitOr,
}

impl BinOp {
    /// The operator's spelling. P4 and BSV agree on all of them.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
        }
    }

    /// Does this operator produce a boolean?
    pub fn is_predicate(&self) -> bool {
        !matches!(self, BinOp::Add | BinOp::Sub | BinOp::BitAnd | BinOp::BitOr)
    }
}

/// Expressions used in conditions and action bodies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    /// A field or parameter reference.
    Field { path: Path },
    /// An integer literal, optionally sized.
    Const {
        value: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<u64>,
    },
    /// `path.isValid()`.
    IsValid { path: Path },
    /// `!expr`.
    Not { expr: Box<Expr> },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn field<P: Into<Path>>(path: P) -> Self {
        Expr::Field { path: path.into() }
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// All paths referenced by this expression, in evaluation order.
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            Expr::Field { path } | Expr::IsValid { path } => vec![path],
            Expr::Const { .. } => vec![],
            Expr::Not { expr } => expr.paths(),
            Expr::Binary { lhs, rhs, .. } => {
                let mut paths = lhs.paths();
                paths.extend(rhs.paths());
                paths
            }
        }
    }
}

/// Formats the expression in P4 syntax.
impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Field { path } => write!(f, "{}", path),
            Expr::Const { value, width: None } => write!(f, "{}", value),
            Expr::Const {
                value,
                width: Some(w),
            } => write!(f, "{}w{}", w, value),
            Expr::IsValid { path } => write!(f, "{}.isValid()", path),
            Expr::Not { expr } => write!(f, "!({})", expr),
            Expr::Binary { op, lhs, rhs } => {
                write!(f, "({} {} {})", lhs, op.symbol(), rhs)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_nested() {
        let e = Expr::binary(
            BinOp::And,
            Expr::IsValid {
                path: Path::from("hdr.ipv4"),
            },
            Expr::binary(
                BinOp::Gt,
                Expr::field("hdr.ipv4.ttl"),
                Expr::Const {
                    value: 0,
                    width: Some(8),
                },
            ),
        );
        assert_eq!(
            e.to_string(),
            "(hdr.ipv4.isValid() && (hdr.ipv4.ttl > 8w0))"
        );
        assert_eq!(e.paths().len(), 2);
    }
}
