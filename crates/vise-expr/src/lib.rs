//! Vise constraint-expression language
//!
//! Constraints recompute attribute values from other attribute values. The
//! expression surface is deliberately tiny: one lookup primitive
//! (`val('entity.attr')`), a fixed builtin set (`min`, `max`, `abs`, `sqrt`,
//! `exp`, `log`, `interval`), numeric literals, and `+ - * /` with
//! parentheses. There is no name resolution beyond the builtins, no
//! definitions, and no iteration.
//!
//! Expressions are parsed **once** (at constraint creation) into the [`Expr`]
//! AST; the engine evaluates the AST on every propagation tick. Parse
//! failures are reported to the caller as a [`ParseError`] but are not fatal
//! to the workbench: a constraint that fails to parse simply contributes no
//! update.

mod parse;

use serde::{Deserialize, Serialize};

pub use parse::{parse_expr, ParseError};

/// Binary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Builtin function. `val` is not listed here: path lookup is its own AST
/// node because its argument is a path literal, not an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Func {
    Min,
    Max,
    Abs,
    Sqrt,
    Exp,
    Log,
    Interval,
}

impl Func {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "min" => Func::Min,
            "max" => Func::Max,
            "abs" => Func::Abs,
            "sqrt" => Func::Sqrt,
            "exp" => Func::Exp,
            "log" => Func::Log,
            // The reference corpus spells the constructor both ways.
            "interval" | "Interval" => Func::Interval,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Func::Min => "min",
            Func::Max => "max",
            Func::Abs => "abs",
            Func::Sqrt => "sqrt",
            Func::Exp => "exp",
            Func::Log => "log",
            Func::Interval => "interval",
        }
    }
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Numeric literal.
    Number(f64),
    /// `val('entity.attr')` — look up an attribute value.
    Val(String),
    /// Unary negation.
    Neg(Box<Expr>),
    /// Binary arithmetic.
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Builtin function call.
    Call { func: Func, args: Vec<Expr> },
}

impl Expr {
    /// Paths this expression reads via `val`, in syntactic order.
    pub fn reads(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_reads(&mut out);
        out
    }

    fn collect_reads<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Number(_) => {}
            Expr::Val(path) => out.push(path),
            Expr::Neg(inner) => inner.collect_reads(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_reads(out);
                rhs.collect_reads(out);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_reads(out);
                }
            }
        }
    }
}
