//! AST evaluation against the graph store.
//!
//! Evaluation is total over the failure domain: every problem — a missing or
//! unknown lookup, a type mismatch, division by zero, a domain error — comes
//! back as an [`EvalError`], which the scheduler treats as "this constraint
//! contributes nothing this tick". Nothing here panics or aborts a tick.

use vise_expr::{BinOp, Expr, Func};

use crate::error::EvalError;
use crate::graph::GraphStore;
use crate::value::{Interval, Value};

/// Evaluate a parsed expression against the current graph state.
pub fn eval(expr: &Expr, graph: &GraphStore) -> Result<Value, EvalError> {
    match expr {
        Expr::Number(x) => Ok(Value::Scalar(*x)),
        Expr::Val(path) => graph
            .lookup(path)
            .cloned()
            .ok_or_else(|| EvalError::MissingValue(path.clone())),
        Expr::Neg(inner) => match eval(inner, graph)? {
            Value::Scalar(x) => Ok(Value::Scalar(-x)),
            other => Err(EvalError::Type(format!("cannot negate {other}"))),
        },
        Expr::Binary { op, lhs, rhs } => {
            let lhs = eval(lhs, graph)?;
            let rhs = eval(rhs, graph)?;
            apply_binary(*op, &lhs, &rhs)
        }
        Expr::Call { func, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, graph)?);
            }
            apply_builtin(*func, &values)
        }
    }
}

fn apply_binary(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
    use Value::{Interval as Iv, Scalar};
    match op {
        BinOp::Add => match (lhs, rhs) {
            (Scalar(a), Scalar(b)) => Ok(Scalar(a + b)),
            (Iv(a), Iv(b)) => Ok(Iv(a.add(b))),
            (Iv(a), Scalar(b)) | (Scalar(b), Iv(a)) => Ok(Iv(a.shift(*b))),
            _ => Err(type_error("+", lhs, rhs)),
        },
        BinOp::Sub => match (lhs, rhs) {
            (Scalar(a), Scalar(b)) => Ok(Scalar(a - b)),
            (Iv(a), Iv(b)) => Ok(Iv(a.sub(b))),
            (Iv(a), Scalar(b)) => Ok(Iv(a.shift(-b))),
            (Scalar(a), Iv(b)) => Ok(Iv(Interval::new(a - b.hi, a - b.lo))),
            _ => Err(type_error("-", lhs, rhs)),
        },
        BinOp::Mul => match (lhs, rhs) {
            (Scalar(a), Scalar(b)) => Ok(Scalar(a * b)),
            (Iv(a), Iv(b)) => Ok(Iv(a.mul(b))),
            (Iv(a), Scalar(b)) | (Scalar(b), Iv(a)) => Ok(Iv(a.scale(*b))),
            _ => Err(type_error("*", lhs, rhs)),
        },
        // Interval division is deliberately unsupported.
        BinOp::Div => match (lhs, rhs) {
            (Scalar(_), Scalar(b)) if *b == 0.0 => Err(EvalError::DivideByZero),
            (Scalar(a), Scalar(b)) => Ok(Scalar(a / b)),
            _ => Err(type_error("/", lhs, rhs)),
        },
    }
}

fn apply_builtin(func: Func, args: &[Value]) -> Result<Value, EvalError> {
    match func {
        Func::Min | Func::Max => {
            if args.len() < 2 {
                return Err(EvalError::Arity {
                    func: func.name(),
                    got: args.len(),
                });
            }
            let mut acc = scalar_arg(func, &args[0])?;
            for arg in &args[1..] {
                let x = scalar_arg(func, arg)?;
                acc = if matches!(func, Func::Min) {
                    acc.min(x)
                } else {
                    acc.max(x)
                };
            }
            Ok(Value::Scalar(acc))
        }
        Func::Abs | Func::Sqrt | Func::Exp | Func::Log => {
            let [arg] = args else {
                return Err(EvalError::Arity {
                    func: func.name(),
                    got: args.len(),
                });
            };
            let x = scalar_arg(func, arg)?;
            match func {
                Func::Abs => Ok(Value::Scalar(x.abs())),
                Func::Exp => Ok(Value::Scalar(x.exp())),
                Func::Sqrt if x < 0.0 => Err(EvalError::Domain("sqrt")),
                Func::Sqrt => Ok(Value::Scalar(x.sqrt())),
                Func::Log if x <= 0.0 => Err(EvalError::Domain("log")),
                Func::Log => Ok(Value::Scalar(x.ln())),
                _ => unreachable!(),
            }
        }
        Func::Interval => {
            let [lo, hi] = args else {
                return Err(EvalError::Arity {
                    func: func.name(),
                    got: args.len(),
                });
            };
            Ok(Value::Interval(Interval::new(
                scalar_arg(func, lo)?,
                scalar_arg(func, hi)?,
            )))
        }
    }
}

fn scalar_arg(func: Func, value: &Value) -> Result<f64, EvalError> {
    value
        .as_scalar()
        .ok_or_else(|| EvalError::Type(format!("`{}` expects scalars, got {value}", func.name())))
}

fn type_error(op: &str, lhs: &Value, rhs: &Value) -> EvalError {
    EvalError::Type(format!("`{op}` unsupported between {lhs} and {rhs}"))
}
