//! nom parser for the constraint-expression surface syntax.
//!
//! Grammar (whitespace-insensitive):
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := factor (('*' | '/') factor)*
//! factor  := '-' factor | primary
//! primary := '(' expr ')' | call | number
//! call    := 'val' '(' string ')' | ident '(' expr (',' expr)* ')'
//! ```
//!
//! Operator precedence falls out of the grammar: `*` and `/` bind tighter
//! than `+` and `-`, both levels associate left.

use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char as pchar, multispace0, one_of},
    combinator::{all_consuming, map, recognize},
    error::{Error, ErrorKind},
    multi::{fold_many0, separated_list1},
    number::complete::double,
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};
use thiserror::Error as ThisError;

use crate::{BinOp, Expr, Func};

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum ParseError {
    #[error("expression syntax error near `{near}`")]
    Syntax { near: String },
}

/// Parse a complete expression. The whole input must be consumed.
pub fn parse_expr(input: &str) -> Result<Expr, ParseError> {
    match all_consuming(delimited(multispace0, expr, multispace0))(input) {
        Ok((_, ast)) => Ok(ast),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(ParseError::Syntax {
            near: e.input.chars().take(24).collect(),
        }),
        Err(nom::Err::Incomplete(_)) => Err(ParseError::Syntax {
            near: String::new(),
        }),
    }
}

fn expr(input: &str) -> IResult<&str, Expr> {
    let (input, init) = term(input)?;
    fold_many0(
        pair(delimited(multispace0, one_of("+-"), multispace0), term),
        move || init.clone(),
        |lhs, (op, rhs)| Expr::Binary {
            op: if op == '+' { BinOp::Add } else { BinOp::Sub },
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
    )(input)
}

fn term(input: &str) -> IResult<&str, Expr> {
    let (input, init) = factor(input)?;
    fold_many0(
        pair(delimited(multispace0, one_of("*/"), multispace0), factor),
        move || init.clone(),
        |lhs, (op, rhs)| Expr::Binary {
            op: if op == '*' { BinOp::Mul } else { BinOp::Div },
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
    )(input)
}

fn factor(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(pair(pchar('-'), multispace0), factor), |e| {
            Expr::Neg(Box::new(e))
        }),
        primary,
    ))(input)
}

fn primary(input: &str) -> IResult<&str, Expr> {
    alt((
        delimited(
            pair(pchar('('), multispace0),
            expr,
            pair(multispace0, pchar(')')),
        ),
        // Calls before numbers: `double` would happily read the `inf` prefix
        // of `interval(...)` as a float literal.
        call,
        map(double, Expr::Number),
    ))(input)
}

fn call(input: &str) -> IResult<&str, Expr> {
    let (rest, name) = parse_ident(input)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = pchar('(')(rest)?;
    let (rest, _) = multispace0(rest)?;

    if name == "val" {
        let (rest, path) = string_literal(rest)?;
        let (rest, _) = multispace0(rest)?;
        let (rest, _) = pchar(')')(rest)?;
        return Ok((rest, Expr::Val(path.to_string())));
    }

    let func = match Func::from_name(name) {
        Some(func) => func,
        None => return Err(nom::Err::Error(Error::new(input, ErrorKind::Tag))),
    };
    let (rest, args) = separated_list1(
        delimited(multispace0, pchar(','), multispace0),
        expr,
    )(rest)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = pchar(')')(rest)?;
    Ok((rest, Expr::Call { func, args }))
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn parse_ident(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        take_while1(is_ident_start),
        take_while(is_ident_continue),
    )))(input)
}

fn string_literal(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(pchar('\''), take_while(|c| c != '\''), pchar('\'')),
        delimited(pchar('"'), take_while(|c| c != '"'), pchar('"')),
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_number() {
        assert_eq!(parse_expr("1.5").unwrap(), Expr::Number(1.5));
    }

    #[test]
    fn parses_val_lookup() {
        assert_eq!(
            parse_expr("val('coffee.level')").unwrap(),
            Expr::Val("coffee.level".to_string())
        );
        // Double quotes work too, and edge ids may carry arrows and colons.
        assert_eq!(
            parse_expr("val(\"coffee->alertness:causes.beta\")").unwrap(),
            Expr::Val("coffee->alertness:causes.beta".to_string())
        );
    }

    #[test]
    fn precedence_mul_over_add() {
        let ast = parse_expr("1 + 2 * 3").unwrap();
        match ast {
            Expr::Binary { op: BinOp::Add, rhs, .. } => match *rhs {
                Expr::Binary { op: BinOp::Mul, .. } => {}
                other => panic!("expected mul on the right, got {other:?}"),
            },
            other => panic!("expected add at the top, got {other:?}"),
        }
    }

    #[test]
    fn left_associativity() {
        // (1 - 2) - 3, not 1 - (2 - 3).
        let ast = parse_expr("1 - 2 - 3").unwrap();
        match ast {
            Expr::Binary { op: BinOp::Sub, lhs, rhs } => {
                assert_eq!(*rhs, Expr::Number(3.0));
                assert!(matches!(*lhs, Expr::Binary { op: BinOp::Sub, .. }));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn parses_calls_and_constructor() {
        let ast = parse_expr("min(val('a.x'), 0.5)").unwrap();
        assert!(matches!(ast, Expr::Call { func: Func::Min, ref args } if args.len() == 2));

        // Both spellings of the interval constructor are accepted.
        for src in ["interval(0, 1)", "Interval(0, 1)"] {
            let ast = parse_expr(src).unwrap();
            assert!(matches!(ast, Expr::Call { func: Func::Interval, ref args } if args.len() == 2));
        }
    }

    #[test]
    fn parses_typical_rule_template_output() {
        let ast = parse_expr("val('coffee.level') * val('coffee->alertness:causes.beta')").unwrap();
        assert_eq!(
            ast.reads(),
            vec!["coffee.level", "coffee->alertness:causes.beta"]
        );
    }

    #[test]
    fn unary_minus_and_parens() {
        let ast = parse_expr("-(1 + val('n.x')) * 2").unwrap();
        assert!(matches!(ast, Expr::Binary { op: BinOp::Mul, .. }));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_expr("").is_err());
        assert!(parse_expr("frob('a.b')").is_err());
        assert!(parse_expr("1 +").is_err());
        assert!(parse_expr("val(coffee.level)").is_err()); // path must be quoted
        assert!(parse_expr("min(1, 2) extra").is_err());
    }
}
