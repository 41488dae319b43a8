//! a module turns a String expression into a symbolic expression
//!
//! Grammar (precedence climbing, lowest first):
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := unary (('*' | '/') unary)*
//! unary  := '-' unary | power
//! power  := atom ('^' unary)?          right-associative
//! atom   := number | function '(' expr ')' | identifier | '(' expr ')'
//! ```
//!# Example
//! ```
//! use RustedOCP::symbolic::symbolic_engine::Expr;
//! let parsed_expression = Expr::parse_expression("x^2.3*ln(x+y+y^2.6)").unwrap();
//! let parsed_function = parsed_expression.lambdify_borrowed_thread_safe(&["x", "y"]).unwrap();
//! assert!(parsed_function(&[1.0, 2.0]).is_finite());
//! ```
use crate::symbolic::symbolic_engine::Expr;
use nom::{
    IResult, Parser,
    branch::alt,
    character::complete::{char, multispace0, one_of, satisfy},
    combinator::{all_consuming, map, map_res, opt, recognize, verify},
    number::complete::recognize_float,
    multi::many0,
    sequence::{delimited, pair, preceded},
};

fn ws<'a, O, F>(inner: F) -> impl Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>
where
    F: Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>,
{
    delimited(multispace0, inner, multispace0)
}

/// unsigned decimal literal; the sign is handled by `unary`. `inf` and `nan` stay identifiers.
fn number(input: &str) -> IResult<&str, Expr> {
    let literal = verify(recognize_float, |s: &str| {
        s.starts_with(|c: char| c.is_ascii_digit() || c == '.')
    });
    map_res(literal, |s: &str| s.parse::<f64>().map(Expr::Const)).parse(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c: char| c.is_ascii_alphabetic() || c == '_'),
        many0(satisfy(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.')),
    ))
    .parse(input)
}

fn apply_function(name: &str, arg: Expr) -> Option<Expr> {
    let expr = match name {
        "exp" => Expr::Exp(arg.boxed()),
        "ln" | "log" => Expr::Ln(arg.boxed()),
        "sin" => Expr::sin(arg.boxed()),
        "cos" => Expr::cos(arg.boxed()),
        "tg" | "tan" => Expr::tg(arg.boxed()),
        "arcsin" | "asin" => Expr::arcsin(arg.boxed()),
        "arccos" | "acos" => Expr::arccos(arg.boxed()),
        "arctg" | "atan" => Expr::arctg(arg.boxed()),
        "sqrt" => Expr::Pow(arg.boxed(), Expr::Const(0.5).boxed()),
        _ => return None,
    };
    Some(expr)
}

/// identifier, optionally followed by a parenthesised argument (function call)
fn call_or_variable(input: &str) -> IResult<&str, Expr> {
    let (rest, name) = identifier(input)?;
    let (after_arg, arg) = opt(preceded(
        multispace0,
        delimited(char('('), ws(expr), char(')')),
    ))
    .parse(rest)?;
    match arg {
        Some(arg) => match apply_function(name, arg) {
            Some(e) => Ok((after_arg, e)),
            None => Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Verify,
            ))),
        },
        None => Ok((rest, Expr::Var(name.to_string()))),
    }
}

fn atom(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        number,
        call_or_variable,
        delimited(char('('), expr, char(')')),
    )))
    .parse(input)
}

fn power(input: &str) -> IResult<&str, Expr> {
    let (input, base) = atom(input)?;
    let (input, exponent) = opt(preceded(char('^'), unary)).parse(input)?;
    let e = match exponent {
        Some(exponent) => Expr::Pow(base.boxed(), exponent.boxed()),
        None => base,
    };
    Ok((input, e))
}

fn unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(char('-')), unary), |e| match e {
            Expr::Const(v) => Expr::Const(-v),
            other => Expr::Mul(Expr::Const(-1.0).boxed(), other.boxed()),
        }),
        preceded(opt(ws(char('+'))), power),
    ))
    .parse(input)
}

fn term(input: &str) -> IResult<&str, Expr> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(pair(ws(one_of("*/")), unary)).parse(input)?;
    let folded = rest.into_iter().fold(first, |acc, (op, rhs)| match op {
        '*' => Expr::Mul(acc.boxed(), rhs.boxed()),
        _ => Expr::Div(acc.boxed(), rhs.boxed()),
    });
    Ok((input, folded))
}

fn expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = term(input)?;
    let (input, rest) = many0(pair(ws(one_of("+-")), term)).parse(input)?;
    let folded = rest.into_iter().fold(first, |acc, (op, rhs)| match op {
        '+' => Expr::Add(acc.boxed(), rhs.boxed()),
        _ => Expr::Sub(acc.boxed(), rhs.boxed()),
    });
    Ok((input, folded))
}

/// Parses the whole input; trailing characters are an error.
pub fn parse_expression_func(input: &str) -> Result<Expr, String> {
    if input.trim().is_empty() {
        return Err("empty expression".to_string());
    }
    match all_consuming(ws(expr)).parse(input) {
        Ok((_, e)) => Ok(e),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(format!(
            "cannot parse '{}': unexpected input at '{}'",
            input, e.input
        )),
        Err(nom::Err::Incomplete(_)) => Err(format!("cannot parse '{}': incomplete input", input)),
    }
}
