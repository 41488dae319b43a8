//! # Symbolic Engine Module
//!
//! Expression tree used to describe optimal control models: right-hand sides of the ODE,
//! running costs and initial-condition residuals are written as `Expr` in named state and
//! control symbols.
//!
//! ## Main Structures and Methods
//!
//! ### `Expr` Enum
//! - **Variables**: `Var(String)` - symbolic variables like "x", "cstr.T"
//! - **Constants**: `Const(f64)` - numerical constants
//! - **Operations**: `Add`, `Sub`, `Mul`, `Div`, `Pow` - basic arithmetic
//! - **Functions**: `Exp`, `Ln`, `sin`, `cos`, `tg`, `arcsin`, `arccos`, `arctg`
//!
//! ### Key Methods
//! - `Symbols(symbols: &str)` - create multiple variables from comma-separated string
//! - `all_arguments_are_variables()` - sorted list of variable names
//! - `simplify()` - constant folding and neutral-element removal
//!
//! Differentiation and direct evaluation live in `symbolic_engine_derivatives`,
//! conversion into closures in `symbolic_lambdify`.

#![allow(non_camel_case_types)]

use std::fmt;

/// Symbolic expression tree. Every node owns its children through `Box<Expr>`.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Symbolic variable with a name
    Var(String),
    /// Numerical constant value
    Const(f64),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    /// base ^ exponent
    Pow(Box<Expr>, Box<Expr>),
    Exp(Box<Expr>),
    /// natural logarithm
    Ln(Box<Expr>),
    sin(Box<Expr>),
    cos(Box<Expr>),
    /// tangent
    tg(Box<Expr>),
    arcsin(Box<Expr>),
    arccos(Box<Expr>),
    /// arctangent
    arctg(Box<Expr>),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Var(name) => write!(f, "{}", name),
            Expr::Const(val) => write!(f, "{}", val),
            Expr::Add(lhs, rhs) => write!(f, "({} + {})", lhs, rhs),
            Expr::Sub(lhs, rhs) => write!(f, "({} - {})", lhs, rhs),
            Expr::Mul(lhs, rhs) => write!(f, "({} * {})", lhs, rhs),
            Expr::Div(lhs, rhs) => write!(f, "({} / {})", lhs, rhs),
            Expr::Pow(base, exp) => write!(f, "({} ^ {})", base, exp),
            Expr::Exp(expr) => write!(f, "exp({})", expr),
            Expr::Ln(expr) => write!(f, "ln({})", expr),
            Expr::sin(expr) => write!(f, "sin({})", expr),
            Expr::cos(expr) => write!(f, "cos({})", expr),
            Expr::tg(expr) => write!(f, "tg({})", expr),
            Expr::arcsin(expr) => write!(f, "arcsin({})", expr),
            Expr::arccos(expr) => write!(f, "arccos({})", expr),
            Expr::arctg(expr) => write!(f, "arctg({})", expr),
        }
    }
}

impl std::ops::Add for Expr {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Expr::Add(self.boxed(), rhs.boxed())
    }
}

impl std::ops::Sub for Expr {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Expr::Sub(self.boxed(), rhs.boxed())
    }
}

impl std::ops::Mul for Expr {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        Expr::Mul(self.boxed(), rhs.boxed())
    }
}

impl std::ops::Div for Expr {
    type Output = Self;

    fn div(self, rhs: Self) -> Self::Output {
        Expr::Div(self.boxed(), rhs.boxed())
    }
}

impl std::ops::AddAssign for Expr {
    fn add_assign(&mut self, rhs: Self) {
        *self = Expr::Add(Box::new(self.clone()), Box::new(rhs));
    }
}

impl std::ops::SubAssign for Expr {
    fn sub_assign(&mut self, rhs: Self) {
        *self = Expr::Sub(Box::new(self.clone()), Box::new(rhs));
    }
}

impl std::ops::MulAssign for Expr {
    fn mul_assign(&mut self, rhs: Self) {
        *self = Expr::Mul(Box::new(self.clone()), Box::new(rhs));
    }
}

impl std::ops::Neg for Expr {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Expr::Mul(Box::new(Expr::Const(-1.0)), Box::new(self))
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Const(value)
    }
}

/// Applies `op` to both children of a binary node or to the argument of a unary one,
/// keeping the node kind. Leaves are returned unchanged.
fn map_children(expr: &Expr, op: &dyn Fn(&Expr) -> Expr) -> Expr {
    match expr {
        Expr::Var(_) | Expr::Const(_) => expr.clone(),
        Expr::Add(lhs, rhs) => Expr::Add(Box::new(op(lhs)), Box::new(op(rhs))),
        Expr::Sub(lhs, rhs) => Expr::Sub(Box::new(op(lhs)), Box::new(op(rhs))),
        Expr::Mul(lhs, rhs) => Expr::Mul(Box::new(op(lhs)), Box::new(op(rhs))),
        Expr::Div(lhs, rhs) => Expr::Div(Box::new(op(lhs)), Box::new(op(rhs))),
        Expr::Pow(base, exp) => Expr::Pow(Box::new(op(base)), Box::new(op(exp))),
        Expr::Exp(e) => Expr::Exp(Box::new(op(e))),
        Expr::Ln(e) => Expr::Ln(Box::new(op(e))),
        Expr::sin(e) => Expr::sin(Box::new(op(e))),
        Expr::cos(e) => Expr::cos(Box::new(op(e))),
        Expr::tg(e) => Expr::tg(Box::new(op(e))),
        Expr::arcsin(e) => Expr::arcsin(Box::new(op(e))),
        Expr::arccos(e) => Expr::arccos(Box::new(op(e))),
        Expr::arctg(e) => Expr::arctg(Box::new(op(e))),
    }
}

impl Expr {
    /// Creates multiple symbolic variables from a comma-separated string.
    ///
    /// # Examples
    /// ```rust, ignore
    /// let vars = Expr::Symbols("x, y, z");
    /// assert_eq!(vars.len(), 3);
    /// ```
    pub fn Symbols(symbols: &str) -> Vec<Expr> {
        symbols
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| Expr::Var(s.to_string()))
            .collect()
    }

    pub fn boxed(self) -> Box<Self> {
        Box::new(self)
    }

    pub fn exp(self) -> Expr {
        Expr::Exp(self.boxed())
    }

    pub fn ln(self) -> Expr {
        Expr::Ln(self.boxed())
    }

    pub fn pow(self, exponent: Expr) -> Expr {
        Expr::Pow(self.boxed(), exponent.boxed())
    }

    pub fn contains_variable(&self, var_name: &str) -> bool {
        match self {
            Expr::Var(name) => name == var_name,
            Expr::Const(_) => false,
            Expr::Add(lhs, rhs)
            | Expr::Sub(lhs, rhs)
            | Expr::Mul(lhs, rhs)
            | Expr::Div(lhs, rhs)
            | Expr::Pow(lhs, rhs) => {
                lhs.contains_variable(var_name) || rhs.contains_variable(var_name)
            }
            Expr::Exp(e)
            | Expr::Ln(e)
            | Expr::sin(e)
            | Expr::cos(e)
            | Expr::tg(e)
            | Expr::arcsin(e)
            | Expr::arccos(e)
            | Expr::arctg(e) => e.contains_variable(var_name),
        }
    }

    /// Sorted, deduplicated list of all variable names in the expression.
    pub fn all_arguments_are_variables(&self) -> Vec<String> {
        let mut vars = Vec::new();
        self.collect_variables(&mut vars);
        vars.sort();
        vars.dedup();
        vars
    }

    fn collect_variables(&self, out: &mut Vec<String>) {
        match self {
            Expr::Var(name) => out.push(name.clone()),
            Expr::Const(_) => {}
            Expr::Add(lhs, rhs)
            | Expr::Sub(lhs, rhs)
            | Expr::Mul(lhs, rhs)
            | Expr::Div(lhs, rhs)
            | Expr::Pow(lhs, rhs) => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
            Expr::Exp(e)
            | Expr::Ln(e)
            | Expr::sin(e)
            | Expr::cos(e)
            | Expr::tg(e)
            | Expr::arcsin(e)
            | Expr::arccos(e)
            | Expr::arctg(e) => e.collect_variables(out),
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Expr::Const(v) if *v == 0.0)
    }

    fn is_one(&self) -> bool {
        matches!(self, Expr::Const(v) if *v == 1.0)
    }

    /// Lightweight simplification: folds constant sub-trees and removes neutral elements
    /// (`x + 0`, `x * 1`, `0 * x`, `x ^ 1`, `x ^ 0`, `0 / x`, `x / 1`).
    ///
    /// Derivatives produced by `diff` are full of such terms, so every derivative is passed
    /// through here before it is lambdified.
    pub fn simplify(&self) -> Expr {
        let node = map_children(self, &|e| e.simplify());
        match node {
            Expr::Add(lhs, rhs) => match (*lhs, *rhs) {
                (Expr::Const(a), Expr::Const(b)) => Expr::Const(a + b),
                (l, r) if l.is_zero() => r,
                (l, r) if r.is_zero() => l,
                (l, r) => Expr::Add(l.boxed(), r.boxed()),
            },
            Expr::Sub(lhs, rhs) => match (*lhs, *rhs) {
                (Expr::Const(a), Expr::Const(b)) => Expr::Const(a - b),
                (l, r) if r.is_zero() => l,
                (l, r) if l.is_zero() => Expr::Mul(Expr::Const(-1.0).boxed(), r.boxed()),
                (l, r) if l == r => Expr::Const(0.0),
                (l, r) => Expr::Sub(l.boxed(), r.boxed()),
            },
            Expr::Mul(lhs, rhs) => match (*lhs, *rhs) {
                (Expr::Const(a), Expr::Const(b)) => Expr::Const(a * b),
                (l, r) if l.is_zero() || r.is_zero() => Expr::Const(0.0),
                (l, r) if l.is_one() => r,
                (l, r) if r.is_one() => l,
                // (a * (b * x)) -> (a*b) * x
                (Expr::Const(a), Expr::Mul(inner_l, inner_r)) => match *inner_l {
                    Expr::Const(b) => Expr::Mul(Expr::Const(a * b).boxed(), inner_r),
                    other => Expr::Mul(
                        Expr::Const(a).boxed(),
                        Expr::Mul(other.boxed(), inner_r).boxed(),
                    ),
                },
                (l, r) => Expr::Mul(l.boxed(), r.boxed()),
            },
            Expr::Div(lhs, rhs) => match (*lhs, *rhs) {
                (Expr::Const(a), Expr::Const(b)) if b != 0.0 => Expr::Const(a / b),
                (l, r) if l.is_zero() && !r.is_zero() => Expr::Const(0.0),
                (l, r) if r.is_one() => l,
                (l, r) => Expr::Div(l.boxed(), r.boxed()),
            },
            Expr::Pow(base, exp) => match (*base, *exp) {
                (Expr::Const(a), Expr::Const(b)) => Expr::Const(a.powf(b)),
                (_, e) if e.is_zero() => Expr::Const(1.0),
                (b, e) if e.is_one() => b,
                (b, e) => Expr::Pow(b.boxed(), e.boxed()),
            },
            Expr::Exp(e) => match *e {
                Expr::Const(a) => Expr::Const(a.exp()),
                other => Expr::Exp(other.boxed()),
            },
            Expr::Ln(e) => match *e {
                Expr::Const(a) if a > 0.0 => Expr::Const(a.ln()),
                other => Expr::Ln(other.boxed()),
            },
            Expr::sin(e) => match *e {
                Expr::Const(a) => Expr::Const(a.sin()),
                other => Expr::sin(other.boxed()),
            },
            Expr::cos(e) => match *e {
                Expr::Const(a) => Expr::Const(a.cos()),
                other => Expr::cos(other.boxed()),
            },
            other => other,
        }
    }
}

