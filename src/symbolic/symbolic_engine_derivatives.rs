//! # Symbolic Engine Derivatives Module
//!
//! Analytical differentiation and string parsing for `Expr`.
//!
//! ## Key Methods
//! - `diff(var)` - analytical partial derivative (sum, product, quotient and chain rules)
//! - `parse_expression(input)` / `parse_vector_expression(input)` - string to `Expr`
//!
//! Use `lambdify` from `symbolic_lambdify` for repeated evaluation.

use crate::symbolic::parse_expr::parse_expression_func;
use crate::symbolic::symbolic_engine::Expr;
use log::debug;

impl Expr {
    /// Computes the analytical derivative of the expression with respect to a variable.
    ///
    /// - Power rule: d/dx(f^g) = g*f^(g-1)*f' + f^g*ln(f)*g' (the second term only
    ///   when the exponent depends on `var`)
    /// - Product rule: d/dx(f*g) = f'*g + f*g'
    /// - Quotient rule: d/dx(f/g) = (f'*g - f*g')/g^2
    /// - Chain rule for every elementary function
    ///
    /// The result is not simplified; call `simplify()` on it.
    ///
    /// # Examples
    /// ```rust, ignore
    /// let x = Expr::Var("x".to_string());
    /// let f = x.clone().pow(Expr::Const(2.0)); // x^2
    /// let df_dx = f.diff("x").simplify(); // 2*x
    /// ```
    pub fn diff(&self, var: &str) -> Expr {
        match self {
            Expr::Var(name) => {
                if name == var {
                    Expr::Const(1.0)
                } else {
                    Expr::Const(0.0)
                }
            }
            Expr::Const(_) => Expr::Const(0.0),
            Expr::Add(lhs, rhs) => Expr::Add(lhs.diff(var).boxed(), rhs.diff(var).boxed()),
            Expr::Sub(lhs, rhs) => Expr::Sub(lhs.diff(var).boxed(), rhs.diff(var).boxed()),
            Expr::Mul(lhs, rhs) => Expr::Add(
                Expr::Mul(lhs.diff(var).boxed(), rhs.clone()).boxed(),
                Expr::Mul(lhs.clone(), rhs.diff(var).boxed()).boxed(),
            ),
            Expr::Div(lhs, rhs) => Expr::Div(
                Expr::Sub(
                    Expr::Mul(lhs.diff(var).boxed(), rhs.clone()).boxed(),
                    Expr::Mul(rhs.diff(var).boxed(), lhs.clone()).boxed(),
                )
                .boxed(),
                Expr::Mul(rhs.clone(), rhs.clone()).boxed(),
            ),
            Expr::Pow(base, exp) => {
                let base_part = Expr::Mul(
                    Expr::Mul(
                        exp.clone(),
                        Expr::Pow(
                            base.clone(),
                            Expr::Sub(exp.clone(), Expr::Const(1.0).boxed()).boxed(),
                        )
                        .boxed(),
                    )
                    .boxed(),
                    base.diff(var).boxed(),
                );
                if exp.contains_variable(var) {
                    let exp_part = Expr::Mul(
                        Expr::Mul(self.clone().boxed(), Expr::Ln(base.clone()).boxed()).boxed(),
                        exp.diff(var).boxed(),
                    );
                    Expr::Add(base_part.boxed(), exp_part.boxed())
                } else {
                    base_part
                }
            }
            Expr::Exp(expr) => Expr::Mul(Expr::Exp(expr.clone()).boxed(), expr.diff(var).boxed()),
            Expr::Ln(expr) => Expr::Div(expr.diff(var).boxed(), expr.clone()),
            Expr::sin(expr) => Expr::Mul(Expr::cos(expr.clone()).boxed(), expr.diff(var).boxed()),
            Expr::cos(expr) => Expr::Mul(
                Expr::Mul(Expr::Const(-1.0).boxed(), Expr::sin(expr.clone()).boxed()).boxed(),
                expr.diff(var).boxed(),
            ),
            Expr::tg(expr) => Expr::Mul(
                Expr::Div(
                    Expr::Const(1.0).boxed(),
                    Expr::Pow(Expr::cos(expr.clone()).boxed(), Expr::Const(2.0).boxed()).boxed(),
                )
                .boxed(),
                expr.diff(var).boxed(),
            ),
            Expr::arcsin(expr) => Expr::Div(
                expr.diff(var).boxed(),
                Expr::Pow(
                    Expr::Sub(
                        Expr::Const(1.0).boxed(),
                        Expr::Pow(expr.clone(), Expr::Const(2.0).boxed()).boxed(),
                    )
                    .boxed(),
                    Expr::Const(0.5).boxed(),
                )
                .boxed(),
            ),
            Expr::arccos(expr) => Expr::Div(
                Expr::Mul(Expr::Const(-1.0).boxed(), expr.diff(var).boxed()).boxed(),
                Expr::Pow(
                    Expr::Sub(
                        Expr::Const(1.0).boxed(),
                        Expr::Pow(expr.clone(), Expr::Const(2.0).boxed()).boxed(),
                    )
                    .boxed(),
                    Expr::Const(0.5).boxed(),
                )
                .boxed(),
            ),
            Expr::arctg(expr) => Expr::Div(
                expr.diff(var).boxed(),
                Expr::Add(
                    Expr::Const(1.0).boxed(),
                    Expr::Pow(expr.clone(), Expr::Const(2.0).boxed()).boxed(),
                )
                .boxed(),
            ),
        }
    } // end of diff

    /// Parses a mathematical expression from string representation.
    ///
    /// # Supported Syntax
    /// - Variables: x, y, var_name, cstr.T
    /// - Constants: 3.14, 2.5e-3
    /// - Operators: +, -, *, /, ^ (power is right-associative), unary minus
    /// - Functions: exp, ln, log, sin, cos, tg/tan, arcsin, arccos, arctg/atan, sqrt
    /// - Parentheses for grouping
    ///
    /// # Examples
    /// ```rust, ignore
    /// let expr = Expr::parse_expression("x^2 + 2*x + 1")?;
    /// ```
    pub fn parse_expression(input: &str) -> Result<Expr, String> {
        let expr = parse_expression_func(input)?;
        debug!("parsed expression '{}' as {}", input, expr);
        Ok(expr)
    }

    /// Parses multiple expressions, failing on the first one that does not parse.
    pub fn parse_vector_expression(input: &[&str]) -> Result<Vec<Expr>, String> {
        input.iter().map(|s| Expr::parse_expression(s)).collect()
    }
}
