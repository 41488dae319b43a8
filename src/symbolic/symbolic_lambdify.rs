use crate::symbolic::symbolic_engine::Expr;

/// Compiled scalar function of a flat argument slice. Shared between rayon workers.
pub type LambdifiedFn = Box<dyn Fn(&[f64]) -> f64 + Send + Sync>;

impl Expr {
    // LAMBDIFICATION - Converting Symbolic Expressions to Executable Functions

    /// Converts the expression into a thread-safe closure of `args`, where `args[i]` is the
    /// value of `vars[i]`.
    ///
    /// The tree is walked once here; calling the closure does no lookups or parsing.
    /// Fails if the expression contains a variable that is not listed in `vars`.
    ///
    /// # Examples
    /// ```rust, ignore
    /// let f = Expr::parse_expression("x^2 + y")?;
    /// let func = f.lambdify_borrowed_thread_safe(&["x", "y"])?;
    /// assert_eq!(func(&[3.0, 1.0]), 10.0);
    /// ```
    pub fn lambdify_borrowed_thread_safe(&self, vars: &[&str]) -> Result<LambdifiedFn, String> {
        let f: LambdifiedFn = match self {
            Expr::Var(name) => {
                let index = vars.iter().position(|&x| x == name.as_str()).ok_or_else(|| {
                    format!(
                        "variable '{}' is not among the function arguments [{}]",
                        name,
                        vars.join(", ")
                    )
                })?;
                Box::new(move |args| args[index])
            }
            Expr::Const(val) => {
                let val = *val;
                Box::new(move |_| val)
            }
            Expr::Add(lhs, rhs) => {
                let lf = lhs.lambdify_borrowed_thread_safe(vars)?;
                let rf = rhs.lambdify_borrowed_thread_safe(vars)?;
                Box::new(move |args| lf(args) + rf(args))
            }
            Expr::Sub(lhs, rhs) => {
                let lf = lhs.lambdify_borrowed_thread_safe(vars)?;
                let rf = rhs.lambdify_borrowed_thread_safe(vars)?;
                Box::new(move |args| lf(args) - rf(args))
            }
            Expr::Mul(lhs, rhs) => {
                let lf = lhs.lambdify_borrowed_thread_safe(vars)?;
                let rf = rhs.lambdify_borrowed_thread_safe(vars)?;
                Box::new(move |args| lf(args) * rf(args))
            }
            Expr::Div(lhs, rhs) => {
                let lf = lhs.lambdify_borrowed_thread_safe(vars)?;
                let rf = rhs.lambdify_borrowed_thread_safe(vars)?;
                Box::new(move |args| lf(args) / rf(args))
            }
            Expr::Pow(b, e) => {
                let bf = b.lambdify_borrowed_thread_safe(vars)?;
                match e.as_ref() {
                    // integer exponents are frequent in cost functions
                    Expr::Const(n) if n.fract() == 0.0 && n.abs() <= i32::MAX as f64 => {
                        let n = *n as i32;
                        Box::new(move |args| bf(args).powi(n))
                    }
                    _ => {
                        let ef = e.lambdify_borrowed_thread_safe(vars)?;
                        Box::new(move |args| bf(args).powf(ef(args)))
                    }
                }
            }
            Expr::Exp(e) => {
                let f = e.lambdify_borrowed_thread_safe(vars)?;
                Box::new(move |args| f(args).exp())
            }
            Expr::Ln(e) => {
                let f = e.lambdify_borrowed_thread_safe(vars)?;
                Box::new(move |args| f(args).ln())
            }
            Expr::sin(e) => {
                let f = e.lambdify_borrowed_thread_safe(vars)?;
                Box::new(move |args| f(args).sin())
            }
            Expr::cos(e) => {
                let f = e.lambdify_borrowed_thread_safe(vars)?;
                Box::new(move |args| f(args).cos())
            }
            Expr::tg(e) => {
                let f = e.lambdify_borrowed_thread_safe(vars)?;
                Box::new(move |args| f(args).tan())
            }
            Expr::arcsin(e) => {
                let f = e.lambdify_borrowed_thread_safe(vars)?;
                Box::new(move |args| f(args).asin())
            }
            Expr::arccos(e) => {
                let f = e.lambdify_borrowed_thread_safe(vars)?;
                Box::new(move |args| f(args).acos())
            }
            Expr::arctg(e) => {
                let f = e.lambdify_borrowed_thread_safe(vars)?;
                Box::new(move |args| f(args).atan())
            }
        };
        Ok(f)
    } // end of lambdify
}
