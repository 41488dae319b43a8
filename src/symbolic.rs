#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
/// a module turns a String expression into a symbolic expression
///
///# Example
/// ```
/// use RustedOCP::symbolic::symbolic_engine::Expr;
/// let parsed_expression = Expr::parse_expression("x^2.3*ln(x+y+y^2.6)").unwrap();
/// println!(" parsed_expression {}", parsed_expression);
/// let parsed_function = parsed_expression.lambdify_borrowed_thread_safe(&["x", "y"]).unwrap();
/// println!("Rust function: {}", parsed_function(&[1.0, 2.0]));
///  ```
/// ________________________________________________________________________________________________________________________________
pub mod parse_expr;
///____________________________________________________________________________________________________________________________
/// # Symbolic engine
/// a module
/// 1) represents model equations as expression trees in named variables
/// 2) substitutes and simplifies them
/// 3) turns a symbolic expression into a string expression for printing and control results
pub mod symbolic_engine;
/// analytical derivatives and parsing from strings
pub mod symbolic_engine_derivatives;
/// symbolic expression -> `Box<dyn Fn(&[f64]) -> f64 + Send + Sync>`
pub mod symbolic_lambdify;
/// # Jacobian
/// symbolic Jacobian of a vector function computed in parallel, compiled into
/// `LambdifiedVector` / `LambdifiedMatrix` (structurally non-zero entries only)
/// ```
/// use RustedOCP::symbolic::symbolic_functions::Jacobian;
/// use RustedOCP::symbolic::symbolic_engine::Expr;
/// let f = Expr::parse_vector_expression(&["x^2+y^2-10", "x-y-4"]).unwrap();
/// let mut jac = Jacobian::from_vectors(f, Expr::Symbols("x, y"));
/// jac.calc_jacobian();
/// let j = jac.jacobian_generate(&["x", "y"]).unwrap();
/// assert_eq!(j.evaluate_DMatrix(&[1.0, 1.0])[(0, 0)], 2.0);
/// ```
pub mod symbolic_functions;
mod symbolic_engine_tests;
