#![allow(non_camel_case_types)]

use crate::symbolic::symbolic_engine::Expr;
use crate::symbolic::symbolic_lambdify::LambdifiedFn;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

///
/// calculate symbolic jacobian and turn it into compiled functions
/// Example#
/// ```
/// use RustedOCP::symbolic::symbolic_functions::Jacobian;
/// use RustedOCP::symbolic::symbolic_engine::Expr;
/// let functions = Expr::parse_vector_expression(&["2*x^3+y", "1"]).unwrap();
/// let mut jacobian_instance = Jacobian::from_vectors(functions, Expr::Symbols("x, y"));
/// // calculate symbolic jacobian
/// jacobian_instance.calc_jacobian();
/// // generate jacobian made of regular rust functions
/// let jac = jacobian_instance.jacobian_generate(&["x", "y"]).unwrap();
/// let evaluated = jac.evaluate_DMatrix(&[10.0, 2.0]);
/// assert_eq!(evaluated[(0, 0)], 600.0);
/// assert_eq!(evaluated[(1, 1)], 0.0);
/// ```
pub struct Jacobian {
    pub vector_of_functions: Vec<Expr>, // vector of symbolic functions/expressions
    pub vector_of_variables: Vec<Expr>, // vector of symbolic variables
    pub variable_string: Vec<String>,   // vector of string representation of variables
    pub symbolic_jacobian: Vec<Vec<Expr>>, // vector of symbolic jacobian
}

impl Jacobian {
    pub fn from_vectors(vector_of_functions: Vec<Expr>, vector_of_variables: Vec<Expr>) -> Self {
        let variable_string = vector_of_variables.iter().map(|v| v.to_string()).collect();
        Self {
            vector_of_functions,
            vector_of_variables,
            variable_string,
            symbolic_jacobian: Vec::new(),
        }
    }

    /// calculate the symbolic jacobian in parallel. Functions that do not contain a
    /// variable get an exact zero without differentiation.
    pub fn calc_jacobian(&mut self) {
        let variable_string_vec = &self.variable_string;
        self.symbolic_jacobian = self
            .vector_of_functions
            .par_iter()
            .map(|func| {
                variable_string_vec
                    .par_iter()
                    .map(|var| {
                        if func.contains_variable(var) {
                            func.diff(var).simplify()
                        } else {
                            Expr::Const(0.0)
                        }
                    })
                    .collect()
            })
            .collect();
    }

    /// compile the function vector over the argument list `variable_str`
    pub fn lambdify_funcvector(&self, variable_str: &[&str]) -> Result<LambdifiedVector, String> {
        let functions = self
            .vector_of_functions
            .iter()
            .map(|f| f.lambdify_borrowed_thread_safe(variable_str))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(LambdifiedVector { functions })
    }

    /// creating function jacobian: a matrix of compiled partial derivatives. Only
    /// structurally non-zero entries are compiled and evaluated.
    pub fn jacobian_generate(&self, variable_str: &[&str]) -> Result<LambdifiedMatrix, String> {
        let nrows = self.vector_of_functions.len();
        let ncols = self.vector_of_variables.len();
        let entries = self
            .symbolic_jacobian
            .par_iter()
            .enumerate()
            .flat_map_iter(|(i, row)| {
                row.iter()
                    .enumerate()
                    .filter(|(_, e)| !e.is_zero())
                    .map(move |(j, e)| {
                        e.lambdify_borrowed_thread_safe(variable_str)
                            .map(|f| (i, j, f))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(LambdifiedMatrix {
            nrows,
            ncols,
            entries,
        })
    }
}

/// Compiled vector function `R^n -> R^m`.
pub struct LambdifiedVector {
    pub functions: Vec<LambdifiedFn>,
}

impl LambdifiedVector {
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// writes `f_i(args)` into `out[i]`; `out` must have `len()` entries
    pub fn eval_into(&self, args: &[f64], out: &mut [f64]) {
        for (slot, f) in out.iter_mut().zip(self.functions.iter()) {
            *slot = f(args);
        }
    }

    pub fn evaluate_DVector(&self, args: &[f64]) -> DVector<f64> {
        DVector::from_iterator(self.functions.len(), self.functions.iter().map(|f| f(args)))
    }
}

/// Compiled Jacobian stored as a list of structurally non-zero entries.
pub struct LambdifiedMatrix {
    pub nrows: usize,
    pub ncols: usize,
    pub entries: Vec<(usize, usize, LambdifiedFn)>,
}

impl LambdifiedMatrix {
    /// overwrites `out` (nrows x ncols) with the Jacobian at `args`
    pub fn eval_into(&self, args: &[f64], out: &mut DMatrix<f64>) {
        out.fill(0.0);
        for (i, j, f) in &self.entries {
            out[(*i, *j)] = f(args);
        }
    }

    pub fn evaluate_DMatrix(&self, args: &[f64]) -> DMatrix<f64> {
        let mut out = DMatrix::zeros(self.nrows, self.ncols);
        self.eval_into(args, &mut out);
        out
    }

    /// (row, column) positions of the structurally non-zero entries
    pub fn sparsity_pattern(&self) -> Vec<(usize, usize)> {
        self.entries.iter().map(|(i, j, _)| (*i, *j)).collect()
    }
}
