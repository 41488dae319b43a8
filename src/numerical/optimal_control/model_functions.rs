//! Evaluable model functions consumed by the integrator and the transcriber.
//!
//! All functions take the concatenated argument `xu = [x_1..x_nx, u_1..u_nu]` and write into
//! caller-owned buffers, so one evaluation does not allocate. Implementations must be
//! `Send + Sync`: the shooting intervals are evaluated on rayon workers.
use crate::numerical::optimal_control::ocp_error::{OcpError, OcpResult};
use crate::numerical::optimal_control::ocp_model::OcpModel;
use crate::symbolic::symbolic_engine::Expr;
use crate::symbolic::symbolic_functions::{Jacobian, LambdifiedMatrix, LambdifiedVector};
use crate::symbolic::symbolic_lambdify::LambdifiedFn;
use log::debug;
use nalgebra::DMatrix;

/// f(x,u), L(x,u) and their first derivatives.
pub trait OdeFunctions: Send + Sync {
    fn nx(&self) -> usize;
    fn nu(&self) -> usize;
    /// f(x,u) -> `out` (nx)
    fn rhs(&self, xu: &[f64], out: &mut [f64]);
    /// L(x,u)
    fn cost(&self, xu: &[f64]) -> f64;
    /// [df/dx | df/du] -> `out` (nx x (nx+nu))
    fn rhs_jacobian(&self, xu: &[f64], out: &mut DMatrix<f64>);
    /// [dL/dx, dL/du] -> `out` (nx+nu)
    fn cost_gradient(&self, xu: &[f64], out: &mut [f64]);
}

/// I(x) and its Jacobian.
pub trait InitFunctions: Send + Sync {
    fn nx(&self) -> usize;
    fn n_init(&self) -> usize;
    fn residual(&self, x: &[f64], out: &mut [f64]);
    /// dI/dx -> `out` (n_init x nx)
    fn jacobian(&self, x: &[f64], out: &mut DMatrix<f64>);
    /// (row, column) of the structurally non-zero entries of dI/dx, row-major order
    fn jacobian_sparsity(&self) -> Vec<(usize, usize)>;
}

fn compile_error(what: &str) -> impl Fn(String) -> OcpError + '_ {
    move |reason| OcpError::configuration(format!("cannot compile {}: {}", what, reason))
}

/// `OdeFunctions` compiled from the symbolic model: closures for f and L, symbolic
/// Jacobian of f and gradient of L, each built once.
pub struct SymbolicOde {
    nx: usize,
    nu: usize,
    rhs: LambdifiedVector,
    rhs_jacobian: LambdifiedMatrix,
    cost: LambdifiedFn,
    cost_gradient: LambdifiedVector,
}

impl SymbolicOde {
    pub fn new(model: &OcpModel) -> OcpResult<Self> {
        let args = model.arguments();
        let arg_exprs = Expr::Symbols(&args.join(","));

        let mut f_jac = Jacobian::from_vectors(model.ode.clone(), arg_exprs.clone());
        f_jac.calc_jacobian();
        let rhs = f_jac
            .lambdify_funcvector(&args)
            .map_err(compile_error("ODE right-hand side"))?;
        let rhs_jacobian = f_jac
            .jacobian_generate(&args)
            .map_err(compile_error("ODE Jacobian"))?;

        let mut l_jac = Jacobian::from_vectors(vec![model.cost.clone()], arg_exprs);
        l_jac.calc_jacobian();
        let cost = model
            .cost
            .lambdify_borrowed_thread_safe(&args)
            .map_err(compile_error("running cost"))?;
        let gradient_exprs = l_jac.symbolic_jacobian.into_iter().flatten().collect();
        let cost_gradient = Jacobian::from_vectors(gradient_exprs, Vec::new())
            .lambdify_funcvector(&args)
            .map_err(compile_error("running cost gradient"))?;

        debug!(
            "compiled ODE: {} equations, {} non-zero Jacobian entries",
            rhs.len(),
            rhs_jacobian.entries.len()
        );
        Ok(Self {
            nx: model.nx(),
            nu: model.nu(),
            rhs,
            rhs_jacobian,
            cost,
            cost_gradient,
        })
    }
}

impl OdeFunctions for SymbolicOde {
    fn nx(&self) -> usize {
        self.nx
    }

    fn nu(&self) -> usize {
        self.nu
    }

    fn rhs(&self, xu: &[f64], out: &mut [f64]) {
        self.rhs.eval_into(xu, out)
    }

    fn cost(&self, xu: &[f64]) -> f64 {
        (self.cost)(xu)
    }

    fn rhs_jacobian(&self, xu: &[f64], out: &mut DMatrix<f64>) {
        self.rhs_jacobian.eval_into(xu, out)
    }

    fn cost_gradient(&self, xu: &[f64], out: &mut [f64]) {
        self.cost_gradient.eval_into(xu, out)
    }
}

/// `InitFunctions` compiled from the symbolic initial-condition residual.
pub struct SymbolicInit {
    nx: usize,
    residual: LambdifiedVector,
    jacobian: LambdifiedMatrix,
}

impl SymbolicInit {
    pub fn new(model: &OcpModel) -> OcpResult<Self> {
        let states: Vec<&str> = model.states.iter().map(|s| s.as_str()).collect();
        let mut jac = Jacobian::from_vectors(
            model.init.clone(),
            states.iter().map(|s| Expr::Var(s.to_string())).collect(),
        );
        jac.calc_jacobian();
        let residual = jac
            .lambdify_funcvector(&states)
            .map_err(compile_error("initial-condition residual"))?;
        let jacobian = jac
            .jacobian_generate(&states)
            .map_err(compile_error("initial-condition Jacobian"))?;
        Ok(Self {
            nx: model.nx(),
            residual,
            jacobian,
        })
    }
}

impl InitFunctions for SymbolicInit {
    fn nx(&self) -> usize {
        self.nx
    }

    fn n_init(&self) -> usize {
        self.residual.len()
    }

    fn residual(&self, x: &[f64], out: &mut [f64]) {
        self.residual.eval_into(x, out)
    }

    fn jacobian(&self, x: &[f64], out: &mut DMatrix<f64>) {
        self.jacobian.eval_into(x, out)
    }

    fn jacobian_sparsity(&self) -> Vec<(usize, usize)> {
        self.jacobian.sparsity_pattern()
    }
}
