//! Solver-facing nonlinear program
//!
//! minimize J(v)  subject to  lb_g ≤ g(v) ≤ ub_g,  lb_v ≤ v ≤ ub_v,  starting from v0.
//!
//! `NlpProblem` is the only thing an NLP solver sees; equality rows have `lb_g = ub_g`.
use crate::numerical::optimal_control::ocp_error::{OcpError, OcpResult};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use std::sync::Arc;
use strum_macros::{Display, EnumIter};

/// Objective, constraints and their exact first derivatives at one point.
#[derive(Debug, Clone)]
pub struct NlpEvaluation {
    pub objective: f64,
    pub gradient: DVector<f64>,
    pub constraints: DVector<f64>,
    pub jacobian: CsrMatrix<f64>,
}

/// Evaluable functions of an NLP. Callers guarantee `v.len() == nv()`.
pub trait NlpFunctions: Send + Sync {
    fn nv(&self) -> usize;
    fn ng(&self) -> usize;
    fn objective(&self, v: &[f64]) -> OcpResult<f64>;
    fn objective_gradient(&self, v: &[f64]) -> OcpResult<DVector<f64>>;
    fn constraints(&self, v: &[f64]) -> OcpResult<DVector<f64>>;
    /// constraint Jacobian with the fixed pattern `jacobian_sparsity()`
    fn constraint_jacobian(&self, v: &[f64]) -> OcpResult<CsrMatrix<f64>>;
    /// (row, column) of every stored Jacobian entry, row-major
    fn jacobian_sparsity(&self) -> &[(usize, usize)];

    /// All four quantities at once. Implementations that share work between them
    /// override this.
    fn evaluate(&self, v: &[f64]) -> OcpResult<NlpEvaluation> {
        Ok(NlpEvaluation {
            objective: self.objective(v)?,
            gradient: self.objective_gradient(v)?,
            constraints: self.constraints(v)?,
            jacobian: self.constraint_jacobian(v)?,
        })
    }
}

pub struct NlpProblem {
    functions: Arc<dyn NlpFunctions>,
    pub lb_v: DVector<f64>,
    pub ub_v: DVector<f64>,
    pub v0: DVector<f64>,
    pub lb_g: DVector<f64>,
    pub ub_g: DVector<f64>,
}

impl NlpProblem {
    pub fn new(
        functions: Arc<dyn NlpFunctions>,
        lb_v: DVector<f64>,
        ub_v: DVector<f64>,
        v0: DVector<f64>,
        lb_g: DVector<f64>,
        ub_g: DVector<f64>,
    ) -> OcpResult<Self> {
        let nv = functions.nv();
        let ng = functions.ng();
        OcpError::check_len("lb_v", nv, lb_v.len())?;
        OcpError::check_len("ub_v", nv, ub_v.len())?;
        OcpError::check_len("v0", nv, v0.len())?;
        OcpError::check_len("lb_g", ng, lb_g.len())?;
        OcpError::check_len("ub_g", ng, ub_g.len())?;
        let bad_bounds = lb_v
            .iter()
            .zip(ub_v.iter())
            .chain(lb_g.iter().zip(ub_g.iter()))
            .any(|(l, u)| l.is_nan() || u.is_nan() || l > u);
        if bad_bounds {
            return Err(OcpError::configuration("NLP bounds with lb > ub or NaN"));
        }
        Ok(Self {
            functions,
            lb_v,
            ub_v,
            v0,
            lb_g,
            ub_g,
        })
    }

    pub fn nv(&self) -> usize {
        self.functions.nv()
    }

    pub fn ng(&self) -> usize {
        self.functions.ng()
    }

    fn check(&self, v: &[f64]) -> OcpResult<()> {
        OcpError::check_len("decision vector", self.nv(), v.len())
    }

    pub fn objective(&self, v: &[f64]) -> OcpResult<f64> {
        self.check(v)?;
        self.functions.objective(v)
    }

    pub fn objective_gradient(&self, v: &[f64]) -> OcpResult<DVector<f64>> {
        self.check(v)?;
        self.functions.objective_gradient(v)
    }

    pub fn constraints(&self, v: &[f64]) -> OcpResult<DVector<f64>> {
        self.check(v)?;
        self.functions.constraints(v)
    }

    pub fn constraint_jacobian(&self, v: &[f64]) -> OcpResult<CsrMatrix<f64>> {
        self.check(v)?;
        self.functions.constraint_jacobian(v)
    }

    pub fn constraint_jacobian_dense(&self, v: &[f64]) -> OcpResult<DMatrix<f64>> {
        Ok(DMatrix::from(&self.constraint_jacobian(v)?))
    }

    pub fn jacobian_sparsity(&self) -> &[(usize, usize)] {
        self.functions.jacobian_sparsity()
    }

    pub fn evaluate(&self, v: &[f64]) -> OcpResult<NlpEvaluation> {
        self.check(v)?;
        self.functions.evaluate(v)
    }

    /// max over rows of the distance of g(v) from [lb_g, ub_g]
    pub fn constraint_violation(&self, g: &DVector<f64>) -> f64 {
        g.iter()
            .zip(self.lb_g.iter().zip(self.ub_g.iter()))
            .map(|(gi, (l, u))| (l - gi).max(gi - u).max(0.0))
            .fold(0.0, f64::max)
    }

    /// true when every constraint row is an equality
    pub fn is_equality_constrained(&self) -> bool {
        self.lb_g.iter().zip(self.ub_g.iter()).all(|(l, u)| l == u)
    }
}

/// How an NLP solver run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum NlpStatus {
    Converged,
    MaxIterationsReached,
    Infeasible,
    NumericalFailure,
}

#[derive(Debug, Clone)]
pub struct NlpSolution {
    pub v: DVector<f64>,
    pub objective: f64,
    pub constraint_violation: f64,
    pub iterations: usize,
    pub status: NlpStatus,
}

impl NlpSolution {
    pub fn is_converged(&self) -> bool {
        self.status == NlpStatus::Converged
    }

    /// `SolverNonConvergence` unless the solver converged
    pub fn check_converged(&self) -> OcpResult<()> {
        if self.is_converged() {
            Ok(())
        } else {
            Err(OcpError::SolverNonConvergence {
                status: self.status,
                iterations: self.iterations,
                constraint_violation: self.constraint_violation,
            })
        }
    }
}

/// Any NLP solver usable by the transcription pipeline.
pub trait NlpSolver {
    fn solve(&self, problem: &NlpProblem) -> OcpResult<NlpSolution>;
}
