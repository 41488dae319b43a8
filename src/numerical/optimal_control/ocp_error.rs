use crate::numerical::optimal_control::nlp_problem::NlpStatus;
use strum_macros::Display;
use thiserror::Error;

/// Model function whose evaluation produced a non-finite value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ModelFunction {
    #[strum(serialize = "ODE right-hand side f(x,u)")]
    Ode,
    #[strum(serialize = "ODE Jacobian df/d(x,u)")]
    OdeJacobian,
    #[strum(serialize = "running cost L(x,u)")]
    Cost,
    #[strum(serialize = "running cost gradient dL/d(x,u)")]
    CostGradient,
    #[strum(serialize = "initial-condition residual I(x)")]
    Init,
    #[strum(serialize = "initial-condition Jacobian dI/dx")]
    InitJacobian,
}

/// Errors of the transcription pipeline: configuration checks, numeric evaluation,
/// the NLP solver, parsing and export.
#[derive(Debug, Error)]
pub enum OcpError {
    #[error("invalid configuration: {reason}")]
    Configuration { reason: String },

    #[error("dimension mismatch in {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        found: usize,
    },

    #[error(
        "non-finite value of {function}{} at x = {x:?}, u = {u:?}",
        location(.interval, .substep, .stage)
    )]
    Evaluation {
        function: ModelFunction,
        interval: Option<usize>,
        substep: Option<usize>,
        stage: Option<usize>,
        x: Vec<f64>,
        u: Vec<f64>,
    },

    #[error(
        "NLP solver stopped with status {status} after {iterations} iterations (constraint violation {constraint_violation:e})"
    )]
    SolverNonConvergence {
        status: NlpStatus,
        iterations: usize,
        constraint_violation: f64,
    },

    #[error("cannot parse '{input}': {reason}")]
    Parse { input: String, reason: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

fn location(interval: &Option<usize>, substep: &Option<usize>, stage: &Option<usize>) -> String {
    let mut s = String::new();
    if let Some(k) = interval {
        s.push_str(&format!(" in interval {}", k));
    }
    if let Some(j) = substep {
        s.push_str(&format!(" sub-step {}", j));
    }
    if let Some(st) = stage {
        s.push_str(&format!(" RK4 stage {}", st));
    }
    s
}

impl OcpError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        OcpError::Configuration {
            reason: reason.into(),
        }
    }

    /// Errors `DimensionMismatch` unless `found == expected`.
    pub fn check_len(what: &str, expected: usize, found: usize) -> OcpResult<()> {
        if expected == found {
            Ok(())
        } else {
            Err(OcpError::DimensionMismatch {
                what: what.to_string(),
                expected,
                found,
            })
        }
    }

    /// Tags an evaluation error with the shooting interval it occurred in.
    pub fn with_interval(self, k: usize) -> Self {
        match self {
            OcpError::Evaluation {
                function,
                substep,
                stage,
                x,
                u,
                ..
            } => OcpError::Evaluation {
                function,
                interval: Some(k),
                substep,
                stage,
                x,
                u,
            },
            other => other,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            OcpError::Configuration { .. } | OcpError::DimensionMismatch { .. }
        )
    }
}

pub type OcpResult<T> = Result<T, OcpError>;
