//! Fixed-step RK4 state-transition map of one shooting interval.
//!
//! The state and the running-cost quadrature are advanced together with the classical
//! RK4 scheme, `nj` equal sub-steps of `h = dt/nj`, control held constant:
//! ```text
//! k1 = f(x_j, u)             k1_L = L(x_j, u)
//! k2 = f(x_j + h/2 k1, u)    k2_L = L(x_j + h/2 k1, u)
//! k3 = f(x_j + h/2 k2, u)    k3_L = L(x_j + h/2 k2, u)
//! k4 = f(x_j + h k3, u)      k4_L = L(x_j + h k3, u)
//! x_{j+1} = x_j + h/6 (k1 + 2k2 + 2k3 + k4),   Q_{j+1} = Q_j + h/6 (k1_L + 2k2_L + 2k3_L + k4_L)
//! ```
//! `eval_with_sensitivities` differentiates this recurrence itself (not the ODE), so the
//! returned derivatives are exact for the discrete map. With `Y = dy/d(x0,u)` of the stage
//! point `y = x_j + c h k_prev`:
//! ```text
//! Y_x = S_x + c h K_prev_x           Y_u = S_u + c h K_prev_u
//! K_x = f_x(y) Y_x                   K_u = f_x(y) Y_u + f_u(y)
//! kL_x = Y_x^T L_x(y)                kL_u = Y_u^T L_x(y) + L_u(y)
//! ```
//! with `S_x = I`, `S_u = 0` at the start of the interval.
use crate::numerical::optimal_control::model_functions::OdeFunctions;
use crate::numerical::optimal_control::ocp_error::{ModelFunction, OcpError, OcpResult};
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;

const STAGE_NODES: [f64; 4] = [0.0, 0.5, 0.5, 1.0];
const STAGE_WEIGHTS: [f64; 4] = [1.0, 2.0, 2.0, 1.0];

/// Builds `IntervalMap`s for a fixed interval duration and sub-step count.
#[derive(Debug, Clone, Copy)]
pub struct FixedStepIntegrator {
    dt: f64,
    nj: usize,
}

impl FixedStepIntegrator {
    pub fn new(dt: f64, nj: usize) -> OcpResult<Self> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(OcpError::configuration(format!(
                "interval duration must be finite and positive, got {}",
                dt
            )));
        }
        if nj == 0 {
            return Err(OcpError::configuration(
                "number of RK4 sub-steps per interval must be at least 1",
            ));
        }
        Ok(Self { dt, nj })
    }

    pub fn build(&self, functions: Arc<dyn OdeFunctions>) -> IntervalMap {
        IntervalMap {
            nx: functions.nx(),
            nu: functions.nu(),
            functions,
            dt: self.dt,
            nj: self.nj,
            h: self.dt / self.nj as f64,
        }
    }
}

/// `(x_start, u) -> (x_end, ΔL)` over one interval.
#[derive(Debug, Clone)]
pub struct IntervalResult {
    pub x_end: DVector<f64>,
    pub cost: f64,
}

/// Interval result plus exact derivatives of the discrete map.
#[derive(Debug, Clone)]
pub struct IntervalSensitivity {
    pub x_end: DVector<f64>,
    pub cost: f64,
    /// d x_end / d x_start (nx x nx)
    pub dx_dx: DMatrix<f64>,
    /// d x_end / d u (nx x nu)
    pub dx_du: DMatrix<f64>,
    /// d ΔL / d x_start (nx)
    pub dcost_dx: DVector<f64>,
    /// d ΔL / d u (nu)
    pub dcost_du: DVector<f64>,
}

/// One interval of RK4 sub-steps, built once and shared by all shooting intervals.
#[derive(Clone)]
pub struct IntervalMap {
    functions: Arc<dyn OdeFunctions>,
    nx: usize,
    nu: usize,
    dt: f64,
    nj: usize,
    h: f64,
}

impl IntervalMap {
    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn nj(&self) -> usize {
        self.nj
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn nu(&self) -> usize {
        self.nu
    }

    fn check_args(&self, x: &[f64], u: &[f64]) -> OcpResult<()> {
        OcpError::check_len("interval start state", self.nx, x.len())?;
        OcpError::check_len("interval control", self.nu, u.len())
    }

    fn stage_error(
        &self,
        function: ModelFunction,
        substep: usize,
        stage: usize,
        xu: &[f64],
    ) -> OcpError {
        OcpError::Evaluation {
            function,
            interval: None,
            substep: Some(substep),
            stage: Some(stage + 1),
            x: xu[..self.nx].to_vec(),
            u: xu[self.nx..].to_vec(),
        }
    }

    /// Propagates `x_start` over `dt` with the control held at `u`.
    pub fn eval(&self, x: &[f64], u: &[f64]) -> OcpResult<IntervalResult> {
        self.check_args(x, u)?;
        let (nx, h) = (self.nx, self.h);
        let mut xu = [x, u].concat();
        let mut x_j = DVector::from_column_slice(x);
        let mut cost = 0.0;
        let mut k: [DVector<f64>; 4] = std::array::from_fn(|_| DVector::zeros(nx));
        let mut k_l = [0.0; 4];

        for j in 0..self.nj {
            for s in 0..4 {
                for i in 0..nx {
                    xu[i] = if s == 0 {
                        x_j[i]
                    } else {
                        x_j[i] + STAGE_NODES[s] * h * k[s - 1][i]
                    };
                }
                self.functions.rhs(&xu, k[s].as_mut_slice());
                if k[s].iter().any(|v| !v.is_finite()) {
                    return Err(self.stage_error(ModelFunction::Ode, j, s, &xu));
                }
                k_l[s] = self.functions.cost(&xu);
                if !k_l[s].is_finite() {
                    return Err(self.stage_error(ModelFunction::Cost, j, s, &xu));
                }
            }
            x_j += (h / 6.0) * (&k[0] + 2.0 * &k[1] + 2.0 * &k[2] + &k[3]);
            cost += (h / 6.0) * (k_l[0] + 2.0 * k_l[1] + 2.0 * k_l[2] + k_l[3]);
        }

        Ok(IntervalResult { x_end: x_j, cost })
    }

    /// Same propagation as `eval`, carrying the derivatives of every stage along.
    pub fn eval_with_sensitivities(&self, x: &[f64], u: &[f64]) -> OcpResult<IntervalSensitivity> {
        self.check_args(x, u)?;
        let (nx, nu, h) = (self.nx, self.nu, self.h);
        let mut xu = [x, u].concat();
        let mut x_j = DVector::from_column_slice(x);
        let mut cost = 0.0;
        let mut s_x = DMatrix::<f64>::identity(nx, nx);
        let mut s_u = DMatrix::<f64>::zeros(nx, nu);
        let mut l_x = DVector::<f64>::zeros(nx);
        let mut l_u = DVector::<f64>::zeros(nu);

        let mut jac = DMatrix::<f64>::zeros(nx, nx + nu);
        let mut grad = vec![0.0; nx + nu];
        let mut k: [DVector<f64>; 4] = std::array::from_fn(|_| DVector::zeros(nx));
        let mut k_x: [DMatrix<f64>; 4] = std::array::from_fn(|_| DMatrix::zeros(nx, nx));
        let mut k_u: [DMatrix<f64>; 4] = std::array::from_fn(|_| DMatrix::zeros(nx, nu));
        let mut k_l = [0.0; 4];
        let mut kl_x: [DVector<f64>; 4] = std::array::from_fn(|_| DVector::zeros(nx));
        let mut kl_u: [DVector<f64>; 4] = std::array::from_fn(|_| DVector::zeros(nu));

        for j in 0..self.nj {
            for s in 0..4 {
                let c = STAGE_NODES[s] * h;
                let (y_x, y_u) = if s == 0 {
                    for i in 0..nx {
                        xu[i] = x_j[i];
                    }
                    (s_x.clone(), s_u.clone())
                } else {
                    for i in 0..nx {
                        xu[i] = x_j[i] + c * k[s - 1][i];
                    }
                    (&s_x + c * &k_x[s - 1], &s_u + c * &k_u[s - 1])
                };

                self.functions.rhs(&xu, k[s].as_mut_slice());
                if k[s].iter().any(|v| !v.is_finite()) {
                    return Err(self.stage_error(ModelFunction::Ode, j, s, &xu));
                }
                k_l[s] = self.functions.cost(&xu);
                if !k_l[s].is_finite() {
                    return Err(self.stage_error(ModelFunction::Cost, j, s, &xu));
                }
                self.functions.rhs_jacobian(&xu, &mut jac);
                if jac.iter().any(|v| !v.is_finite()) {
                    return Err(self.stage_error(ModelFunction::OdeJacobian, j, s, &xu));
                }
                self.functions.cost_gradient(&xu, &mut grad);
                if grad.iter().any(|v| !v.is_finite()) {
                    return Err(self.stage_error(ModelFunction::CostGradient, j, s, &xu));
                }

                let f_x = jac.columns(0, nx);
                let f_u = jac.columns(nx, nu);
                let g_x = DVector::from_column_slice(&grad[..nx]);
                let g_u = DVector::from_column_slice(&grad[nx..]);

                k_x[s] = &f_x * &y_x;
                k_u[s] = &f_x * &y_u + &f_u;
                kl_x[s] = y_x.tr_mul(&g_x);
                kl_u[s] = y_u.tr_mul(&g_x) + g_u;
            }

            let w = h / 6.0;
            x_j += w * (&k[0] + 2.0 * &k[1] + 2.0 * &k[2] + &k[3]);
            cost += w * (k_l[0] + 2.0 * k_l[1] + 2.0 * k_l[2] + k_l[3]);
            for s in 0..4 {
                let ws = w * STAGE_WEIGHTS[s];
                s_x += ws * &k_x[s];
                s_u += ws * &k_u[s];
                l_x += ws * &kl_x[s];
                l_u += ws * &kl_u[s];
            }
        }

        Ok(IntervalSensitivity {
            x_end: x_j,
            cost,
            dx_dx: s_x,
            dx_du: s_u,
            dcost_dx: l_x,
            dcost_du: l_u,
        })
    }
}
