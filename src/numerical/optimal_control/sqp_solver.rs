//! Dense reference SQP solver for equality-constrained NLPs with simple bounds.
//!
//! Each iteration:
//! 1. Hessian of the Lagrangian `∇f + J^T λ` by forward differences of the exact gradient
//!    and Jacobian, symmetrized and shifted by `δI`
//! 2. variables sitting on a bound with the Lagrangian gradient pushing outward are frozen
//! 3. KKT system `[H J^T; J 0] [d; λ] = [-∇f; -c]` solved by LU; on failure or a
//!    non-descent direction `δ` is increased
//! 4. backtracking on the l1 merit `f + μ ||c||_1` with the trial point projected onto the
//!    bounds; a trial point where the model cannot be evaluated is rejected
//!
//! Converged when `||c||_inf ≤ tol` and the projected Lagrangian gradient is below
//! `tol * max(1, ||∇f||_inf)`. Only meant for small problems: every iteration costs `nv`
//! gradient evaluations and a dense factorization of size `nv + ng`.
use crate::numerical::optimal_control::nlp_problem::{
    NlpEvaluation, NlpProblem, NlpSolution, NlpSolver, NlpStatus,
};
use crate::numerical::optimal_control::ocp_error::{OcpError, OcpResult};
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};

const MAX_REGULARIZATION_TRIES: usize = 12;
const ARMIJO: f64 = 1e-4;
const MIN_STEP_LENGTH: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct SqpConfig {
    /// feasibility and (scaled) stationarity tolerance
    pub tolerance: f64,
    pub max_iterations: usize,
    /// relative finite-difference step of the Hessian
    pub hessian_step: f64,
    /// initial diagonal shift of the Hessian
    pub regularization: f64,
    /// initial l1 merit penalty
    pub merit_penalty: f64,
}

impl Default for SqpConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            max_iterations: 100,
            hessian_step: 1e-6,
            regularization: 1e-8,
            merit_penalty: 10.0,
        }
    }
}

impl SqpConfig {
    pub fn validate(&self) -> OcpResult<()> {
        let positive = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(OcpError::configuration(format!(
                    "SQP {} must be finite and positive, got {}",
                    name, value
                )))
            }
        };
        positive("tolerance", self.tolerance)?;
        positive("hessian_step", self.hessian_step)?;
        positive("merit_penalty", self.merit_penalty)?;
        if !self.regularization.is_finite() || self.regularization < 0.0 {
            return Err(OcpError::configuration(format!(
                "SQP regularization must be finite and non-negative, got {}",
                self.regularization
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SqpSolver {
    pub config: SqpConfig,
}

struct Iterate {
    v: DVector<f64>,
    eval: NlpEvaluation,
    jac: DMatrix<f64>,
    /// g(v) - lb_g
    c: DVector<f64>,
}

impl Iterate {
    fn new(problem: &NlpProblem, v: DVector<f64>, eval: NlpEvaluation) -> Self {
        let jac = DMatrix::from(&eval.jacobian);
        let c = &eval.constraints - &problem.lb_g;
        Self { v, eval, jac, c }
    }

    fn merit(&self, mu: f64) -> f64 {
        self.eval.objective + mu * self.c.lp_norm(1)
    }

    fn lagrangian_gradient(&self, lambda: &DVector<f64>) -> DVector<f64> {
        &self.eval.gradient + self.jac.tr_mul(lambda)
    }
}

fn inf_norm(v: &DVector<f64>) -> f64 {
    v.iter().fold(0.0, |acc: f64, x| acc.max(x.abs()))
}

impl SqpSolver {
    pub fn new(config: SqpConfig) -> Self {
        Self { config }
    }

    fn project(problem: &NlpProblem, v: &DVector<f64>) -> DVector<f64> {
        v.zip_zip_map(&problem.lb_v, &problem.ub_v, |x, l, u| x.max(l).min(u))
    }

    fn projected_gradient(problem: &NlpProblem, v: &DVector<f64>, grad: &DVector<f64>) -> f64 {
        let moved = Self::project(problem, &(v - grad));
        inf_norm(&(v - moved))
    }

    /// forward differences of the Lagrangian gradient; backward where the forward point
    /// cannot be evaluated
    fn lagrangian_hessian(
        &self,
        problem: &NlpProblem,
        it: &Iterate,
        lambda: &DVector<f64>,
        grad_l: &DVector<f64>,
    ) -> OcpResult<DMatrix<f64>> {
        let n = it.v.len();
        let mut h = DMatrix::zeros(n, n);
        for i in 0..n {
            let step = self.config.hessian_step * it.v[i].abs().max(1.0);
            let mut vp = it.v.clone();
            vp[i] += step;
            let column = match problem.evaluate(vp.as_slice()) {
                Ok(ep) => {
                    let gp = &ep.gradient + DMatrix::from(&ep.jacobian).tr_mul(lambda);
                    (gp - grad_l) / step
                }
                Err(_) => {
                    let mut vm = it.v.clone();
                    vm[i] -= step;
                    let em = problem.evaluate(vm.as_slice())?;
                    let gm = &em.gradient + DMatrix::from(&em.jacobian).tr_mul(lambda);
                    (grad_l - gm) / step
                }
            };
            h.set_column(i, &column);
        }
        Ok((&h + h.transpose()) * 0.5)
    }

    fn solve_kkt(
        h: &DMatrix<f64>,
        it: &Iterate,
        frozen: &[bool],
        delta: f64,
        delta_c: f64,
    ) -> Option<(DVector<f64>, DVector<f64>)> {
        let n = h.nrows();
        let m = it.jac.nrows();
        let mut k = DMatrix::zeros(n + m, n + m);
        k.view_mut((0, 0), (n, n)).copy_from(h);
        for i in 0..n {
            k[(i, i)] += delta;
        }
        k.view_mut((0, n), (n, m)).copy_from(&it.jac.transpose());
        k.view_mut((n, 0), (m, n)).copy_from(&it.jac);
        for r in 0..m {
            k[(n + r, n + r)] = -delta_c;
        }
        let mut rhs = DVector::zeros(n + m);
        rhs.rows_mut(0, n).copy_from(&(-&it.eval.gradient));
        rhs.rows_mut(n, m).copy_from(&(-&it.c));
        for (i, _) in frozen.iter().enumerate().filter(|(_, f)| **f) {
            k.row_mut(i).fill(0.0);
            k[(i, i)] = 1.0;
            rhs[i] = 0.0;
        }
        let sol = k.lu().solve(&rhs)?;
        if sol.iter().any(|x| !x.is_finite()) {
            return None;
        }
        Some((sol.rows(0, n).into_owned(), sol.rows(n, m).into_owned()))
    }

    fn solution(problem: &NlpProblem, it: Iterate, iterations: usize, status: NlpStatus) -> NlpSolution {
        let constraint_violation = problem.constraint_violation(&it.eval.constraints);
        info!(
            "SQP finished: {} after {} iterations, objective {:e}, constraint violation {:e}",
            status, iterations, it.eval.objective, constraint_violation
        );
        NlpSolution {
            objective: it.eval.objective,
            v: it.v,
            constraint_violation,
            iterations,
            status,
        }
    }
}

impl NlpSolver for SqpSolver {
    fn solve(&self, problem: &NlpProblem) -> OcpResult<NlpSolution> {
        let cfg = &self.config;
        cfg.validate()?;
        if !problem.is_equality_constrained() {
            return Err(OcpError::configuration(
                "SQP solver supports equality constraints only (lb_g = ub_g)",
            ));
        }
        let n = problem.nv();
        let m = problem.ng();

        let v = Self::project(problem, &problem.v0);
        let eval = problem.evaluate(v.as_slice())?;
        let mut it = Iterate::new(problem, v, eval);
        let mut lambda = DVector::zeros(m);
        let mut mu = cfg.merit_penalty;
        let mut iterations = 0;

        loop {
            let grad_l = it.lagrangian_gradient(&lambda);
            let violation = inf_norm(&it.c);
            let stationarity = Self::projected_gradient(problem, &it.v, &grad_l);
            let scale = inf_norm(&it.eval.gradient).max(1.0);
            debug!(
                "SQP iteration {}: objective {:e}, violation {:e}, stationarity {:e}",
                iterations, it.eval.objective, violation, stationarity
            );
            if violation <= cfg.tolerance && stationarity <= cfg.tolerance * scale {
                return Ok(Self::solution(problem, it, iterations, NlpStatus::Converged));
            }
            if iterations >= cfg.max_iterations {
                return Ok(Self::solution(
                    problem,
                    it,
                    iterations,
                    NlpStatus::MaxIterationsReached,
                ));
            }
            iterations += 1;

            let h = self.lagrangian_hessian(problem, &it, &lambda, &grad_l)?;
            let frozen: Vec<bool> = (0..n)
                .map(|i| {
                    (it.v[i] <= problem.lb_v[i] && grad_l[i] > 0.0)
                        || (it.v[i] >= problem.ub_v[i] && grad_l[i] < 0.0)
                })
                .collect();

            let c_l1 = it.c.lp_norm(1);
            let negligible = 1e-15 * (1.0 + inf_norm(&it.v));
            let mut delta = cfg.regularization;
            let mut delta_c = 0.0;
            let mut step = None;
            for _ in 0..MAX_REGULARIZATION_TRIES {
                match Self::solve_kkt(&h, &it, &frozen, delta, delta_c) {
                    Some((d, lambda_new)) => {
                        let mu_new = mu.max(1.1 * inf_norm(&lambda_new));
                        let slope = it.eval.gradient.dot(&d) - mu_new * c_l1;
                        if slope < 0.0 || inf_norm(&d) <= negligible {
                            step = Some((d, lambda_new, mu_new, slope));
                            break;
                        }
                        debug!("not a descent direction (slope {:e}), δ = {:e}", slope, delta);
                    }
                    None => {
                        debug!("KKT system singular with δ = {:e}", delta);
                        delta_c = delta_c.max(cfg.regularization).max(1e-12);
                    }
                }
                delta = (delta * 100.0).max(1e-8);
            }
            let Some((d, lambda_new, mu_new, slope)) = step else {
                warn!("SQP: no usable search direction at iteration {}", iterations);
                let status = if violation > cfg.tolerance {
                    NlpStatus::Infeasible
                } else {
                    NlpStatus::NumericalFailure
                };
                return Ok(Self::solution(problem, it, iterations, status));
            };
            mu = mu_new;

            let merit0 = it.merit(mu);
            let mut alpha = 1.0;
            let accepted = loop {
                let trial = Self::project(problem, &(&it.v + alpha * &d));
                if let Ok(eval) = problem.evaluate(trial.as_slice()) {
                    let candidate = Iterate::new(problem, trial, eval);
                    let merit = candidate.merit(mu);
                    if merit.is_finite()
                        && (merit <= merit0 + ARMIJO * alpha * slope
                            || inf_norm(&d) <= negligible)
                    {
                        break Some(candidate);
                    }
                }
                alpha *= 0.5;
                if alpha < MIN_STEP_LENGTH {
                    break None;
                }
            };
            match accepted {
                Some(candidate) => {
                    it = candidate;
                    lambda = lambda_new;
                }
                None => {
                    warn!("SQP: line search failed at iteration {}", iterations);
                    let status = if violation > cfg.tolerance {
                        NlpStatus::Infeasible
                    } else {
                        NlpStatus::NumericalFailure
                    };
                    return Ok(Self::solution(problem, it, iterations, status));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numerical::optimal_control::nlp_problem::NlpFunctions;
    use approx::assert_relative_eq;
    use nalgebra_sparse::{CooMatrix, CsrMatrix};
    use std::sync::Arc;

    /// min (v0-2)^2 + (v1-1)^2 + exp(v2)  s.t.  v0 + v1 + v2 = a
    struct SmallNlp {
        a: f64,
        pattern: Vec<(usize, usize)>,
    }

    impl NlpFunctions for SmallNlp {
        fn nv(&self) -> usize {
            3
        }
        fn ng(&self) -> usize {
            1
        }
        fn objective(&self, v: &[f64]) -> OcpResult<f64> {
            Ok((v[0] - 2.0).powi(2) + (v[1] - 1.0).powi(2) + v[2].exp())
        }
        fn objective_gradient(&self, v: &[f64]) -> OcpResult<DVector<f64>> {
            Ok(DVector::from_vec(vec![
                2.0 * (v[0] - 2.0),
                2.0 * (v[1] - 1.0),
                v[2].exp(),
            ]))
        }
        fn constraints(&self, v: &[f64]) -> OcpResult<DVector<f64>> {
            Ok(DVector::from_element(1, v[0] + v[1] + v[2] - self.a))
        }
        fn constraint_jacobian(&self, _v: &[f64]) -> OcpResult<CsrMatrix<f64>> {
            let coo = CooMatrix::try_from_triplets(1, 3, vec![0; 3], vec![0, 1, 2], vec![1.0; 3])
                .map_err(|e| OcpError::configuration(e.to_string()))?;
            Ok(CsrMatrix::from(&coo))
        }
        fn jacobian_sparsity(&self) -> &[(usize, usize)] {
            &self.pattern
        }
    }

    fn small_problem(lb: [f64; 3], ub: [f64; 3], lb_g: f64, ub_g: f64) -> NlpProblem {
        NlpProblem::new(
            Arc::new(SmallNlp {
                a: 0.0,
                pattern: vec![(0, 0), (0, 1), (0, 2)],
            }),
            DVector::from_row_slice(&lb),
            DVector::from_row_slice(&ub),
            DVector::from_vec(vec![0.5, 0.5, 0.5]),
            DVector::from_element(1, lb_g),
            DVector::from_element(1, ub_g),
        )
        .unwrap()
    }

    #[test]
    fn test_equality_constrained_convergence() {
        let inf = f64::INFINITY;
        let problem = small_problem([-inf; 3], [inf; 3], 0.0, 0.0);
        let sol = SqpSolver::default().solve(&problem).unwrap();
        assert_eq!(sol.status, NlpStatus::Converged);
        assert!(sol.constraint_violation < 1e-8);
        // stationarity: 2(v0-2) = 2(v1-1) = exp(v2)
        let v = &sol.v;
        assert_relative_eq!(2.0 * (v[0] - 2.0), v[2].exp(), epsilon = 1e-6);
        assert_relative_eq!(2.0 * (v[1] - 1.0), v[2].exp(), epsilon = 1e-6);
        assert_relative_eq!(v[0] + v[1] + v[2], 0.0, epsilon = 1e-8);
    }

    #[test]
    fn test_active_upper_bound() {
        let inf = f64::INFINITY;
        // without the bound v0 would settle above 2
        let problem = small_problem([-inf; 3], [0.5, inf, inf], 0.0, 0.0);
        let sol = SqpSolver::default().solve(&problem).unwrap();
        assert_eq!(sol.status, NlpStatus::Converged);
        assert_relative_eq!(sol.v[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(2.0 * (sol.v[1] - 1.0), sol.v[2].exp(), epsilon = 1e-6);
    }

    #[test]
    fn test_inequality_rows_are_rejected() {
        let inf = f64::INFINITY;
        let problem = small_problem([-inf; 3], [inf; 3], -1.0, 1.0);
        let err = SqpSolver::default().solve(&problem).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_iteration_limit() {
        let inf = f64::INFINITY;
        let problem = small_problem([-inf; 3], [inf; 3], 0.0, 0.0);
        let solver = SqpSolver::new(SqpConfig {
            max_iterations: 1,
            ..SqpConfig::default()
        });
        let sol = solver.solve(&problem).unwrap();
        assert_eq!(sol.status, NlpStatus::MaxIterationsReached);
        assert_eq!(sol.iterations, 1);
        assert!(sol.check_converged().is_err());
    }

    #[test]
    fn test_invalid_config() {
        let solver = SqpSolver::new(SqpConfig {
            tolerance: 0.0,
            ..SqpConfig::default()
        });
        let inf = f64::INFINITY;
        assert!(solver.solve(&small_problem([-inf; 3], [inf; 3], 0.0, 0.0)).is_err());
    }
}
