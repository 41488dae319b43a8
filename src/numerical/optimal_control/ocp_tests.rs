#[cfg(test)]
mod tests {
    use crate::Examples::ocp_examples::{cstr_config, cstr_model, cstr_task};
    use crate::numerical::optimal_control::model_functions::{
        InitFunctions, OdeFunctions, SymbolicInit, SymbolicOde,
    };
    use crate::numerical::optimal_control::nlp_problem::{NlpProblem, NlpSolver, NlpStatus};
    use crate::numerical::optimal_control::ocp_api::{DirectMultipleShooting, OcpOutcome};
    use crate::numerical::optimal_control::ocp_error::{ModelFunction, OcpError};
    use crate::numerical::optimal_control::ocp_model::OcpModel;
    use crate::numerical::optimal_control::ocp_task_parser::OcpTask;
    use crate::numerical::optimal_control::shooting_transcriber::{
        ConstraintLayout, DecisionLayout, ShootingConfig, ShootingTranscriber,
    };
    use crate::numerical::optimal_control::sqp_solver::{SqpConfig, SqpSolver};
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};
    use rand::Rng;
    use simplelog::*;
    use std::sync::Arc;

    fn init_logger() {
        let _ = SimpleLogger::init(LevelFilter::Warn, Config::default());
    }

    fn inf_norm(v: &DVector<f64>) -> f64 {
        v.iter().fold(0.0, |acc: f64, x| acc.max(x.abs()))
    }

    fn assert_partition(nx: usize, nu: usize, nk: usize) {
        let layout = DecisionLayout::new(nx, nu, nk);
        assert_eq!(layout.nv(), (nk + 1) * nx + nk * nu);
        let mut next = 0;
        for block in layout.ordered_blocks() {
            assert_eq!(block.start, next);
            next = block.end;
        }
        assert_eq!(next, layout.nv());
        for k in 0..nk {
            assert_eq!(layout.state_block(k).len(), nx);
            assert_eq!(layout.control_block(k).len(), nu);
            assert_eq!(layout.control_block(k).start, layout.state_block(k).end);
        }
        assert_eq!(layout.state_block(nk).end, layout.nv());
    }

    #[test]
    fn layout_partitions_decision_vector() {
        for nk in 1..6 {
            for nx in 1..4 {
                for nu in 0..3 {
                    assert_partition(nx, nu, nk);
                }
            }
        }
    }

    #[test]
    fn layout_partitions_random_sizes() {
        let mut rng = rand::rng();
        for _ in 0..50 {
            let nk = rng.random_range(1..40);
            let nx = rng.random_range(1..7);
            let nu = rng.random_range(1..5);
            assert_partition(nx, nu, nk);
        }
    }

    #[test]
    fn cstr_problem_sizes() {
        init_logger();
        let model = cstr_model().unwrap();
        let ocp = ShootingTranscriber::new(cstr_config()).transcribe(&model).unwrap();
        let nlp = &ocp.nlp;
        // I(x0) plus nk-1 continuity blocks: nx + (nk-1)*nx = nx*nk
        assert_eq!(nlp.ng(), 2 * 20);
        assert_eq!(nlp.nv(), 21 * 2 + 20);
        assert_eq!(nlp.v0.len(), nlp.nv());
        assert!(nlp.lb_g.iter().all(|b| *b == 0.0));
        assert!(nlp.ub_g.iter().all(|b| *b == 0.0));
        assert!(nlp.is_equality_constrained());
        // dI/dx is diagonal; each continuity row holds nx + nu + 1 entries
        assert_eq!(nlp.jacobian_sparsity().len(), 2 + 19 * 2 * 4);
        assert_relative_eq!(ocp.dt, 7.5);

        // the guess starts on the initial condition
        let g = nlp.constraints(nlp.v0.as_slice()).unwrap();
        assert!(g.rows(0, 2).iter().all(|r| r.abs() < 1e-9));
        assert_eq!(nlp.lb_v[ocp.layout.control_block(3).start], 230.0);
        assert_eq!(nlp.ub_v[ocp.layout.state_block(20).start + 1], 450.0);
    }

    #[test]
    fn cstr_model_values_at_known_point() {
        let model = cstr_model().unwrap();
        let ode = SymbolicOde::new(&model).unwrap();
        // no reactant: only inflow and jacket exchange remain
        let mut f = [0.0; 2];
        ode.rhs(&[0.0, 350.0, 300.0], &mut f);
        assert_relative_eq!(f[0], 16.6670, epsilon = 1e-10);
        assert_relative_eq!(f[1], -1.75, epsilon = 1e-10);
        assert_relative_eq!(ode.cost(&[0.0, 350.0, 300.0]), 25.09, epsilon = 1e-10);

        let init = SymbolicInit::new(&model).unwrap();
        let mut r = [0.0; 2];
        init.residual(&[956.271065, 250.051971], &mut r);
        assert_relative_eq!(r[0], 0.0);
        assert_relative_eq!(r[1], 0.0);
        init.residual(&[956.0, 250.0], &mut r);
        assert_relative_eq!(r[0], -0.271065, epsilon = 1e-9);
        assert_relative_eq!(r[1], -0.051971, epsilon = 1e-9);
    }

    #[test]
    fn constraint_layout_needs_an_interval() {
        assert!(ConstraintLayout::new(2, 2, 0, false).unwrap_err().is_configuration());
        assert!(ConstraintLayout::new(2, 2, 0, true).unwrap_err().is_configuration());
        let single = ConstraintLayout::new(2, 2, 1, false).unwrap();
        assert_eq!(single.n_links(), 0);
        assert_eq!(single.ng(), 2);
        assert_eq!(ConstraintLayout::new(2, 2, 1, true).unwrap().ng(), 4);
    }

    #[test]
    fn terminal_link_adds_last_block() {
        let model = cstr_model().unwrap();
        let linked = ShootingTranscriber::new(cstr_config().with_terminal_link(true))
            .transcribe(&model)
            .unwrap();
        assert_eq!(linked.nlp.ng(), 2 + 20 * 2);
        assert_eq!(linked.constraint_layout.n_links(), 20);
        assert_eq!(linked.constraint_layout.continuity_rows(19), 40..42);
    }

    fn pendulum_model() -> OcpModel {
        OcpModel::from_strings(
            &["x", "y"],
            &["u"],
            &["y", "-sin(x)+u*y"],
            "x^2+u^2*y^2+exp(u)",
            &["x-1", "y"],
        )
        .unwrap()
    }

    fn probe_point(nv: usize) -> DVector<f64> {
        DVector::from_fn(nv, |i, _| 0.5 + 0.3 * (i as f64).sin())
    }

    fn finite_difference_check(nlp: &NlpProblem, v: &DVector<f64>) {
        let e = nlp.evaluate(v.as_slice()).unwrap();
        let jac = DMatrix::from(&e.jacobian);
        assert_eq!(e.jacobian.nnz(), nlp.jacobian_sparsity().len());
        let eps = 1e-6;
        for i in 0..v.len() {
            let mut vp = v.clone();
            vp[i] += eps;
            let mut vm = v.clone();
            vm[i] -= eps;
            let df = (nlp.objective(vp.as_slice()).unwrap() - nlp.objective(vm.as_slice()).unwrap())
                / (2.0 * eps);
            assert_relative_eq!(e.gradient[i], df, epsilon = 1e-6, max_relative = 1e-5);
            let dg = (nlp.constraints(vp.as_slice()).unwrap()
                - nlp.constraints(vm.as_slice()).unwrap())
                / (2.0 * eps);
            for r in 0..nlp.ng() {
                assert_relative_eq!(jac[(r, i)], dg[r], epsilon = 1e-6, max_relative = 1e-5);
            }
        }
    }

    #[test]
    fn derivatives_match_finite_differences() {
        let config = ShootingConfig::new(1.5, 3, 4).with_terminal_link(true);
        let ocp = ShootingTranscriber::new(config)
            .transcribe(&pendulum_model())
            .unwrap();
        let v = probe_point(ocp.nlp.nv());
        finite_difference_check(&ocp.nlp, &v);
    }

    #[test]
    fn evaluate_agrees_with_separate_calls() {
        let ocp = ShootingTranscriber::new(ShootingConfig::new(1.0, 4, 2))
            .transcribe(&pendulum_model())
            .unwrap();
        let v = probe_point(ocp.nlp.nv());
        let e = ocp.nlp.evaluate(v.as_slice()).unwrap();
        assert_relative_eq!(e.objective, ocp.nlp.objective(v.as_slice()).unwrap(), epsilon = 1e-14);
        assert_eq!(e.constraints, ocp.nlp.constraints(v.as_slice()).unwrap());
        assert_eq!(
            DMatrix::from(&e.jacobian),
            ocp.nlp.constraint_jacobian_dense(v.as_slice()).unwrap()
        );
    }

    #[test]
    fn parallel_and_sequential_transcriptions_agree() {
        let model = pendulum_model();
        let sequential = ShootingTranscriber::new(ShootingConfig::new(2.0, 8, 3).with_parallel(false))
            .transcribe(&model)
            .unwrap();
        let parallel = ShootingTranscriber::new(ShootingConfig::new(2.0, 8, 3).with_parallel(true))
            .transcribe(&model)
            .unwrap();
        let v = probe_point(sequential.nlp.nv());
        let s = sequential.nlp.evaluate(v.as_slice()).unwrap();
        let p = parallel.nlp.evaluate(v.as_slice()).unwrap();
        assert_eq!(s.constraints, p.constraints);
        assert_eq!(s.objective, p.objective);
        assert_eq!(s.gradient, p.gradient);
        assert_eq!(DMatrix::from(&s.jacobian), DMatrix::from(&p.jacobian));
    }

    fn solve_quiet(model: OcpModel, config: ShootingConfig) -> OcpOutcome {
        init_logger();
        let mut ocp = DirectMultipleShooting::new(model, config);
        ocp.set_log_level("off");
        ocp.solve().unwrap()
    }

    #[test]
    fn zero_dynamics_hold_initial_state() {
        let model = OcpModel::from_strings(&["x"], &["u"], &["0"], "u^2", &["x-1"])
            .unwrap()
            .with_guess(vec![1.0], vec![0.5]);
        let outcome = solve_quiet(model, ShootingConfig::new(1.0, 5, 2));
        assert!(outcome.is_converged());
        assert!(outcome.nlp().objective.abs() < 1e-10);
        let solution = outcome.solution();
        for x in solution.state("x").unwrap() {
            assert_relative_eq!(*x, 1.0, epsilon = 1e-8);
        }
        for u in solution.control("u").unwrap() {
            assert!(u.abs() < 1e-6);
        }
    }

    #[test]
    fn linear_tracking_problem_converges() {
        init_logger();
        let model = OcpModel::from_strings(&["x"], &["u"], &["-x+u"], "x^2+u^2", &["x-1"]).unwrap();
        let ocp = ShootingTranscriber::new(ShootingConfig::new(1.0, 10, 4))
            .transcribe(&model)
            .unwrap();
        let sol = SqpSolver::default().solve(&ocp.nlp).unwrap();
        assert_eq!(sol.status, NlpStatus::Converged);

        let g = ocp.nlp.constraints(sol.v.as_slice()).unwrap();
        // initial condition and continuity at the solution
        assert!(inf_norm(&g) < 1e-8);
        assert_relative_eq!(sol.v[0], 1.0, epsilon = 1e-8);
        // u = 0 is feasible with cost (1 - e^-2)/2 = 0.432...
        assert!(sol.objective < 0.43);
        let u0 = ocp.layout.control(sol.v.as_slice(), 0)[0];
        assert!(u0 < 0.0);
    }

    #[test]
    fn guess_outside_bounds_reaches_the_solver() {
        init_logger();
        let model = OcpModel::from_strings(&["x"], &["u"], &["-x+u"], "x^2+u^2", &["x-1"])
            .unwrap()
            .with_control_bounds(vec![-0.5], vec![0.5])
            .with_guess(vec![1.0], vec![2.0]);
        let ocp = ShootingTranscriber::new(ShootingConfig::new(1.0, 6, 4))
            .transcribe(&model)
            .unwrap();
        // v0 carries the guess unchanged
        assert_eq!(ocp.layout.control(ocp.nlp.v0.as_slice(), 2)[0], 2.0);

        let sol = SqpSolver::default().solve(&ocp.nlp).unwrap();
        assert_eq!(sol.status, NlpStatus::Converged);
        for k in 0..6 {
            let u = ocp.layout.control(sol.v.as_slice(), k)[0];
            assert!((-0.5..=0.5).contains(&u), "u_{} = {}", k, u);
        }
    }

    #[test]
    fn mildly_nonlinear_problem_converges() {
        let model = OcpModel::from_strings(
            &["x"],
            &["u"],
            &["-x+0.2*sin(x)+u"],
            "x^2+u^2",
            &["x-1"],
        )
        .unwrap()
        .with_control_bounds(vec![-2.0], vec![2.0]);
        let outcome = solve_quiet(model, ShootingConfig::new(1.0, 10, 4).with_terminal_link(true));
        assert!(outcome.is_converged());
        assert!(outcome.nlp().constraint_violation < 1e-8);
        let solution = outcome.into_result().unwrap();
        assert_eq!(solution.t_grid.len(), 11);
        assert_relative_eq!(solution.state("x").unwrap()[0], 1.0, epsilon = 1e-8);
    }

    #[test]
    fn iteration_limit_gives_non_converged_outcome() {
        let model = OcpModel::from_strings(
            &["x"],
            &["u"],
            &["-x+0.2*sin(x)+u"],
            "x^2+u^2",
            &["x-1"],
        )
        .unwrap();
        let mut ocp = DirectMultipleShooting::new(model, ShootingConfig::new(1.0, 4, 2))
            .with_solver_config(SqpConfig {
                max_iterations: 0,
                ..SqpConfig::default()
            });
        ocp.set_log_level("off");
        let outcome = ocp.solve().unwrap();
        assert!(!outcome.is_converged());
        // best-effort trajectory is still delivered
        assert_eq!(outcome.solution().states[0].len(), 5);
        match outcome.into_result() {
            Err(OcpError::SolverNonConvergence { status, .. }) => {
                assert_eq!(status, NlpStatus::MaxIterationsReached)
            }
            other => panic!("expected SolverNonConvergence, got {:?}", other),
        }
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let model = OcpModel::from_strings(&["x"], &["u"], &["-x+u"], "u^2", &["x-1"]).unwrap();
        for config in [
            ShootingConfig::new(1.0, 0, 4),
            ShootingConfig::new(1.0, 4, 0),
            ShootingConfig::new(0.0, 4, 4),
            ShootingConfig::new(-1.0, 4, 4),
            ShootingConfig::new(f64::NAN, 4, 4),
        ] {
            let err = ShootingTranscriber::new(config).transcribe(&model).err().unwrap();
            assert!(err.is_configuration(), "{}", err);
        }

        let wrong_bounds = model.clone().with_state_bounds(vec![0.0, 0.0], vec![1.0, 1.0]);
        let err = ShootingTranscriber::new(ShootingConfig::new(1.0, 4, 4))
            .transcribe(&wrong_bounds)
            .err()
            .unwrap();
        assert!(matches!(err, OcpError::DimensionMismatch { .. }));

        let mut wrong_ode = model.clone();
        wrong_ode.ode.push(crate::symbolic::symbolic_engine::Expr::Const(1.0));
        assert!(
            ShootingTranscriber::new(ShootingConfig::new(1.0, 4, 4))
                .transcribe(&wrong_ode)
                .err()
                .unwrap()
                .is_configuration()
        );
    }

    #[test]
    fn evaluation_error_names_the_interval() {
        let model = OcpModel::from_strings(&["x"], &["u"], &["1/x"], "u^2", &["x-1"])
            .unwrap()
            .with_guess(vec![1.0], vec![0.0]);
        let ocp = ShootingTranscriber::new(ShootingConfig::new(1.0, 5, 2).with_parallel(false))
            .transcribe(&model)
            .unwrap();
        let mut v = ocp.nlp.v0.clone();
        v[ocp.layout.state_block(3).start] = 0.0;
        match ocp.nlp.evaluate(v.as_slice()) {
            Err(OcpError::Evaluation {
                function,
                interval,
                substep,
                stage,
                x,
                ..
            }) => {
                assert_eq!(function, ModelFunction::Ode);
                assert_eq!(interval, Some(3));
                assert_eq!(substep, Some(0));
                assert_eq!(stage, Some(1));
                assert_eq!(x, vec![0.0]);
            }
            other => panic!("expected an evaluation error, got {:?}", other.map(|e| e.objective)),
        }
        assert!(ocp.nlp.constraints(v.as_slice()).is_err());
    }

    #[test]
    fn evaluation_error_at_the_guess_reaches_the_caller() {
        let model = OcpModel::from_strings(&["x"], &["u"], &["-x+u"], "ln(x)+u^2", &["x-1"])
            .unwrap();
        let mut ocp = DirectMultipleShooting::new(model, ShootingConfig::new(1.0, 3, 2));
        ocp.set_log_level("off");
        let err = ocp.solve().err().unwrap();
        assert!(matches!(
            err,
            OcpError::Evaluation {
                function: ModelFunction::Cost,
                ..
            }
        ));
    }

    /// dx/dt = -a x + u, L = x^2 + u^2, I = x - 1, written by hand
    struct Decay {
        a: f64,
    }

    impl OdeFunctions for Decay {
        fn nx(&self) -> usize {
            1
        }
        fn nu(&self) -> usize {
            1
        }
        fn rhs(&self, xu: &[f64], out: &mut [f64]) {
            out[0] = -self.a * xu[0] + xu[1];
        }
        fn cost(&self, xu: &[f64]) -> f64 {
            xu[0] * xu[0] + xu[1] * xu[1]
        }
        fn rhs_jacobian(&self, _xu: &[f64], out: &mut DMatrix<f64>) {
            out[(0, 0)] = -self.a;
            out[(0, 1)] = 1.0;
        }
        fn cost_gradient(&self, xu: &[f64], out: &mut [f64]) {
            out[0] = 2.0 * xu[0];
            out[1] = 2.0 * xu[1];
        }
    }

    struct StartAtOne;

    impl InitFunctions for StartAtOne {
        fn nx(&self) -> usize {
            1
        }
        fn n_init(&self) -> usize {
            1
        }
        fn residual(&self, x: &[f64], out: &mut [f64]) {
            out[0] = x[0] - 1.0;
        }
        fn jacobian(&self, _x: &[f64], out: &mut DMatrix<f64>) {
            out[(0, 0)] = 1.0;
        }
        fn jacobian_sparsity(&self) -> Vec<(usize, usize)> {
            vec![(0, 0)]
        }
    }

    #[test]
    fn hand_written_functions_match_symbolic_ones() {
        let model = OcpModel::from_strings(&["x"], &["u"], &["-x+u"], "x^2+u^2", &["x-1"]).unwrap();
        let transcriber = ShootingTranscriber::new(ShootingConfig::new(1.0, 6, 3));
        let symbolic = transcriber.transcribe(&model).unwrap();
        let manual = transcriber
            .transcribe_with(&model, Arc::new(Decay { a: 1.0 }), Arc::new(StartAtOne))
            .unwrap();

        let v = probe_point(symbolic.nlp.nv());
        let s = symbolic.nlp.evaluate(v.as_slice()).unwrap();
        let m = manual.nlp.evaluate(v.as_slice()).unwrap();
        assert_relative_eq!(s.objective, m.objective, epsilon = 1e-12);
        assert_relative_eq!(s.gradient, m.gradient, epsilon = 1e-12);
        assert_relative_eq!(s.constraints, m.constraints, epsilon = 1e-12);
        assert_relative_eq!(
            DMatrix::from(&s.jacobian),
            DMatrix::from(&m.jacobian),
            epsilon = 1e-12
        );

        let two_states = OcpModel::from_strings(&["x", "y"], &["u"], &["y", "u"], "u^2", &["x"])
            .unwrap();
        let err = transcriber
            .transcribe_with(&two_states, Arc::new(Decay { a: 1.0 }), Arc::new(StartAtOne))
            .err()
            .unwrap();
        assert!(matches!(err, OcpError::DimensionMismatch { .. }));
    }

    #[test]
    fn task_file_end_to_end() {
        let text = "
model
states: x
controls: u
ode: -x+u
cost: x^2+u^2
init: x-1
shooting
tf: 1.0
nk: 10
nj: 4
solver
loglevel: off
";
        let task: OcpTask = text.parse().unwrap();
        let mut ocp = DirectMultipleShooting::from_task(task);
        let outcome = ocp.solve().unwrap();
        assert!(outcome.is_converged());
        assert_eq!(ocp.calc_statistics()["number of constraints"], 10);
        assert!(ocp.timer_hash().contains_key("NLP solver time, s"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linear.csv");
        outcome.solution().save_to_csv(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "t,x,u");
        assert_eq!(lines.len(), 12);
        assert!(lines[11].ends_with(','));
    }

    #[test]
    fn cstr_task_matches_builder_model() {
        let task: OcpTask = cstr_task().parse().unwrap();
        let model = cstr_model().unwrap();
        assert_eq!(task.model.states, model.states);
        assert_eq!(task.model.lb_x, model.lb_x);
        assert_eq!(task.shooting, cstr_config());
        let a = ShootingTranscriber::new(task.shooting.clone())
            .transcribe(&task.model)
            .unwrap();
        let b = ShootingTranscriber::new(cstr_config()).transcribe(&model).unwrap();
        let v = a.nlp.v0.clone();
        assert_eq!(
            a.nlp.constraints(v.as_slice()).unwrap(),
            b.nlp.constraints(v.as_slice()).unwrap()
        );
    }
}
