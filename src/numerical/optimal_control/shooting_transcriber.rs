//! # Direct multiple shooting
//!
//! The horizon `[0, tf]` is split into `nk` intervals of length `dt = tf/nk`. The decision
//! vector holds a state block at every node and a constant control block per interval:
//! ```text
//! v = [x_0, u_0, x_1, u_1, ..., x_{nk-1}, u_{nk-1}, x_nk],   nv = (nk+1)*nx + nk*nu
//! ```
//! Each interval is integrated independently from its own start state; gluing them
//! together is left to the NLP as equality constraints, in this fixed order:
//! ```text
//! I(x_0) = 0                                 n_init rows
//! x_end(k) - x_{k+1} = 0,  k = 0..nk-2      nx rows each
//! x_end(nk-1) - x_nk = 0                    nx rows, only with link_terminal_state
//! ```
//! Without the terminal link the last node is not tied to the dynamics and the constraint
//! count is `n_init + (nk-1)*nx`.
//!
//! Constraint Jacobian pattern, computed once:
//! - initial-condition rows: the structural non-zeros of dI/dx in the columns of x_0
//! - continuity block k: dense dx_end/dx in x_k, dense dx_end/du in u_k, -1 diagonal in x_{k+1}
use crate::numerical::optimal_control::model_functions::{
    InitFunctions, OdeFunctions, SymbolicInit, SymbolicOde,
};
use crate::numerical::optimal_control::nlp_problem::{NlpEvaluation, NlpFunctions, NlpProblem};
use crate::numerical::optimal_control::ocp_error::{ModelFunction, OcpError, OcpResult};
use crate::numerical::optimal_control::ocp_model::OcpModel;
use crate::numerical::optimal_control::rk4_integrator::{FixedStepIntegrator, IntervalMap};
use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CsrMatrix, pattern::SparsityPattern};
use rayon::prelude::*;
use std::ops::Range;
use std::sync::Arc;

/// Horizon and discretization. `tf`, `nk` and `nj` have no defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ShootingConfig {
    pub tf: f64,
    /// number of shooting intervals
    pub nk: usize,
    /// RK4 sub-steps per interval
    pub nj: usize,
    /// add the continuity block of the last interval
    pub link_terminal_state: bool,
    /// evaluate the intervals on the rayon thread pool
    pub parallel: bool,
}

impl ShootingConfig {
    pub fn new(tf: f64, nk: usize, nj: usize) -> Self {
        Self {
            tf,
            nk,
            nj,
            link_terminal_state: false,
            parallel: true,
        }
    }

    pub fn with_terminal_link(mut self, link: bool) -> Self {
        self.link_terminal_state = link;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn dt(&self) -> f64 {
        self.tf / self.nk as f64
    }

    pub fn validate(&self) -> OcpResult<()> {
        if !self.tf.is_finite() || self.tf <= 0.0 {
            return Err(OcpError::configuration(format!(
                "final time must be finite and positive, got {}",
                self.tf
            )));
        }
        if self.nk == 0 {
            return Err(OcpError::configuration(
                "number of shooting intervals must be at least 1",
            ));
        }
        if self.nj == 0 {
            return Err(OcpError::configuration(
                "number of RK4 sub-steps per interval must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Index map of the decision vector: the range of every state and control block.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionLayout {
    nx: usize,
    nu: usize,
    nk: usize,
    nv: usize,
    state_blocks: Vec<Range<usize>>,
    control_blocks: Vec<Range<usize>>,
}

impl DecisionLayout {
    /// Single pass over the interleaved blocks.
    pub fn new(nx: usize, nu: usize, nk: usize) -> Self {
        let mut state_blocks = Vec::with_capacity(nk + 1);
        let mut control_blocks = Vec::with_capacity(nk);
        let mut offset = 0;
        for k in 0..=nk {
            state_blocks.push(offset..offset + nx);
            offset += nx;
            if k < nk {
                control_blocks.push(offset..offset + nu);
                offset += nu;
            }
        }
        Self {
            nx,
            nu,
            nk,
            nv: offset,
            state_blocks,
            control_blocks,
        }
    }

    pub fn nv(&self) -> usize {
        self.nv
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn nu(&self) -> usize {
        self.nu
    }

    pub fn nk(&self) -> usize {
        self.nk
    }

    /// range of x_k, k in 0..=nk
    pub fn state_block(&self, k: usize) -> Range<usize> {
        self.state_blocks[k].clone()
    }

    /// range of u_k, k in 0..nk
    pub fn control_block(&self, k: usize) -> Range<usize> {
        self.control_blocks[k].clone()
    }

    pub fn state<'a>(&self, v: &'a [f64], k: usize) -> &'a [f64] {
        &v[self.state_block(k)]
    }

    pub fn control<'a>(&self, v: &'a [f64], k: usize) -> &'a [f64] {
        &v[self.control_block(k)]
    }

    /// all blocks in the order they occupy the decision vector
    pub fn ordered_blocks(&self) -> Vec<Range<usize>> {
        let mut blocks = Vec::with_capacity(2 * self.nk + 1);
        for k in 0..self.nk {
            blocks.push(self.state_block(k));
            blocks.push(self.control_block(k));
        }
        blocks.push(self.state_block(self.nk));
        blocks
    }

    /// Fills a vector of length nv with `x_value` in every state block and `u_value` in
    /// every control block.
    pub fn fill(&self, x_value: &[f64], u_value: &[f64]) -> DVector<f64> {
        let mut v = DVector::zeros(self.nv);
        for block in &self.state_blocks {
            v.as_mut_slice()[block.clone()].copy_from_slice(x_value);
        }
        for block in &self.control_blocks {
            v.as_mut_slice()[block.clone()].copy_from_slice(u_value);
        }
        v
    }
}

/// Row ranges of the constraint vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintLayout {
    n_init: usize,
    nx: usize,
    n_links: usize,
}

impl ConstraintLayout {
    /// `nk = 0` has no shooting interval and is rejected.
    pub fn new(n_init: usize, nx: usize, nk: usize, link_terminal_state: bool) -> OcpResult<Self> {
        if nk == 0 {
            return Err(OcpError::configuration(
                "constraint layout needs at least one shooting interval",
            ));
        }
        let n_links = if link_terminal_state { nk } else { nk - 1 };
        Ok(Self { n_init, nx, n_links })
    }

    pub fn ng(&self) -> usize {
        self.n_init + self.n_links * self.nx
    }

    pub fn init_rows(&self) -> Range<usize> {
        0..self.n_init
    }

    /// number of continuity blocks
    pub fn n_links(&self) -> usize {
        self.n_links
    }

    /// rows of x_end(k) - x_{k+1}, k in 0..n_links
    pub fn continuity_rows(&self, k: usize) -> Range<usize> {
        let start = self.n_init + k * self.nx;
        start..start + self.nx
    }
}

/// Objective and constraints of the transcribed problem.
pub struct ShootingNlpFunctions {
    interval_map: IntervalMap,
    init: Arc<dyn InitFunctions>,
    layout: DecisionLayout,
    constraint_layout: ConstraintLayout,
    parallel: bool,
    sparsity: Vec<(usize, usize)>,
    pattern: SparsityPattern,
    init_pattern: Vec<(usize, usize)>,
}

impl ShootingNlpFunctions {
    pub fn new(
        interval_map: IntervalMap,
        init: Arc<dyn InitFunctions>,
        layout: DecisionLayout,
        constraint_layout: ConstraintLayout,
        parallel: bool,
    ) -> OcpResult<Self> {
        let init_pattern = init.jacobian_sparsity();
        let (nx, nu) = (layout.nx(), layout.nu());
        let ng = constraint_layout.ng();

        let mut sparsity = Vec::with_capacity(init_pattern.len() + constraint_layout.n_links() * nx * (nx + nu + 1));
        let x0_cols = layout.state_block(0);
        for (r, c) in &init_pattern {
            sparsity.push((*r, x0_cols.start + c));
        }
        for k in 0..constraint_layout.n_links() {
            let rows = constraint_layout.continuity_rows(k);
            let xk = layout.state_block(k);
            let uk = layout.control_block(k);
            let xnext = layout.state_block(k + 1);
            for i in 0..nx {
                let row = rows.start + i;
                sparsity.extend(xk.clone().map(|c| (row, c)));
                sparsity.extend(uk.clone().map(|c| (row, c)));
                sparsity.push((row, xnext.start + i));
            }
        }

        let mut offsets = vec![0usize; ng + 1];
        for (r, _) in &sparsity {
            offsets[r + 1] += 1;
        }
        for r in 0..ng {
            offsets[r + 1] += offsets[r];
        }
        let indices = sparsity.iter().map(|(_, c)| *c).collect();
        let pattern =
            SparsityPattern::try_from_offsets_and_indices(ng, layout.nv(), offsets, indices)
                .map_err(|e| {
                    OcpError::configuration(format!("invalid constraint Jacobian pattern: {}", e))
                })?;
        debug!(
            "constraint Jacobian: {} x {}, {} stored entries",
            ng,
            layout.nv(),
            sparsity.len()
        );

        Ok(Self {
            interval_map,
            init,
            layout,
            constraint_layout,
            parallel,
            sparsity,
            pattern,
            init_pattern,
        })
    }

    pub fn layout(&self) -> &DecisionLayout {
        &self.layout
    }

    pub fn constraint_layout(&self) -> &ConstraintLayout {
        &self.constraint_layout
    }

    fn check(&self, v: &[f64]) -> OcpResult<()> {
        OcpError::check_len("decision vector", self.layout.nv(), v.len())
    }

    /// Runs `eval` for every interval; results are ordered by interval index whatever the
    /// completion order.
    fn map_intervals<T, F>(&self, eval: F) -> OcpResult<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> OcpResult<T> + Sync + Send,
    {
        let nk = self.layout.nk();
        let tagged = |k: usize| eval(k).map_err(|e| e.with_interval(k));
        if self.parallel {
            (0..nk).into_par_iter().map(tagged).collect()
        } else {
            (0..nk).map(tagged).collect()
        }
    }

    fn init_residual(&self, v: &[f64], g: &mut DVector<f64>) -> OcpResult<()> {
        let x0 = self.layout.state(v, 0);
        let rows = self.constraint_layout.init_rows();
        let out = &mut g.as_mut_slice()[rows];
        self.init.residual(x0, out);
        if out.iter().any(|r| !r.is_finite()) {
            return Err(init_error(ModelFunction::Init, x0));
        }
        Ok(())
    }

    fn continuity(&self, k: usize, x_end: &DVector<f64>, v: &[f64], g: &mut DVector<f64>) {
        let x_next = self.layout.state(v, k + 1);
        let rows = self.constraint_layout.continuity_rows(k);
        for (i, row) in rows.enumerate() {
            g[row] = x_end[i] - x_next[i];
        }
    }

    fn jacobian_values(
        &self,
        v: &[f64],
        dx_dx: &[&DMatrix<f64>],
        dx_du: &[&DMatrix<f64>],
    ) -> OcpResult<CsrMatrix<f64>> {
        let nx = self.layout.nx();
        let x0 = self.layout.state(v, 0);
        let mut init_jac = DMatrix::zeros(self.init.n_init(), nx);
        self.init.jacobian(x0, &mut init_jac);
        if init_jac.iter().any(|e| !e.is_finite()) {
            return Err(init_error(ModelFunction::InitJacobian, x0));
        }

        let mut values = Vec::with_capacity(self.sparsity.len());
        values.extend(self.init_pattern.iter().map(|(r, c)| init_jac[(*r, *c)]));
        for k in 0..self.constraint_layout.n_links() {
            for i in 0..nx {
                values.extend(dx_dx[k].row(i).iter());
                values.extend(dx_du[k].row(i).iter());
                values.push(-1.0);
            }
        }
        CsrMatrix::try_from_pattern_and_values(self.pattern.clone(), values).map_err(|e| {
            OcpError::configuration(format!("cannot assemble constraint Jacobian: {}", e))
        })
    }

    fn gradient(&self, dcost_dx: &[&DVector<f64>], dcost_du: &[&DVector<f64>]) -> DVector<f64> {
        let mut grad = DVector::zeros(self.layout.nv());
        for k in 0..self.layout.nk() {
            for (i, col) in self.layout.state_block(k).enumerate() {
                grad[col] += dcost_dx[k][i];
            }
            for (i, col) in self.layout.control_block(k).enumerate() {
                grad[col] += dcost_du[k][i];
            }
        }
        grad
    }
}

fn init_error(function: ModelFunction, x0: &[f64]) -> OcpError {
    OcpError::Evaluation {
        function,
        interval: Some(0),
        substep: None,
        stage: None,
        x: x0.to_vec(),
        u: Vec::new(),
    }
}

impl NlpFunctions for ShootingNlpFunctions {
    fn nv(&self) -> usize {
        self.layout.nv()
    }

    fn ng(&self) -> usize {
        self.constraint_layout.ng()
    }

    fn objective(&self, v: &[f64]) -> OcpResult<f64> {
        self.check(v)?;
        let results = self.map_intervals(|k| {
            self.interval_map
                .eval(self.layout.state(v, k), self.layout.control(v, k))
        })?;
        Ok(results.iter().map(|r| r.cost).sum())
    }

    fn objective_gradient(&self, v: &[f64]) -> OcpResult<DVector<f64>> {
        Ok(self.evaluate(v)?.gradient)
    }

    fn constraints(&self, v: &[f64]) -> OcpResult<DVector<f64>> {
        self.check(v)?;
        let results = self.map_intervals(|k| {
            self.interval_map
                .eval(self.layout.state(v, k), self.layout.control(v, k))
        })?;
        let mut g = DVector::zeros(self.ng());
        self.init_residual(v, &mut g)?;
        for k in 0..self.constraint_layout.n_links() {
            self.continuity(k, &results[k].x_end, v, &mut g);
        }
        Ok(g)
    }

    fn constraint_jacobian(&self, v: &[f64]) -> OcpResult<CsrMatrix<f64>> {
        Ok(self.evaluate(v)?.jacobian)
    }

    fn jacobian_sparsity(&self) -> &[(usize, usize)] {
        &self.sparsity
    }

    /// one sensitivity sweep over the intervals serves all four quantities
    fn evaluate(&self, v: &[f64]) -> OcpResult<NlpEvaluation> {
        self.check(v)?;
        let results = self.map_intervals(|k| {
            self.interval_map
                .eval_with_sensitivities(self.layout.state(v, k), self.layout.control(v, k))
        })?;

        let objective = results.iter().map(|r| r.cost).sum();
        let mut constraints = DVector::zeros(self.ng());
        self.init_residual(v, &mut constraints)?;
        for k in 0..self.constraint_layout.n_links() {
            self.continuity(k, &results[k].x_end, v, &mut constraints);
        }

        let dx_dx: Vec<&DMatrix<f64>> = results.iter().map(|r| &r.dx_dx).collect();
        let dx_du: Vec<&DMatrix<f64>> = results.iter().map(|r| &r.dx_du).collect();
        let dcost_dx: Vec<&DVector<f64>> = results.iter().map(|r| &r.dcost_dx).collect();
        let dcost_du: Vec<&DVector<f64>> = results.iter().map(|r| &r.dcost_du).collect();

        Ok(NlpEvaluation {
            objective,
            gradient: self.gradient(&dcost_dx, &dcost_du),
            constraints,
            jacobian: self.jacobian_values(v, &dx_dx, &dx_du)?,
        })
    }
}

/// NLP plus the index maps needed to read the solution back.
pub struct TranscribedOcp {
    pub nlp: NlpProblem,
    pub layout: DecisionLayout,
    pub constraint_layout: ConstraintLayout,
    pub dt: f64,
}

pub struct ShootingTranscriber {
    pub config: ShootingConfig,
}

impl ShootingTranscriber {
    pub fn new(config: ShootingConfig) -> Self {
        Self { config }
    }

    /// Validates the model, compiles its functions and builds the NLP.
    pub fn transcribe(&self, model: &OcpModel) -> OcpResult<TranscribedOcp> {
        model.validate()?;
        self.config.validate()?;
        let ode = Arc::new(SymbolicOde::new(model)?);
        let init = Arc::new(SymbolicInit::new(model)?);
        self.transcribe_with(model, ode, init)
    }

    /// Builds the NLP from externally supplied model functions. `model` provides names,
    /// bounds and the initial guess; its expressions are not used.
    pub fn transcribe_with(
        &self,
        model: &OcpModel,
        ode: Arc<dyn OdeFunctions>,
        init: Arc<dyn InitFunctions>,
    ) -> OcpResult<TranscribedOcp> {
        model.validate()?;
        self.config.validate()?;
        let (nx, nu) = (model.nx(), model.nu());
        OcpError::check_len("ODE functions state dimension", nx, ode.nx())?;
        OcpError::check_len("ODE functions control dimension", nu, ode.nu())?;
        OcpError::check_len("initial-condition state dimension", nx, init.nx())?;

        let config = &self.config;
        let dt = config.dt();
        let interval_map = FixedStepIntegrator::new(dt, config.nj)?.build(ode);

        let layout = DecisionLayout::new(nx, nu, config.nk);
        let constraint_layout =
            ConstraintLayout::new(init.n_init(), nx, config.nk, config.link_terminal_state)?;

        let lb_v = layout.fill(&model.lb_x, &model.lb_u);
        let ub_v = layout.fill(&model.ub_x, &model.ub_u);
        let v0 = layout.fill(&model.x0_guess, &model.u0_guess);
        let ng = constraint_layout.ng();
        let lb_g = DVector::zeros(ng);
        let ub_g = DVector::zeros(ng);

        let functions = ShootingNlpFunctions::new(
            interval_map,
            init,
            layout.clone(),
            constraint_layout.clone(),
            config.parallel,
        )?;
        info!(
            "multiple shooting: nk = {}, nj = {}, dt = {}, nv = {}, ng = {}, terminal link: {}",
            config.nk,
            config.nj,
            dt,
            layout.nv(),
            ng,
            config.link_terminal_state
        );
        let nlp = NlpProblem::new(Arc::new(functions), lb_v, ub_v, v0, lb_g, ub_g)?;
        Ok(TranscribedOcp {
            nlp,
            layout,
            constraint_layout,
            dt,
        })
    }
}
