//! Explicit-ODE optimal control model
//!
//! minimize   ∫ L(x, u) dt   over [0, tf]
//! subject to dx/dt = f(x, u),  I(x(0)) = 0,  lb_x ≤ x ≤ ub_x,  lb_u ≤ u ≤ ub_u
//!
//! `OcpModel` is plain data: symbolic expressions in named state and control symbols plus
//! bounds and an initial guess. It is never mutated by the transcription.
use crate::numerical::optimal_control::ocp_error::{OcpError, OcpResult};
use crate::symbolic::symbolic_engine::Expr;
use log::warn;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct OcpModel {
    pub states: Vec<String>,
    pub controls: Vec<String>,
    /// right-hand side f(x,u), one expression per state
    pub ode: Vec<Expr>,
    /// running cost rate L(x,u)
    pub cost: Expr,
    /// initial-condition residual I(x), any length
    pub init: Vec<Expr>,
    pub lb_x: Vec<f64>,
    pub ub_x: Vec<f64>,
    pub lb_u: Vec<f64>,
    pub ub_u: Vec<f64>,
    pub x0_guess: Vec<f64>,
    pub u0_guess: Vec<f64>,
}

impl OcpModel {
    /// Model without bounds (all ±inf) and with zero initial guess.
    pub fn new(
        states: &[&str],
        controls: &[&str],
        ode: Vec<Expr>,
        cost: Expr,
        init: Vec<Expr>,
    ) -> Self {
        let nx = states.len();
        let nu = controls.len();
        Self {
            states: states.iter().map(|s| s.to_string()).collect(),
            controls: controls.iter().map(|s| s.to_string()).collect(),
            ode,
            cost,
            init,
            lb_x: vec![f64::NEG_INFINITY; nx],
            ub_x: vec![f64::INFINITY; nx],
            lb_u: vec![f64::NEG_INFINITY; nu],
            ub_u: vec![f64::INFINITY; nu],
            x0_guess: vec![0.0; nx],
            u0_guess: vec![0.0; nu],
        }
    }

    /// Same as `new`, with f, L and I given as strings.
    pub fn from_strings(
        states: &[&str],
        controls: &[&str],
        ode: &[&str],
        cost: &str,
        init: &[&str],
    ) -> OcpResult<Self> {
        let parse = |s: &str| {
            Expr::parse_expression(s).map_err(|reason| OcpError::Parse {
                input: s.to_string(),
                reason,
            })
        };
        let ode = ode.iter().map(|s| parse(s)).collect::<OcpResult<Vec<_>>>()?;
        let cost = parse(cost)?;
        let init = init.iter().map(|s| parse(s)).collect::<OcpResult<Vec<_>>>()?;
        Ok(Self::new(states, controls, ode, cost, init))
    }

    pub fn with_state_bounds(mut self, lb_x: Vec<f64>, ub_x: Vec<f64>) -> Self {
        self.lb_x = lb_x;
        self.ub_x = ub_x;
        self
    }

    pub fn with_control_bounds(mut self, lb_u: Vec<f64>, ub_u: Vec<f64>) -> Self {
        self.lb_u = lb_u;
        self.ub_u = ub_u;
        self
    }

    pub fn with_guess(mut self, x0_guess: Vec<f64>, u0_guess: Vec<f64>) -> Self {
        self.x0_guess = x0_guess;
        self.u0_guess = u0_guess;
        self
    }

    pub fn nx(&self) -> usize {
        self.states.len()
    }

    pub fn nu(&self) -> usize {
        self.controls.len()
    }

    pub fn n_init(&self) -> usize {
        self.init.len()
    }

    /// states followed by controls: the argument order of every compiled model function
    pub fn arguments(&self) -> Vec<&str> {
        self.states
            .iter()
            .chain(self.controls.iter())
            .map(|s| s.as_str())
            .collect()
    }

    /// Shape and consistency checks; every failure is a configuration error and happens
    /// before any numeric work.
    pub fn validate(&self) -> OcpResult<()> {
        let nx = self.nx();
        let nu = self.nu();
        if nx == 0 {
            return Err(OcpError::configuration("model has no states"));
        }
        OcpError::check_len("ode right-hand side", nx, self.ode.len())?;
        OcpError::check_len("lb_x", nx, self.lb_x.len())?;
        OcpError::check_len("ub_x", nx, self.ub_x.len())?;
        OcpError::check_len("x0_guess", nx, self.x0_guess.len())?;
        OcpError::check_len("lb_u", nu, self.lb_u.len())?;
        OcpError::check_len("ub_u", nu, self.ub_u.len())?;
        OcpError::check_len("u0_guess", nu, self.u0_guess.len())?;

        let mut seen = HashSet::new();
        for name in self.states.iter().chain(self.controls.iter()) {
            if name.is_empty() {
                return Err(OcpError::configuration("empty variable name"));
            }
            if !seen.insert(name.as_str()) {
                return Err(OcpError::configuration(format!(
                    "variable '{}' is declared twice",
                    name
                )));
            }
        }

        let states: HashSet<&str> = self.states.iter().map(|s| s.as_str()).collect();
        for (i, residual) in self.init.iter().enumerate() {
            if let Some(v) = residual
                .all_arguments_are_variables()
                .into_iter()
                .find(|v| !states.contains(v.as_str()))
            {
                return Err(OcpError::configuration(format!(
                    "initial condition {} depends on '{}', which is not a state",
                    i, v
                )));
            }
        }
        for (what, expr) in self
            .ode
            .iter()
            .enumerate()
            .map(|(i, e)| (format!("ode equation {}", i), e))
            .chain(std::iter::once(("running cost".to_string(), &self.cost)))
        {
            if let Some(v) = expr
                .all_arguments_are_variables()
                .into_iter()
                .find(|v| !seen.contains(v.as_str()))
            {
                return Err(OcpError::configuration(format!(
                    "{} depends on unknown symbol '{}'",
                    what, v
                )));
            }
        }

        check_box("state", &self.states, &self.lb_x, &self.ub_x, &self.x0_guess)?;
        check_box("control", &self.controls, &self.lb_u, &self.ub_u, &self.u0_guess)?;
        Ok(())
    }
}

fn check_box(kind: &str, names: &[String], lb: &[f64], ub: &[f64], guess: &[f64]) -> OcpResult<()> {
    for (i, name) in names.iter().enumerate() {
        let (l, u, g) = (lb[i], ub[i], guess[i]);
        if l.is_nan() || u.is_nan() || l > u {
            return Err(OcpError::configuration(format!(
                "{} '{}' has invalid bounds [{}, {}]",
                kind, name, l, u
            )));
        }
        if !g.is_finite() {
            return Err(OcpError::configuration(format!(
                "initial guess {} of {} '{}' is not finite",
                g, kind, name
            )));
        }
        if g < l || g > u {
            warn!(
                "initial guess {} of {} '{}' is outside its bounds [{}, {}]",
                g, kind, name, l, u
            );
        }
    }
    Ok(())
}
