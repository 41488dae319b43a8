//! Optimal control task read from a sectioned text document (see `Utils::task_parser`).
//!
//! ```text
//! model
//! states: c, T
//! controls: q
//! ode: expr_c, expr_T
//! cost: expr_L
//! init: c-0.5, T-350
//! bounds
//! lb_x: 0, 300
//! ub_x: 1, 400
//! lb_u: 0
//! ub_u: 1
//! guess
//! x0: 0.5, 350
//! u0: 0.5
//! shooting
//! tf: 150.0
//! nk: 20
//! nj: 10
//! link_terminal_state: false
//! parallel: true
//! solver
//! tolerance: 1e-8
//! max_iterations: 100
//! loglevel: info
//! ```
//! `model` and `shooting` are mandatory; `bounds` defaults to ±inf, `guess` to zeros and
//! `solver` to `SqpConfig::default()`. Expressions may not contain spaces or commas.
use crate::Utils::task_parser::{DocumentMap, SectionMap, Value, parse_document_as};
use crate::numerical::optimal_control::ocp_error::{OcpError, OcpResult};
use crate::numerical::optimal_control::ocp_model::OcpModel;
use crate::numerical::optimal_control::shooting_transcriber::ShootingConfig;
use crate::numerical::optimal_control::sqp_solver::SqpConfig;
use log::info;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct OcpTask {
    pub model: OcpModel,
    pub shooting: ShootingConfig,
    pub solver: SqpConfig,
    pub loglevel: Option<String>,
}

fn missing(section: &str, key: &str) -> OcpError {
    OcpError::configuration(format!("task: missing key '{}' in section '{}'", key, section))
}

fn bad_value(section: &str, key: &str, expected: &str, values: &[Value]) -> OcpError {
    let found: Vec<String> = values.iter().map(|v| v.to_string_value()).collect();
    OcpError::configuration(format!(
        "task: '{}.{}' must be {}, found [{}]",
        section,
        key,
        expected,
        found.join(", ")
    ))
}

/// Typed access to one section of the document.
struct Section<'a> {
    name: &'static str,
    map: Option<&'a SectionMap>,
}

impl<'a> Section<'a> {
    fn get(doc: &'a DocumentMap, name: &'static str) -> Self {
        Self {
            name,
            map: doc.get(name),
        }
    }

    fn required(doc: &'a DocumentMap, name: &'static str) -> OcpResult<Self> {
        if doc.contains_key(name) {
            Ok(Self::get(doc, name))
        } else {
            Err(OcpError::configuration(format!(
                "task: missing section '{}'",
                name
            )))
        }
    }

    fn optional(&self, key: &str) -> Option<&'a [Value]> {
        self.map?.get(key)?.as_deref()
    }

    fn values(&self, key: &str) -> OcpResult<&'a [Value]> {
        self.optional(key).ok_or_else(|| missing(self.name, key))
    }

    fn strings(&self, key: &str) -> OcpResult<Vec<String>> {
        Ok(self.values(key)?.iter().map(|v| v.to_string_value()).collect())
    }

    fn floats_of(&self, key: &str, values: &[Value]) -> OcpResult<Vec<f64>> {
        values
            .iter()
            .map(|v| v.as_float())
            .collect::<Option<Vec<f64>>>()
            .ok_or_else(|| bad_value(self.name, key, "a list of numbers", values))
    }

    fn optional_floats(&self, key: &str) -> OcpResult<Option<Vec<f64>>> {
        self.optional(key)
            .map(|values| self.floats_of(key, values))
            .transpose()
    }

    fn single<'v>(&self, key: &str, values: &'v [Value]) -> OcpResult<&'v Value> {
        match values {
            [v] => Ok(v),
            _ => Err(bad_value(self.name, key, "a single value", values)),
        }
    }

    fn float(&self, key: &str) -> OcpResult<f64> {
        let values = self.values(key)?;
        self.single(key, values)?
            .as_float()
            .ok_or_else(|| bad_value(self.name, key, "a number", values))
    }

    fn optional_float(&self, key: &str) -> OcpResult<Option<f64>> {
        match self.optional(key) {
            Some(_) => self.float(key).map(Some),
            None => Ok(None),
        }
    }

    fn count(&self, key: &str) -> OcpResult<usize> {
        let values = self.values(key)?;
        self.single(key, values)?
            .as_integer()
            .and_then(|i| usize::try_from(i).ok())
            .ok_or_else(|| bad_value(self.name, key, "a non-negative integer", values))
    }

    fn optional_count(&self, key: &str) -> OcpResult<Option<usize>> {
        match self.optional(key) {
            Some(_) => self.count(key).map(Some),
            None => Ok(None),
        }
    }

    fn optional_bool(&self, key: &str) -> OcpResult<Option<bool>> {
        match self.optional(key) {
            Some(values) => self
                .single(key, values)?
                .as_boolean()
                .map(Some)
                .ok_or_else(|| bad_value(self.name, key, "true or false", values)),
            None => Ok(None),
        }
    }

    fn optional_string(&self, key: &str) -> OcpResult<Option<String>> {
        match self.optional(key) {
            Some(values) => Ok(Some(self.single(key, values)?.to_string_value())),
            None => Ok(None),
        }
    }
}

fn as_strs(v: &[String]) -> Vec<&str> {
    v.iter().map(|s| s.as_str()).collect()
}

fn parse_model(doc: &DocumentMap) -> OcpResult<OcpModel> {
    let model = Section::required(doc, "model")?;
    let states = model.strings("states")?;
    let controls = match model.optional("controls") {
        Some(_) => model.strings("controls")?,
        None => Vec::new(),
    };
    let ode = model.strings("ode")?;
    let cost_values = model.values("cost")?;
    let cost = model.single("cost", cost_values)?.to_string_value();
    let init = model.strings("init")?;
    let mut ocp = OcpModel::from_strings(
        &as_strs(&states),
        &as_strs(&controls),
        &as_strs(&ode),
        &cost,
        &as_strs(&init),
    )?;

    let bounds = Section::get(doc, "bounds");
    if let Some(lb_x) = bounds.optional_floats("lb_x")? {
        ocp.lb_x = lb_x;
    }
    if let Some(ub_x) = bounds.optional_floats("ub_x")? {
        ocp.ub_x = ub_x;
    }
    if let Some(lb_u) = bounds.optional_floats("lb_u")? {
        ocp.lb_u = lb_u;
    }
    if let Some(ub_u) = bounds.optional_floats("ub_u")? {
        ocp.ub_u = ub_u;
    }

    let guess = Section::get(doc, "guess");
    if let Some(x0) = guess.optional_floats("x0")? {
        ocp.x0_guess = x0;
    }
    if let Some(u0) = guess.optional_floats("u0")? {
        ocp.u0_guess = u0;
    }
    Ok(ocp)
}

fn parse_shooting(doc: &DocumentMap) -> OcpResult<ShootingConfig> {
    let shooting = Section::required(doc, "shooting")?;
    let mut config = ShootingConfig::new(
        shooting.float("tf")?,
        shooting.count("nk")?,
        shooting.count("nj")?,
    );
    if let Some(link) = shooting.optional_bool("link_terminal_state")? {
        config = config.with_terminal_link(link);
    }
    if let Some(parallel) = shooting.optional_bool("parallel")? {
        config = config.with_parallel(parallel);
    }
    Ok(config)
}

fn parse_solver(doc: &DocumentMap) -> OcpResult<(SqpConfig, Option<String>)> {
    let solver = Section::get(doc, "solver");
    let mut config = SqpConfig::default();
    if let Some(tolerance) = solver.optional_float("tolerance")? {
        config.tolerance = tolerance;
    }
    if let Some(max_iterations) = solver.optional_count("max_iterations")? {
        config.max_iterations = max_iterations;
    }
    if let Some(step) = solver.optional_float("hessian_step")? {
        config.hessian_step = step;
    }
    if let Some(regularization) = solver.optional_float("regularization")? {
        config.regularization = regularization;
    }
    if let Some(penalty) = solver.optional_float("merit_penalty")? {
        config.merit_penalty = penalty;
    }
    let loglevel = solver.optional_string("loglevel")?;
    Ok((config, loglevel))
}

impl FromStr for OcpTask {
    type Err = OcpError;

    fn from_str(input: &str) -> OcpResult<Self> {
        let doc = parse_document_as(input).map_err(|reason| OcpError::Parse {
            input: "task document".to_string(),
            reason,
        })?;
        let model = parse_model(&doc)?;
        let shooting = parse_shooting(&doc)?;
        let (solver, loglevel) = parse_solver(&doc)?;
        model.validate()?;
        shooting.validate()?;
        solver.validate()?;
        Ok(Self {
            model,
            shooting,
            solver,
            loglevel,
        })
    }
}

impl OcpTask {
    pub fn from_file(path: &Path) -> OcpResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let task = content.parse()?;
        info!("task loaded from {}", path.display());
        Ok(task)
    }
}
