//! # DirectMultipleShooting
//!
//! One-stop driver: model + shooting configuration in, trajectories out.
//!
//! ```rust, ignore
//! use RustedOCP::numerical::optimal_control::ocp_api::DirectMultipleShooting;
//! use RustedOCP::numerical::optimal_control::ocp_model::OcpModel;
//! use RustedOCP::numerical::optimal_control::shooting_transcriber::ShootingConfig;
//!
//! let model = OcpModel::from_strings(&["x"], &["u"], &["-x+u"], "x^2+u^2", &["x-1"]).unwrap();
//! let mut ocp = DirectMultipleShooting::new(model, ShootingConfig::new(1.0, 10, 4));
//! ocp.set_log_level("warn");
//! let solution = ocp.solve().unwrap().into_result().unwrap();
//! println!("{:?}", solution.state("x"));
//! ```
use crate::numerical::optimal_control::nlp_problem::{NlpSolution, NlpSolver, NlpStatus};
use crate::numerical::optimal_control::ocp_error::{OcpError, OcpResult};
use crate::numerical::optimal_control::ocp_model::OcpModel;
use crate::numerical::optimal_control::ocp_task_parser::OcpTask;
use crate::numerical::optimal_control::shooting_transcriber::{
    ShootingConfig, ShootingTranscriber, TranscribedOcp,
};
use crate::numerical::optimal_control::solution_extractor::{OcpSolution, SolutionExtractor};
use crate::numerical::optimal_control::sqp_solver::{SqpConfig, SqpSolver};
use chrono::Local;
use itertools::Itertools;
use log::{LevelFilter, info, warn};
use simplelog::*;
use std::collections::HashMap;
use std::fs::File;
use std::time::Instant;
use tabled::builder::Builder;
use tabled::settings::Style;

/// Result of a solve that reached the solver. A non-converged run still carries the
/// best-effort trajectory; it is never reported as success.
#[derive(Debug, Clone)]
pub enum OcpOutcome {
    Converged {
        solution: OcpSolution,
        nlp: NlpSolution,
    },
    NonConverged {
        solution: OcpSolution,
        nlp: NlpSolution,
        status: NlpStatus,
    },
}

impl OcpOutcome {
    pub fn is_converged(&self) -> bool {
        matches!(self, OcpOutcome::Converged { .. })
    }

    pub fn solution(&self) -> &OcpSolution {
        match self {
            OcpOutcome::Converged { solution, .. } | OcpOutcome::NonConverged { solution, .. } => {
                solution
            }
        }
    }

    pub fn nlp(&self) -> &NlpSolution {
        match self {
            OcpOutcome::Converged { nlp, .. } | OcpOutcome::NonConverged { nlp, .. } => nlp,
        }
    }

    /// The trajectory if converged, `SolverNonConvergence` otherwise.
    pub fn into_result(self) -> OcpResult<OcpSolution> {
        match self {
            OcpOutcome::Converged { solution, .. } => Ok(solution),
            OcpOutcome::NonConverged { nlp, status, .. } => Err(OcpError::SolverNonConvergence {
                status,
                iterations: nlp.iterations,
                constraint_violation: nlp.constraint_violation,
            }),
        }
    }
}

/// `None` means logging disabled.
fn parse_loglevel(level: Option<&str>) -> OcpResult<Option<LevelFilter>> {
    let filter = match level.map(|l| l.to_lowercase()) {
        None => Some(LevelFilter::Info),
        Some(l) => match l.as_str() {
            "off" | "none" => None,
            "error" => Some(LevelFilter::Error),
            "warn" => Some(LevelFilter::Warn),
            "info" => Some(LevelFilter::Info),
            "debug" => Some(LevelFilter::Debug),
            "trace" => Some(LevelFilter::Trace),
            other => {
                return Err(OcpError::configuration(format!(
                    "loglevel must be off, none, error, warn, info, debug or trace, got '{}'",
                    other
                )));
            }
        },
    };
    Ok(filter)
}

pub struct DirectMultipleShooting {
    pub model: OcpModel,
    pub config: ShootingConfig,
    pub solver_config: SqpConfig,
    /// off | none | error | warn | info | debug | trace; info when unset
    pub loglevel: Option<String>,
    /// also write the log to `log_<date>.txt`
    pub log_to_file: bool,
    timer_hash: HashMap<String, f64>,
    calc_statistics: HashMap<String, usize>,
}

impl DirectMultipleShooting {
    pub fn new(model: OcpModel, config: ShootingConfig) -> Self {
        Self {
            model,
            config,
            solver_config: SqpConfig::default(),
            loglevel: None,
            log_to_file: false,
            timer_hash: HashMap::new(),
            calc_statistics: HashMap::new(),
        }
    }

    pub fn from_task(task: OcpTask) -> Self {
        let mut ocp = Self::new(task.model, task.shooting);
        ocp.solver_config = task.solver;
        ocp.loglevel = task.loglevel;
        ocp
    }

    pub fn with_solver_config(mut self, solver_config: SqpConfig) -> Self {
        self.solver_config = solver_config;
        self
    }

    pub fn set_log_level(&mut self, level: &str) {
        self.loglevel = Some(level.to_string());
    }

    pub fn set_log_file(&mut self, enabled: bool) {
        self.log_to_file = enabled;
    }

    pub fn timer_hash(&self) -> &HashMap<String, f64> {
        &self.timer_hash
    }

    pub fn calc_statistics(&self) -> &HashMap<String, usize> {
        &self.calc_statistics
    }

    /// Builds the NLP; no solver involved.
    pub fn transcribe(&mut self) -> OcpResult<TranscribedOcp> {
        info!(
            "transcribing OCP: states [{}], controls [{}]",
            self.model.states.iter().join(", "),
            self.model.controls.iter().join(", ")
        );
        let now = Instant::now();
        let ocp = ShootingTranscriber::new(self.config.clone()).transcribe(&self.model)?;
        self.timer_hash.insert(
            "transcription time, s".to_string(),
            now.elapsed().as_secs_f64(),
        );
        self.calc_statistics
            .insert("number of decision variables".to_string(), ocp.layout.nv());
        self.calc_statistics
            .insert("number of constraints".to_string(), ocp.constraint_layout.ng());
        self.calc_statistics.insert(
            "non-zeros in constraint jacobian".to_string(),
            ocp.nlp.jacobian_sparsity().len(),
        );
        Ok(ocp)
    }

    /// Transcribe, solve with `solver` and extract the trajectories.
    pub fn solve_with<S: NlpSolver>(&mut self, solver: &S) -> OcpResult<OcpOutcome> {
        let total = Instant::now();
        let ocp = self.transcribe()?;

        let now = Instant::now();
        let nlp = solver.solve(&ocp.nlp)?;
        self.timer_hash
            .insert("NLP solver time, s".to_string(), now.elapsed().as_secs_f64());
        self.calc_statistics
            .insert("NLP iterations".to_string(), nlp.iterations);

        let solution = SolutionExtractor::extract(
            &ocp.layout,
            &nlp.v,
            ocp.dt,
            &self.model.states,
            &self.model.controls,
        )?;
        self.timer_hash
            .insert("total time, s".to_string(), total.elapsed().as_secs_f64());
        self.report();

        if nlp.is_converged() {
            info!("OCP solved, objective {:e}", nlp.objective);
            Ok(OcpOutcome::Converged { solution, nlp })
        } else {
            warn!(
                "OCP not solved: {} (constraint violation {:e})",
                nlp.status, nlp.constraint_violation
            );
            let status = nlp.status;
            Ok(OcpOutcome::NonConverged {
                solution,
                nlp,
                status,
            })
        }
    }

    /// `solve_with` the reference SQP solver, wrapped in logger initialization.
    pub fn solve(&mut self) -> OcpResult<OcpOutcome> {
        self.init_logger()?;
        let solver = SqpSolver::new(self.solver_config.clone());
        let res = self.solve_with(&solver);
        info!(" \n \n Program ended");
        res
    }

    fn init_logger(&self) -> OcpResult<()> {
        let Some(level) = parse_loglevel(self.loglevel.as_deref())? else {
            return Ok(());
        };
        let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
        loggers.push(TermLogger::new(
            level,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ));
        if self.log_to_file {
            let date_and_time = Local::now().format("%Y-%m-%d_%H-%M-%S");
            let name = format!("log_{}.txt", date_and_time);
            loggers.push(WriteLogger::new(level, Config::default(), File::create(name)?));
        }
        // a global logger may already be installed
        let _ = CombinedLogger::init(loggers);
        Ok(())
    }

    fn report(&self) {
        let mut table = Builder::from(self.calc_statistics.clone()).build();
        table.with(Style::modern_rounded());
        info!("\n \n CALC STATISTICS \n \n {}", table.to_string());

        let timer: HashMap<String, String> = self
            .timer_hash
            .iter()
            .map(|(k, v)| (k.clone(), format!("{:.4}", v)))
            .collect();
        let mut table = Builder::from(timer).build();
        table.with(Style::modern_rounded());
        info!("\n \n TIMER DATA \n \n {}", table.to_string());
    }
}
