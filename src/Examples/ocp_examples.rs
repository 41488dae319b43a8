use crate::numerical::optimal_control::ocp_api::{DirectMultipleShooting, OcpOutcome};
use crate::numerical::optimal_control::ocp_error::OcpResult;
use crate::numerical::optimal_control::ocp_model::OcpModel;
use crate::numerical::optimal_control::ocp_task_parser::OcpTask;
use crate::numerical::optimal_control::shooting_transcriber::{
    ShootingConfig, ShootingTranscriber,
};
use log::info;
use std::path::Path;

/// Continuous stirred tank reactor with a cooling jacket, exothermic reaction A -> B.
/// States: concentration `c` [mol/m^3] and temperature `T` [K]; control: jacket
/// temperature `Tc` [K]. Tracking cost towards (c, T, Tc) = (500, 320, 300), scaled by 1e-4.
pub fn cstr_model() -> OcpResult<OcpModel> {
    let ode_c = "0.016667*(1000-c)-3e8*c*exp(-8750/T)";
    let ode_t = "0.016667*(350-T)+6.276e7*c*exp(-8750/T)+0.035*(Tc-T)";
    let cost = "1e-4*((c-500)^2+(T-320)^2+(Tc-300)^2)";
    let init = ["c-956.271065", "T-250.051971"];
    let model = OcpModel::from_strings(&["c", "T"], &["Tc"], &[ode_c, ode_t], cost, &init)?
        .with_state_bounds(vec![0.0, 200.0], vec![1000.0, 450.0])
        .with_control_bounds(vec![230.0], vec![370.0])
        .with_guess(vec![956.271065, 250.051971], vec![280.0]);
    Ok(model)
}

/// 150 s horizon, 20 intervals, 10 RK4 sub-steps each
pub fn cstr_config() -> ShootingConfig {
    ShootingConfig::new(150.0, 20, 10)
}

/// The CSTR problem as a task document.
pub fn cstr_task() -> &'static str {
    "
// CSTR start-up
model
states: c, T
controls: Tc
ode: 0.016667*(1000-c)-3e8*c*exp(-8750/T), 0.016667*(350-T)+6.276e7*c*exp(-8750/T)+0.035*(Tc-T)
cost: 1e-4*((c-500)^2+(T-320)^2+(Tc-300)^2)
init: c-956.271065, T-250.051971
bounds
lb_x: 0, 200
ub_x: 1000, 450
lb_u: 230
ub_u: 370
guess
x0: 956.271065, 250.051971
u0: 280
shooting
tf: 150.0
nk: 20
nj: 10
solver
tolerance: 1e-6
max_iterations: 100
loglevel: info
"
}

fn report(outcome: &OcpOutcome) {
    let solution = outcome.solution();
    for (name, values) in solution.state_names.iter().zip(solution.states.iter()) {
        println!("{} = {:?}", name, values);
    }
    for (name, values) in solution.control_names.iter().zip(solution.controls.iter()) {
        println!("{} = {:?}", name, values);
    }
    println!(
        "converged: {}, objective {:e}",
        outcome.is_converged(),
        outcome.nlp().objective
    );
}

/// Runs a task file and saves the trajectories next to it as `<name>.csv`.
pub fn run_task_file(path: &Path) -> OcpResult<OcpOutcome> {
    let task = OcpTask::from_file(path)?;
    let mut ocp = DirectMultipleShooting::from_task(task);
    let outcome = ocp.solve()?;
    let csv = path.with_extension("csv");
    outcome.solution().save_to_csv(&csv)?;
    report(&outcome);
    Ok(outcome)
}

pub fn ocp_examples(example: usize) -> OcpResult<()> {
    match example {
        0 => {
            // transcription only: problem sizes of the CSTR NLP
            let model = cstr_model()?;
            let ocp = ShootingTranscriber::new(cstr_config()).transcribe(&model)?;
            let v0 = ocp.nlp.v0.clone();
            let g = ocp.nlp.constraints(v0.as_slice())?;
            println!(
                "nv = {}, ng = {}, jacobian non-zeros = {}, |g(v0)|_inf = {:e}",
                ocp.layout.nv(),
                ocp.constraint_layout.ng(),
                ocp.nlp.jacobian_sparsity().len(),
                g.amax()
            );
        }
        1 => {
            // first-order tracking problem with the reference SQP solver
            let model =
                OcpModel::from_strings(&["x"], &["u"], &["-x+u"], "x^2+u^2", &["x-1"])?;
            let mut ocp = DirectMultipleShooting::new(model, ShootingConfig::new(1.0, 10, 4));
            ocp.set_log_level("info");
            let outcome = ocp.solve()?;
            report(&outcome);
        }
        2 => {
            // CSTR start-up
            let mut ocp = DirectMultipleShooting::new(cstr_model()?, cstr_config());
            ocp.solver_config.tolerance = 1e-6;
            let outcome = ocp.solve()?;
            report(&outcome);
            if let Some((t, tc)) = outcome.solution().control_step_profile(0) {
                info!("Tc step profile: t = {:?}, Tc = {:?}", t, tc);
            }
        }
        3 => {
            // the same problem from a task document
            let task: OcpTask = cstr_task().parse()?;
            let mut ocp = DirectMultipleShooting::from_task(task);
            let outcome = ocp.solve()?;
            report(&outcome);
        }
        _ => {
            println!("no example with number {}", example);
        }
    }
    Ok(())
}
