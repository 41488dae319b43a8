/// errors of the whole pipeline
pub mod ocp_error;
/// explicit-ODE optimal control model: names, expressions, bounds, guess
pub mod ocp_model;
/// `OdeFunctions` / `InitFunctions` traits and their symbolic implementations
pub mod model_functions;
/// fixed-step RK4 interval map with exact discrete sensitivities
pub mod rk4_integrator;
/// solver-facing NLP and the `NlpSolver` trait
pub mod nlp_problem;
/// decision/constraint layouts and the multiple shooting transcription
pub mod shooting_transcriber;
/// dense reference SQP solver
pub mod sqp_solver;
/// trajectories from the NLP solution
pub mod solution_extractor;
/// task files
pub mod ocp_task_parser;
/// # DirectMultipleShooting
/// transcription, solve, extraction, logging and statistics in one call
pub mod ocp_api;
mod ocp_tests;
