//! examples of usage of RustedOCP
/// Optimal control examples: CSTR start-up, first-order tracking, task files
pub mod ocp_examples;
