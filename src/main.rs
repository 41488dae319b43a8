#![allow(non_snake_case)]
use RustedOCP::Examples::ocp_examples::{ocp_examples, run_task_file};
use std::path::Path;

/// `RustedOCP <task file>` solves the task and writes `<task file>.csv`;
/// without arguments the CSTR example runs.
fn main() {
    let result = match std::env::args().nth(1) {
        Some(path) => run_task_file(Path::new(&path)).map(|_| ()),
        None => ocp_examples(2),
    };
    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
