pub mod cli;
pub mod run;
pub mod validate;

use std::path::Path;

use taskflow_core::error::CliError;
use taskflow_core::workflow::Workflow;

/// Read and parse a workflow file. Read failures are IO errors, parse
/// failures are workflow errors.
pub fn load_workflow(path: &Path) -> Result<Workflow, CliError> {
    let raw = std::fs::read_to_string(path)?;
    Workflow::from_json(&raw)
        .map_err(|e| CliError::Workflow(format!("{}: {e}", path.display())))
}
