use taskflow_core::error::CliError;
use taskflow_core::executor::TaskGraph;
use taskflow_plugins::factory;

use super::cli::ValidateArgs;
use super::load_workflow;

/// Build the task graph without running anything and print its shape.
pub fn validate_cmd(args: &ValidateArgs) -> Result<i32, CliError> {
    let workflow = load_workflow(&args.workflow)?;
    let registry = factory::build_registry();

    let graph = match TaskGraph::build(&workflow.nodes, &workflow.edges, &registry) {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("invalid workflow: {e}");
            return Ok(12);
        }
    };

    let priorities = graph.priorities();
    println!(
        "{}: {} tasks, {} edges",
        args.workflow.display(),
        graph.len(),
        workflow.edges.len()
    );
    for id in graph.topo_order() {
        let priority = priorities.get(id).copied().unwrap_or_default();
        println!("  {id} (priority {priority})");
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_workflow(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_validate_accepts_dag() {
        let file = write_workflow(
            r#"{"nodes":[{"id":"a","type":"material","data":{"value":1}},
                         {"id":"b","type":"result"}],
                "edges":[{"source":"a","target":"b"}]}"#,
        );
        let args = ValidateArgs {
            workflow: file.path().to_path_buf(),
        };
        assert_eq!(validate_cmd(&args).unwrap(), 0);
    }

    #[test]
    fn test_validate_rejects_cycle() {
        let file = write_workflow(
            r#"{"nodes":[{"id":"a","type":"result"},{"id":"b","type":"result"}],
                "edges":[{"source":"a","target":"b"},{"source":"b","target":"a"}]}"#,
        );
        let args = ValidateArgs {
            workflow: file.path().to_path_buf(),
        };
        assert_eq!(validate_cmd(&args).unwrap(), 12);
    }

    #[test]
    fn test_malformed_json_is_workflow_error() {
        let file = write_workflow("{not json");
        let args = ValidateArgs {
            workflow: file.path().to_path_buf(),
        };
        assert!(matches!(validate_cmd(&args), Err(CliError::Workflow(_))));
    }
}
