//! The `run_workflow` entry point: validate staged files, run the probe and
//! translate the outcome into a process exit code.
//!
//! Diagnostics go to stdout/stderr as plain text; the handler captures both
//! streams verbatim as the job log.
use std::path::PathBuf;

use serde_json::{Map, Value};

use crate::error::{AppError, AppResult};
use crate::probe::{ProbeRequest, Prober};
use crate::workflow::{load_graph, wire_input_images};

pub const EXIT_OK: i32 = 0;
pub const EXIT_WORKFLOW_MISSING: i32 = 2;
pub const EXIT_INPUTS_MISSING: i32 = 3;
pub const EXIT_EXECUTION_FAILED: i32 = 100;

#[derive(Debug, Clone)]
pub struct RunnerArgs {
    pub workflow: PathBuf,
    pub input1: PathBuf,
    pub input2: PathBuf,
    pub output: PathBuf,
    /// JSON object text, `{}` when the caller sent no params.
    pub params: String,
}

pub async fn run(args: &RunnerArgs, prober: &Prober) -> i32 {
    if !args.workflow.exists() {
        eprintln!("Workflow file not found: {}", args.workflow.display());
        return EXIT_WORKFLOW_MISSING;
    }
    if !args.input1.exists() || !args.input2.exists() {
        eprintln!("Input images not found");
        return EXIT_INPUTS_MISSING;
    }

    let (rc, msg) = match execute(args, prober).await {
        Ok(msg) => (0, msg),
        Err(e) => (1, e.to_string()),
    };
    println!("Execution result: {} {}", rc, msg);

    // The probe can succeed without writing anything; only the file counts.
    if rc == 0 && args.output.exists() {
        println!("Output produced at {}", args.output.display());
        EXIT_OK
    } else {
        eprintln!("Automatic workflow execution failed.");
        eprintln!("Check COMFYUI_URLS and that the workflow is an API-format export with two LoadImage nodes.");
        EXIT_EXECUTION_FAILED
    }
}

async fn execute(args: &RunnerArgs, prober: &Prober) -> AppResult<String> {
    let params = parse_params(&args.params)?;
    let graph = load_graph(&args.workflow).await?;
    // Reject unwireable graphs before any server sees them.
    wire_input_images(&mut graph.clone(), ["input1", "input2"])?;

    let request = ProbeRequest {
        graph: &graph,
        input1: &args.input1,
        input2: &args.input2,
        output: &args.output,
        params: &params,
    };
    prober.execute(&request).await
}

pub fn parse_params(raw: &str) -> AppResult<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(AppError::Validation(format!("--params must be a JSON object, got {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const GRAPH: &str = r#"{
        "1": {"class_type": "LoadImage", "inputs": {"image": "a.png"}},
        "2": {"class_type": "LoadImage", "inputs": {"image": "b.png"}},
        "3": {"class_type": "SaveImage", "inputs": {"images": ["9", 0]}}
    }"#;

    fn no_servers() -> Prober {
        Prober::new(Vec::new(), Duration::from_secs(1), Duration::from_millis(10))
    }

    fn staged(dir: &std::path::Path) -> RunnerArgs {
        let workflow = dir.join("wf.json");
        let input1 = dir.join("input1.png");
        let input2 = dir.join("input2.png");
        std::fs::write(&workflow, GRAPH).unwrap();
        std::fs::write(&input1, b"one").unwrap();
        std::fs::write(&input2, b"two").unwrap();
        RunnerArgs { workflow, input1, input2, output: dir.join("output.png"), params: "{}".into() }
    }

    #[tokio::test]
    async fn missing_workflow_exits_2() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = staged(dir.path());
        args.workflow = dir.path().join("nope.json");
        assert_eq!(run(&args, &no_servers()).await, EXIT_WORKFLOW_MISSING);
    }

    #[tokio::test]
    async fn missing_input_exits_3() {
        let dir = tempfile::tempdir().unwrap();
        let args = staged(dir.path());
        std::fs::remove_file(&args.input2).unwrap();
        assert_eq!(run(&args, &no_servers()).await, EXIT_INPUTS_MISSING);
    }

    #[tokio::test]
    async fn exhausted_probe_exits_100() {
        let dir = tempfile::tempdir().unwrap();
        let args = staged(dir.path());
        assert_eq!(run(&args, &no_servers()).await, EXIT_EXECUTION_FAILED);
        assert!(!args.output.exists());
    }

    #[tokio::test]
    async fn bad_params_exit_100() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = staged(dir.path());
        args.params = "[1, 2]".into();
        assert_eq!(run(&args, &no_servers()).await, EXIT_EXECUTION_FAILED);
    }

    #[test]
    fn params_accept_objects_and_null() {
        assert_eq!(parse_params(r#"{"seed": 3}"#).unwrap()["seed"], 3);
        assert!(parse_params("null").unwrap().is_empty());
        assert!(parse_params("{oops").is_err());
    }
}
