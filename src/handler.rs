//! The serverless job handler.
//!
//! One call stages both input images in a private temp directory, runs the
//! `run_workflow` runner against them under a wall-clock limit and turns
//! whatever happened into a [`JobResult`]. The temp directory is removed on
//! every return path.
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{Map, Value};
use tokio::fs;
use tokio::process::Command;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::job::{JobRequest, JobResult};
use crate::process;

pub const RUNNER_FAILED: &str = "Workflow runner failed";
pub const NO_OUTPUT: &str = "No output image produced. See log.";

#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub runner_bin: PathBuf,
    pub runner_timeout: Duration,
    pub default_workflow: String,
}

impl From<&Config> for HandlerConfig {
    fn from(config: &Config) -> Self {
        HandlerConfig {
            runner_bin: config.runner_bin.clone(),
            runner_timeout: config.runner_timeout,
            default_workflow: config.default_workflow.clone(),
        }
    }
}

/// Files of one job inside its staging directory.
struct Staged {
    input1: PathBuf,
    input2: PathBuf,
    output: PathBuf,
    log: PathBuf,
}

impl Staged {
    fn in_dir(dir: &Path) -> Self {
        Staged {
            input1: dir.join("input1.png"),
            input2: dir.join("input2.png"),
            output: dir.join("output.png"),
            log: dir.join("runlog.txt"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Handler {
    config: HandlerConfig,
}

impl Handler {
    pub fn new(config: HandlerConfig) -> Self {
        Handler { config }
    }

    /// Run one job. Never fails: every error becomes an error result.
    pub async fn handle(&self, event: Value) -> JobResult {
        let start = Instant::now();
        match self.try_handle(event, start).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("job failed: {}", e);
                JobResult::error(e.to_string())
            }
        }
    }

    async fn try_handle(&self, event: Value, start: Instant) -> AppResult<JobResult> {
        let job = JobRequest::from_event(event)?;
        let (image1_b64, image2_b64) = job.require_images()?;

        let staging = tempfile::Builder::new().prefix("edit-job-").tempdir()?;
        let files = Staged::in_dir(staging.path());
        tracing::debug!("staging job in {}", staging.path().display());

        fs::write(&files.input1, decode("image1_b64", image1_b64)?).await?;
        fs::write(&files.input2, decode("image2_b64", image2_b64)?).await?;

        let workflow = job
            .workflow
            .clone()
            .unwrap_or_else(|| self.config.default_workflow.clone());
        let mut cmd = self.runner_command(&workflow, &files, job.forwarded_params())?;

        tracing::info!("running workflow {} via {}", workflow, self.config.runner_bin.display());
        let out = process::run_with_timeout(&mut cmd, self.config.runner_timeout).await?;
        let run_log = out.combined_log();
        fs::write(&files.log, &run_log).await?;

        tracing::info!("runner exited with {} after {:.1?}", out.exit_code, out.duration);
        if !out.success() {
            return Ok(JobResult::error(RUNNER_FAILED)
                .with_returncode(out.exit_code)
                .with_log(run_log));
        }
        if !fs::try_exists(&files.output).await? {
            tracing::warn!("runner exited cleanly without writing {}", files.output.display());
            return Ok(JobResult::error(NO_OUTPUT).with_log(run_log));
        }

        let output_b64 = STANDARD.encode(fs::read(&files.output).await?);
        let elapsed = start.elapsed().as_secs_f64();
        tracing::info!("job finished in {:.2}s", elapsed);
        Ok(JobResult::ok(output_b64, run_log, elapsed))
    }

    fn runner_command(
        &self,
        workflow: &str,
        files: &Staged,
        params: Option<&Map<String, Value>>,
    ) -> AppResult<Command> {
        let mut cmd = Command::new(&self.config.runner_bin);
        cmd.arg("--workflow")
            .arg(workflow)
            .arg("--input1")
            .arg(&files.input1)
            .arg("--input2")
            .arg(&files.input2)
            .arg("--output")
            .arg(&files.output);
        if let Some(params) = params {
            cmd.arg("--params").arg(serde_json::to_string(params)?);
        }
        Ok(cmd)
    }
}

/// Decode standard base64, ignoring line breaks and other ASCII whitespace
/// that MIME encoders and the `base64` tool insert.
fn decode(field: &'static str, b64: &str) -> AppResult<Vec<u8>> {
    let compact: String = b64.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|source| AppError::Base64 { field, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_round_trips_arbitrary_bytes() {
        let bytes: Vec<u8> = (0..=255u8).rev().chain([0, 0, 1]).collect();
        let encoded = STANDARD.encode(&bytes);
        assert_eq!(decode("image1_b64", &encoded).unwrap(), bytes);
    }

    #[test]
    fn wrapped_base64_is_accepted() {
        let bytes: Vec<u8> = (0..200u16).map(|i| (i * 7 % 256) as u8).collect();
        let encoded = STANDARD.encode(&bytes);
        let wrapped = encoded
            .as_bytes()
            .chunks(76)
            .map(|line| std::str::from_utf8(line).unwrap())
            .collect::<Vec<_>>()
            .join("\r\n");
        assert!(wrapped.contains('\n'));
        assert_eq!(decode("image1_b64", &format!("{}\n", wrapped)).unwrap(), bytes);
    }

    #[test]
    fn invalid_base64_names_the_field() {
        let err = decode("image2_b64", "***").unwrap_err();
        assert!(err.to_string().contains("image2_b64"));
    }

    #[tokio::test]
    async fn missing_image_returns_error_without_running() {
        let handler = Handler::new(HandlerConfig {
            runner_bin: PathBuf::from("/nonexistent/run_workflow"),
            runner_timeout: Duration::from_secs(1),
            default_workflow: "/wf.json".into(),
        });
        let result = handler.handle(serde_json::json!({"image1_b64": "YQ=="})).await;
        assert!(!result.is_ok());
        assert_eq!(result.message.as_deref(), Some(crate::job::MISSING_IMAGES));
        assert!(result.returncode.is_none());
    }

    #[test]
    fn params_are_forwarded_as_json() {
        let handler = Handler::new(HandlerConfig {
            runner_bin: PathBuf::from("run_workflow"),
            runner_timeout: Duration::from_secs(1),
            default_workflow: "/wf.json".into(),
        });
        let files = Staged::in_dir(Path::new("/stage"));
        let mut params = Map::new();
        params.insert("seed".into(), Value::from(9));
        let cmd = handler.runner_command("/wf.json", &files, Some(&params)).unwrap();
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "--workflow", "/wf.json",
                "--input1", "/stage/input1.png",
                "--input2", "/stage/input2.png",
                "--output", "/stage/output.png",
                "--params", r#"{"seed":9}"#,
            ]
        );
    }
}
