use std::{collections::BTreeMap, io::ErrorKind, process::Stdio, time::Duration};

use thiserror::Error;
use tokio::{io::AsyncWriteExt, process::Command};

pub const TEST_SCRIPT: &str = "test";
pub const WEATHER_SCRIPT: &str = "get weather";
pub const UPDATE_CONDA_SCRIPT: &str = "update conda";
pub const UPDATE_ENV_SCRIPT: &str = "update conda env";

pub const DEFAULT_SCRIPT_TIMEOUT_SECS: u64 = 60;
/// Environment updates download packages.
const UPDATE_ENV_TIMEOUT: Duration = Duration::from_secs(30 * 60);

pub fn default_scripts() -> BTreeMap<String, String> {
    BTreeMap::from([
        (TEST_SCRIPT.to_owned(), "cat".to_owned()),
        (
            WEATHER_SCRIPT.to_owned(),
            "conda run --no-capture-output -n noaa python3 NOAA_scripts/get_weather.py".to_owned(),
        ),
        (
            UPDATE_CONDA_SCRIPT.to_owned(),
            "conda update -n base -c defaults conda -y".to_owned(),
        ),
        (
            UPDATE_ENV_SCRIPT.to_owned(),
            "conda env update -f NOAA_scripts/environment.yml -n noaa --prune".to_owned(),
        ),
    ])
}

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("no script named {0:?}")]
    UnknownScript(String),
    #[error("script {0:?} has an empty command line")]
    EmptyCommand(String),
    #[error("script {id:?} exited with {status}: {stderr}")]
    Failed {
        id: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("script {id:?} did not finish within {limit:?}")]
    TimedOut { id: String, limit: Duration },
    #[error("could not run script: {0}")]
    Io(#[from] std::io::Error),
    #[error("script printed malformed JSON: {0}")]
    MalformedOutput(#[from] serde_json::Error),
}

/// Only commands listed in the table can be run. Command lines are split on
/// whitespace and executed directly, never through a shell.
#[derive(Clone, Debug)]
pub struct ScriptRunner {
    scripts: BTreeMap<String, String>,
    timeout: Duration,
}

impl ScriptRunner {
    pub fn new(scripts: BTreeMap<String, String>) -> ScriptRunner {
        ScriptRunner {
            scripts,
            timeout: Duration::from_secs(DEFAULT_SCRIPT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> ScriptRunner {
        self.timeout = timeout;
        self
    }

    pub async fn run(&self, id: &str, stdin: Option<&[u8]>) -> Result<Vec<u8>, ScriptError> {
        self.run_within(id, stdin, self.timeout).await
    }

    /// The child is killed when `limit` passes.
    async fn run_within(
        &self,
        id: &str,
        stdin: Option<&[u8]>,
        limit: Duration,
    ) -> Result<Vec<u8>, ScriptError> {
        let command_line = self
            .scripts
            .get(id)
            .ok_or_else(|| ScriptError::UnknownScript(id.to_owned()))?;
        let mut parts = command_line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| ScriptError::EmptyCommand(id.to_owned()))?;

        tracing::debug!("running script {id:?}: {command_line}");
        let mut child = Command::new(program)
            .args(parts)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Input is fed while output is collected so neither pipe can fill up
        // and stall the other. Dropping the pipe closes the child's stdin.
        let pipe = child.stdin.take();
        let feed = async move {
            if let (Some(mut pipe), Some(input)) = (pipe, stdin) {
                match pipe.write_all(input).await {
                    Err(error) if error.kind() != ErrorKind::BrokenPipe => return Err(error),
                    _ => {}
                }
            }
            Ok::<(), std::io::Error>(())
        };
        let finished = async {
            let (fed, output) = tokio::join!(feed, child.wait_with_output());
            fed?;
            output
        };

        let output = tokio::time::timeout(limit, finished)
            .await
            .map_err(|_| ScriptError::TimedOut {
                id: id.to_owned(),
                limit,
            })??;
        if !output.status.success() {
            return Err(ScriptError::Failed {
                id: id.to_owned(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(output.stdout)
    }

    /// Sends `input` as JSON and parses the script's stdout as JSON.
    pub async fn run_json(
        &self,
        id: &str,
        input: &serde_json::Value,
    ) -> Result<serde_json::Value, ScriptError> {
        let stdin = serde_json::to_vec(input)?;
        let stdout = self.run(id, Some(&stdin)).await?;
        Ok(serde_json::from_slice(&stdout)?)
    }

    /// Refreshes the conda environment the weather script runs in.
    pub async fn update_env(&self) -> Result<(), ScriptError> {
        self.run_within(UPDATE_ENV_SCRIPT, None, UPDATE_ENV_TIMEOUT)
            .await?;
        tracing::info!("script environment updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn runner(entries: &[(&str, &str)]) -> ScriptRunner {
        ScriptRunner::new(
            entries
                .iter()
                .map(|(id, command)| (id.to_string(), command.to_string()))
                .collect(),
        )
    }

    #[tokio::test]
    async fn unknown_scripts_are_refused() {
        let scripts = runner(&[]);
        assert!(matches!(
            scripts.run("rm -rf /", None).await,
            Err(ScriptError::UnknownScript(_))
        ));
    }

    #[tokio::test]
    async fn blank_commands_are_refused() {
        let scripts = runner(&[("blank", "   ")]);
        assert!(matches!(
            scripts.run("blank", None).await,
            Err(ScriptError::EmptyCommand(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn json_goes_through_stdin_and_back() {
        let scripts = runner(&[("echo", "cat")]);
        let input = json!({"latitude": 36.6, "longitude": -121.9});
        assert_eq!(scripts.run_json("echo", &input).await.unwrap(), input);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_scripts_are_errors() {
        let scripts = runner(&[("fail", "false")]);
        assert!(matches!(
            scripts.run("fail", None).await,
            Err(ScriptError::Failed { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn large_inputs_do_not_stall() {
        let scripts = runner(&[("echo", "cat")]);
        let input = json!({ "padding": "~".repeat(300 * 1024) });
        assert_eq!(scripts.run_json("echo", &input).await.unwrap(), input);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_scripts_time_out() {
        let scripts = runner(&[("nap", "sleep 5")]).with_timeout(Duration::from_millis(100));
        assert!(matches!(
            scripts.run("nap", None).await,
            Err(ScriptError::TimedOut { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn scripts_may_ignore_their_input() {
        let scripts = runner(&[("quiet", "true")]);
        let input = vec![b'x'; 300 * 1024];
        assert_eq!(scripts.run("quiet", Some(input.as_slice())).await.unwrap(), b"");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn environment_update_runs_its_script() {
        assert!(runner(&[(UPDATE_ENV_SCRIPT, "true")]).update_env().await.is_ok());
        assert!(matches!(
            runner(&[(UPDATE_ENV_SCRIPT, "false")]).update_env().await,
            Err(ScriptError::Failed { .. })
        ));
        assert!(matches!(
            runner(&[]).update_env().await,
            Err(ScriptError::UnknownScript(_))
        ));
    }

    #[test]
    fn every_script_is_listed_by_default() {
        let scripts = default_scripts();
        for id in [TEST_SCRIPT, WEATHER_SCRIPT, UPDATE_CONDA_SCRIPT, UPDATE_ENV_SCRIPT] {
            assert!(scripts.contains_key(id), "{id} missing");
        }
    }
}
