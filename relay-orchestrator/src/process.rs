//! External command execution
//!
//! Build and deploy procedures are shell commands. A command exports
//! variables by appending `KEY=VALUE` lines to the file named by
//! `RELAY_OUTPUT`.

use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Environment variable naming the exports file
pub const OUTPUT_ENV: &str = "RELAY_OUTPUT";

const OUTPUT_FILE: &str = "relay-output.env";

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to prepare working directory: {0}")]
    Workspace(std::io::Error),

    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("failed to read exported variables: {0}")]
    Exports(std::io::Error),
}

/// Outcome of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub exports: BTreeMap<String, String>,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Last non-empty stderr line, for error messages
    pub fn stderr_tail(&self) -> &str {
        self.stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("")
    }
}

/// Runs `command` through `sh -c` in `workdir` with the given environment
///
/// The child is killed if the returned future is dropped, so cancelling a run
/// never leaves a build or provisioning process behind.
pub async fn run_shell(
    command: &str,
    env: &BTreeMap<String, String>,
    workdir: &Path,
) -> Result<CommandOutcome, ProcessError> {
    tokio::fs::create_dir_all(workdir)
        .await
        .map_err(ProcessError::Workspace)?;

    // Start every attempt with an empty exports file
    let output_path = workdir.join(OUTPUT_FILE);
    match tokio::fs::remove_file(&output_path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(ProcessError::Workspace(e)),
    }

    debug!("Executing '{}' in {}", command, workdir.display());

    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(workdir)
        .envs(env)
        .env(OUTPUT_ENV, &output_path)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| ProcessError::Spawn {
            command: command.to_string(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        debug!(target: "relay_orchestrator::process::stdout", "{}", line);
    }
    for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
        debug!(target: "relay_orchestrator::process::stderr", "{}", line);
    }

    let exports = match tokio::fs::read_to_string(&output_path).await {
        Ok(content) => parse_exports(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
        Err(e) => return Err(ProcessError::Exports(e)),
    };

    Ok(CommandOutcome {
        exit_code: output.status.code(),
        stdout,
        stderr,
        exports,
    })
}

/// Parses `KEY=VALUE` lines; blank lines and `#` comments are skipped
pub fn parse_exports(content: &str) -> BTreeMap<String, String> {
    let mut exports = BTreeMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match line.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                exports.insert(key.trim().to_string(), value.to_string());
            }
            _ => warn!("Ignoring malformed export line: {}", line),
        }
    }

    exports
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exports() {
        let exports = parse_exports(
            "# comment\nARTIFACTS_PATH=s3://bkt/A1\n\nGIT_BRANCH=main\nEMPTY=\nnot a pair\nURL=http://x?a=b\n",
        );

        assert_eq!(exports.get("ARTIFACTS_PATH").unwrap(), "s3://bkt/A1");
        assert_eq!(exports.get("GIT_BRANCH").unwrap(), "main");
        assert_eq!(exports.get("EMPTY").unwrap(), "");
        assert_eq!(exports.get("URL").unwrap(), "http://x?a=b");
        assert_eq!(exports.len(), 4);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_shell_collects_exports() {
        let dir = std::env::temp_dir().join(format!("relay-process-{}", uuid::Uuid::new_v4()));
        let env = BTreeMap::from([("GREETING".to_string(), "hello".to_string())]);

        let outcome = run_shell("echo \"SAID=$GREETING\" >> \"$RELAY_OUTPUT\"", &env, &dir)
            .await
            .unwrap();

        assert!(outcome.success());
        assert_eq!(outcome.exports.get("SAID").unwrap(), "hello");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_shell_reports_failure() {
        let dir = std::env::temp_dir().join(format!("relay-process-{}", uuid::Uuid::new_v4()));

        let outcome = run_shell("echo boom >&2; exit 3", &BTreeMap::new(), &dir)
            .await
            .unwrap();

        assert!(!outcome.success());
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.stderr_tail(), "boom");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
