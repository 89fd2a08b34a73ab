//! Runs external executables with a deadline, never panicking or
//! propagating launch/exit failures across the boundary.

use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, error, info};

/// Outcome of one external-process invocation. `error_kind` is `None` on a
/// clean exit (any exit code); it is set only when the process could not be
/// run to completion at all (launch failure, deadline, cancellation).
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub returncode: Option<i32>,
    pub error_kind: Option<String>,
    pub label: Option<String>,
}

impl CommandResult {
    fn failed(error_kind: impl Into<String>, label: Option<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            returncode: None,
            error_kind: Some(error_kind.into()),
            label,
        }
    }
}

/// Run `program` with `args`, decoding stdout/stderr as UTF-8 with
/// replacement on invalid bytes. `deadline` bounds the whole call,
/// including launch; on expiry the child is killed and awaited before
/// returning `error_kind = "Timeout"`.
pub async fn run_cmd(
    program: &str,
    args: &[&str],
    deadline: Duration,
    label: Option<&str>,
) -> CommandResult {
    let label_owned = label.map(|s| s.to_string());
    info!(program, label, "starting external command");

    match tokio::time::timeout(deadline, run_once(program, args, &label_owned)).await {
        Ok(result) => {
            info!(
                program,
                label,
                returncode = ?result.returncode,
                "external command completed"
            );
            result
        }
        Err(_) => {
            error!(program, label, ?deadline, "external command timed out");
            CommandResult::failed("Timeout", label_owned)
        }
    }
}

async fn run_once(program: &str, args: &[&str], label: &Option<String>) -> CommandResult {
    let mut child = match Command::new(program)
        .args(args)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(source) => {
            let error_kind = launch_error_kind(&source);
            let err = crate::errors::EngineError::Launch { program: program.to_string(), source };
            error!(error = %err, "failed to launch external command");
            return CommandResult::failed(error_kind, label.clone());
        }
    };

    debug!(program, pid = ?child.id(), "spawned child process");

    match child.wait_with_output().await {
        Ok(output) => CommandResult {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            returncode: output.status.code(),
            error_kind: None,
            label: label.clone(),
        },
        Err(e) => {
            error!(program, error = %e, "error waiting for child process");
            CommandResult::failed(e.kind().to_string(), label.clone())
        }
    }
}

fn launch_error_kind(e: &std::io::Error) -> String {
    match e.kind() {
        std::io::ErrorKind::NotFound => "NotFound".to_string(),
        std::io::ErrorKind::PermissionDenied => "PermissionDenied".to_string(),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_on_clean_exit() {
        let result = run_cmd("echo", &["hello"], Duration::from_secs(5), Some("t")).await;
        assert_eq!(result.stdout, "hello");
        assert_eq!(result.returncode, Some(0));
        assert!(result.error_kind.is_none());
    }

    #[tokio::test]
    async fn reports_timeout_error_kind() {
        let result = run_cmd("sleep", &["5"], Duration::from_millis(50), Some("slow")).await;
        assert_eq!(result.error_kind.as_deref(), Some("Timeout"));
        assert!(result.returncode.is_none());
    }

    #[tokio::test]
    async fn reports_launch_failure_without_panicking() {
        let result = run_cmd(
            "/nonexistent/program-xyz",
            &[],
            Duration::from_secs(5),
            None,
        )
        .await;
        assert!(result.error_kind.is_some());
        assert!(result.returncode.is_none());
    }

    #[tokio::test]
    async fn nonzero_exit_is_not_an_error_kind() {
        let result = run_cmd("false", &[], Duration::from_secs(5), None).await;
        assert_eq!(result.returncode, Some(1));
        assert!(result.error_kind.is_none());
    }
}
