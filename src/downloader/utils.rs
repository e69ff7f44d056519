// Helper functions shared by the metadata fetcher and tool discovery

use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;
use tracing::warn;

use super::errors::{DownloadError, Result};

/// Run a command to completion, collecting stdout/stderr, killing it on timeout
pub async fn run_output_with_timeout(
    program: &str,
    args: &[String],
    limit: Duration,
) -> Result<std::process::Output> {
    let mut child = TokioCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| DownloadError::ProcessSpawn {
            program: program.to_string(),
            source,
        })?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| pipe_error(program, "stdout"))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| pipe_error(program, "stderr"))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    match timeout(limit, child.wait()).await {
        Ok(status) => {
            let status = status?;
            let stdout = join_pipe(stdout_task).await;
            let stderr = join_pipe(stderr_task).await;
            Ok(std::process::Output {
                status,
                stdout,
                stderr,
            })
        }
        Err(_) => {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill {} after timeout: {}", program, e);
            }
            stdout_task.abort();
            stderr_task.abort();
            Err(DownloadError::Timeout {
                program: program.to_string(),
                after_ms: limit.as_millis(),
            })
        }
    }
}

pub(crate) fn pipe_error(program: &str, stream: &str) -> DownloadError {
    DownloadError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("{} of {} was not captured", stream, program),
    ))
}

async fn join_pipe(task: tokio::task::JoinHandle<std::io::Result<Vec<u8>>>) -> Vec<u8> {
    match task.await {
        Ok(Ok(buf)) => buf,
        Ok(Err(e)) => {
            warn!("Failed to read child output: {}", e);
            Vec::new()
        }
        Err(e) => {
            warn!("Output reader task failed: {}", e);
            Vec::new()
        }
    }
}

/// Last non-empty lines of a process' stderr, for error messages
pub fn tail_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_lines() {
        let text = "first\n\nsecond\nthird\n";
        assert_eq!(tail_lines(text, 2), "second | third");
        assert_eq!(tail_lines(text, 10), "first | second | third");
        assert_eq!(tail_lines("", 3), "");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_output_collects_stdout() {
        let args = vec!["-c".to_string(), "echo hello; echo oops 1>&2".to_string()];
        let out = run_output_with_timeout("sh", &args, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(out.status.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hello");
        assert_eq!(String::from_utf8_lossy(&out.stderr).trim(), "oops");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_output_times_out() {
        let args = vec!["-c".to_string(), "sleep 5".to_string()];
        let err = run_output_with_timeout("sh", &args, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_run_output_missing_binary() {
        let err = run_output_with_timeout(
            "definitely-not-a-real-binary-1234",
            &[],
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DownloadError::ProcessSpawn { .. }));
    }
}
