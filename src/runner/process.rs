//! One-shot subprocess execution with a controlled environment.
//!
//! The script body is written to a scoped temporary file that is removed on
//! every exit path (RAII), the child starts from an empty environment plus
//! exactly the variables the caller provides, and the timeout sends SIGTERM
//! with kill-on-drop as the backstop. Spawn failures and timeouts surface as
//! distinct error variants so callers can tell them apart.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::error::ExecError;

/// Observer invoked with each line the child writes to stdout, as it arrives.
pub type LineObserver = Arc<dyn Fn(&str) + Send + Sync>;

/// What to run and under which environment.
#[derive(Clone)]
pub struct SubprocessSpec {
    /// Interpreter executable, e.g. `node` or `sh`.
    pub interpreter: String,
    /// Arguments placed before the script path.
    pub args: Vec<String>,
    /// Script body, written to a temporary file.
    pub script: String,
    /// Temporary file extension, e.g. `js`.
    pub extension: &'static str,
    /// The complete child environment. Nothing else is inherited.
    pub env: HashMap<String, String>,
    pub timeout: Duration,
    pub cwd: Option<PathBuf>,
}

/// Captured outcome of a finished subprocess.
#[derive(Debug, Clone)]
pub struct SubprocessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

async fn capture<R>(reader: R, observer: Option<LineObserver>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut collected = String::new();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(observer) = observer.as_deref() {
            observer(&line);
        }
        collected.push_str(&line);
        collected.push('\n');
    }
    collected
}

#[cfg(unix)]
fn terminate(pid: u32) {
    // graceful signal only; escalation is the caller's concern and
    // kill_on_drop reaps anything that ignores it
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn terminate(_pid: u32) {}

/// Run a script to completion under `spec`, streaming stdout lines to the
/// observer as they arrive.
pub async fn run_script(
    spec: SubprocessSpec,
    observer: Option<LineObserver>,
) -> Result<SubprocessOutput, ExecError> {
    let mut script_file = tempfile::Builder::new()
        .prefix("vx-")
        .suffix(&format!(".{}", spec.extension))
        .tempfile()
        .map_err(|e| ExecError::Spawn(format!("failed to create script file: {}", e)))?;
    script_file
        .write_all(spec.script.as_bytes())
        .map_err(|e| ExecError::Spawn(format!("failed to write script file: {}", e)))?;
    script_file
        .flush()
        .map_err(|e| ExecError::Spawn(format!("failed to write script file: {}", e)))?;

    let mut cmd = Command::new(&spec.interpreter);
    cmd.args(&spec.args)
        .arg(script_file.path())
        .env_clear()
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| ExecError::Spawn(format!("{}: {}", spec.interpreter, e)))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_task = tokio::spawn(async move {
        match stdout {
            Some(out) => capture(out, observer).await,
            None => String::new(),
        }
    });
    let stderr_task = tokio::spawn(async move {
        match stderr {
            Some(err) => capture(err, None).await,
            None => String::new(),
        }
    });

    let status = match tokio::time::timeout(spec.timeout, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            return Err(ExecError::Spawn(format!("wait failed: {}", e)));
        }
        Err(_) => {
            if let Some(pid) = child.id() {
                terminate(pid);
            }
            // short grace period for the signal to land; the drop of `child`
            // hard-kills anything still alive
            let _ = tokio::time::timeout(Duration::from_secs(2), child.wait()).await;
            return Err(ExecError::Timeout(spec.timeout.as_secs()));
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    Ok(SubprocessOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout,
        stderr,
    })
}
