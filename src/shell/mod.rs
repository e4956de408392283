//! Subprocess execution
//!
//! Commands run with captured output, a fixed working directory and an
//! explicit environment. The caller's thread blocks until the child exits;
//! if the cancellation token fires first, the child is killed.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::concurrency::CancellationToken;
use crate::errors::{EngineError, EngineResult};

/// How often a running child is checked for exit or cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Captured output of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `program` with `args` in `dir`
pub fn run_command(
    program: &str,
    args: &[String],
    dir: &Path,
    env: &HashMap<String, String>,
    cancel: &CancellationToken,
) -> EngineResult<CommandOutput> {
    cancel.check()?;
    let command_line = render_command(program, args);
    tracing::debug!(command = %command_line, dir = %dir.display(), "running command");

    let mut child = Command::new(program)
        .args(args)
        .current_dir(dir)
        .env_clear()
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| EngineError::CommandFailed {
            command: command_line.clone(),
            dir: dir.display().to_string(),
            message: format!("failed to start: {}", e),
            stderr: String::new(),
        })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = wait_or_cancel(&mut child, cancel);
    let stdout = join_output(stdout);
    let stderr = join_output(stderr);

    let status = match status {
        Ok(status) => status,
        Err(err) => {
            tracing::warn!(command = %command_line, "command cancelled");
            return Err(err);
        }
    };

    if !status.success() {
        return Err(EngineError::CommandFailed {
            command: command_line,
            dir: dir.display().to_string(),
            message: match status.code() {
                Some(code) => format!("exited with status {}", code),
                None => "terminated by signal".to_string(),
            },
            stderr: stderr.trim_end().to_string(),
        });
    }

    Ok(CommandOutput { stdout, stderr })
}

fn wait_or_cancel(child: &mut Child, cancel: &CancellationToken) -> EngineResult<ExitStatus> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if cancel.is_cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            return Err(EngineError::Cancelled);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Read a pipe to the end on its own thread so the child never blocks on
/// a full pipe buffer
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join_output(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Human-readable command line for logs and errors
pub fn render_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}
