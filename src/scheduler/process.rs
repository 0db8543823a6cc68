//! Child-process execution for jobs
//!
//! Runs an external program from inside a worker thread. The child is polled
//! rather than waited on so that a cancellation request kills it promptly.
//! On unix the child leads its own process group and the whole group is
//! killed, so helpers it spawned do not outlive it.

use super::job::JobContext;
use crate::error::JobError;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// External program invocation
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

/// Captured output of a successful run
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
        }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Run to completion, killing the child if the job is cancelled
    pub fn run(&self, ctx: &JobContext) -> Result<CommandOutput, JobError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        own_process_group(&mut command);

        let mut child = command.spawn().map_err(|e| JobError::SpawnFailed {
            program: self.program.clone(),
            message: e.to_string(),
        })?;
        debug!(job_id = ctx.job_id(), program = %self.program, pid = child.id(), "Spawned child");

        // Drain pipes on helper threads so a chatty child cannot block on a full pipe
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = loop {
            if ctx.is_cancelled() {
                kill(&mut child, &self.program);
                return Err(JobError::Interrupted);
            }
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    kill(&mut child, &self.program);
                    return Err(JobError::SpawnFailed {
                        program: self.program.clone(),
                        message: e.to_string(),
                    });
                }
            }
        };

        let output = CommandOutput {
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        };

        if status.success() {
            Ok(output)
        } else {
            Err(JobError::ProcessFailed {
                program: self.program.clone(),
                code: status.code(),
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut buffer);
        }
        buffer
    })
}

#[cfg(unix)]
fn own_process_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_command: &mut Command) {}

#[cfg(unix)]
fn kill(child: &mut Child, program: &str) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Err(e) = killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL) {
        warn!(program, error = %e, "Failed to kill process group");
        let _ = child.kill();
    }
    let _ = child.wait();
}

#[cfg(not(unix))]
fn kill(child: &mut Child, program: &str) {
    if let Err(e) = child.kill() {
        warn!(program, error = %e, "Failed to kill child process");
    }
    let _ = child.wait();
}
