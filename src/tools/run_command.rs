use crate::context::{Context, TargetShell};
use crate::protocol::{ExecutionResult, INTERNAL_ERROR_EXIT};
use crate::tools::Executor;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Clone, Copy, Debug)]
enum Stream {
    Stdout,
    Stderr,
}

/// Runs commands through the host shell with a wall-clock limit.
pub struct RunCommandTool {
    target: TargetShell,
    timeout: Duration,
}

impl RunCommandTool {
    pub fn new(target: TargetShell, timeout: Duration) -> Self {
        Self { target, timeout }
    }

    pub fn from_context(context: &Context) -> Self {
        Self::new(context.target, context.exec_timeout)
    }

    fn shell_command(&self, command: &str) -> Command {
        match self.target {
            TargetShell::Windows => {
                let mut cmd = Command::new("cmd");
                cmd.arg("/C").arg(command);
                cmd
            }
            TargetShell::Posix => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(command);
                // own process group, so a timeout kill also reaches background jobs
                #[cfg(unix)]
                {
                    use std::os::unix::process::CommandExt;
                    cmd.process_group(0);
                }
                cmd
            }
        }
    }

    fn timed_out(&self, command: &str, child: &mut Child) -> ExecutionResult {
        kill_tree(child);
        let _ = child.wait();
        warn!(command, timeout = ?self.timeout, "command timed out");
        ExecutionResult {
            timed_out: true,
            ..ExecutionResult::failure(&format!("Command timed out after {:?}", self.timeout))
        }
    }
}

impl Executor for RunCommandTool {
    fn execute(&self, command: &str) -> ExecutionResult {
        if command.trim().is_empty() {
            warn!("refusing to run an empty command");
            return ExecutionResult::failure("Empty command received");
        }

        info!(command, "executing command");
        let spawned = self
            .shell_command(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => return ExecutionResult::failure(&format!("Command execution failed: {e}")),
        };

        let (tx, rx) = mpsc::channel();
        drain(Stream::Stdout, child.stdout.take(), tx.clone());
        drain(Stream::Stderr, child.stderr.take(), tx);
        let deadline = Instant::now() + self.timeout;

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    return self.timed_out(command, &mut child);
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    kill_tree(&mut child);
                    return ExecutionResult::failure(&format!("Command execution failed: {e}"));
                }
            }
        };

        // the shell is gone but a background job may still hold the pipes
        let Some((stdout, stderr)) = collect_output(&rx, deadline) else {
            return self.timed_out(command, &mut child);
        };
        let exit_code = status.code().unwrap_or(INTERNAL_ERROR_EXIT);
        debug!(
            exit_code,
            stdout_len = stdout.len(),
            stderr_len = stderr.len(),
            "command finished"
        );

        ExecutionResult {
            success: status.success(),
            stdout,
            stderr,
            exit_code,
            timed_out: false,
        }
    }
}

fn drain<R: Read + Send + 'static>(stream: Stream, pipe: Option<R>, tx: Sender<(Stream, String)>) {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send((stream, String::from_utf8_lossy(&buf).into_owned()));
    });
}

/// Waits for both pipes to reach EOF. `None` when the deadline passes first.
fn collect_output(
    rx: &Receiver<(Stream, String)>,
    deadline: Instant,
) -> Option<(String, String)> {
    let mut stdout = String::new();
    let mut stderr = String::new();
    for _ in 0..2 {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((Stream::Stdout, text)) => stdout = text,
            Ok((Stream::Stderr, text)) => stderr = text,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => return None,
        }
    }
    Some((stdout, stderr))
}

fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;
        if let Ok(pid) = i32::try_from(child.id()) {
            let _ = killpg(Pid::from_raw(pid), Signal::SIGKILL);
        }
    }
    let _ = child.kill();
}
