use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use wait_timeout::ChildExt;

/// How long pipe readers get after the budget is spent (e.g. right after a kill).
const READER_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandRunOptions {
    pub current_dir: Option<PathBuf>,
}

/// Failures that happen before the command produced an exit status.
#[derive(Debug)]
pub enum CommandError {
    Spawn {
        cmd: String,
        source: std::io::Error,
    },
    Wait {
        cmd: String,
        source: std::io::Error,
    },
    Timeout {
        cmd: String,
        timeout: Duration,
        stderr: String,
    },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Spawn { cmd, source } => {
                write!(f, "failed to start process `{cmd}`: {source}")
            }
            CommandError::Wait { cmd, source } => {
                write!(f, "failed to wait for process `{cmd}`: {source}")
            }
            CommandError::Timeout { cmd, timeout, .. } => {
                write!(f, "process `{cmd}` timed out after {}s", timeout.as_secs())
            }
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::Spawn { source, .. } | CommandError::Wait { source, .. } => Some(source),
            CommandError::Timeout { .. } => None,
        }
    }
}

/// Runs `cmd` to completion within `timeout`.
///
/// The whole call, including collecting output, is bounded by `timeout` plus a
/// short grace period. Any process the command left behind in its process
/// group is killed before returning, whether it exited on its own or not.
pub fn run_command_with_options(
    cmd: &str,
    args: &[&str],
    timeout: Duration,
    options: &CommandRunOptions,
) -> Result<CommandOutput, CommandError> {
    let deadline = Instant::now() + timeout;

    let mut command = Command::new(cmd);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if let Some(dir) = &options.current_dir {
        command.current_dir(dir);
    }

    // Own process group so one signal reaches everything the tool spawned.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let mut child = command.spawn().map_err(|source| CommandError::Spawn {
        cmd: cmd.to_string(),
        source,
    })?;

    // Drain pipes concurrently so a chatty tool cannot block on a full pipe.
    let stdout_rx = spawn_reader(child.stdout.take());
    let stderr_rx = spawn_reader(child.stderr.take());

    let status = match child.wait_timeout(timeout) {
        Ok(Some(status)) => {
            // Background children may still hold the pipes open.
            kill_group(&child);
            status
        }
        Ok(None) => {
            kill_tree(&mut child);
            let _ = collect_reader(stdout_rx, deadline);
            let stderr = collect_reader(stderr_rx, deadline);
            return Err(CommandError::Timeout {
                cmd: cmd.to_string(),
                timeout,
                stderr,
            });
        }
        Err(source) => {
            kill_tree(&mut child);
            let _ = collect_reader(stdout_rx, deadline);
            let _ = collect_reader(stderr_rx, deadline);
            return Err(CommandError::Wait {
                cmd: cmd.to_string(),
                source,
            });
        }
    };

    Ok(CommandOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout: collect_reader(stdout_rx, deadline),
        stderr: collect_reader(stderr_rx, deadline),
    })
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<Vec<u8>>> {
    let mut pipe = pipe?;
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(buf);
    });
    Some(rx)
}

/// Waits for a reader until `deadline` (at least [`READER_GRACE`]); a reader
/// still blocked after that is abandoned and yields no output.
fn collect_reader(rx: Option<Receiver<Vec<u8>>>, deadline: Instant) -> String {
    let Some(rx) = rx else {
        return String::new();
    };
    let wait = deadline
        .saturating_duration_since(Instant::now())
        .max(READER_GRACE);
    let bytes = rx.recv_timeout(wait).unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(unix)]
fn kill_group(child: &Child) {
    if let Ok(pid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: the child was started as leader of its own group (pgid == pid).
        // A pid is not reused while a group with that id still has members, and
        // an empty group makes this a harmless ESRCH.
        unsafe {
            libc::kill(-pid, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}

fn kill_tree(child: &mut Child) {
    kill_group(child);
    let _ = child.kill();
    let _ = child.wait();
}

pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
}

/// Resolves `path` against the current directory and follows symlinks.
pub fn resolve_dir(path: &Path) -> std::io::Result<PathBuf> {
    let resolved = std::fs::canonicalize(path)?;
    if !resolved.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotADirectory,
            format!("not a directory: {}", resolved.display()),
        ));
    }
    Ok(resolved)
}
