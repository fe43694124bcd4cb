use std::{
    io::{BufRead, BufReader, Read},
    path::{Path, PathBuf},
    process::Stdio,
    sync::{Arc, Mutex},
};

use launchpad_process::{ProcessId, ProcessKind, ProcessState, ProcessStatus};
use tokio::{
    process::{Child, Command},
    sync::{mpsc, oneshot, watch},
};

use crate::console::{LineStream, line_channel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
    /// `sh -c <text>`, `sh <script>`
    Posix,
    /// `cmd.exe /c <text>`, `cmd.exe /c <script>`
    Cmd,
}

/// The host command interpreter used for launch scripts and relayed commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    kind: ShellKind,
    program: PathBuf,
}

impl Interpreter {
    pub fn native() -> Self {
        if cfg!(windows) {
            Self::cmd()
        } else {
            Self::posix()
        }
    }

    pub fn posix() -> Self {
        Self {
            kind: ShellKind::Posix,
            program: PathBuf::from("sh"),
        }
    }

    pub fn cmd() -> Self {
        Self {
            kind: ShellKind::Cmd,
            program: PathBuf::from("cmd.exe"),
        }
    }

    /// Same argument conventions, different executable.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn kind(&self) -> ShellKind {
        self.kind
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub(crate) fn command_line(&self, text: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        match self.kind {
            ShellKind::Posix => cmd.arg("-c").arg(text),
            ShellKind::Cmd => cmd.arg("/c").arg(text),
        };
        cmd
    }

    pub(crate) fn script(&self, script: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        match self.kind {
            ShellKind::Posix => cmd.arg(script),
            ShellKind::Cmd => cmd.arg("/c").arg(script),
        };
        cmd
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Running,
    Exited(Option<i32>),
    Killed(Option<i32>),
    Failed(String),
}

/// Shared view of one spawned child.
///
/// Clones observe the same process. Dropping every clone leaves the process
/// running; only [`ChildHandle::kill`] terminates it.
#[derive(Debug, Clone)]
pub struct ChildHandle {
    id: ProcessId,
    kind: ProcessKind,
    pid: Option<u32>,
    outcome: watch::Receiver<Outcome>,
    kill_tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl ChildHandle {
    pub fn id(&self) -> &ProcessId {
        &self.id
    }

    pub fn kind(&self) -> ProcessKind {
        self.kind
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_alive(&self) -> bool {
        matches!(*self.outcome.borrow(), Outcome::Running)
    }

    pub fn status(&self) -> ProcessStatus {
        let outcome = self.outcome.borrow().clone();
        let (state, exit_code, message) = match outcome {
            Outcome::Running => (ProcessState::Running, None, None),
            Outcome::Exited(code) => (
                ProcessState::Exited,
                code,
                Some(match code {
                    Some(c) => format!("exited with code {c}"),
                    None => "terminated by signal".to_string(),
                }),
            ),
            Outcome::Killed(code) => (ProcessState::Killed, code, Some("killed".to_string())),
            Outcome::Failed(msg) => (ProcessState::Failed, None, Some(msg)),
        };
        ProcessStatus {
            id: self.id.clone(),
            kind: self.kind,
            state,
            pid: self.pid,
            exit_code,
            message,
        }
    }

    /// Resolves once the process has terminated, however that happened.
    pub async fn wait(&self) -> ProcessStatus {
        let mut rx = self.outcome.clone();
        let _ = rx.wait_for(|o| !matches!(o, Outcome::Running)).await;
        self.status()
    }

    /// Asks the waiter task to kill the process (its whole group on unix).
    /// Returns `false` when the process had already terminated or a kill was
    /// already requested.
    pub fn kill(&self) -> bool {
        let tx = self
            .kill_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match tx {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }
}

/// Spawns `cmd` with stdout and stderr merged into one line stream.
///
/// Both descriptors share one pipe, so lines arrive in the order the child
/// wrote them. Each line is decoded lossily and stripped of its `\r\n`/`\n`
/// terminator. The stream ends once every writer of the pipe has closed it.
pub(crate) fn spawn_tracked(
    mut cmd: Command,
    kind: ProcessKind,
) -> std::io::Result<(ChildHandle, LineStream<String>)> {
    let (reader, writer) = std::io::pipe()?;
    let err_writer = writer.try_clone()?;
    cmd.stdin(Stdio::null())
        .stdout(Stdio::from(writer))
        .stderr(Stdio::from(err_writer));

    #[cfg(unix)]
    {
        unsafe {
            cmd.pre_exec(|| {
                // New session, so the whole tree can be signalled through the group.
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    let child = cmd.spawn()?;
    // The command still owns our copies of the write end; EOF needs them closed.
    drop(cmd);
    let pid = child.id();
    let id = ProcessId::new();

    let (tx, lines) = line_channel();
    tokio::task::spawn_blocking(move || pump_lines(reader, tx));

    let (outcome_tx, outcome) = watch::channel(Outcome::Running);
    let (kill_tx, kill_rx) = oneshot::channel();
    tokio::spawn(wait_for_exit(child, pid, kill_rx, outcome_tx));

    tracing::debug!(process_id = %id, ?pid, ?kind, "child spawned");
    let handle = ChildHandle {
        id,
        kind,
        pid,
        outcome,
        kill_tx: Arc::new(Mutex::new(Some(kill_tx))),
    };
    Ok((handle, lines))
}

fn pump_lines<R: Read>(reader: R, tx: mpsc::UnboundedSender<String>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "child pipe read failed");
                break;
            }
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\r', '\n']);
        // Keep draining with no listener: a full pipe stalls the child.
        let _ = tx.send(line.to_string());
    }
}

async fn wait_for_exit(
    mut child: Child,
    pid: Option<u32>,
    kill_rx: oneshot::Receiver<()>,
    outcome_tx: watch::Sender<Outcome>,
) {
    let outcome = tokio::select! {
        res = child.wait() => match res {
            Ok(status) => Outcome::Exited(status.code()),
            Err(e) => Outcome::Failed(format!("wait failed: {e}")),
        },
        Ok(()) = kill_rx => {
            #[cfg(unix)]
            {
                if let Some(pgid) = pid.map(|p| p as libc::pid_t) {
                    unsafe {
                        libc::kill(-pgid, libc::SIGKILL);
                    }
                }
            }
            let _ = child.start_kill();
            match child.wait().await {
                Ok(status) => Outcome::Killed(status.code()),
                Err(e) => Outcome::Failed(format!("wait failed: {e}")),
            }
        }
    };
    tracing::debug!(?pid, ?outcome, "child terminated");
    let _ = outcome_tx.send(outcome);
}
