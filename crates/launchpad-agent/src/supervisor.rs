use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use launchpad_process::{ProcessId, ProcessKind, ProcessStatus};

use crate::{
    child::{ChildHandle, Interpreter, spawn_tracked},
    console::LineStream,
};

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("start {}", script.display())]
    SpawnFailed {
        script: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The running game server, started from its launch script.
#[derive(Debug, Clone)]
pub struct SupervisedProcess {
    handle: ChildHandle,
    script: PathBuf,
}

impl SupervisedProcess {
    pub fn id(&self) -> &ProcessId {
        self.handle.id()
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.pid()
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    pub fn is_alive(&self) -> bool {
        self.handle.is_alive()
    }

    pub fn status(&self) -> ProcessStatus {
        self.handle.status()
    }

    pub async fn wait(&self) -> ProcessStatus {
        self.handle.wait().await
    }

    pub fn kill(&self) -> bool {
        self.handle.kill()
    }
}

/// Starts launch scripts and remembers the most recent one.
#[derive(Debug, Clone)]
pub struct Supervisor {
    interpreter: Interpreter,
    current: Arc<Mutex<Option<SupervisedProcess>>>,
}

impl Supervisor {
    pub fn new(interpreter: Interpreter) -> Self {
        Self {
            interpreter,
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Runs `script` through the interpreter with the script's directory as
    /// working directory.
    ///
    /// The returned stream carries merged stdout and stderr and ends when the
    /// child closes both pipes. A still-running previous process is left alone;
    /// the supervisor just stops tracking it.
    pub fn start(
        &self,
        script: &Path,
    ) -> Result<(SupervisedProcess, LineStream<String>), SupervisorError> {
        let spawn_failed = |source| SupervisorError::SpawnFailed {
            script: script.to_path_buf(),
            source,
        };
        if !script.is_file() {
            return Err(spawn_failed(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "launch script does not exist",
            )));
        }
        let (dir, file) = split_script_path(script);

        let mut cmd = self.interpreter.script(file);
        cmd.current_dir(dir);
        let (handle, lines) = spawn_tracked(cmd, ProcessKind::Server).map_err(spawn_failed)?;

        let process = SupervisedProcess {
            handle,
            script: script.to_path_buf(),
        };
        let previous = self
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(process.clone());
        if let Some(prev) = previous
            && prev.is_alive()
        {
            tracing::warn!(
                previous = %prev.id(),
                previous_pid = ?prev.pid(),
                "starting a new server while the previous one is still running"
            );
        }

        tracing::info!(
            process_id = %process.id(),
            pid = ?process.pid(),
            script = %script.display(),
            "server started"
        );
        Ok((process, lines))
    }

    pub fn current(&self) -> Option<SupervisedProcess> {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

fn split_script_path(script: &Path) -> (&Path, &Path) {
    let dir = match script.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let file = script.file_name().map(Path::new).unwrap_or(script);
    (dir, file)
}
