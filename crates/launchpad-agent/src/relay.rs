use std::path::PathBuf;

use launchpad_process::{ProcessId, ProcessKind, ProcessStatus};

use crate::{
    child::{ChildHandle, Interpreter, spawn_tracked},
    console::LineStream,
};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("run {command:?}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Hands operator text to the host shell, verbatim.
///
/// There is no allow-list or escaping: whatever the operator types runs with
/// the launcher's privileges.
#[derive(Debug, Clone)]
pub struct CommandRelay {
    interpreter: Interpreter,
    work_dir: Option<PathBuf>,
}

/// One relayed command: its own process and its own output stream.
#[derive(Debug)]
pub struct RelayInvocation {
    pub command: String,
    handle: ChildHandle,
    lines: LineStream<String>,
}

impl RelayInvocation {
    pub fn id(&self) -> &ProcessId {
        self.handle.id()
    }

    pub fn handle(&self) -> &ChildHandle {
        &self.handle
    }

    pub fn status(&self) -> ProcessStatus {
        self.handle.status()
    }

    pub fn lines_mut(&mut self) -> &mut LineStream<String> {
        &mut self.lines
    }

    pub fn into_parts(self) -> (ChildHandle, LineStream<String>) {
        (self.handle, self.lines)
    }
}

impl CommandRelay {
    pub fn allow_arbitrary_commands(interpreter: Interpreter) -> Self {
        Self {
            interpreter,
            work_dir: None,
        }
    }

    /// Runs commands from `dir` when it exists, otherwise from the launcher's own directory.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    /// Starts `command_text` without waiting for it.
    ///
    /// Concurrent invocations are independent; each one's lines stay in the
    /// order that process wrote them.
    pub fn run(&self, command_text: &str) -> Result<RelayInvocation, RelayError> {
        let mut cmd = self.interpreter.command_line(command_text);
        if let Some(dir) = &self.work_dir
            && dir.is_dir()
        {
            cmd.current_dir(dir);
        }
        let (handle, lines) =
            spawn_tracked(cmd, ProcessKind::Relay).map_err(|source| RelayError::SpawnFailed {
                command: command_text.to_string(),
                source,
            })?;
        tracing::info!(process_id = %handle.id(), pid = ?handle.pid(), command = command_text, "relayed command");
        Ok(RelayInvocation {
            command: command_text.to_string(),
            handle,
            lines,
        })
    }
}
