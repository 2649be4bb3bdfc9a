//! ProcessSpawner port - OS process creation.
//!
//! A spawner starts the child with piped stdio and hands back an exclusively
//! owned [`ChildHandle`]. Everything the child does afterwards (output, exit,
//! runtime errors) comes back as [`ChildEvent`]s on the sender given at spawn
//! time, so all state changes happen on the supervisor's event loop.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::domain::{
    ChildStream, ExitReport, LifecycleError, ProcessDefinition, ProcessName, RunId, SpawnError,
};

pub type ChildEventSender = mpsc::Sender<ChildEvent>;

/// Everything needed to start one run of a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub name: ProcessName,
    pub run: RunId,
    pub path: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Option<BTreeMap<String, String>>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub shell: bool,
}

impl SpawnRequest {
    pub fn new(name: ProcessName, run: RunId, definition: &ProcessDefinition) -> Self {
        Self {
            name,
            run,
            path: definition.path.clone(),
            args: definition.args.clone(),
            cwd: definition.cwd.clone(),
            env: definition.env.clone(),
            uid: definition.uid,
            gid: definition.gid,
            shell: definition.shell,
        }
    }

    /// Command line handed to `/bin/sh -c` in shell mode.
    pub fn shell_line(&self) -> String {
        std::iter::once(self.path.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEvent {
    pub process: ProcessName,
    pub run: RunId,
    pub kind: ChildEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildEventKind {
    /// A chunk read from one of the pipes, in OS order.
    Output { stream: ChildStream, data: Vec<u8> },
    /// OS-level error while the child runs. Does not end the run by itself.
    Error(String),
    /// The child was reaped. Always the last event of a run.
    Exit(ExitReport),
}

pub trait ProcessSpawner: Send + Sync {
    fn spawn(
        &self,
        request: SpawnRequest,
        events: ChildEventSender,
    ) -> Result<Box<dyn ChildHandle>, SpawnError>;
}

/// Handle to a live child. Only the supervisor holds one.
pub trait ChildHandle: Send {
    fn pid(&self) -> u32;

    /// Queue bytes for the child's stdin. Never blocks the caller.
    fn write_stdin(&mut self, data: Vec<u8>) -> Result<(), LifecycleError>;

    /// Signal end-of-input once queued writes are flushed. Idempotent.
    fn close_stdin(&mut self);

    /// Deliver a signal given by name (`SIGTERM`) or number (`15`).
    fn signal(&self, signal: &str) -> Result<(), LifecycleError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_copies_definition() {
        let def = ProcessDefinition::new("/bin/echo").with_args(["a", "b c"]);
        let req = SpawnRequest::new(ProcessName::new("echo"), RunId::new(1), &def);
        assert_eq!(req.path, "/bin/echo");
        assert_eq!(req.args, vec!["a", "b c"]);
        assert_eq!(req.shell_line(), "/bin/echo a b c");
    }
}
