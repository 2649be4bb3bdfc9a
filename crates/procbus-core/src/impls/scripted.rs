//! ScriptedSpawner - fake process creation for tests.
//!
//! Spawns nothing. Each "child" gets a fake pid and a log of what the
//! supervisor did to it (stdin writes, close, signals). Tests drive the child
//! side with [`ScriptedSpawner::emit`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::{ChildStream, ExitReport, LifecycleError, RunId, SpawnError};
use crate::ports::{
    ChildEvent, ChildEventKind, ChildEventSender, ChildHandle, ProcessSpawner, SpawnRequest,
};

const FIRST_PID: u32 = 4000;

/// What happened to one scripted child.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildLog {
    pub pid: u32,
    pub stdin: Vec<Vec<u8>>,
    pub stdin_closed: bool,
    pub signals: Vec<String>,
}

#[derive(Debug, Default)]
struct Script {
    next_pid: u32,
    failures: VecDeque<String>,
    requests: Vec<SpawnRequest>,
    children: HashMap<RunId, ChildLog>,
    senders: HashMap<RunId, (SpawnRequest, ChildEventSender)>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedSpawner {
    script: Arc<Mutex<Script>>,
}

impl ScriptedSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The next spawn is refused with `reason`.
    pub fn fail_next(&self, reason: impl Into<String>) {
        self.lock().failures.push_back(reason.into());
    }

    /// Every request received, including refused ones.
    pub fn requests(&self) -> Vec<SpawnRequest> {
        self.lock().requests.clone()
    }

    /// Run id of the most recent successful spawn of `process`.
    pub fn last_run(&self, process: &str) -> Option<RunId> {
        self.lock()
            .senders
            .iter()
            .filter(|(_, (req, _))| req.name.as_str() == process)
            .map(|(run, _)| *run)
            .max()
    }

    pub fn child(&self, run: RunId) -> Option<ChildLog> {
        self.lock().children.get(&run).cloned()
    }

    /// Build the event a child of `run` would send.
    pub fn event(&self, run: RunId, kind: ChildEventKind) -> Option<ChildEvent> {
        let script = self.lock();
        let (req, _) = script.senders.get(&run)?;
        Some(ChildEvent {
            process: req.name.clone(),
            run,
            kind,
        })
    }

    /// Send an event on behalf of the child of `run`. Returns `false` if unknown or closed.
    pub async fn emit(&self, run: RunId, kind: ChildEventKind) -> bool {
        let sender = self.lock().senders.get(&run).map(|(_, tx)| tx.clone());
        let Some(tx) = sender else {
            return false;
        };
        let Some(event) = self.event(run, kind) else {
            return false;
        };
        tx.send(event).await.is_ok()
    }

    pub async fn emit_stdout(&self, run: RunId, data: &[u8]) -> bool {
        self.emit(
            run,
            ChildEventKind::Output {
                stream: ChildStream::Stdout,
                data: data.to_vec(),
            },
        )
        .await
    }

    pub async fn emit_exit(&self, run: RunId, report: ExitReport) -> bool {
        self.emit(run, ChildEventKind::Exit(report)).await
    }
}

impl ProcessSpawner for ScriptedSpawner {
    fn spawn(
        &self,
        request: SpawnRequest,
        events: ChildEventSender,
    ) -> Result<Box<dyn ChildHandle>, SpawnError> {
        let mut script = self.lock();
        script.requests.push(request.clone());

        if let Some(reason) = script.failures.pop_front() {
            return Err(SpawnError::Rejected {
                path: request.path,
                reason,
            });
        }

        if script.next_pid == 0 {
            script.next_pid = FIRST_PID;
        }
        let pid = script.next_pid;
        script.next_pid += 1;

        let run = request.run;
        script.children.insert(
            run,
            ChildLog {
                pid,
                ..ChildLog::default()
            },
        );
        script.senders.insert(run, (request, events));

        Ok(Box::new(ScriptedChild {
            run,
            pid,
            script: Arc::clone(&self.script),
        }))
    }
}

struct ScriptedChild {
    run: RunId,
    pid: u32,
    script: Arc<Mutex<Script>>,
}

impl ScriptedChild {
    fn with_log<T>(&self, f: impl FnOnce(&mut ChildLog) -> T) -> Option<T> {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        script.children.get_mut(&self.run).map(f)
    }
}

impl ChildHandle for ScriptedChild {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn write_stdin(&mut self, data: Vec<u8>) -> Result<(), LifecycleError> {
        self.with_log(|log| {
            if log.stdin_closed {
                return Err(LifecycleError::StdinClosed);
            }
            log.stdin.push(data);
            Ok(())
        })
        .unwrap_or(Err(LifecycleError::StdinClosed))
    }

    fn close_stdin(&mut self) {
        self.with_log(|log| log.stdin_closed = true);
    }

    fn signal(&self, signal: &str) -> Result<(), LifecycleError> {
        self.with_log(|log| log.signals.push(signal.to_string()));
        Ok(())
    }
}
