//! ProcessSupervisor - one lifecycle per configured process.
//!
//! ```text
//! Idle ──spawn──► Running ──exit──► Idle
//!                   │  ▲              │
//!      spawn while  │  └── pending ◄──┘  (queue non-empty: start next payload at once)
//!      running:     ▼
//!      enqueue (enqueueSpawns) or reject
//! ```
//!
//! Design:
//! - `states` is an arena keyed by process name, created for every
//!   definition up front; the child handle lives only inside it.
//! - All mutation happens on the caller's task (the runtime event loop), so
//!   no locking is needed. Child events come back through `events`.
//! - Events carry a [`RunId`]; anything not from the current run is dropped.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::aggregator::OutputAggregator;
use super::publisher::StatusPublisher;
use super::status::{ProcessStatus, StatusSnapshot};
use crate::domain::{
    ChildStream, ExitReport, LifecycleError, ProcessDefinition, ProcessName, ProcessState,
    ProcessTable, RunId,
};
use crate::ports::{
    ChildEvent, ChildEventKind, ChildEventSender, ChildHandle, ProcessSpawner, SpawnRequest,
};

const SHUTDOWN_SIGNAL: &str = "SIGTERM";

struct RunningChild {
    run: RunId,
    pid: u32,
    handle: Box<dyn ChildHandle>,
    started_at: DateTime<Utc>,
}

/// Mutable per-process state.
pub struct ProcessRuntimeState {
    running: Option<RunningChild>,
    pending: VecDeque<Vec<u8>>,
    output: OutputAggregator,
}

impl ProcessRuntimeState {
    fn new() -> Self {
        Self {
            running: None,
            pending: VecDeque::new(),
            output: OutputAggregator::new(),
        }
    }

    pub fn state(&self) -> ProcessState {
        if self.running.is_some() {
            ProcessState::Running
        } else {
            ProcessState::Idle
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.running.as_ref().map(|r| r.pid)
    }

    pub fn pending(&self) -> &VecDeque<Vec<u8>> {
        &self.pending
    }

    pub fn output(&self) -> &OutputAggregator {
        &self.output
    }

    fn is_current(&self, run: RunId) -> bool {
        self.running.as_ref().is_some_and(|r| r.run == run)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnOutcome {
    Started { pid: u32 },
    /// Accepted for later; `queued` counts this payload.
    Enqueued { running: u32, queued: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeOutcome {
    Written(usize),
    Closed,
}

/// Matches `SIG` followed by at least one uppercase letter anywhere in the payload.
pub fn looks_like_signal_name(payload: &str) -> bool {
    payload.match_indices("SIG").any(|(at, _)| {
        payload[at + 3..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_uppercase())
    })
}

pub struct ProcessSupervisor {
    table: Arc<ProcessTable>,
    states: HashMap<ProcessName, ProcessRuntimeState>,
    spawner: Arc<dyn ProcessSpawner>,
    publisher: StatusPublisher,
    events: ChildEventSender,
    next_run: u64,
}

impl ProcessSupervisor {
    pub fn new(
        table: Arc<ProcessTable>,
        spawner: Arc<dyn ProcessSpawner>,
        publisher: StatusPublisher,
        events: ChildEventSender,
    ) -> Self {
        let states = table
            .names()
            .map(|name| (name.clone(), ProcessRuntimeState::new()))
            .collect();
        Self {
            table,
            states,
            spawner,
            publisher,
            events,
            next_run: 0,
        }
    }

    pub fn publisher(&self) -> &StatusPublisher {
        &self.publisher
    }

    pub fn table(&self) -> &Arc<ProcessTable> {
        &self.table
    }

    pub fn runtime_state(&self, name: &ProcessName) -> Option<&ProcessRuntimeState> {
        self.states.get(name)
    }

    pub fn state(&self, name: &ProcessName) -> Option<ProcessState> {
        self.states.get(name).map(ProcessRuntimeState::state)
    }

    fn unknown(name: &ProcessName) -> LifecycleError {
        LifecycleError::UnknownProcess(name.to_string())
    }

    pub async fn spawn(
        &mut self,
        name: &ProcessName,
        payload: Vec<u8>,
    ) -> Result<SpawnOutcome, LifecycleError> {
        let table = Arc::clone(&self.table);
        let definition = table.get(name).ok_or_else(|| Self::unknown(name))?;
        let state = self.states.get_mut(name).ok_or_else(|| Self::unknown(name))?;

        if let Some(running) = &state.running {
            let pid = running.pid;
            if !definition.enqueue_spawns {
                return Err(LifecycleError::AlreadyRunning { pid });
            }
            state.pending.push_back(payload);
            let queued = state.pending.len();
            warn!(process = %name, pid, queued, "already running, enqueuing");
            return Ok(SpawnOutcome::Enqueued {
                running: pid,
                queued,
            });
        }

        let pid = self.start(name, definition, payload).await?;
        Ok(SpawnOutcome::Started { pid })
    }

    /// Idle -> Running. Leaves the state idle when the OS refuses.
    async fn start(
        &mut self,
        name: &ProcessName,
        definition: &ProcessDefinition,
        payload: Vec<u8>,
    ) -> Result<u32, LifecycleError> {
        if !self.states.contains_key(name) {
            return Err(Self::unknown(name));
        }

        self.publisher.clear_error(name).await;

        self.next_run += 1;
        let run = RunId::new(self.next_run);
        let request = SpawnRequest::new(name.clone(), run, definition);

        let mut handle = match self.spawner.spawn(request, self.events.clone()) {
            Ok(handle) => handle,
            Err(e) => {
                let reason = e.to_string();
                self.publisher.error(name, &reason).await;
                return Err(LifecycleError::StartFailed { reason });
            }
        };

        let pid = handle.pid();
        info!(process = %name, path = %definition.path, pid, %run, "started");
        self.publisher.pid(name, Some(pid)).await;

        if definition.stdin_from_spawn_payload {
            if !payload.is_empty() {
                if let Err(e) = handle.write_stdin(payload) {
                    warn!(process = %name, error = %e, "spawn payload not written");
                }
            }
            handle.close_stdin();
        }

        if let Some(state) = self.states.get_mut(name) {
            state.output.reset();
            state.running = Some(RunningChild {
                run,
                pid,
                handle,
                started_at: Utc::now(),
            });
        }
        Ok(pid)
    }

    /// Non-empty payload is written to stdin; empty payload closes it.
    pub fn pipe(
        &mut self,
        name: &ProcessName,
        payload: Vec<u8>,
    ) -> Result<PipeOutcome, LifecycleError> {
        let definition = self.table.get(name).ok_or_else(|| Self::unknown(name))?;
        if definition.disable_stdin {
            return Err(LifecycleError::StdinDisabled);
        }

        let running = self
            .states
            .get_mut(name)
            .ok_or_else(|| Self::unknown(name))?
            .running
            .as_mut()
            .ok_or(LifecycleError::NotRunning)?;

        if payload.is_empty() {
            running.handle.close_stdin();
            return Ok(PipeOutcome::Closed);
        }
        let len = payload.len();
        running.handle.write_stdin(payload)?;
        Ok(PipeOutcome::Written(len))
    }

    /// A payload that does not look like a signal name is logged as invalid,
    /// then forwarded anyway; the delivery itself decides.
    pub fn signal(&self, name: &ProcessName, payload: &str) -> Result<(), LifecycleError> {
        let running = self
            .states
            .get(name)
            .ok_or_else(|| Self::unknown(name))?
            .running
            .as_ref()
            .ok_or(LifecycleError::NotRunning)?;

        if !looks_like_signal_name(payload) {
            error!(process = %name, payload, "invalid signal");
        }
        info!(process = %name, pid = running.pid, signal = payload, "sending");
        running.handle.signal(payload)
    }

    pub async fn on_child_event(&mut self, event: ChildEvent) {
        let ChildEvent { process, run, kind } = event;

        let current = self
            .states
            .get(&process)
            .is_some_and(|state| state.is_current(run));
        if !current {
            debug!(process = %process, %run, "dropping event from a finished run");
            return;
        }

        match kind {
            ChildEventKind::Output { stream, data } => {
                self.on_output(&process, stream, &data).await
            }
            ChildEventKind::Error(message) => self.on_error(&process, &message).await,
            ChildEventKind::Exit(report) => self.on_exit(&process, report).await,
        }
    }

    async fn on_output(&mut self, name: &ProcessName, stream: ChildStream, data: &[u8]) {
        let table = Arc::clone(&self.table);
        let Some(definition) = table.get(name) else {
            return;
        };
        let Some(state) = self.states.get_mut(name) else {
            return;
        };

        let text = String::from_utf8_lossy(data);
        debug!(
            process = %name,
            stream = %stream.descriptor(),
            "{}",
            text.strip_suffix('\n').unwrap_or(&text)
        );

        let deliveries = state.output.on_chunk(definition, stream, data);
        for delivery in &deliveries {
            self.publisher.output(name, delivery).await;
        }
    }

    async fn on_error(&mut self, name: &ProcessName, message: &str) {
        error!(process = %name, error = message, "error");
        self.publisher.error(name, message).await;
    }

    async fn on_exit(&mut self, name: &ProcessName, report: ExitReport) {
        let table = Arc::clone(&self.table);
        let Some(definition) = table.get(name) else {
            return;
        };
        let Some(state) = self.states.get_mut(name) else {
            return;
        };

        info!(process = %name, code = ?report.code, signal = ?report.signal, "exit");
        let flushed = state.output.flush(definition);
        state.running = None;

        for delivery in &flushed {
            self.publisher.output(name, delivery).await;
        }
        self.publisher.pid(name, None).await;
        self.publisher.exit(name, &report).await;

        self.dequeue(name, definition).await;
    }

    /// Start the oldest queued payload. A refused start consumes its entry and
    /// the next one is tried, so the queue never waits on an idle process.
    async fn dequeue(&mut self, name: &ProcessName, definition: &ProcessDefinition) {
        loop {
            let Some(state) = self.states.get_mut(name) else {
                return;
            };
            let Some(payload) = state.pending.pop_front() else {
                return;
            };
            info!(process = %name, remaining = state.pending.len(), "finished running, dequeuing");

            match self.start(name, definition, payload).await {
                Ok(_) => return,
                Err(e) => error!(process = %name, error = %e, "start failed"),
            }
        }
    }

    /// Ask every running child to terminate.
    pub fn shutdown(&mut self) {
        for (name, state) in &mut self.states {
            let Some(running) = state.running.as_mut() else {
                continue;
            };
            running.handle.close_stdin();
            info!(process = %name, pid = running.pid, "terminating");
            if let Err(e) = running.handle.signal(SHUTDOWN_SIGNAL) {
                warn!(process = %name, error = %e, "terminate failed");
            }
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let mut processes: Vec<ProcessStatus> = self
            .states
            .iter()
            .map(|(name, state)| ProcessStatus {
                name: name.to_string(),
                state: state.state(),
                pid: state.pid(),
                queued: state.pending.len(),
                started_at: state.running.as_ref().map(|r| r.started_at),
            })
            .collect();
        processes.sort_by(|a, b| a.name.cmp(&b.name));
        StatusSnapshot { processes }
    }
}
