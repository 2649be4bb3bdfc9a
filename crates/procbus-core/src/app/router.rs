//! CommandRouter - inbound bus messages to supervisor operations.
//!
//! ```text
//! <inst>/set/<proc>/spawn   -> ProcessSupervisor::spawn(payload)
//! <inst>/set/<proc>/pipe    -> ProcessSupervisor::pipe(payload)
//! <inst>/set/<proc>/signal  -> ProcessSupervisor::signal(payload as text)
//! <inst>/status/<proc>/<fd> -> retained self-heal (see `heal_retained`)
//! ```
//!
//! Design:
//! - `route` never fails. Every problem is one `error!` line carrying the
//!   error's label, and nothing is published for it.
//! - `dispatch` returns the typed error so tests can assert on it.

use std::sync::Arc;

use tracing::{debug, error, warn};

use super::publisher::StatusPublisher;
use super::supervisor::ProcessSupervisor;
use crate::domain::{
    Command, CommandError, Direction, ProcessDefinition, ProcessName, ProcessTable,
    RoutingError, StreamDescriptor, Topics,
};
use crate::ports::InboundMessage;

/// What a successfully dispatched message did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    Command(Command),
    /// A stale retained stream value was erased.
    ClearedRetained,
    /// Status echo that needs no action.
    Ignored,
}

pub struct CommandRouter {
    topics: Topics,
    table: Arc<ProcessTable>,
    supervisor: ProcessSupervisor,
}

impl CommandRouter {
    pub fn new(topics: Topics, supervisor: ProcessSupervisor) -> Self {
        let table = Arc::clone(supervisor.table());
        Self {
            topics,
            table,
            supervisor,
        }
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    pub fn supervisor_mut(&mut self) -> &mut ProcessSupervisor {
        &mut self.supervisor
    }

    pub async fn route(&mut self, message: InboundMessage) {
        debug!(
            topic = %message.topic,
            payload = %String::from_utf8_lossy(&message.payload),
            retain = message.retain,
            "mqtt <"
        );

        if let Err(e) = self.dispatch(message).await {
            error!(label = e.as_label(), "{e}");
        }
    }

    pub async fn dispatch(&mut self, message: InboundMessage) -> Result<Routed, CommandError> {
        let table = Arc::clone(&self.table);
        let parsed = self.topics.parse(&message.topic)?;
        let (name, definition) = table
            .resolve(parsed.process)
            .ok_or_else(|| RoutingError::UnknownProcess(parsed.process.to_string()))?;

        match parsed.direction {
            Direction::Status => {
                let publisher = self.supervisor.publisher();
                let cleared =
                    heal_retained(publisher, name, definition, parsed.leaf, &message).await;
                Ok(if cleared {
                    Routed::ClearedRetained
                } else {
                    Routed::Ignored
                })
            }
            Direction::Set => {
                let command: Command = parsed.leaf.parse().map_err(|()| {
                    RoutingError::UnknownCommand {
                        process: name.to_string(),
                        command: parsed.leaf.to_string(),
                    }
                })?;
                self.command(name, command, message.payload).await?;
                Ok(Routed::Command(command))
            }
        }
    }

    async fn command(
        &mut self,
        name: &ProcessName,
        command: Command,
        payload: Vec<u8>,
    ) -> Result<(), CommandError> {
        match command {
            Command::Spawn => {
                self.supervisor.spawn(name, payload).await?;
            }
            Command::Pipe => {
                self.supervisor.pipe(name, payload)?;
            }
            Command::Signal => {
                let signal = String::from_utf8_lossy(&payload);
                self.supervisor.signal(name, &signal)?;
            }
        }
        Ok(())
    }
}

/// A retained value on a stream topic whose handler mode does not retain
/// was left by an earlier configuration: erase it. Our own pid/exit/error
/// echoes and erasures (empty payload) are ignored.
async fn heal_retained(
    publisher: &StatusPublisher,
    name: &ProcessName,
    definition: &ProcessDefinition,
    field: &str,
    message: &InboundMessage,
) -> bool {
    if !message.retain || message.payload.is_empty() {
        return false;
    }
    let Some(stream) = StreamDescriptor::parse(field) else {
        return false;
    };
    if definition.mode(stream).retains() {
        return false;
    }

    warn!(
        process = %name,
        topic = %message.topic,
        "deleting retained mqtt but not retained in config"
    );
    publisher.clear_retained(&message.topic).await;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HandlerMode, LifecycleError, ProcessState};
    use crate::impls::{RecordingBus, ScriptedSpawner};
    use crate::ports::ChildEvent;
    use rstest::rstest;
    use tokio::sync::mpsc;

    type Fixture = (
        CommandRouter,
        RecordingBus,
        ScriptedSpawner,
        mpsc::Receiver<ChildEvent>,
    );

    fn router(table: ProcessTable) -> Fixture {
        let topics = Topics::new("pc");
        let bus = RecordingBus::new();
        let spawner = ScriptedSpawner::new();
        let (tx, rx) = mpsc::channel(16);
        let supervisor = ProcessSupervisor::new(
            Arc::new(table),
            Arc::new(spawner.clone()),
            StatusPublisher::new(topics.clone(), Arc::new(bus.clone())),
            tx,
        );
        (CommandRouter::new(topics, supervisor), bus, spawner, rx)
    }

    fn single(def: ProcessDefinition) -> ProcessTable {
        ProcessTable::new().with("job", def).unwrap()
    }

    #[tokio::test]
    async fn spawn_command_starts_process() {
        let (mut router, _bus, spawner, _rx) = router(single(ProcessDefinition::new("/bin/job")));

        let routed = router
            .dispatch(InboundMessage::new("pc/set/job/spawn", ""))
            .await
            .unwrap();

        assert_eq!(routed, Routed::Command(Command::Spawn));
        assert_eq!(spawner.requests().len(), 1);
        assert_eq!(
            router.supervisor().state(&ProcessName::new("job")),
            Some(ProcessState::Running)
        );
    }

    #[rstest]
    #[case::unknown_process("pc/set/ghost/spawn", "routing_unknown_process")]
    #[case::unknown_command("pc/set/job/restart", "routing_unknown_command")]
    #[case::malformed("pc/set/job", "routing_malformed_topic")]
    #[case::unknown_direction("pc/get/job/spawn", "routing_unknown_direction")]
    #[tokio::test]
    async fn routing_failures_publish_nothing(#[case] topic: &str, #[case] label: &str) {
        let (mut router, bus, spawner, _rx) = router(single(ProcessDefinition::new("/bin/job")));

        let err = router
            .dispatch(InboundMessage::new(topic, "x"))
            .await
            .unwrap_err();

        assert_eq!(err.as_label(), label);
        assert!(bus.published().is_empty());
        assert!(spawner.requests().is_empty());
    }

    #[tokio::test]
    async fn unknown_process_message_names_it() {
        let (mut router, _bus, _spawner, _rx) = router(single(ProcessDefinition::new("/bin/job")));
        let err = router
            .dispatch(InboundMessage::new("pc/set/ghost/pipe", "x"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown process ghost");
    }

    #[tokio::test]
    async fn pipe_to_idle_process_reports_not_running() {
        let (mut router, bus, _spawner, _rx) = router(single(ProcessDefinition::new("/bin/job")));
        let err = router
            .dispatch(InboundMessage::new("pc/set/job/pipe", "data"))
            .await
            .unwrap_err();
        assert_eq!(err, CommandError::Lifecycle(LifecycleError::NotRunning));
        assert!(bus.published().is_empty());
    }

    #[tokio::test]
    async fn signal_payload_is_forwarded_verbatim() {
        let (mut router, _bus, spawner, _rx) = router(single(ProcessDefinition::new("/bin/job")));
        router
            .dispatch(InboundMessage::new("pc/set/job/spawn", ""))
            .await
            .unwrap();
        router
            .dispatch(InboundMessage::new("pc/set/job/signal", "SIGINT\n"))
            .await
            .unwrap();

        let run = spawner.last_run("job").unwrap();
        assert_eq!(spawner.child(run).unwrap().signals, vec!["SIGINT\n"]);
    }

    #[rstest]
    #[case::stale_stream("stdout", b"old".as_slice(), true, HandlerMode::Stream, true)]
    #[case::not_retained("stdout", b"old".as_slice(), false, HandlerMode::Stream, false)]
    #[case::retaining_mode("stdout", b"old".as_slice(), true, HandlerMode::StreamRetain, false)]
    #[case::own_erasure("stdout", b"".as_slice(), true, HandlerMode::Drop, false)]
    #[case::pid_echo("pid", b"4000".as_slice(), true, HandlerMode::Drop, false)]
    #[case::exit_echo("exit", b"0".as_slice(), true, HandlerMode::Drop, false)]
    #[tokio::test]
    async fn retained_status_self_heal(
        #[case] field: &str,
        #[case] payload: &[u8],
        #[case] retain: bool,
        #[case] mode: HandlerMode,
        #[case] cleared: bool,
    ) {
        let topic = format!("pc/status/job/{field}");
        let def = ProcessDefinition::new("/bin/job").with_mode(StreamDescriptor::Stdout, mode);
        let (mut router, bus, _spawner, _rx) = router(single(def));
        let mut message = InboundMessage::new(topic.as_str(), payload);
        if retain {
            message = message.retained();
        }

        let routed = router.dispatch(message).await.unwrap();

        if cleared {
            assert_eq!(routed, Routed::ClearedRetained);
            let p = bus.last_to(&topic).unwrap();
            assert!(p.payload.is_empty());
            assert!(p.retain);
        } else {
            assert_eq!(routed, Routed::Ignored);
            assert!(bus.published().is_empty());
        }
    }

    #[tokio::test]
    async fn self_heal_checks_the_addressed_stream() {
        let def = ProcessDefinition::new("/bin/job")
            .with_mode(StreamDescriptor::Stdout, HandlerMode::BufferRetain)
            .with_mode(StreamDescriptor::Stderr, HandlerMode::Buffer);
        let (mut router, bus, _spawner, _rx) = router(single(def));

        router
            .dispatch(InboundMessage::new("pc/status/job/stdout", "keep").retained())
            .await
            .unwrap();
        router
            .dispatch(InboundMessage::new("pc/status/job/stderr", "drop").retained())
            .await
            .unwrap();

        let topics: Vec<_> = bus.published().into_iter().map(|p| p.topic).collect();
        assert_eq!(topics, vec!["pc/status/job/stderr"]);
    }

    #[tokio::test]
    async fn route_swallows_errors() {
        let (mut router, bus, _spawner, _rx) = router(single(ProcessDefinition::new("/bin/job")));
        router
            .route(InboundMessage::new("pc/set/ghost/spawn", ""))
            .await;
        assert!(bus.published().is_empty());
    }
}
