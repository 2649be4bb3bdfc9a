//! Runtime - the supervisor's single event loop.
//!
//! ```text
//!            ┌──────────── shutdown (watch) ────────────┐
//!            │                                          ▼
//! bus events ─► route / connect / close ─┐        stop(): SIGTERM children,
//! child events ─► supervisor ────────────┴─► bus  snapshot, connected=0
//! ```
//!
//! Design:
//! - One task owns every piece of mutable state; sources are merged with a
//!   biased `select!` (shutdown first, then child events, then bus events).
//! - Child events are preferred over bus events so an exit is applied before
//!   a spawn that was sent after it.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::cleaner::RetainedTopicCleaner;
use super::config::SupervisorConfig;
use super::publisher::StatusPublisher;
use super::router::CommandRouter;
use super::status::StatusSnapshot;
use crate::ports::{BusEvent, ChildEvent};

pub struct Runtime {
    config: SupervisorConfig,
    router: CommandRouter,
    publisher: StatusPublisher,
    cleaner: RetainedTopicCleaner,
    child_events: mpsc::Receiver<ChildEvent>,
    cleanup: Option<JoinHandle<()>>,
}

impl Runtime {
    pub(crate) fn new(
        config: SupervisorConfig,
        router: CommandRouter,
        publisher: StatusPublisher,
        cleaner: RetainedTopicCleaner,
        child_events: mpsc::Receiver<ChildEvent>,
    ) -> Self {
        Self {
            config,
            router,
            publisher,
            cleaner,
            child_events,
            cleanup: None,
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.router.supervisor().snapshot()
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped) or the
    /// bus event stream ends. Returns the state as it was when stopping.
    pub async fn run(
        mut self,
        mut bus_events: mpsc::Receiver<BusEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> StatusSnapshot {
        info!(
            instance = %self.config.instance,
            processes = self.router.supervisor().table().len(),
            "supervisor started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                Some(event) = self.child_events.recv() => {
                    self.router.supervisor_mut().on_child_event(event).await;
                }
                event = bus_events.recv() => {
                    let Some(event) = event else {
                        info!("bus event stream ended");
                        break;
                    };
                    self.on_bus_event(event).await;
                }
            }
        }

        self.stop().await
    }

    async fn on_bus_event(&mut self, event: BusEvent) {
        match event {
            BusEvent::Connected => self.on_connected().await,
            BusEvent::Disconnected { reason } => self.publisher.on_closed(&reason),
            BusEvent::Message(message) => self.router.route(message).await,
        }
    }

    /// Every (re)connect: announce, subscribe to commands, re-arm the
    /// retained-topic cleanup window.
    async fn on_connected(&mut self) {
        self.publisher.on_connected().await;

        let filter = self.publisher.topics().command_filter();
        info!(filter = %filter, "mqtt subscribe");
        if let Err(e) = self.publisher.bus().subscribe(&filter).await {
            error!(filter = %filter, error = %e, "mqtt subscribe failed");
        }

        if let Some(previous) = self.cleanup.take() {
            previous.abort();
        }
        self.cleanup = Some(self.cleaner.arm().await);
    }

    async fn stop(mut self) -> StatusSnapshot {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup.abort();
        }

        let supervisor = self.router.supervisor_mut();
        let snapshot = supervisor.snapshot();
        supervisor.shutdown();
        info!(
            running = snapshot.running().count(),
            queued = snapshot.queued_total(),
            "supervisor stopping"
        );

        self.publisher.announce_offline().await;
        snapshot
    }
}
