//! AppBuilder - supervisor runtime の構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）: bus 接続前に確認できるものは `build()` で確認する
//! - bus は必須、spawner の既定値は実 OS process

use std::sync::Arc;

use tokio::sync::mpsc;

use super::cleaner::RetainedTopicCleaner;
use super::config::SupervisorConfig;
use super::publisher::StatusPublisher;
use super::router::CommandRouter;
use super::runtime::Runtime;
use super::supervisor::ProcessSupervisor;
use crate::domain::{ProcessTable, Topics};
use crate::impls::TokioProcessSpawner;
use crate::ports::{BusClient, ProcessSpawner};

/// # Example
/// ```ignore
/// let runtime = AppBuilder::new(SupervisorConfig::new("pc"))
///     .process_table(ProcessTable::load("procs.json")?)
///     .bus(Arc::new(bus))
///     .build()?;
/// ```
pub struct AppBuilder {
    config: SupervisorConfig,
    table: Option<ProcessTable>,
    bus: Option<Arc<dyn BusClient>>,
    spawner: Option<Arc<dyn ProcessSpawner>>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("no bus client configured")]
    MissingBus,

    #[error("no process table configured")]
    MissingProcessTable,

    #[error("invalid instance name {0:?}: must be non-empty and free of MQTT wildcards")]
    InvalidInstanceName(String),

    #[error("child event capacity must be at least 1")]
    ZeroChildEventCapacity,
}

impl BuildError {
    pub fn as_label(&self) -> &'static str {
        match self {
            BuildError::MissingBus => "build_missing_bus",
            BuildError::MissingProcessTable => "build_missing_process_table",
            BuildError::InvalidInstanceName(_) => "build_invalid_instance_name",
            BuildError::ZeroChildEventCapacity => "build_zero_child_event_capacity",
        }
    }
}

impl AppBuilder {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            table: None,
            bus: None,
            spawner: None,
        }
    }

    pub fn process_table(mut self, table: ProcessTable) -> Self {
        self.table = Some(table);
        self
    }

    pub fn bus(mut self, bus: Arc<dyn BusClient>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn spawner(mut self, spawner: Arc<dyn ProcessSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    pub fn build(self) -> Result<Runtime, BuildError> {
        let instance = &self.config.instance;
        if instance.is_empty() || instance.contains(['+', '#']) {
            return Err(BuildError::InvalidInstanceName(instance.clone()));
        }
        if self.config.child_event_capacity == 0 {
            return Err(BuildError::ZeroChildEventCapacity);
        }
        let table = self.table.ok_or(BuildError::MissingProcessTable)?;
        let bus = self.bus.ok_or(BuildError::MissingBus)?;
        let spawner = self
            .spawner
            .unwrap_or_else(|| Arc::new(TokioProcessSpawner::new()));

        let topics = Topics::new(instance.clone());
        let publisher = StatusPublisher::new(topics.clone(), Arc::clone(&bus));
        let (events_tx, events_rx) = mpsc::channel(self.config.child_event_capacity);

        let supervisor =
            ProcessSupervisor::new(Arc::new(table), spawner, publisher.clone(), events_tx);
        let router = CommandRouter::new(topics.clone(), supervisor);
        let cleaner = RetainedTopicCleaner::new(
            bus,
            topics.legacy_retained_filters(),
            self.config.cleanup_window,
        );

        Ok(Runtime::new(
            self.config,
            router,
            publisher,
            cleaner,
            events_rx,
        ))
    }
}
