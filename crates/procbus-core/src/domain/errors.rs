//! Errors - エラー型と分類
//!
//! # 分類
//! - [`RoutingError`]: 宛先の process / command が存在しない
//! - [`LifecycleError`]: process の状態と矛盾するコマンド
//! - [`SpawnError`]: OS が process の生成を拒否した
//! - [`ConfigError`]: process table を読み込めない
//! - [`BusError`]: transport がリクエストを運べない
//!
//! どのエラーも supervisor を止めない。ログ行か `error` status topic の値として表に出る。

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("topic {topic} is outside instance {instance}")]
    ForeignTopic { topic: String, instance: String },

    #[error("malformed topic {0}")]
    MalformedTopic(String),

    #[error("unknown direction {direction} in {topic}")]
    UnknownDirection { direction: String, topic: String },

    #[error("unknown process {0}")]
    UnknownProcess(String),

    #[error("received unknown command {command} for process {process}")]
    UnknownCommand { process: String, command: String },
}

impl RoutingError {
    pub fn as_label(&self) -> &'static str {
        match self {
            RoutingError::ForeignTopic { .. } => "routing_foreign_topic",
            RoutingError::MalformedTopic(_) => "routing_malformed_topic",
            RoutingError::UnknownDirection { .. } => "routing_unknown_direction",
            RoutingError::UnknownProcess(_) => "routing_unknown_process",
            RoutingError::UnknownCommand { .. } => "routing_unknown_command",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("not running")]
    NotRunning,

    #[error("piping to stdin disabled")]
    StdinDisabled,

    #[error("stdin already closed")]
    StdinClosed,

    #[error("no pid, start failed: {reason}")]
    StartFailed { reason: String },

    #[error("sending {signal} failed: {reason}")]
    SignalFailed { signal: String, reason: String },

    #[error("process {0} has no runtime state")]
    UnknownProcess(String),
}

impl LifecycleError {
    pub fn as_label(&self) -> &'static str {
        match self {
            LifecycleError::AlreadyRunning { .. } => "lifecycle_already_running",
            LifecycleError::NotRunning => "lifecycle_not_running",
            LifecycleError::StdinDisabled => "lifecycle_stdin_disabled",
            LifecycleError::StdinClosed => "lifecycle_stdin_closed",
            LifecycleError::StartFailed { .. } => "lifecycle_start_failed",
            LifecycleError::SignalFailed { .. } => "lifecycle_signal_failed",
            LifecycleError::UnknownProcess(_) => "lifecycle_unknown_process",
        }
    }
}

/// Anything a routed command can fail with.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl CommandError {
    pub fn as_label(&self) -> &'static str {
        match self {
            CommandError::Routing(e) => e.as_label(),
            CommandError::Lifecycle(e) => e.as_label(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("spawn {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("spawn {path}: no process id")]
    NoPid { path: String },

    #[error("spawn {path}: {reason}")]
    Rejected { path: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("process table is not valid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid definition for process {name}: {reason}")]
    InvalidDefinition { name: String, reason: String },
}

impl ConfigError {
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Io { .. } => "config_io",
            ConfigError::Json(_) => "config_json",
            ConfigError::InvalidDefinition { .. } => "config_invalid_definition",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("bus transport: {0}")]
    Transport(String),

    #[error("bus request rejected: {0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_log_wording() {
        assert_eq!(
            RoutingError::UnknownProcess("x".into()).to_string(),
            "unknown process x"
        );
        assert_eq!(LifecycleError::NotRunning.to_string(), "not running");
        assert_eq!(
            LifecycleError::StdinDisabled.to_string(),
            "piping to stdin disabled"
        );
    }

    #[test]
    fn command_error_keeps_inner_label() {
        let err: CommandError = LifecycleError::AlreadyRunning { pid: 7 }.into();
        assert_eq!(err.as_label(), "lifecycle_already_running");
        assert_eq!(err.to_string(), "already running (pid 7)");
    }
}
