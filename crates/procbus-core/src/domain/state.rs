//! Lifecycle state of a supervised process.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State transitions:
/// - Idle -> Running (spawn)
/// - Running -> Idle (exit), or straight back to Running when a spawn was queued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Idle,
    Running,
}

/// Identifies one spawn of a process. Events tagged with an older run are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(u64);

impl RunId {
    pub fn new(n: u64) -> Self {
        Self(n)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

/// How a child ended. At least one side is normally set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExitReport {
    pub code: Option<i32>,
    pub signal: Option<String>,
}

impl ExitReport {
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn signal(signal: impl Into<String>) -> Self {
        Self {
            code: None,
            signal: Some(signal.into()),
        }
    }

    /// Value for the `exit` status topic: the code if any, else the signal name.
    pub fn status_value(&self) -> String {
        match (&self.code, &self.signal) {
            (Some(code), _) => code.to_string(),
            (None, Some(signal)) => signal.clone(),
            (None, None) => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::clean(ExitReport::code(0), "0")]
    #[case::failure(ExitReport::code(3), "3")]
    #[case::signalled(ExitReport::signal("SIGTERM"), "SIGTERM")]
    #[case::unknown(ExitReport::default(), "")]
    fn exit_status_value(#[case] report: ExitReport, #[case] expected: &str) {
        assert_eq!(report.status_value(), expected);
    }
}
