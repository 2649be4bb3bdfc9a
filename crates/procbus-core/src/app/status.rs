//! Status - point-in-time view of every supervised process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ProcessState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStatus {
    pub name: String,
    pub state: ProcessState,
    pub pid: Option<u32>,
    /// Spawn payloads waiting for the current run to exit.
    pub queued: usize,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Sorted by name.
    pub processes: Vec<ProcessStatus>,
}

impl StatusSnapshot {
    pub fn get(&self, name: &str) -> Option<&ProcessStatus> {
        self.processes.iter().find(|p| p.name == name)
    }

    pub fn running(&self) -> impl Iterator<Item = &ProcessStatus> {
        self.processes
            .iter()
            .filter(|p| p.state == ProcessState::Running)
    }

    pub fn queued_total(&self) -> usize {
        self.processes.iter().map(|p| p.queued).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_state_in_snake_case() {
        let snapshot = StatusSnapshot {
            processes: vec![ProcessStatus {
                name: "job".into(),
                state: ProcessState::Running,
                pid: Some(7),
                queued: 2,
                started_at: None,
            }],
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["processes"][0]["state"], "running");
        assert_eq!(snapshot.running().count(), 1);
        assert_eq!(snapshot.queued_total(), 2);
        assert_eq!(snapshot.get("job").and_then(|p| p.pid), Some(7));
    }
}
