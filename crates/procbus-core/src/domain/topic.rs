//! Topic grammar.
//!
//! ```text
//! <instance>/connected                    1 / 0, retained
//! <instance>/set/<process>/<command>      inbound: spawn | pipe | signal
//! <instance>/status/<process>/<field>     outbound: pid | exit | error | stdout | stderr | output
//! ```

use std::fmt;
use std::str::FromStr;

use super::errors::RoutingError;
use super::stream::StreamDescriptor;

pub const CONNECTED_PAYLOAD: &[u8] = b"1";
pub const DISCONNECTED_PAYLOAD: &[u8] = b"0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Set,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Spawn,
    Pipe,
    Signal,
}

impl FromStr for Command {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spawn" => Ok(Command::Spawn),
            "pipe" => Ok(Command::Pipe),
            "signal" => Ok(Command::Signal),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusField {
    Pid,
    Exit,
    Error,
    Stream(StreamDescriptor),
}

impl StatusField {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusField::Pid => "pid",
            StatusField::Exit => "exit",
            StatusField::Error => "error",
            StatusField::Stream(stream) => stream.as_str(),
        }
    }
}

impl fmt::Display for StatusField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A topic split into its three segments below the instance prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedTopic<'a> {
    pub direction: Direction,
    pub process: &'a str,
    /// Command for `set`, status field for `status`.
    pub leaf: &'a str,
}

/// Formats and parses topics for one supervisor instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    instance: String,
}

impl Topics {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn connected(&self) -> String {
        format!("{}/connected", self.instance)
    }

    pub fn command_filter(&self) -> String {
        format!("{}/set/#", self.instance)
    }

    pub fn status(&self, process: &str, field: StatusField) -> String {
        format!("{}/status/{}/{}", self.instance, process, field)
    }

    /// Wildcards under which a previous configuration may have left retained output.
    pub fn legacy_retained_filters(&self) -> Vec<String> {
        StreamDescriptor::ALL
            .iter()
            .map(|stream| format!("{}/status/+/{}", self.instance, stream))
            .collect()
    }

    pub fn parse<'a>(&self, topic: &'a str) -> Result<ParsedTopic<'a>, RoutingError> {
        let rest = topic
            .strip_prefix(self.instance.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| RoutingError::ForeignTopic {
                topic: topic.to_string(),
                instance: self.instance.clone(),
            })?;

        let mut segments = rest.split('/');
        let (Some(direction), Some(process), Some(leaf), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(RoutingError::MalformedTopic(topic.to_string()));
        };

        if process.is_empty() || leaf.is_empty() {
            return Err(RoutingError::MalformedTopic(topic.to_string()));
        }

        let direction = match direction {
            "set" => Direction::Set,
            "status" => Direction::Status,
            other => {
                return Err(RoutingError::UnknownDirection {
                    direction: other.to_string(),
                    topic: topic.to_string(),
                });
            }
        };

        Ok(ParsedTopic {
            direction,
            process,
            leaf,
        })
    }
}
