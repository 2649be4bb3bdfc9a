//! Stream descriptors and the delivery policy attached to each of them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three logical output channels tracked per process.
///
/// `Output` is synthetic: every chunk read from either pipe is also offered to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamDescriptor {
    Stdout,
    Stderr,
    Output,
}

impl StreamDescriptor {
    /// Flush order at exit.
    pub const ALL: [StreamDescriptor; 3] = [
        StreamDescriptor::Stdout,
        StreamDescriptor::Stderr,
        StreamDescriptor::Output,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StreamDescriptor::Stdout => "stdout",
            StreamDescriptor::Stderr => "stderr",
            StreamDescriptor::Output => "output",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stdout" => Some(StreamDescriptor::Stdout),
            "stderr" => Some(StreamDescriptor::Stderr),
            "output" => Some(StreamDescriptor::Output),
            _ => None,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            StreamDescriptor::Stdout => 0,
            StreamDescriptor::Stderr => 1,
            StreamDescriptor::Output => 2,
        }
    }
}

impl fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A real pipe of the child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildStream {
    Stdout,
    Stderr,
}

impl ChildStream {
    pub fn descriptor(self) -> StreamDescriptor {
        match self {
            ChildStream::Stdout => StreamDescriptor::Stdout,
            ChildStream::Stderr => StreamDescriptor::Stderr,
        }
    }
}

/// Delivery policy for a stream descriptor.
///
/// Decoded from the process table at load time, so an unknown mode never
/// reaches the output path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerMode {
    #[default]
    Drop,
    Buffer,
    BufferRetain,
    Stream,
    StreamRetain,
}

impl HandlerMode {
    /// Chunks are kept and published once at exit.
    pub fn is_buffered(self) -> bool {
        matches!(self, HandlerMode::Buffer | HandlerMode::BufferRetain)
    }

    /// Chunks are published as they arrive.
    pub fn is_streamed(self) -> bool {
        matches!(self, HandlerMode::Stream | HandlerMode::StreamRetain)
    }

    /// Publications of this mode carry the retain flag.
    pub fn retains(self) -> bool {
        matches!(self, HandlerMode::BufferRetain | HandlerMode::StreamRetain)
    }
}
