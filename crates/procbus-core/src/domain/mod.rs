//! Domain - ドメインモデル（definition, stream, topic, state, errors）

pub mod definition;
pub mod errors;
pub mod state;
pub mod stream;
pub mod topic;

pub use definition::{DEFAULT_BUFFER_MAX, ProcessDefinition, ProcessName, ProcessTable};
pub use errors::{
    BusError, CommandError, ConfigError, LifecycleError, RoutingError, SpawnError,
};
pub use state::{ExitReport, ProcessState, RunId};
pub use stream::{ChildStream, HandlerMode, StreamDescriptor};
pub use topic::{Command, Direction, ParsedTopic, StatusField, Topics};
