//! Ports - seams to external collaborators.
//!
//! - **bus**: the publish/subscribe transport (MQTT in production)
//! - **spawner**: OS process creation, stdin, signals
//!
//! Production adapters live outside this module (`impls::TokioProcessSpawner`,
//! the MQTT client in the binary crate).

pub mod bus;
pub mod spawner;

pub use self::bus::{BusClient, BusEvent, ConnectionState, InboundMessage};
pub use self::spawner::{
    ChildEvent, ChildEventKind, ChildEventSender, ChildHandle, ProcessSpawner, SpawnRequest,
};
