//! Impls - port implementations.
//!
//! # Included
//! - **TokioProcessSpawner**: real OS processes (production)
//! - **RecordingBus**: records bus requests (development / tests)
//! - **ScriptedSpawner**: fake children driven by the caller (tests)
//!
//! The MQTT adapter lives in the binary crate, next to the transport setup.

pub mod memory_bus;
pub mod scripted;
pub mod tokio_process;

pub use self::memory_bus::{Publication, RecordingBus};
pub use self::scripted::{ChildLog, ScriptedSpawner};
pub use self::tokio_process::TokioProcessSpawner;
