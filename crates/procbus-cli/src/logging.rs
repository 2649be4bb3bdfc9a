//! Log sink setup for the binary.

use clap::ValueEnum;
use tracing::Level;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Verbosity {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl Verbosity {
    pub fn level(self) -> Level {
        match self {
            Verbosity::Error => Level::ERROR,
            Verbosity::Warn => Level::WARN,
            Verbosity::Info => Level::INFO,
            Verbosity::Debug => Level::DEBUG,
        }
    }
}

/// Install the global subscriber. `RUST_LOG`, when set, wins over `verbosity`.
pub fn init_logging(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.level().to_string()));

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false));
    let _ = tracing::subscriber::set_global_default(subscriber);
}
