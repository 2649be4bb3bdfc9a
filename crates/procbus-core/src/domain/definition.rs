//! Process definitions and the table they are loaded into.
//!
//! The table is read once at startup from a JSON object keyed by process name.
//! Field names follow the on-disk format (camelCase).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use super::errors::ConfigError;
use super::stream::{HandlerMode, StreamDescriptor};

/// Default cap for a single output buffer (128 KiB).
pub const DEFAULT_BUFFER_MAX: usize = 128 * 1024;

fn default_buffer_max() -> usize {
    DEFAULT_BUFFER_MAX
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessName(String);

impl ProcessName {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Immutable description of a process the supervisor may run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDefinition {
    pub path: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Replaces the child environment entirely when present.
    #[serde(default)]
    pub env: Option<BTreeMap<String, String>>,

    #[serde(default)]
    pub uid: Option<u32>,

    #[serde(default)]
    pub gid: Option<u32>,

    #[serde(default)]
    pub shell: bool,

    #[serde(default)]
    pub disable_stdin: bool,

    #[serde(default)]
    pub stdin_from_spawn_payload: bool,

    #[serde(default)]
    pub enqueue_spawns: bool,

    #[serde(default = "default_buffer_max")]
    pub buffer_max: usize,

    #[serde(default)]
    pub stdout: HandlerMode,

    #[serde(default)]
    pub stderr: HandlerMode,

    #[serde(default)]
    pub output: HandlerMode,
}

impl ProcessDefinition {
    /// Minimal definition: run `path` with every stream dropped.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
            cwd: None,
            env: None,
            uid: None,
            gid: None,
            shell: false,
            disable_stdin: false,
            stdin_from_spawn_payload: false,
            enqueue_spawns: false,
            buffer_max: DEFAULT_BUFFER_MAX,
            stdout: HandlerMode::Drop,
            stderr: HandlerMode::Drop,
            output: HandlerMode::Drop,
        }
    }

    pub fn mode(&self, stream: StreamDescriptor) -> HandlerMode {
        match stream {
            StreamDescriptor::Stdout => self.stdout,
            StreamDescriptor::Stderr => self.stderr,
            StreamDescriptor::Output => self.output,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_mode(mut self, stream: StreamDescriptor, mode: HandlerMode) -> Self {
        match stream {
            StreamDescriptor::Stdout => self.stdout = mode,
            StreamDescriptor::Stderr => self.stderr = mode,
            StreamDescriptor::Output => self.output = mode,
        }
        self
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.path.trim().is_empty() {
            return Err(ConfigError::InvalidDefinition {
                name: name.to_string(),
                reason: "path must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// All configured processes, keyed by name.
///
/// Design:
/// - Built once during initialization, shared read-only afterwards.
/// - Every entry was validated on the way in (fail-fast).
#[derive(Debug, Clone, Default)]
pub struct ProcessTable {
    definitions: HashMap<ProcessName, ProcessDefinition>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Decode every entry separately so an error can name the offending process.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let entries: BTreeMap<String, serde_json::Value> = serde_json::from_str(raw)?;
        let mut table = Self::new();
        for (name, value) in entries {
            let definition: ProcessDefinition =
                serde_json::from_value(value).map_err(|e| ConfigError::InvalidDefinition {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            table.insert(ProcessName::new(name), definition)?;
        }
        Ok(table)
    }

    pub fn insert(
        &mut self,
        name: ProcessName,
        definition: ProcessDefinition,
    ) -> Result<(), ConfigError> {
        definition.validate(name.as_str())?;
        if self.definitions.contains_key(&name) {
            return Err(ConfigError::InvalidDefinition {
                name: name.to_string(),
                reason: "defined twice".to_string(),
            });
        }
        self.definitions.insert(name, definition);
        Ok(())
    }

    pub fn with(mut self, name: &str, definition: ProcessDefinition) -> Result<Self, ConfigError> {
        self.insert(ProcessName::new(name), definition)?;
        Ok(self)
    }

    pub fn get(&self, name: &ProcessName) -> Option<&ProcessDefinition> {
        self.definitions.get(name)
    }

    /// Look up the canonical key for a raw topic segment.
    pub fn resolve(&self, raw: &str) -> Option<(&ProcessName, &ProcessDefinition)> {
        self.definitions.get_key_value(&ProcessName::new(raw))
    }

    pub fn names(&self) -> impl Iterator<Item = &ProcessName> {
        self.definitions.keys()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
