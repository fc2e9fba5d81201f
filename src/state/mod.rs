//! Durable service state.
//!
//! A single JSON document, `{version, timestamp, services}`, with the
//! previous snapshot kept alongside as a backup.

mod manager;
mod types;

pub use manager::StateManager;
pub use types::{PersistedServiceState, StateDocument, STATE_SCHEMA_VERSION};

pub const STATE_FILE_NAME: &str = "orchestrator-state.json";
pub const BACKUP_FILE_NAME: &str = "orchestrator-state.backup.json";
