//! Orchestrator configuration.
//!
//! - `settings` - runtime tunables (`OrchestratorConfig`) with YAML loading and env overrides
//! - `duration` - human-readable duration parsing and the serde adapter used by `settings`

pub mod duration;
mod settings;

pub use duration::parse_duration_string;
pub use settings::*;
