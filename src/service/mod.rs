//! Runtime model and process control for managed services.

pub mod circuit_breaker;
mod events;
pub mod health;
mod log_capture;
mod monitor;
pub mod path;
mod process;
mod types;

pub use circuit_breaker::BreakerTransition;
pub use events::ProcessEvent;
pub use health::{apply_health_check, required_checks, HealthPolicy, HealthTransition};
pub use log_capture::{LogBuffer, Stream};
pub use path::{augment_path, PackageManagerLocator};
pub use process::{ExitInfo, ProcessManager, ProcessSnapshot};
pub use types::*;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Runtime state of every registry entry, shared by the orchestrator and the
/// process manager. A sync mutex: never held across an await.
pub type SharedStates = Arc<Mutex<HashMap<String, RuntimeState>>>;
