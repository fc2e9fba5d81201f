//! Static service catalogue and dependency analysis.
//!
//! - `types` - `ServiceConfig` and its enums, filters, startup-order entries
//! - `catalogue` - the immutable `Registry` and its queries
//! - `graph` - topological startup order and cycle detection
//! - `validation` - per-service and catalogue-wide checks
//! - `environment` - environment merge and working-directory resolution

mod catalogue;
pub mod environment;
mod graph;
mod types;
mod validation;

pub use catalogue::Registry;
pub use environment::{build_service_environment, missing_required_env, service_working_directory};
pub use graph::Graph;
pub use types::*;
pub use validation::{validate_catalogue, validate_service_config};
