//! # Service Orchestrator
//!
//! Supervises the processes of a multi-service platform described by a
//! static service registry.
//!
//! ## Features
//!
//! - **Dependency-aware startup**: topological auto-start order with cycle detection
//! - **Process supervision**: spawn, stop and restart with SIGTERM to SIGKILL escalation
//! - **Health monitoring**: warmup windows and a per-service circuit breaker
//! - **Crash recovery**: bounded, backed-off auto-restart of Critical services
//! - **Durable state**: status survives an orchestrator restart through an atomic JSON file
//! - **Control API**: an axum router exposing status, logs and lifecycle actions
//!
//! Services marked `managed: external` are never spawned or signalled; they
//! always report as healthy.
//!
//! ## Quick Start
//!
//! ```no_run
//! use service_orchestrator::{config::OrchestratorConfig, orchestrator::Orchestrator, registry::Registry};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), service_orchestrator::Error> {
//! let registry = Registry::from_file(std::path::Path::new("registry.yaml"))?;
//! registry.validate()?;
//!
//! let orchestrator = Arc::new(Orchestrator::new(registry, OrchestratorConfig::load(None)?)?);
//! orchestrator.initialize().await?;
//!
//! let app = service_orchestrator::api::router(orchestrator.clone());
//! # let _ = app;
//! orchestrator.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod healthcheck;
pub mod orchestrator;
pub mod registry;
pub mod service;
pub mod state;

pub use config::OrchestratorConfig;
pub use error::{Error, Result};
pub use orchestrator::{Orchestrator, ServiceAction};
pub use registry::{Registry, ServiceConfig};
pub use state::StateManager;
