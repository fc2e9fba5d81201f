use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "orch")]
#[command(about = "Service Orchestrator - Supervise platform services from a registry")]
pub struct Cli {
    /// Orchestrator config file (defaults are used when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Service registry file
    #[arg(short, long, default_value = "registry.yaml")]
    pub registry: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Auto-start services and serve the Control API until interrupted
    Serve,
    /// Validate the service registry
    Validate,
    /// Print the dependency-respecting startup order
    Order,
    /// Print the persisted service state
    State,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_with_options() {
        let cli = Cli::parse_from([
            "orch",
            "--config",
            "orchestrator.yaml",
            "--registry",
            "services.yaml",
            "--json",
            "serve",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("orchestrator.yaml")));
        assert_eq!(cli.registry, PathBuf::from("services.yaml"));
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Serve));
    }

    #[test]
    fn test_registry_default() {
        let cli = Cli::parse_from(["orch", "order"]);
        assert_eq!(cli.registry, PathBuf::from("registry.yaml"));
        assert!(!cli.json);
        assert!(matches!(cli.command, Commands::Order));
    }
}
