mod cli;
mod commands;
mod output;

use clap::Parser;
use cli::{Cli, Commands};
use service_orchestrator::{Error as OrchError, OrchestratorConfig};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if let Some(orch_error) = e.downcast_ref::<OrchError>() {
            eprintln!("Error: {}", orch_error);
            if let Some(suggestion) = orch_error.suggestion() {
                eprintln!("\nHint: {}", suggestion);
            }
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json)?;

    let out = output::CliOutput;
    match cli.command {
        Commands::Validate => commands::run_validate(&cli.registry, &out),
        Commands::Order => commands::run_order(&cli.registry, &out),
        Commands::State => {
            let config = OrchestratorConfig::load(cli.config.as_deref())?;
            commands::run_state(&config, &out).await
        }
        Commands::Serve => {
            let config = OrchestratorConfig::load(cli.config.as_deref())?;
            commands::run_serve(&cli.registry, config, &out).await
        }
    }
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .init();
    }

    Ok(())
}
