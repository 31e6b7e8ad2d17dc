//! OAuth Bridge - one authorization server in front of several identity providers

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use oauth_bridge::{
    bridge::{Bridge, BridgeCore},
    cli::{Cli, Command},
    config::Config,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::Metadata { resource }) => match print_metadata(&config, resource) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Failed to render metadata: {e:#}");
                ExitCode::FAILURE
            }
        },
        Some(Command::Serve) | None => run_server(config).await,
    }
}

/// Load configuration and apply CLI overrides
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(ref host) = cli.host {
        config.server.host = host.clone();
    }
    if cli.test_mode {
        config.tokens.test_mode = true;
    }
    Ok(config)
}

/// Print discovery JSON without starting the server
fn print_metadata(config: &Config, resource: bool) -> anyhow::Result<()> {
    let core = BridgeCore::from_config(config).context("building bridge")?;
    let json = if resource {
        serde_json::to_string_pretty(&core.protected_resource_metadata())?
    } else {
        serde_json::to_string_pretty(&core.authorization_server_metadata())?
    };
    println!("{json}");
    Ok(())
}

async fn run_server(config: Config) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        providers = config.enabled_providers().count(),
        test_mode = config.tokens.test_mode,
        "Starting OAuth bridge"
    );

    let bridge = match Bridge::new(config) {
        Ok(bridge) => bridge,
        Err(e) => {
            error!("Failed to create bridge: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = bridge.run().await {
        error!("Bridge error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Bridge shutdown complete");
    ExitCode::SUCCESS
}
