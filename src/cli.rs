//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// OAuth bridge - one PKCE authorization spanning several upstream providers
#[derive(Parser, Debug)]
#[command(name = "oauth-bridge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "OAUTH_BRIDGE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "OAUTH_BRIDGE_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "OAUTH_BRIDGE_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "OAUTH_BRIDGE_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "OAUTH_BRIDGE_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Issue short-lived access tokens to exercise client refresh loops
    #[arg(long)]
    pub test_mode: bool,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the bridge server (default)
    Serve,

    /// Print the discovery documents for the resolved configuration
    Metadata {
        /// Print the protected resource document instead
        #[arg(long)]
        resource: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_server_mode() {
        let cli = Cli::try_parse_from(["oauth-bridge"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level, "info");
        assert!(!cli.test_mode);
    }

    #[test]
    fn parses_overrides_and_subcommand() {
        let cli = Cli::try_parse_from([
            "oauth-bridge",
            "--port",
            "9999",
            "--host",
            "0.0.0.0",
            "--test-mode",
            "metadata",
            "--resource",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.port, Some(9999));
        assert_eq!(cli.host.as_deref(), Some("0.0.0.0"));
        assert!(cli.test_mode);
        assert_eq!(cli.log_format.as_deref(), Some("json"));
        assert!(matches!(cli.command, Some(Command::Metadata { resource: true })));
    }
}
