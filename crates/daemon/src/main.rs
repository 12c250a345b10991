//! FileLite Daemon
//!
//! Serves a confined remote filesystem over HTTP.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use daemon::config::{config_path_in, default_data_dir, Config, RuntimeConfig};
use daemon::server::{self, AppState};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// FileLite Daemon - serves a confined remote filesystem over HTTP.
#[derive(Parser, Debug)]
#[command(name = "filelite")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Data directory (config, logs, default uploads)
    #[arg(short, long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute (defaults to `start`)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands for the daemon.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start serving files
    Start {
        /// Override the listen port
        #[arg(long, short)]
        port: Option<u16>,

        /// Disable token authentication
        #[arg(long)]
        no_auth: bool,
    },

    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(long, short)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| config_path_in(&data_dir));

    match cli.command.clone().unwrap_or(Commands::Start {
        port: None,
        no_auth: false,
    }) {
        Commands::Init { force } => {
            if config_path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists at {} (use --force to overwrite)",
                    config_path.display()
                );
            }
            Config::default().save(&config_path)?;
            println!("Wrote default configuration to {}", config_path.display());
        }
        Commands::Start { port, no_auth } => {
            if !config_path.exists() {
                Config::default().save(&config_path)?;
            }
            let mut config = Config::load(&config_path)?;

            // Apply environment variable overrides, then command line flags
            let overrides = config.apply_env_overrides();
            if let Some(port) = port {
                config.port = port;
            }
            if no_auth {
                config.no_auth = true;
            }

            let cwd = std::env::current_dir()?;
            let runtime = config.resolve(&data_dir, &cwd)?;

            let _log_guard = init_logging(cli.verbose, &runtime)?;
            tracing::info!("FileLite daemon starting...");
            tracing::info!("Using config file: {:?}", config_path);
            for note in &overrides {
                tracing::info!("{}", note);
            }

            prepare_root(&runtime)?;
            announce(&runtime);

            server::serve(AppState::new(runtime), wait_for_shutdown_signal()).await?;
        }
    }

    Ok(())
}

/// Install the tracing subscriber; adds a daily log file when enabled.
///
/// The returned guard must stay alive for file logs to be flushed.
fn init_logging(verbose: bool, runtime: &RuntimeConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let level = if verbose { "debug" } else { runtime.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_layer, guard) = if runtime.enable_log {
        let logs_dir = runtime.logs_dir();
        std::fs::create_dir_all(&logs_dir)?;
        let appender = tracing_appender::rolling::daily(&logs_dir, "filelite.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Create the confinement root if it does not exist yet.
fn prepare_root(runtime: &RuntimeConfig) -> anyhow::Result<()> {
    if let Some(root) = &runtime.safe_base_dir {
        let root = Path::new(root);
        if !root.exists() {
            std::fs::create_dir_all(root)?;
            tracing::info!("Created root directory {}", root.display());
        }
    }
    Ok(())
}

fn announce(runtime: &RuntimeConfig) {
    let scheme = if runtime.tls.is_some() { "https" } else { "http" };
    let addr = runtime.listen_addr;
    let host = if addr.ip().is_unspecified() {
        "localhost".to_string()
    } else {
        addr.ip().to_string()
    };

    match &runtime.safe_base_dir {
        Some(root) => tracing::info!("Serving files under {}", root),
        None => tracing::warn!("No root directory configured, the whole filesystem is exposed"),
    }

    let auth = runtime.auth_param();
    if auth.is_empty() {
        tracing::warn!("Authentication is disabled");
        println!("Open {}://{}:{}/", scheme, host, addr.port());
    } else {
        println!("Open {}://{}:{}/?{}", scheme, host, addr.port(), auth);
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::warn!("Failed to register SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_debug_assert() {
        // Verify the CLI structure is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_subcommand_defaults_to_start() {
        let cli = Cli::try_parse_from(["filelite"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_start_command() {
        let cli = Cli::try_parse_from(["filelite", "start"]).unwrap();
        match cli.command {
            Some(Commands::Start { port, no_auth }) => {
                assert!(port.is_none());
                assert!(!no_auth);
            }
            _ => panic!("Expected Start command"),
        }
    }

    #[test]
    fn test_start_with_overrides() {
        let cli = Cli::try_parse_from(["filelite", "start", "-p", "8080", "--no-auth"]).unwrap();
        match cli.command {
            Some(Commands::Start { port, no_auth }) => {
                assert_eq!(port, Some(8080));
                assert!(no_auth);
            }
            _ => panic!("Expected Start command"),
        }
    }

    #[test]
    fn test_init_force() {
        let cli = Cli::try_parse_from(["filelite", "init", "--force"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Init { force: true })));
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from([
            "filelite",
            "-v",
            "-c",
            "/etc/filelite/config.json",
            "--data-dir",
            "/var/lib/filelite",
            "start",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/filelite/config.json")));
        assert_eq!(cli.data_dir, Some(PathBuf::from("/var/lib/filelite")));
    }

    #[test]
    fn test_invalid_command_fails() {
        let result = Cli::try_parse_from(["filelite", "invalid"]);
        assert!(result.is_err());
    }
}
