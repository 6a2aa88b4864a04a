//! termhost
//!
//! PTY session host for terminal display surfaces.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use host::bridge::Bridge;
use host::config::{default_config_path, Config, LogConfig};
use host::session::SessionManager;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// termhost - PTY session host for terminal display surfaces.
#[derive(Parser, Debug)]
#[command(name = "termhost")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Serve sessions over stdin/stdout (JSON lines)
    Serve,

    /// Print the effective configuration
    Config {
        /// Write it to the config file instead (`--config` or the default path)
        #[arg(long)]
        write: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let _guard = init_logging(&config.log, cli.verbose)?;
    tracing::debug!(config = ?config, "Configuration loaded");

    match cli.command {
        Commands::Serve => {
            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            let result = runtime.block_on(serve(config));
            // A pending stdin read cannot be cancelled; don't wait on it.
            runtime.shutdown_timeout(Duration::from_millis(100));
            result
        }
        Commands::Config { write } => {
            print!("{}", config_command(&config, cli.config.as_deref(), write)?);
            Ok(())
        }
    }
}

/// Runs `termhost config`, returning what to print.
///
/// With `write`, saves the effective configuration and reports where.
fn config_command(config: &Config, path: Option<&Path>, write: bool) -> anyhow::Result<String> {
    if !write {
        return config.to_toml();
    }

    let path = path.map_or_else(default_config_path, Path::to_path_buf);
    config.save(&path)?;
    Ok(format!("Configuration written to {}\n", path.display()))
}

/// Loads the configuration file, applies environment overrides and
/// validates the result.
fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    config.apply_env_overrides();
    config.validate().context("Invalid configuration")?;

    Ok(config)
}

/// Initializes tracing. Stdout carries the bridge protocol, so logs go to
/// stderr and optionally to a daily-rotated file.
fn init_logging(log: &LogConfig, verbose: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let level = if verbose { "debug" } else { log.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    let Some(path) = &log.file else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
        return Ok(None);
    };

    let file_name = path
        .file_name()
        .with_context(|| format!("Log file path has no file name: {}", path.display()))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let appender = tracing_appender::rolling::daily(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();

    Ok(Some(guard))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    tracing::info!("termhost starting");

    let (manager, events) = SessionManager::new(config.session);
    Bridge::new(manager, events)
        .run_until(
            tokio::io::stdin(),
            tokio::io::stdout(),
            wait_for_shutdown_signal(),
        )
        .await?;

    tracing::info!("termhost stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("Failed to register SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
}

/// Wait for Ctrl-C.
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Received Ctrl-C");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_command() {
        let cli = Cli::try_parse_from(["termhost", "serve"]).unwrap();
        assert_eq!(cli.command, Commands::Serve);
        assert!(!cli.verbose);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["termhost", "config", "-v", "--config", "/tmp/t.toml"]).unwrap();
        assert_eq!(cli.command, Commands::Config { write: false });
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/t.toml")));
    }

    #[test]
    fn test_config_write_flag() {
        let cli = Cli::try_parse_from(["termhost", "config", "--write"]).unwrap();
        assert_eq!(cli.command, Commands::Config { write: true });
    }

    #[test]
    fn test_config_command_prints_toml() {
        let config = Config::default();
        let output = config_command(&config, None, false).unwrap();
        assert_eq!(Config::from_toml(&output).unwrap(), config);
    }

    #[test]
    fn test_config_command_writes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.session.term = "xterm".to_string();

        let output = config_command(&config, Some(&path), true).unwrap();
        assert!(output.contains(&path.display().to_string()));
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_subcommand_rejected() {
        assert!(Cli::try_parse_from(["termhost"]).is_err());
    }

    #[test]
    #[serial]
    fn test_load_config_rejects_invalid_values() {
        std::env::remove_var("TERMHOST_LOG_LEVEL");
        std::env::remove_var("TERMHOST_SHELL");

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[log]\nlevel = \"loud\"\n").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(format!("{:#}", err).contains("loud"), "got: {:#}", err);
    }

    #[test]
    #[serial]
    fn test_load_config_env_override_applied() {
        std::env::set_var("TERMHOST_SHELL", "/bin/sh");

        let dir = TempDir::new().unwrap();
        let config = load_config(Some(&dir.path().join("missing.toml"))).unwrap();
        assert_eq!(config.session.shell.as_deref(), Some("/bin/sh"));

        std::env::remove_var("TERMHOST_SHELL");
    }
}
