//! Airspace CLI - OpenSky state vectors through Kafka into a local store.

use airspace_core::config::LogFormat;
use airspace_core::Config;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit codes for CLI operations.
///
/// Following Unix conventions:
/// - 0: Success
/// - 1-127: Application errors
/// - 128+N: Signal N received (e.g., 130 = SIGINT)
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// Invalid config file, environment or overrides
    ConfigError = 1,
    /// Broker connection, publish or topic admin failure
    KafkaError = 2,
    /// Store could not be opened or written
    StoreError = 3,
    /// Token could not be acquired
    AuthError = 4,
    /// State-vector API failure
    ApiError = 5,
    /// General runtime error
    RuntimeError = 10,
    /// Signal interrupt (SIGINT = 2, so 128 + 2 = 130)
    SignalInterrupt = 130,
}

impl ExitCode {
    /// Map an error to an exit code by finding the core error in its chain.
    fn from_error(error: &anyhow::Error) -> Self {
        let core = error
            .chain()
            .find_map(|cause| cause.downcast_ref::<airspace_core::Error>());

        match core {
            Some(airspace_core::Error::Config(_)) => ExitCode::ConfigError,
            Some(airspace_core::Error::Kafka(_)) => ExitCode::KafkaError,
            Some(airspace_core::Error::Store(_)) => ExitCode::StoreError,
            Some(airspace_core::Error::Auth(_)) => ExitCode::AuthError,
            Some(airspace_core::Error::Api(_)) => ExitCode::ApiError,
            Some(airspace_core::Error::Shutdown) => ExitCode::SignalInterrupt,
            Some(_) => ExitCode::RuntimeError,
            None if error.chain().any(|c| c.is::<toml::de::Error>()) => ExitCode::ConfigError,
            None => ExitCode::RuntimeError,
        }
    }
}

mod commands;
mod server;

#[derive(Parser)]
#[command(name = "airspace")]
#[command(about = "Aircraft state-vector ingestion pipeline", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "AIRSPACE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the state-vector API and publish records to Kafka
    Produce {
        /// Override Kafka bootstrap servers (comma separated)
        #[arg(long)]
        bootstrap_servers: Option<String>,

        /// Override Kafka topic
        #[arg(long)]
        topic: Option<String>,

        /// Override the poll interval in seconds
        #[arg(long)]
        poll_interval: Option<u64>,
    },

    /// Consume records from Kafka and write them to the store
    Consume {
        /// Override Kafka bootstrap servers (comma separated)
        #[arg(long)]
        bootstrap_servers: Option<String>,

        /// Override Kafka topic
        #[arg(long)]
        topic: Option<String>,

        /// Override consumer group
        #[arg(long)]
        consumer_group: Option<String>,

        /// Override the store file
        #[arg(long)]
        store_path: Option<PathBuf>,
    },

    /// Manage the state-vector topic
    Topic {
        #[command(subcommand)]
        action: TopicAction,
    },

    /// Show status and health of a running process
    Status {
        /// Health endpoint URL; the consumer listens on 8081 by default
        #[arg(long, default_value = "http://localhost:8080")]
        url: String,
    },

    /// Validate configuration
    Validate,
}

#[derive(Subcommand)]
enum TopicAction {
    /// Create the topic if it does not exist
    Init,
}

#[tokio::main]
async fn main() {
    let exit_code = run_cli().await;
    std::process::exit(exit_code as i32);
}

/// Main CLI execution logic with proper error handling.
async fn run_cli() -> ExitCode {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Config is parsed again by the command; here only the log format matters.
    let log_format = cli
        .config
        .as_deref()
        .and_then(|path| std::fs::read_to_string(path).ok())
        .and_then(|content| Config::from_toml_str(&content).ok())
        .map(|config| config.monitoring.log_format)
        .unwrap_or(LogFormat::Json);

    init_logging(cli.verbose, log_format);

    match execute_command(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = format!("{:#}", e), "Command failed");
            ExitCode::from_error(&e)
        }
    }
}

fn init_logging(verbose: u8, log_format: LogFormat) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    match log_format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .init();
        }
    }
}

/// Execute the CLI command.
async fn execute_command(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config.as_deref();

    let outcome = match cli.command {
        Commands::Produce {
            bootstrap_servers,
            topic,
            poll_interval,
        } => {
            let mut config = load_config(config_path)?;
            commands::override_kafka(&mut config, bootstrap_servers, topic, None);
            if let Some(secs) = poll_interval {
                config.opensky.poll_interval_secs = secs;
            }
            commands::produce::run(config).await?
        }

        Commands::Consume {
            bootstrap_servers,
            topic,
            consumer_group,
            store_path,
        } => {
            let mut config = load_config(config_path)?;
            commands::override_kafka(&mut config, bootstrap_servers, topic, consumer_group);
            if let Some(path) = store_path {
                config.store.path = path;
            }
            commands::consume::run(config).await?
        }

        Commands::Topic { action } => {
            let config = load_config(config_path)?;
            match action {
                TopicAction::Init => commands::topic::init(config).await?,
            }
            commands::Outcome::Completed
        }

        Commands::Status { url } => {
            commands::status::run(&url).await?;
            commands::Outcome::Completed
        }

        Commands::Validate => {
            let config = load_config(config_path)?;
            config.validate()?;
            println!("Configuration is valid");
            if config.validate_credentials().is_err() {
                println!("Note: OpenSky client credentials are not set; `produce` will refuse to start");
            }
            commands::Outcome::Completed
        }
    };

    Ok(match outcome {
        commands::Outcome::Completed => ExitCode::Success,
        commands::Outcome::Interrupted => ExitCode::SignalInterrupt,
    })
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = Config::load(path).with_context(|| match path {
        Some(path) => format!("Failed to load config from {}", path.display()),
        None => "Failed to load config from environment".to_string(),
    })?;
    Ok(config)
}
