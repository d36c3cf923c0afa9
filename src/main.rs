//! mvcroute - MVC request router
//!
//! Entry point for the mvcroute binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mvcroute::cli::{self, ConfigCommand};
use mvcroute::server::{self, Server};

/// mvcroute - MVC request routing and URL reversal
#[derive(Parser)]
#[command(name = "mvcroute")]
#[command(author = "mvcroute Team")]
#[command(version = mvcroute::VERSION)]
#[command(about = "MVC request routing and URL reversal engine", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/mvcroute/mvcroute.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve,
    /// Route a path and print the outcome as JSON
    Match {
        /// Request path, e.g. /products/5
        path: String,

        /// Raw query string
        #[arg(short, long)]
        query: Option<String>,

        /// Host header value
        #[arg(long)]
        host: Option<String>,
    },
    /// Build a URL for a route name or Controller:Action
    Url {
        /// Route name or Controller:Action
        name: String,

        /// Params as key=value (key[]=value for lists)
        params: Vec<String>,

        /// Prefix scheme and host
        #[arg(short, long)]
        absolute: bool,

        /// Host used for absolute URLs
        #[arg(long)]
        host: Option<String>,
    },
    /// List routes in match order
    Routes,
    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("mvcroute={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Some(Commands::Serve) | None => {
            start_server(&cli.config)?;
        }
        Some(Commands::Match { path, query, host }) => {
            let config = cli::load_config(&cli.config)?;
            let value = cli::match_path(&config, &path, query.as_deref(), host.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Some(Commands::Url {
            name,
            params,
            absolute,
            host,
        }) => {
            let config = cli::load_config(&cli.config)?;
            println!(
                "{}",
                cli::build_url(&config, &name, &params, absolute, host.as_deref())?
            );
        }
        Some(Commands::Routes) => {
            let config = cli::load_config(&cli.config)?;
            print!("{}", cli::list_routes(&config)?);
        }
        Some(Commands::Config { command }) => {
            cli::handle_config_command(&cli.config, command)?;
        }
    }

    Ok(())
}

fn start_server(config_path: &PathBuf) -> anyhow::Result<()> {
    info!("mvcroute v{} starting...", mvcroute::VERSION);

    let config = cli::load_config(config_path)?;
    let reload_path = config_path.exists().then(|| config_path.clone());

    info!(
        "Server configured to listen on {} with {} routes",
        config.server.listen,
        config.routes.len()
    );

    let runtime = server::build_runtime(&config)?;
    let server = Server::new(config, reload_path)?;

    info!("Starting HTTP server...");
    runtime.block_on(async { server.run().await })?;

    Ok(())
}
