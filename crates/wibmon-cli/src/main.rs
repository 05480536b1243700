//! CLI for wibmon: WIB fleet status poller and dashboard.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "wibmon")]
#[command(about = "wibmon: poll the WIB fleet and publish a status dashboard")]
#[command(version = wibmon_core::VERSION)]
struct Cli {
    /// JSON config file (defaults to the built-in NP04 fleet)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the fleet forever, rebuilding the dashboard after every cycle
    Run {
        /// Seconds between cycles
        #[arg(long)]
        interval: Option<u64>,

        /// Output directory for pages and the dashboard
        #[arg(long)]
        output: Option<String>,

        /// Control tool executable
        #[arg(long)]
        tool: Option<String>,
    },

    /// Run a single poll cycle and exit
    Once {
        /// Output directory for pages and the dashboard
        #[arg(long)]
        output: Option<String>,

        /// Control tool executable
        #[arg(long)]
        tool: Option<String>,
    },

    /// Print the canonical name and zone of board addresses
    Resolve {
        /// Canonical names or bench subnet addresses
        #[arg(required = true)]
        addresses: Vec<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Scrape a saved status report and print its register tables as JSON
    Scrape {
        /// Status report HTML file
        file: String,

        /// Comma-separated table names (defaults to the tables the metrics use)
        #[arg(long)]
        tables: Option<String>,

        /// Print the reduced dashboard metrics instead of the raw tables
        #[arg(long)]
        metrics: bool,
    },

    /// Serve the rendered dashboard over HTTP
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Directory the poller writes to
        #[arg(long)]
        output: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Run {
            interval,
            output,
            tool,
        } => {
            let overrides = commands::Overrides {
                interval,
                output,
                tool,
            };
            commands::run::run(&commands::load_config(config_path, &overrides))
        }
        Commands::Once { output, tool } => {
            let overrides = commands::Overrides {
                interval: None,
                output,
                tool,
            };
            commands::once::run(&commands::load_config(config_path, &overrides))
        }
        Commands::Resolve { addresses, json } => commands::resolve::run(&addresses, json),
        Commands::Scrape {
            file,
            tables,
            metrics,
        } => {
            let config = commands::load_config(config_path, &commands::Overrides::default());
            commands::scrape::run(&config, &file, tables.as_deref(), metrics)
        }
        Commands::Serve { port, host, output } => {
            let overrides = commands::Overrides {
                interval: None,
                output,
                tool: None,
            };
            let config = commands::load_config(config_path, &overrides);
            commands::serve::run(&config, &host, port)
        }
    }
}
