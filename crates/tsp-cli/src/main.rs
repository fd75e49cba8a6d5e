mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;
use tsp_core::config::DEFAULT_CONFIG_FILE;

#[derive(Parser)]
#[command(
    name = "tsp",
    about = "Transit signal priority: drive controller phase control from priority schedules",
    version,
    propagate_version = true
)]
struct Cli {
    /// Service config file
    #[arg(long, global = true, env = "TSP_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Receive schedules over UDP and drive an in-memory controller
    Run {
        /// Override receiver.bind from the config file
        #[arg(long)]
        bind: Option<String>,
    },

    /// Print the install plan for a schedule document
    Plan {
        /// Schedule JSON file
        file: PathBuf,
    },

    /// Inspect the service configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Derive phase timing for one snapshot from a translation config
    Spat {
        /// Translation config JSON
        translation: PathBuf,
        /// Phase snapshot JSON
        snapshot: PathBuf,
        /// Deciseconds between initialization and the snapshot
        #[arg(long, default_value = "0")]
        elapsed: i64,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Run { bind } => cmd::run::run(&cli.config, bind),
        Commands::Plan { file } => cmd::plan::run(&file, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&cli.config, subcommand, cli.json),
        Commands::Spat {
            translation,
            snapshot,
            elapsed,
        } => cmd::spat::run(&translation, &snapshot, elapsed, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
