mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ocmap",
    about = "Geocode the address backlog and refresh each operating unit's map layer",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .ocmap/)
    #[arg(long, global = true, env = "OCMAP_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .ocmap/, a default config and the record store
    Init,

    /// Run the whole pipeline: precondition, geocoding, artifacts, layers
    Run,

    /// Resolve one address and print the outcome (nothing is stored)
    Geocode { address: String },

    /// Geocode every outstanding address in the record store
    Backlog {
        /// Only print how many addresses are outstanding
        #[arg(long)]
        count: bool,
    },

    /// Replace map layers for the configured operating units
    Layers {
        /// Restrict to these unit ids (repeatable)
        #[arg(long = "oc", value_name = "ID")]
        units: Vec<String>,
    },

    /// Print the layer name a unit gets for a run date
    LayerName {
        oc: String,
        /// Run date, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<chrono::NaiveDate>,
    },

    /// Inspect and validate the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run | Commands::Layers { .. } | Commands::Backlog { count: false } => {
            tracing::Level::INFO
        }
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Run => cmd::run::run(&root, cli.json),
        Commands::Geocode { address } => cmd::geocode::run(&root, &address, cli.json),
        Commands::Backlog { count } => cmd::backlog::run(&root, count, cli.json),
        Commands::Layers { units } => cmd::layers::run(&root, &units, cli.json),
        Commands::LayerName { oc, date } => cmd::layer_name::run(&oc, date, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
