//! The `vast` binary: a single-node wrapper over the ARCHIVE/INDEX/
//! IMPORTER/EXPORTER actor graph, enough to import and query events from a
//! shell without embedding the crate.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use vast_common::config::Config;

mod commands;
mod schema_file;

#[derive(Parser)]
#[command(name = "vast", about = "single-node bitmap-indexed event store")]
struct Cli {
    /// TOML config file; falls back to built-in defaults.
    #[arg(long, global = true, env = "VAST_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides the config's on-disk root.
    #[arg(long, global = true, env = "VAST_ROOT")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Import(ImportArgs),
    Export(ExportArgs),
    Peer(PeerArgs),
    /// Reports this node's on-disk archive/index footprint.
    Status,
}

#[derive(Args)]
struct ImportArgs {
    #[command(subcommand)]
    format: ImportFormat,
}

#[derive(Subcommand)]
enum ImportFormat {
    /// Generates deterministic test events from a schema file.
    Test {
        schema: PathBuf,
        #[arg(long, default_value_t = 100)]
        count: usize,
    },
    /// Imports line-delimited JSON events read against a schema file.
    Json { schema: PathBuf, file: PathBuf },
}

#[derive(Args)]
struct ExportArgs {
    #[command(subcommand)]
    format: ExportFormat,
}

#[derive(Subcommand)]
enum ExportFormat {
    /// Prints every match as one JSON array.
    Json { schema: PathBuf, query: String },
    /// Prints one JSON object per match, as it's found.
    Line { schema: PathBuf, query: String },
}

#[derive(Args)]
struct PeerArgs {
    #[command(subcommand)]
    action: PeerAction,
}

#[derive(Subcommand)]
enum PeerAction {
    /// Alias for `status`; single-node builds have no other peers to show.
    Show,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    vast_common::logging::init();

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            tracing::error!(error = %err, "vast command failed");
            eprintln!("error: {err}");
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> vast_common::Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(root) = cli.root {
        config.root = root;
    }
    config.validate()?;

    match cli.command {
        Command::Import(args) => match args.format {
            ImportFormat::Test { schema, count } => {
                commands::import_test(&schema, count, &config).await
            }
            ImportFormat::Json { schema, file } => {
                commands::import_json(&schema, &file, &config).await
            }
        },
        Command::Export(args) => match args.format {
            ExportFormat::Json { schema, query } => {
                commands::export_json(&schema, &query, &config).await
            }
            ExportFormat::Line { schema, query } => {
                commands::export_line(&schema, &query, &config).await
            }
        },
        Command::Peer(args) => match args.action {
            PeerAction::Show => commands::status(&config).await,
        },
        Command::Status => commands::status(&config).await,
    }
}
