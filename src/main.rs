//! # Project Populate CLI (`pop`)
//!
//! ## Usage
//!
//! ```bash
//! pop --config ./config/pop.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pop init` | Create the SQLite store and run schema migrations |
//! | `pop sources` | List sources, their directives and supported fields |
//! | `pop validate` | Parse and validate instructions without network access |
//! | `pop populate` | Assemble every project and write the batch to the store |
//! | `pop get <id>` | Print a stored project record |
//! | `pop list` | List the project ids in the configured collection |
//!
//! ## Examples
//!
//! ```bash
//! # Assemble everything, keep a copy of what upstream returned
//! pop populate --instructions ./projects.json --network-dump ./network.json
//!
//! # Re-run a single project without touching the store
//! pop populate --only my-tool --dry-run --dump -
//! ```
//!
//! Logs go to stderr; set `RUST_LOG` (e.g. `RUST_LOG=project_populate=debug`)
//! to see raw source payloads.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use project_populate::populate::{self, PopulateOptions};
use project_populate::{config, get, migrate, sources};

/// Populate a project document store from code hosts, package registries
/// and literal instructions.
#[derive(Parser)]
#[command(
    name = "pop",
    about = "Populate project records from GitHub, npm and literal instructions",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pop.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the store schema. Safe to run repeatedly.
    Init,

    /// List registered sources, their directives and supported fields.
    Sources,

    /// Parse and validate instructions without contacting any source.
    Validate {
        /// Instruction file (defaults to `populate.instructions`).
        #[arg(long)]
        instructions: Option<PathBuf>,

        /// Only validate these project ids.
        #[arg(long)]
        only: Vec<String>,
    },

    /// Assemble every project and write the batch to the store.
    ///
    /// If any project fails to assemble, nothing is written.
    Populate {
        /// Instruction file (defaults to `populate.instructions`).
        #[arg(long)]
        instructions: Option<PathBuf>,

        /// Only populate these project ids.
        #[arg(long)]
        only: Vec<String>,

        /// Assemble but do not write to the store.
        #[arg(long)]
        dry_run: bool,

        /// Write assembled records to this file (`-` for stdout).
        #[arg(long)]
        dump: Option<PathBuf>,

        /// Write raw source payloads to this file (`-` for stdout).
        #[arg(long)]
        network_dump: Option<PathBuf>,
    },

    /// Print a stored project record as JSON.
    Get {
        /// Project id.
        id: String,
    },

    /// List stored project ids.
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "project_populate=info,pop=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Validate { instructions, only } => {
            populate::run_validate(&cfg, instructions, &only).await?;
        }
        Commands::Populate {
            instructions,
            only,
            dry_run,
            dump,
            network_dump,
        } => {
            populate::run_populate(
                &cfg,
                PopulateOptions {
                    instructions,
                    only,
                    dry_run,
                    dump,
                    network_dump,
                },
            )
            .await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, &id).await?;
        }
        Commands::List => {
            get::run_list(&cfg).await?;
        }
    }

    Ok(())
}
