//! Lineage CLI
//!
//! Command-line tools for inspecting Lineage dumps.
//!
//! # Commands
//!
//! - `scenario` - Run the device walk-through and optionally save a dump
//! - `as-of` - Show the version of an entity valid at an instant
//! - `history` - List every retained version of an entity
//! - `snapshot` - Show every entity of a tenant at an instant
//! - `verify` - Check the integrity of a dump

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Lineage command-line tools.
#[derive(Parser)]
#[command(name = "lineage")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a dump file
    #[arg(global = true, short, long)]
    dump: Option<PathBuf>,

    /// Path to an engine configuration (JSON)
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the device walk-through
    Scenario {
        /// Write the resulting store to this dump file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Show the version valid at an instant
    AsOf {
        /// Tenant key
        #[arg(short, long)]
        tenant: String,

        /// Entity kind
        #[arg(short, long, default_value = "device")]
        kind: String,

        /// Entity key
        #[arg(short, long)]
        entity: String,

        /// Instant (milliseconds or RFC 3339); current version if omitted
        #[arg(short, long)]
        at: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List every retained version of an entity
    History {
        /// Tenant key
        #[arg(short, long)]
        tenant: String,

        /// Entity kind
        #[arg(short, long, default_value = "device")]
        kind: String,

        /// Entity key
        #[arg(short, long)]
        entity: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show every entity of a tenant at an instant
    Snapshot {
        /// Tenant key
        #[arg(short, long)]
        tenant: String,

        /// Comma-separated kinds; every kind in the dump if omitted
        #[arg(short, long)]
        kinds: Option<String>,

        /// Instant (milliseconds or RFC 3339); current versions if omitted
        #[arg(short, long)]
        at: Option<String>,
    },

    /// Verify the integrity of a dump
    Verify {
        /// Only verify this tenant
        #[arg(short, long)]
        tenant: Option<String>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Scenario { out } => {
            commands::scenario::run(config, out.as_deref())?;
        }
        Commands::AsOf {
            tenant,
            kind,
            entity,
            at,
            format,
        } => {
            let dump = cli.dump.ok_or("Dump path required for as-of")?;
            commands::as_of::run(&dump, config, &tenant, &kind, &entity, at.as_deref(), &format)?;
        }
        Commands::History {
            tenant,
            kind,
            entity,
            format,
        } => {
            let dump = cli.dump.ok_or("Dump path required for history")?;
            commands::history::run(&dump, config, &tenant, &kind, &entity, &format)?;
        }
        Commands::Snapshot { tenant, kinds, at } => {
            let dump = cli.dump.ok_or("Dump path required for snapshot")?;
            commands::snapshot::run(&dump, config, &tenant, kinds.as_deref(), at.as_deref())?;
        }
        Commands::Verify { tenant } => {
            let dump = cli.dump.ok_or("Dump path required for verify")?;
            commands::verify::run(&dump, config, tenant.as_deref())?;
        }
        Commands::Version => {
            println!("Lineage CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Lineage Core v{}", lineage_core::VERSION);
        }
    }

    Ok(())
}
