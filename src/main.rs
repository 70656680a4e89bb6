use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use patchdb::store::schema;
use patchdb::{export_database, OpenMode, PatchDatabase, PatchFilter};

#[derive(Parser)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about = "Maintenance tool for synthesizer patch catalogs", long_about = None)]
struct Cli {
    /// Catalog file to operate on (defaults to the per-user catalog)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show schema version and patch count
    Info,

    /// List category definitions and their bit indexes
    Categories,

    /// List import batches of a synth
    Imports {
        /// Synth name as stored in the catalog
        synth: String,
    },

    /// List stored patch lists
    Lists,

    /// Take an online backup of the catalog into a file
    Backup {
        /// Destination file, replaced if it exists
        dest: PathBuf,
    },

    /// Copy any catalog file into a destination without opening it for
    /// writing
    Export {
        /// Source catalog file
        source: PathBuf,
        /// Destination file
        dest: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if let Commands::Export { source, dest } = &cli.command {
        export_database(source, dest)
            .with_context(|| format!("Failed to export {}", source.display()))?;
        println!("Exported {} to {}", source.display(), dest.display());
        return Ok(());
    }

    let db = open_catalog(&cli)?;
    match cli.command {
        Commands::Info => {
            println!("Catalog:        {}", db.path().display());
            println!("Schema version: {}", schema::SCHEMA_VERSION);
            println!("Patches:        {}", db.count(&PatchFilter::all_patches(Vec::new())));
            println!("Lists:          {}", db.all_lists().len());
        }
        Commands::Categories => {
            for def in db.get_categories() {
                println!(
                    "{:>3}  {:<20} {}  {}",
                    def.bit_index,
                    def.name,
                    def.color,
                    if def.active { "active" } else { "inactive" }
                );
            }
        }
        Commands::Imports { synth } => {
            let imports = db.imports_for_synth(&synth);
            if imports.is_empty() {
                println!("No imports recorded for {}", synth);
            }
            for import in imports {
                println!("{}  {}", import.id, import.description);
            }
        }
        Commands::Lists => {
            for list in db.all_lists() {
                println!("{}  {}", list.id, list.name);
            }
        }
        Commands::Backup { dest } => {
            db.backup_to(&dest)
                .with_context(|| format!("Failed to back up into {}", dest.display()))?;
            println!("Backup written to {}", dest.display());
        }
        Commands::Export { .. } => unreachable!("handled above"),
    }

    Ok(())
}

fn open_catalog(cli: &Cli) -> Result<PatchDatabase> {
    // Maintenance commands must not leave backup files behind.
    match &cli.db {
        Some(path) => PatchDatabase::open(path, OpenMode::ReadWriteNoBackups)
            .with_context(|| format!("Failed to open catalog {}", path.display())),
        None => {
            let path = patchdb::paths::default_database_location()
                .context("Could not determine the default catalog location")?;
            PatchDatabase::open(&path, OpenMode::ReadWriteNoBackups)
                .with_context(|| format!("Failed to open catalog {}", path.display()))
        }
    }
}
