use anyhow::Result;
use chapter_import::services::migration::{MigrationOutcome, migrate_legacy_store};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt};

/// Split the legacy chapters.json store into one file per project.
#[derive(Debug, Parser)]
#[command(name = "migrate-chapters", version)]
struct Args {
    /// Directory holding chapters.json
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    match migrate_legacy_store(&args.data_dir)? {
        MigrationOutcome::NoLegacyFile => println!("No chapters.json found, nothing to migrate."),
        MigrationOutcome::AlreadyMigrated => println!("Backup exists, migration already done."),
        MigrationOutcome::Migrated {
            projects,
            chapters,
            skipped,
        } => println!(
            "Migrated {chapters} chapters into {projects} project files ({skipped} skipped)."
        ),
    }
    Ok(())
}
