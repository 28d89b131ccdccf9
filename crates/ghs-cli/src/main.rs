use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ghs_store::ProfileStore;
use ghs_sync::SyncConfig;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ghs")]
#[command(about = "GitHub hiring scout command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Discover contributors for the configured targets and persist new profiles.
    Run,
    /// List saved profiles whose language set contains LANG (case-sensitive).
    FindLanguage { lang: String },
    /// List saved profiles whose location contains TERM (case-insensitive).
    FindLocation { term: String },
    /// Export the profile table to CSV.
    Export {
        /// Output path; defaults to the configured CSV path.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the API's current core rate-limit numbers.
    RateLimit,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let summary = ghs_sync::run_once_from_env().await?;
            println!(
                "run complete: targets={} discovered={} new={} saved={} exported={}",
                summary.targets,
                summary.discovered,
                summary.new_logins,
                summary.saved,
                summary
                    .exported_rows
                    .map(|rows| rows.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            );
        }
        Commands::FindLanguage { lang } => {
            let store = open_store().await?;
            for hit in store.find_by_language(&lang).await? {
                println!(
                    "{}\t{}\t{}",
                    hit.name.as_deref().unwrap_or("-"),
                    hit.html_url,
                    hit.bio.as_deref().unwrap_or(""),
                );
            }
        }
        Commands::FindLocation { term } => {
            let store = open_store().await?;
            for hit in store.find_by_location(&term).await? {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    hit.login,
                    hit.name.as_deref().unwrap_or("-"),
                    hit.location,
                    hit.followers,
                    hit.languages.join(","),
                );
            }
        }
        Commands::Export { out } => {
            let config = SyncConfig::from_env();
            let path = out.unwrap_or(config.csv_path);
            let store = open_store().await?;
            let rows = store.export_csv(&path).await?;
            println!("exported {rows} rows to {}", path.display());
        }
        Commands::RateLimit => {
            let config = SyncConfig::from_env();
            let forge = ghs_sync::forge_from_config(&config)?;
            let core = forge.rate_limit().await?;
            let reset = chrono::DateTime::from_timestamp(core.reset, 0)
                .map(|ts| ts.to_rfc3339())
                .unwrap_or_else(|| core.reset.to_string());
            println!(
                "limit={} remaining={} used={} resets_at={}",
                core.limit, core.remaining, core.used, reset
            );
        }
    }

    Ok(())
}

async fn open_store() -> Result<ProfileStore> {
    let config = SyncConfig::from_env();
    ProfileStore::initialize_if_missing(&config.db_path).await?;
    Ok(ProfileStore::open(&config.db_path).await?)
}
