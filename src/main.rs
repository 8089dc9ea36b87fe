mod config;
mod crm;
mod db;
mod experience;
mod filters;
mod models;
mod pipeline;
mod scrapers;
mod sync;
#[cfg(test)]
mod testing;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::{FilterConfig, Settings};
use crm::EspoClient;
use db::{Database, PostingStore};
use pipeline::{Pipeline, RunAborted, RunStats};
use scrapers::ScraperRegistry;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "leadpipe")]
#[command(about = "Scrape job postings, filter them, and sync new leads into EspoCRM")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Scrape sources and sync new postings
    Run {
        /// Comma-separated sources
        #[arg(short, long, default_value = "hn_hiring", value_delimiter = ',')]
        sources: Vec<String>,

        /// Store postings but skip the CRM
        #[arg(long)]
        dry_run: bool,

        /// Filter config (JSON)
        #[arg(short, long)]
        filters: Option<PathBuf>,
    },

    /// Show pipeline statistics
    Status,

    /// List postings that have not reached the CRM
    Unsynced,

    /// Show the sync state of one posting
    Show {
        /// Source name (hn_hiring, indeed, wellfound)
        source: String,

        /// Id within the source
        source_id: String,
    },

    /// Try the CRM sync again for every unsynced posting
    Retry {
        /// Show what would be synced without calling the CRM
        #[arg(long)]
        dry_run: bool,
    },

    /// List available sources
    Sources,

    /// Validate a filter config and print it
    Check {
        /// Filter config (JSON)
        #[arg(short, long)]
        filters: PathBuf,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env();

    match cli.command {
        Commands::Init => {
            let db = Database::open(&settings.database_path)?;
            db.init()?;
            println!("Database initialized at {}", db.path().display());
        }

        Commands::Run {
            sources,
            dry_run,
            filters,
        } => {
            let db = Database::open(&settings.database_path)?;
            db.ensure_initialized()?;
            let filter_config = FilterConfig::load(
                filters.as_deref().unwrap_or(settings.filters_path.as_path()),
            )?;
            let crm = EspoClient::new(&settings.espo_url, &settings.espo_user, &settings.espo_pass);
            let registry = ScraperRegistry::from_settings(&settings);

            let sources: Vec<String> = sources
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();

            let result = Pipeline::new(&db, &crm, &filter_config, dry_run).run(&sources, &registry);
            report_run(result, dry_run)?;
        }

        Commands::Status => {
            let db = Database::open(&settings.database_path)?;
            db.ensure_initialized()?;
            let stats = db.stats()?;
            println!("{:<12} {:>8}", "METRIC", "VALUE");
            println!("{}", "-".repeat(21));
            println!("{:<12} {:>8}", "Total", stats.total);
            println!("{:<12} {:>8}", "Synced", stats.synced);
            println!("{:<12} {:>8}", "Pending", stats.pending);
        }

        Commands::Unsynced => {
            let db = Database::open(&settings.database_path)?;
            db.ensure_initialized()?;
            let records = db.list_unsynced()?;
            if records.is_empty() {
                println!("Everything is synced.");
            } else {
                println!("{:<10} {:<12} {:<25} {:<30} {:<16}", "SOURCE", "ID", "COMPANY", "TITLE", "SCRAPED");
                println!("{}", "-".repeat(97));
                for record in records {
                    println!(
                        "{:<10} {:<12} {:<25} {:<30} {:<16}",
                        truncate(&record.source, 10),
                        truncate(&record.source_id, 12),
                        truncate(&record.company_name, 23),
                        truncate(&record.title, 28),
                        record.scraped_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }

        Commands::Show { source, source_id } => {
            let db = Database::open(&settings.database_path)?;
            db.ensure_initialized()?;
            match db.get_record(&source, &source_id)? {
                Some(record) => {
                    println!("{} at {}", record.title, record.company_name);
                    println!("Source: {} #{}", record.source, record.source_id);
                    println!("URL: {}", record.source_url);
                    println!("Scraped: {}", record.scraped_at.format("%Y-%m-%d %H:%M"));
                    if record.is_synced() {
                        if let Some(synced_at) = record.synced_at {
                            println!("Synced: {}", synced_at.format("%Y-%m-%d %H:%M"));
                        }
                        println!("Account: {}", record.account_id.as_deref().unwrap_or("-"));
                        println!("Opportunity: {}", record.opportunity_id.as_deref().unwrap_or("-"));
                    } else {
                        println!("Synced: no");
                    }
                }
                None => {
                    println!("Posting {}/{} not found.", source, source_id);
                }
            }
        }

        Commands::Retry { dry_run } => {
            let db = Database::open(&settings.database_path)?;
            db.ensure_initialized()?;
            let crm = EspoClient::new(&settings.espo_url, &settings.espo_user, &settings.espo_pass);
            report_run(pipeline::retry_unsynced(&db, &crm, dry_run), dry_run)?;
        }

        Commands::Sources => {
            let registry = ScraperRegistry::from_settings(&settings);
            for name in registry.names() {
                println!("{}", name);
            }
        }

        Commands::Check { filters } => {
            let config = FilterConfig::load(&filters)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

/// Counts are printed even when the run was cut short.
fn report_run(result: Result<RunStats, RunAborted>, dry_run: bool) -> Result<()> {
    match result {
        Ok(stats) => {
            print_run_stats(&stats, dry_run);
            Ok(())
        }
        Err(aborted) => {
            print_run_stats(&aborted.stats, dry_run);
            Err(aborted.into())
        }
    }
}

fn print_run_stats(stats: &RunStats, dry_run: bool) {
    println!("\nResults:");
    if dry_run {
        println!("  Would sync:        {}", stats.synced);
    } else {
        println!("  Synced:            {}", stats.synced);
        println!("  Failed:            {}", stats.failed);
    }
    println!("  Skipped duplicate: {}", stats.skipped_duplicate);
    println!("  Skipped filtered:  {}", stats.skipped_filtered);
    if !stats.failed_sources.is_empty() {
        println!("  Failed sources:    {}", stats.failed_sources.join(", "));
    }

    if dry_run {
        println!("\n(Dry run - nothing was sent to the CRM)");
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
