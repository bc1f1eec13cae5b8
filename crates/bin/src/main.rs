//! Command-line driver for the Sundsvall company-data engine.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use sundsvall::{Config, Engine, SyncError};
use sundsvall_model::normalize_orgnr;

#[derive(Parser)]
#[command(name = "sundsvall", version, about = "Swedish company-data ingestion engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch (or refresh) one company and print the canonical record.
    Fetch {
        /// Organization number, with or without hyphen.
        orgnr: String,
        /// Bypass the cache and re-fetch from every source.
        #[arg(long)]
        force: bool,
    },
    /// Enrich a batch of companies.
    Batch {
        /// File with one orgnr per line.
        file: PathBuf,
        /// Parallel workers.
        #[arg(long)]
        workers: Option<usize>,
        /// Bypass the cache.
        #[arg(long)]
        force: bool,
    },
    /// Search companies by name or orgnr.
    Search {
        /// Free-text query.
        query: String,
        /// Maximum results.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Sync annual reports (XBRL) for one company.
    SyncReports {
        /// Organization number.
        orgnr: String,
        /// How many years back to sync.
        #[arg(long, default_value_t = 5)]
        years: i32,
        /// Re-process reports already stored as processed.
        #[arg(long)]
        force: bool,
    },
    /// Sync annual reports for every tracked company.
    SyncAll {
        /// How many years back to sync.
        #[arg(long, default_value_t = 3)]
        years: i32,
    },
    /// Show store statistics and circuit-breaker status.
    Status,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "command failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), SyncError> {
    let config = Config::from_env();
    if let Some(parent) = config.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).ok();
        }
    }
    let engine = Arc::new(Engine::from_config(config)?);

    match cli.command {
        Command::Fetch { orgnr, force } => {
            match engine.orchestrator().get_company(&orgnr, force).await? {
                Some(record) => {
                    println!("{}", serde_json::to_string_pretty(&record).unwrap_or_default());
                    if record.from_cache {
                        eprintln!("(served from cache)");
                    }
                }
                None => eprintln!("No data found for {}", normalize_orgnr(&orgnr)),
            }
        }

        Command::Batch {
            file,
            workers,
            force,
        } => {
            let orgnrs: Vec<String> = std::fs::read_to_string(&file)
                .map_err(|e| SyncError::Config(format!("cannot read {}: {e}", file.display())))?
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(normalize_orgnr)
                .collect();
            if orgnrs.is_empty() {
                eprintln!("No orgnrs in {}", file.display());
                return Ok(());
            }

            let workers = workers.unwrap_or(engine.config().batch_parallel_workers);
            let bar = ProgressBar::new(orgnrs.len() as u64);
            bar.set_style(
                ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );

            let bar_clone = bar.clone();
            let results = engine
                .orchestrator()
                .enrich_batch(&orgnrs, workers, force, Some(&move |_done, _total, orgnr| {
                    bar_clone.set_message(orgnr.to_string());
                    bar_clone.inc(1);
                }))
                .await;
            bar.finish();

            let ok = results.values().filter(|v| v.is_some()).count();
            println!("Enriched {ok}/{} companies", results.len());
        }

        Command::Search { query, limit } => {
            let hits = engine.search(&query, limit).await?;
            if hits.is_empty() {
                println!("No results");
            }
            for hit in hits {
                println!(
                    "{}  {}  {}  [{}]",
                    hit.orgnr,
                    hit.name.as_deref().unwrap_or("-"),
                    hit.city.as_deref().unwrap_or("-"),
                    hit.source
                );
            }
        }

        Command::SyncReports {
            orgnr,
            years,
            force,
        } => {
            let report = engine.report_sync().sync_company(&orgnr, years, force).await;
            println!(
                "{}: {} found, {} processed, {} failed",
                report.orgnr, report.reports_found, report.reports_processed, report.reports_failed
            );
            for error in &report.errors {
                eprintln!("  error: {error}");
            }
        }

        Command::SyncAll { years } => {
            let report = engine.report_sync().sync_all_tracked_companies(years).await?;
            println!(
                "{} companies, {} batches: {} reports found, {} processed, {} failed",
                report.total_companies,
                report.batches_completed,
                report.total_reports_found,
                report.total_reports_processed,
                report.total_reports_failed
            );
            for error in report.errors.iter().take(10) {
                eprintln!("  error: {error}");
            }
        }

        Command::Status => {
            let stats = engine.store().stats()?;
            println!(
                "companies: {}  roles: {}  financial periods: {}",
                stats.companies, stats.roles, stats.financial_periods
            );
            println!(
                "annual reports: {}  xbrl facts: {}  registry entries: {}",
                stats.annual_reports, stats.xbrl_facts, stats.registry_entries
            );
            let (total, processed, failed) = engine.store().report_processing_stats()?;
            println!("report processing: {total} total, {processed} processed, {failed} failed");

            for circuit in engine.circuit_status() {
                println!(
                    "circuit {}: {} ({} ok / {} failed / {} rejected)",
                    circuit.name,
                    circuit.state.as_str(),
                    circuit.successful_requests,
                    circuit.failed_requests,
                    circuit.rejected_requests
                );
            }
        }
    }

    Ok(())
}
