use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing::warn;

use kindred::config::Config;
use kindred::db::models::RatingFact;
use kindred::pipeline::lock::RunLock;
use kindred::pipeline::{full, incremental, RunReport};

/// Kindred: pairwise similarity engine for a ratings dataset.
///
/// Computes user-user similarity from rating vectors and business-business
/// similarity from category sets, and serves similarity-weighted
/// recommendations from the resulting graph.
#[derive(Parser)]
#[command(name = "kindred", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RunTarget {
    Users,
    Businesses,
    All,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Add a user
    AddUser {
        user_id: String,
        /// Display name (defaults to the id)
        #[arg(long)]
        name: Option<String>,
    },

    /// Add or replace a business and its categories
    AddBusiness {
        business_id: String,
        name: String,
        /// Category label, repeatable
        #[arg(long = "category", value_name = "CATEGORY")]
        categories: Vec<String>,
    },

    /// Record a rating (1.0 to 5.0); a later rating for the same pair wins
    AddRating {
        user_id: String,
        business_id: String,
        rating: f64,
    },

    /// Rebuild similarity edges from scratch
    Recompute {
        #[arg(value_enum)]
        target: RunTarget,

        /// Minimum co-rated businesses per user pair
        #[arg(long)]
        min_common: Option<u32>,

        /// Inclusive edge threshold (0.0 to 1.0)
        #[arg(long)]
        min_similarity: Option<f64>,

        /// Entities per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Concurrent batch workers
        #[arg(long)]
        workers: Option<usize>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rescore only the pairs touching the given entities
    Update {
        #[arg(value_enum)]
        target: RunTarget,

        /// Affected user or business ids
        #[arg(required = true, num_args = 1..)]
        ids: Vec<String>,

        /// Minimum co-rated businesses per user pair
        #[arg(long)]
        min_common: Option<u32>,

        /// Inclusive edge threshold (0.0 to 1.0)
        #[arg(long)]
        min_similarity: Option<f64>,

        /// Entities per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Concurrent batch workers
        #[arg(long)]
        workers: Option<usize>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Recommend businesses in a category for a user
    Recommend {
        user_id: String,
        category: String,

        /// Maximum results
        #[arg(long, default_value = "10")]
        limit: u32,
    },

    /// Show dataset and similarity graph status
    Status {
        /// Print the stats as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("kindred=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Init => {
            let store = kindred::db::initialize(&config.db_path)?;
            let table_count = store.table_count().await?;
            println!("Database initialized at: {}", config.db_path);
            println!("Tables created: {table_count}");
            println!("\nNext: load ratings with `kindred add-rating`, then");
            println!("run `kindred recompute users` to build the similarity graph.");
        }

        Commands::AddUser { user_id, name } => {
            let store = kindred::db::open(&config.db_path)?;
            let name = name.unwrap_or_else(|| user_id.clone());
            store.add_user(&user_id, &name).await?;
            println!("User {user_id} saved.");
        }

        Commands::AddBusiness {
            business_id,
            name,
            categories,
        } => {
            let store = kindred::db::open(&config.db_path)?;
            store.add_business(&business_id, &name, &categories).await?;
            println!(
                "Business {business_id} saved with {} categories.",
                categories.len()
            );
            if !categories.is_empty() {
                println!(
                    "{}",
                    format!("Run `kindred update businesses {business_id}` to refresh its edges.")
                        .dimmed()
                );
            }
        }

        Commands::AddRating {
            user_id,
            business_id,
            rating,
        } => {
            let store = kindred::db::open(&config.db_path)?;
            store
                .upsert_rating(&RatingFact {
                    user_id: user_id.clone(),
                    business_id: business_id.clone(),
                    rating,
                    rated_at: chrono::Utc::now().timestamp_millis(),
                })
                .await?;
            println!("Rating saved: {user_id} -> {business_id} = {rating}");
            println!(
                "{}",
                format!("Run `kindred update users {user_id}` to refresh their edges.").dimmed()
            );
        }

        Commands::Recompute {
            target,
            min_common,
            min_similarity,
            batch_size,
            workers,
            json,
        } => {
            let params = config.params(min_common, min_similarity, batch_size, workers)?;
            let store = kindred::db::open(&config.db_path)?;
            let lock = RunLock::new();
            let cancel = install_cancel_handler();

            if matches!(target, RunTarget::Users | RunTarget::All) {
                if !json {
                    println!("Recomputing user similarity...");
                }
                let report = full::recompute_users(&store, &lock, params, &cancel).await?;
                print_report(&report, json)?;
            }
            if matches!(target, RunTarget::Businesses | RunTarget::All) {
                if !json {
                    println!("Recomputing business similarity...");
                }
                let report = full::recompute_businesses(&store, &lock, params, &cancel).await?;
                print_report(&report, json)?;
            }
        }

        Commands::Update {
            target,
            ids,
            min_common,
            min_similarity,
            batch_size,
            workers,
            json,
        } => {
            let params = config.params(min_common, min_similarity, batch_size, workers)?;
            let store = kindred::db::open(&config.db_path)?;
            let lock = RunLock::new();
            let cancel = install_cancel_handler();

            let report = match target {
                RunTarget::Users => {
                    incremental::update_users(&store, &lock, params, &cancel, &ids).await?
                }
                RunTarget::Businesses => {
                    incremental::update_businesses(&store, &lock, params, &cancel, &ids).await?
                }
                RunTarget::All => {
                    anyhow::bail!("`update` takes a single target: users or businesses")
                }
            };
            print_report(&report, json)?;
        }

        Commands::Recommend {
            user_id,
            category,
            limit,
        } => {
            let store = kindred::db::open(&config.db_path)?;
            kindred::recommend::show(&store, &user_id, &category, limit).await?;
        }

        Commands::Status { json } => {
            let store = kindred::db::open(&config.db_path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&store.stats().await?)?);
            } else {
                kindred::status::show(&store, &config.db_path).await?;
            }
        }
    }

    Ok(())
}

/// Spawn a ctrl-c listener that flips the shared cancellation flag.
/// In-flight batches finish; pending batches are skipped.
fn install_cancel_handler() -> Arc<AtomicBool> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\nCancelling after in-flight batches finish...");
            flag.store(true, Ordering::SeqCst);
        }
    });
    cancel
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{report}");
    }
    if !report.succeeded() {
        warn!(
            failed = report.failed_batches.len(),
            "Run finished with failed batches"
        );
        if !json {
            println!(
                "{}",
                "Some batches failed; run the command again to fill the gaps.".yellow()
            );
        }
    }
    Ok(())
}
