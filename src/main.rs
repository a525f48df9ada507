use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use uuid::Uuid;

use churn_risk::config::{self, DatabaseConfig, DEFAULT_BIND, DEFAULT_MAX_CONNECTIONS};
use churn_risk::db::{self, PgStore};
use churn_risk::{build_router, report, seed, AppState, ChurnStore, MemoryStore};

#[derive(Parser)]
#[command(name = "churn-risk")]
#[command(about = "Churn risk scoring and intervention service", long_about = None)]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,
    #[arg(long, env = "CHURN_DB_MAX_CONNECTIONS", global = true, default_value_t = DEFAULT_MAX_CONNECTIONS)]
    max_connections: u32,
    /// Emit logs as JSON lines
    #[arg(long, env = "CHURN_LOG_JSON", global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo portfolio
    Seed {
        #[arg(long, default_value_t = seed::DEMO_USER_ID)]
        user: Uuid,
    },
    /// Import customer activity from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long, env = "CHURN_BIND", default_value = DEFAULT_BIND)]
        bind: String,
        /// Serve a seeded in-memory store instead of Postgres
        #[arg(long)]
        demo: bool,
    },
    /// Score churn risk across a user's customers
    Score {
        #[arg(long)]
        user: Uuid,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        user: Uuid,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    config::init_tracing(cli.log_json);

    if let Commands::Serve { bind, demo: true } = &cli.command {
        let store = MemoryStore::new();
        seed::seed(&store, seed::DEMO_USER_ID, Utc::now()).await?;
        tracing::info!(user_id = %seed::DEMO_USER_ID, "serving demo portfolio");
        return serve(bind, Arc::new(store)).await;
    }

    let pool = DatabaseConfig::new(cli.database_url, cli.max_connections)?
        .connect()
        .await?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed { user } => {
            let summary = seed::seed(&PgStore::new(pool), user, Utc::now()).await?;
            println!(
                "Seeded {} customers, {} subscriptions and {} activities.",
                summary.customers, summary.subscriptions, summary.activities
            );
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} activities from {}.", csv.display());
        }
        Commands::Serve { bind, .. } => {
            serve(&bind, Arc::new(PgStore::new(pool))).await?;
        }
        Commands::Score { user, limit } => {
            let store = PgStore::new(pool);
            let portfolio = report::collect_portfolio(&store, user, Utc::now()).await?;

            if portfolio.scores.is_empty() {
                println!("No customers found for this user.");
                return Ok(());
            }

            println!("Top customers by churn risk:");
            for score in portfolio.scores.iter().take(limit) {
                println!(
                    "- {} ({}, {}) risk {} at {}% confidence",
                    score.customer_name,
                    score.customer_email,
                    score.status.as_str(),
                    score.risk,
                    score.confidence
                );
            }
        }
        Commands::Report { user, out } => {
            let store = PgStore::new(pool);
            let now = Utc::now();
            let portfolio = report::collect_portfolio(&store, user, now).await?;
            let report = report::build_report(&user.to_string(), now, &portfolio);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

async fn serve(bind: &str, store: Arc<dyn ChurnStore>) -> anyhow::Result<()> {
    let app = build_router(AppState::new(store));
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
