use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

mod db;
mod drift;
mod features;
mod forecast;
mod models;
mod pipeline;
mod platforms;
mod report;
mod week;

#[derive(Parser)]
#[command(name = "dsa-drift")]
#[command(about = "Solve-count drift tracker for competitive-programming progress", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Register a subject's platform profile
    AddSubject {
        #[arg(long)]
        handle: String,
        #[arg(long, default_value = "leetcode")]
        platform: String,
        #[arg(long)]
        display_name: String,
    },
    /// Import historical snapshots from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Fetch current counts for all subjects and bucket them onto weeks
    Fetch,
    /// Rebuild the weekly feature table with drift annotations
    Engineer,
    /// Train the growth forecast model from the feature table
    Train,
    /// Predict next-period growth for one subject
    Predict {
        #[arg(long)]
        handle: String,
    },
    /// Run fetch, engineer, and train in sequence
    Run,
    /// Generate a markdown drift report
    Report {
        #[arg(long)]
        handle: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::AddSubject {
            handle,
            platform,
            display_name,
        } => {
            let id = db::upsert_subject(&pool, &handle, &platform, &display_name).await?;
            println!("Registered {handle} on {platform} ({id}).");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Imported {inserted} snapshots from {}.", csv.display());
        }
        Commands::Fetch => {
            let client = platforms::build_client()?;
            pipeline::run_fetch(&pool, &client).await?;
            println!("Fetch complete.");
        }
        Commands::Engineer => {
            pipeline::run_engineer(&pool).await?;
            println!("Feature table rebuilt.");
        }
        Commands::Train => {
            pipeline::run_train(&pool).await?;
            println!("Training complete.");
        }
        Commands::Predict { handle } => {
            let model = forecast::load_model(&forecast::default_model_path())?;
            let rows = db::fetch_features(&pool, Some(&handle)).await?;
            let predicted = forecast::predict_latest(&model, &rows)?;
            println!("Predicted next-week growth for {handle}: {predicted:.2}");
        }
        Commands::Run => {
            let client = platforms::build_client()?;
            pipeline::run_full_pipeline(&pool, &client).await?;
            println!("Pipeline done.");
        }
        Commands::Report { handle, out } => {
            let rows = db::fetch_features(&pool, handle.as_deref()).await?;
            let report = report::build_report(week::today_utc(), &rows);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
