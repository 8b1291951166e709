//! Command-line entry point for the corpus crawler.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use corpus_crawler::identity::normalize_handle;
use corpus_crawler::{
    AcceptancePolicy, CorpusStore, CrawlConfig, Crawler, DescriptionKeywords, PassScheduler,
};
use social_api::{Credentials, SocialApiClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "corpus-crawl")]
#[command(about = "Grow a social-graph corpus from seed profiles")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue handles for resolution
    Seed {
        #[arg(required = true)]
        handles: Vec<String>,
    },

    /// Crawl until stopped
    Run {
        /// Extra handles to seed before crawling
        #[arg(long = "seed")]
        seeds: Vec<String>,
    },

    /// Print corpus counts as JSON
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,corpus_crawler=debug,sqlx=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let cli = Cli::parse();
    let config = CrawlConfig::from_env()?;

    let db_path = config.database_path();
    let store = CorpusStore::open(&db_path)
        .await
        .with_context(|| format!("Failed to open corpus at {}", db_path.display()))?;

    match cli.command {
        Commands::Seed { handles } => seed(&store, &config, handles).await,
        Commands::Run { seeds } => run(store, config, seeds).await,
        Commands::Status => {
            let counts = store.counts().await?;
            println!("{}", serde_json::to_string_pretty(&counts)?);
            Ok(())
        }
    }
}

async fn seed(store: &CorpusStore, config: &CrawlConfig, handles: Vec<String>) -> Result<()> {
    let (writer, writer_task) = store.spawn_writer(config.write_queue_capacity).await?;
    let applying = tokio::spawn(writer_task.run());

    let handles: Vec<String> = handles
        .iter()
        .map(|h| normalize_handle(h))
        .filter(|h| !h.is_empty())
        .collect();
    let count = handles.len();
    writer.enqueue_handles(handles).await?;
    writer.flush().await?;
    drop(writer);

    applying.await.context("Store writer panicked")??;
    tracing::info!(count, corpus = %config.corpus_name, "Seeded handles");
    Ok(())
}

async fn run(store: CorpusStore, config: CrawlConfig, extra_seeds: Vec<String>) -> Result<()> {
    let credentials = Credentials::from_file(&config.credentials_file).with_context(|| {
        format!(
            "Failed to load credentials from {}",
            config.credentials_file.display()
        )
    })?;
    let api = SocialApiClient::new(credentials, config.rate_limit_window);

    let keywords = DescriptionKeywords::new(&config.accept_keywords);
    let policy = move |raw: &[u8]| keywords.is_empty() || keywords.accept(raw);

    let (writer, writer_task) = store.spawn_writer(config.write_queue_capacity).await?;
    let mut scheduler = PassScheduler::new(config.pass_interval);
    scheduler.supervise("store_writer", writer_task.run());

    let crawler = Arc::new(Crawler::new(api, policy, store, writer));
    crawler
        .seed(config.seed_handles.iter().chain(extra_seeds.iter()))
        .await?;

    tracing::info!(
        corpus = %config.corpus_name,
        pass_interval_secs = config.pass_interval.as_secs(),
        "Starting crawl"
    );

    tokio::select! {
        result = crawler.run(scheduler) => {
            result.context("Crawl stopped")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, stopping crawl");
        }
    }

    Ok(())
}
