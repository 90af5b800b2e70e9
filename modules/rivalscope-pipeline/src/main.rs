use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rivalscope_common::Config;
use rivalscope_pipeline::analyzer::Analyzer;
use rivalscope_pipeline::checker::SourceChecker;
use rivalscope_pipeline::feed_fetcher::FeedFetcher;
use rivalscope_pipeline::listing_scraper::{BrowserlessScraper, ListingScraper};
use rivalscope_pipeline::store::PgStore;
use rivalscope_pipeline::timeline::TimelineFetcher;
use rivalscope_pipeline::traits::Store;

#[derive(Parser)]
#[command(name = "rivalscope", about = "Competitive intelligence pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Full pass: ingest all enabled sources, then classify the backlog.
    Run,
    /// Ingest only; leaves the backlog for a later classify invocation.
    Ingest,
    /// Classify the current unprocessed backlog.
    Classify,
    /// Show recent runs, most recent first.
    History {
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("rivalscope=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let store = Arc::new(PgStore::connect(&config.database_url).await?);
    store.migrate().await?;

    match cli.command {
        Command::Run => {
            let checker = build_checker(&config, store.clone());
            let mut run = checker.check_all_sources().await?;

            let analyzer = build_analyzer(&config, store.clone());
            let cards = analyzer.process_unprocessed_items(Some(run.id)).await?;
            run.cards_generated += cards as i32;
            store.update_run(&run).await?;

            info!(
                run_id = %run.id,
                status = run.status.as_str(),
                sources_checked = run.sources_checked,
                new_items = run.new_items,
                cards_generated = run.cards_generated,
                "Pipeline run complete"
            );
        }
        Command::Ingest => {
            let checker = build_checker(&config, store.clone());
            let run = checker.check_all_sources().await?;
            info!(
                run_id = %run.id,
                status = run.status.as_str(),
                new_items = run.new_items,
                "Ingestion complete, classification pending"
            );
        }
        Command::Classify => {
            let analyzer = build_analyzer(&config, store.clone());
            let cards = analyzer.process_unprocessed_items(None).await?;
            info!(cards_generated = cards, "Classification complete");
        }
        Command::History { limit } => {
            let runs = store.recent_runs(limit).await?;
            for run in runs {
                println!(
                    "{}  {}  status={}  sources={}  new_items={}  cards={}{}",
                    run.started_at.format("%Y-%m-%d %H:%M:%S"),
                    run.id,
                    run.status.as_str(),
                    run.sources_checked,
                    run.new_items,
                    run.cards_generated,
                    run.error_log
                        .as_deref()
                        .map(|e| format!("  errors: {}", e.lines().count()))
                        .unwrap_or_default(),
                );
            }
        }
    }

    Ok(())
}

fn build_checker(config: &Config, store: Arc<PgStore>) -> SourceChecker {
    let scraper = Arc::new(BrowserlessScraper::new(
        &config.browserless_url,
        config.browserless_token.as_deref(),
    ));
    SourceChecker::new(
        store,
        Arc::new(FeedFetcher::new()),
        Arc::new(ListingScraper::new(scraper)),
        Arc::new(TimelineFetcher::new(x_client::XApiClient::new(
            config.x_bearer_token.clone(),
        ))),
    )
}

fn build_analyzer(config: &Config, store: Arc<PgStore>) -> Analyzer {
    let model = Arc::new(ai_client::Claude::new(
        &config.anthropic_api_key,
        &config.anthropic_model,
    ));
    Analyzer::new(store, model)
}
