use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ratewatch_core::aggregate::Aggregator;
use ratewatch_core::config::Settings;
use ratewatch_core::domain::{SourceKey, Ticker};
use ratewatch_core::fetch::HttpFetcher;

mod batch;
mod probe;
mod summary;

#[derive(Debug, Parser)]
#[command(name = "ratewatch_worker")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Append rating columns to a CSV of tickers.
    Enrich {
        input: PathBuf,

        /// Ticker column name. Detected from the header when omitted.
        #[arg(long)]
        column: Option<String>,

        /// Output path. Defaults to `<input stem>_ratings.csv`.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Skip every pause between requests.
        #[arg(long)]
        no_delay: bool,
    },

    /// Rate a single ticker and print the JSON.
    Probe {
        ticker: String,

        #[arg(long)]
        source: Option<SourceKey>,

        /// Replay a saved page instead of fetching.
        #[arg(long)]
        html: Option<PathBuf>,

        /// Store the fetched page body (requires --source).
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    if let Err(err) = run(args.command, settings).await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %format!("{err:#}"), "worker failed");
        return Err(err);
    }
    Ok(())
}

async fn run(command: Command, settings: Settings) -> anyhow::Result<()> {
    match command {
        Command::Enrich {
            input,
            column,
            output,
            no_delay,
        } => {
            let settings = if no_delay {
                settings.without_delay()
            } else {
                settings
            };
            let aggregator = Aggregator::from_settings(&settings)?;
            let opts = batch::EnrichOptions {
                column,
                pacing: (!no_delay).then(batch::Pacing::default),
            };

            tracing::info!(input = %input.display(), sources = ?aggregator.keys(), "enrich start");
            let (out_path, summary) =
                batch::enrich_file(&aggregator, &input, output.as_deref(), &opts).await?;
            tracing::info!(output = %out_path.display(), "enrich done");

            println!("{summary}");
        }

        Command::Probe {
            ticker,
            source,
            html,
            save,
        } => {
            let ticker = Ticker::parse(&ticker)?;

            let value = if let Some(html) = html {
                let keys = source.map(|k| vec![k]).unwrap_or_else(|| settings.sources.clone());
                serde_json::to_value(probe::replay_file(&keys, &ticker, &html)?)?
            } else if let Some(save) = save {
                let key = source.context("--save needs --source")?;
                let fetcher = HttpFetcher::from_settings(&settings)?;
                serde_json::to_value(probe::fetch_and_save(fetcher, key, &ticker, &save).await?)?
            } else {
                let aggregator = Arc::new(Aggregator::from_settings(&settings)?);
                probe::live(aggregator, source, &ticker).await?
            };

            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(())
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
