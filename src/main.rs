use calltrack::services::{compute_performance, PriceService};
use calltrack::{trailing_window, AppError, AssetReference, Config, Sentiment, Signal};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Calltrack - resolve asset prices and score bull/bear calls
///
/// Assets are written `token:<chain>:<address>`, `coin:<id>` or
/// `nft:<chain>:<address>`.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve the current price, or the price at a date or instant
    Price {
        asset: String,

        /// UTC calendar day (YYYY-MM-DD)
        #[arg(long, conflicts_with = "at")]
        date: Option<NaiveDate>,

        /// Exact instant (RFC 3339)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Daily floor series for an NFT collection, ending today
    FloorSeries {
        asset: String,

        /// Number of days to cover
        #[arg(long, default_value_t = 30)]
        days: i64,
    },

    /// Resolve snapshots for one call and score it
    Performance {
        asset: String,

        /// bullish or bearish
        #[arg(long)]
        sentiment: String,

        /// When the call was made (RFC 3339)
        #[arg(long)]
        called_at: DateTime<Utc>,

        /// Precise post timestamp, if known (RFC 3339)
        #[arg(long)]
        posted_at: Option<DateTime<Utc>>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr; stdout carries the JSON result.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "calltrack=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    config.validate()?;
    let service = PriceService::from_config(&config).await;
    let now = Utc::now();

    let output = match cli.command {
        Command::Price { asset, date, at } => {
            let asset = AssetReference::parse(&asset)?;
            let price = match (date, at) {
                (Some(date), _) => service.price_at_date(&asset, date).await,
                (None, Some(at)) => service.price_at_instant(&asset, at).await,
                (None, None) => service.current_price(&asset).await,
            };
            if price.is_none() {
                info!("No price available for {}", asset);
            }
            json!({ "asset": asset, "price": price })
        }

        Command::FloorSeries { asset, days } => {
            let asset = AssetReference::parse(&asset)?;
            let (from, to) = trailing_window(now.date_naive(), days)?;
            let series = service.floor_series(&asset, from, to).await;
            json!({ "asset": asset, "from": from, "to": to, "series": series })
        }

        Command::Performance {
            asset,
            sentiment,
            called_at,
            posted_at,
        } => {
            let asset = AssetReference::parse(&asset)?;
            let sentiment = Sentiment::from_str(&sentiment).ok_or_else(|| {
                AppError::InvalidInput(format!("unknown sentiment: {}", sentiment))
            })?;
            let mut signal = Signal::new(sentiment, called_at);
            if let Some(posted_at) = posted_at {
                signal = signal.with_posted_at(posted_at);
            }

            let snapshots = service.snapshots(&asset, &signal, now).await;
            let performance = compute_performance(&signal, &snapshots, now);
            json!({
                "asset": asset,
                "signal": signal,
                "snapshots": snapshots,
                "performance": performance,
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
