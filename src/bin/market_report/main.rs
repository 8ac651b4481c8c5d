//! Market report orchestrator - runs geocode, fetch, refine, aggregate for one address

use anyhow::{Context, Result};
use chrono::Local;
use dvf_market_analysis::config::Config;
use dvf_market_analysis::geo::geocode::Geocoder;
use dvf_market_analysis::geo::BoundingBox;
use dvf_market_analysis::ingestion::fetch::{DvfClient, DvfFetcher};
use dvf_market_analysis::ingestion::{analyze, MarketAnalysis};
use std::env;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    info!("Configuration loaded");

    let args: Vec<String> = env::args().skip(1).collect();
    let client = DvfClient::new(&config.dvf_api_url, config.http_timeout)?;
    let fetcher = DvfFetcher::from_client(client, config.retry_policy(), config.fetch_filters());

    match args.first().map(String::as_str) {
        Some("mutation") => {
            let mutation_id = args.get(1).context("usage: market-report mutation <id>")?;
            match fetcher.fetch_mutation(mutation_id).await? {
                Some(location) => println!("{}", serde_json::to_string_pretty(&location)?),
                None => warn!("No information found for mutation {}", mutation_id),
            }
        }
        Some(_) => {
            let address = args.join(" ");
            if let Err(e) = run_report(&config, &fetcher, &address).await {
                error!("✗ Market report failed: {:#}", e);
                return Err(e);
            }
        }
        None => {
            anyhow::bail!("usage: market-report <address> | market-report mutation <id>");
        }
    }

    Ok(())
}

async fn run_report(
    config: &Config,
    fetcher: &DvfFetcher<DvfClient>,
    address: &str,
) -> Result<()> {
    info!("=== Market report for '{}' ===", address);

    let geocoder = Geocoder::new(
        &config.nominatim_url,
        config.http_timeout,
        config.geocode_cache_size,
    )?;
    let coordinates = geocoder
        .locate(address)
        .await
        .with_context(|| format!("Failed to geocode '{}'", address))?;

    let bbox = BoundingBox::around(coordinates);
    let min_year = config.min_year(Local::now().date_naive(), config.period_months);
    info!(
        "Analysing {} months back (mutations from {})",
        config.period_months, min_year
    );

    let analysis = analyze(fetcher, &bbox, min_year)
        .await
        .context("Transaction pipeline failed")?;

    print_analysis(&analysis)?;
    info!("✓ Market report complete: {}", analysis.refine_stats);

    Ok(())
}

fn print_analysis(analysis: &MarketAnalysis) -> Result<()> {
    if analysis.report.is_empty() {
        warn!("No property transaction data found for this location");
        return Ok(());
    }

    let transactions = analysis.transactions_by_recency();
    println!("{}", serde_json::to_string_pretty(&transactions)?);
    println!("{}", serde_json::to_string_pretty(&analysis.report)?);

    for (label, stats) in &analysis.report.by_property_type {
        info!(
            "{}: {} transactions ({:.1}%), average {:.0}/m²",
            label,
            stats.count,
            analysis.report.percentage_of_total(stats.count),
            stats.price_per_m2.mean
        );
    }

    Ok(())
}
