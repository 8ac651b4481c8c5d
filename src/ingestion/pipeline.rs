//! Pipeline - fetch, refine and aggregate in sequence

use crate::geo::bbox::BoundingBox;
use crate::ingestion::aggregate::{aggregate, AggregateReport};
use crate::ingestion::error::Result;
use crate::ingestion::fetch::{DvfFetcher, DvfSource};
use crate::ingestion::parse::refine_transactions;
use crate::ingestion::retry::Sleeper;
use crate::ingestion::types::{NormalizedTransaction, RefineStats};
use serde::Serialize;
use tracing::{info, warn};

/// Everything one pipeline run produces
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MarketAnalysis {
    pub transactions: Vec<NormalizedTransaction>,
    pub report: AggregateReport,
    pub refine_stats: RefineStats,
}

impl MarketAnalysis {
    /// Transactions newest first, by year then date
    pub fn transactions_by_recency(&self) -> Vec<&NormalizedTransaction> {
        let mut sorted: Vec<&NormalizedTransaction> = self.transactions.iter().collect();
        sorted.sort_by(|a, b| {
            (b.year, b.date.as_deref().unwrap_or(""))
                .cmp(&(a.year, a.date.as_deref().unwrap_or("")))
        });
        sorted
    }
}

/// Run the full pipeline for one bounding box.
/// A fatal fetch error aborts the run; no partial report is produced.
pub async fn analyze<S: DvfSource, Z: Sleeper>(
    fetcher: &DvfFetcher<S, Z>,
    bbox: &BoundingBox,
    min_year: i32,
) -> Result<MarketAnalysis> {
    info!("Step 1/3: Fetching transactions...");
    let raw = match fetcher.fetch_all(bbox, min_year).await {
        Ok(raw) => raw,
        Err(e) if e.is_not_found() => {
            warn!("No transaction data available: {}", e);
            return Ok(MarketAnalysis::default());
        }
        Err(e) => return Err(e),
    };
    info!("✓ Fetched {} raw entries", raw.len());

    info!("Step 2/3: Refining transactions...");
    let (transactions, refine_stats) = refine_transactions(&raw);
    info!("✓ {}", refine_stats);

    info!("Step 3/3: Aggregating statistics...");
    let report = aggregate(&transactions);
    info!("✓ Aggregated {} transactions", report.total_transactions);

    Ok(MarketAnalysis {
        transactions,
        report,
        refine_stats,
    })
}
