//! Enrichment functions - add calculated data to normalized transactions

use crate::ingestion::types::NormalizedTransaction;
use crate::price_per_area;
use tracing::debug;

/// Derive price per built area and price per land area.
/// Pure function - no side effects
pub fn calculate_prices(record: NormalizedTransaction) -> NormalizedTransaction {
    let price_per_built_area = price_per_area(record.land_value, record.built_area);
    let price_per_land_area = price_per_area(record.land_value, record.land_area);

    if let Some(price) = price_per_built_area {
        debug!("Calculated price for {}: {:.2}/m²", record.id, price);
    }

    NormalizedTransaction {
        price_per_built_area,
        price_per_land_area,
        ..record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::parse::tests::mock_transaction;

    #[test]
    fn test_calculate_prices() {
        let mut record = mock_transaction();
        record.land_value = 250_000.0;
        record.built_area = 100.0;
        record.land_area = 300.0;

        let enriched = calculate_prices(record);

        assert_eq!(enriched.price_per_built_area, Some(2500.0));
        assert_eq!(enriched.price_per_land_area, Some(833.33));
    }

    #[test]
    fn test_no_built_area_means_no_price() {
        let mut record = mock_transaction();
        record.land_value = 250_000.0;
        record.built_area = 0.0;
        record.land_area = 0.0;

        let enriched = calculate_prices(record);

        assert!(enriched.price_per_built_area.is_none());
        assert!(enriched.price_per_land_area.is_none());
    }

    #[test]
    fn test_zero_value_means_no_price() {
        let mut record = mock_transaction();
        record.land_value = 0.0;
        record.built_area = 50.0;

        let enriched = calculate_prices(record);

        assert!(enriched.price_per_built_area.is_none());
    }
}
