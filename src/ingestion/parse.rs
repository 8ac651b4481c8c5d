//! Parse functions - transform raw DVF mutations into NormalizedTransaction structs

use crate::ingestion::enrich::calculate_prices;
use crate::ingestion::types::{NormalizedTransaction, RawTransaction, RefineStats};
use crate::ingestion::utils::{
    coerce_amount, coerce_count, coerce_flag, coerce_year, text, text_list, CoercionError,
};
use tracing::{info, warn};

/// Skips beyond this count are only counted, not logged
const MAX_LOGGED_SKIPS: usize = 10;

/// Refine raw mutations, preserving input order.
/// Never fails as a whole: malformed records are skipped and counted.
pub fn refine_transactions(raw: &[RawTransaction]) -> (Vec<NormalizedTransaction>, RefineStats) {
    let mut refined = Vec::with_capacity(raw.len());
    let mut stats = RefineStats::default();

    for (idx, entry) in raw.iter().enumerate() {
        match parse_transaction(entry) {
            Ok(record) => {
                refined.push(calculate_prices(record));
                stats.refined += 1;
            }
            Err((field, e)) => {
                stats.skipped += 1;
                if stats.skipped <= MAX_LOGGED_SKIPS {
                    warn!(
                        "Skipping entry {} ({}): invalid {}: {}",
                        idx,
                        entry.label(),
                        field,
                        e
                    );
                }
            }
        }
    }

    info!("Refined {} DVF entries ({})", raw.len(), stats);

    (refined, stats)
}

/// Coerce the required numeric fields and copy the rest with safe defaults.
/// Derived prices are left empty; see `enrich::calculate_prices`.
pub fn parse_transaction(
    entry: &RawTransaction,
) -> Result<NormalizedTransaction, (&'static str, CoercionError)> {
    let year = coerce_year(entry.get("anneemut")).map_err(|e| ("anneemut", e))?;
    let land_value = coerce_amount(entry.get("valeurfonc")).map_err(|e| ("valeurfonc", e))?;
    let land_area = coerce_amount(entry.get("sterr")).map_err(|e| ("sterr", e))?;
    let built_area = coerce_amount(entry.get("sbati")).map_err(|e| ("sbati", e))?;

    Ok(NormalizedTransaction {
        id: text(entry.get("idmutation")).unwrap_or_default(),
        date: text(entry.get("datemut")),
        year,
        department_code: text(entry.get("coddep")),
        insee_codes: text_list(entry.get("l_codinsee")),
        commune_count: coerce_count(entry.get("nbcomm")),
        land_value,
        land_area,
        built_area,
        price_per_built_area: None,
        price_per_land_area: None,
        property_type_code: text(entry.get("codtypbien")),
        property_type_label: text(entry.get("libtypbien")),
        mutation_nature: text(entry.get("libnatmut")),
        is_vefa: coerce_flag(entry.get("vefa")),
        parcel_count: coerce_count(entry.get("nbpar")),
        mutated_parcel_count: coerce_count(entry.get("nbparmut")),
        parcel_ids: text_list(entry.get("l_idpar")),
        mutated_parcel_ids: text_list(entry.get("l_idparmut")),
        volume_count: coerce_count(entry.get("nbvolmut")),
        local_count: coerce_count(entry.get("nblocmut")),
        local_ids: text_list(entry.get("l_idlocmut")),
    })
}
