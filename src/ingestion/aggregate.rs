//! Aggregate statistics over normalized transactions
//!
//! Every figure is computed from a sorted multiset of values so the report
//! does not depend on the order of the input sequence.

use crate::ingestion::types::NormalizedTransaction;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use tracing::info;

/// Grouping key for optional labels; records without a label form their own group.
/// The absent group serializes as the empty string, which no label can equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupKey {
    Absent,
    Label(String),
}

impl GroupKey {
    pub fn from_option(label: Option<&str>) -> Self {
        match label.map(str::trim) {
            Some(l) if !l.is_empty() => GroupKey::Label(l.to_string()),
            _ => GroupKey::Absent,
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Absent => write!(f, "N/A"),
            GroupKey::Label(l) => write!(f, "{}", l),
        }
    }
}

impl Serialize for GroupKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            GroupKey::Absent => serializer.serialize_str(""),
            GroupKey::Label(l) => serializer.serialize_str(l),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct YearRange {
    pub min: i32,
    pub max: i32,
}

/// Distribution of price per built area
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceDistribution {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueSummary {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialStats {
    pub price_per_m2: PriceDistribution,
    pub land_value: ValueSummary,
    pub built_area: ValueSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceRange {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyTypeStats {
    pub count: usize,
    pub valid_price_count: usize,
    pub price_per_m2: PriceRange,
    pub avg_built_area: f64,
    pub avg_land_value: f64,
}

/// Used for both the mutation-nature breakdown and the VEFA/classic partitions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStats {
    pub count: usize,
    pub valid_price_count: usize,
    pub avg_price_per_m2: f64,
    pub avg_land_value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VefaComparison {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vefa: Option<GroupStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classic: Option<GroupStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeographicStats {
    pub departments: BTreeMap<GroupKey, usize>,
    pub communes: BTreeMap<String, usize>,
    pub unique_departments: usize,
    pub unique_communes: usize,
}

/// Read-only snapshot of the market in the analysed window
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateReport {
    pub total_transactions: usize,
    pub valid_price_transactions: usize,
    pub valid_land_price_transactions: usize,
    pub year_range: Option<YearRange>,
    pub financial_stats: Option<FinancialStats>,
    pub by_property_type: BTreeMap<GroupKey, PropertyTypeStats>,
    pub by_mutation_nature: BTreeMap<GroupKey, GroupStats>,
    pub vefa_vs_classic: VefaComparison,
    pub geographic_stats: Option<GeographicStats>,
}

impl AggregateReport {
    /// No transactions were analysed
    pub fn is_empty(&self) -> bool {
        self.total_transactions == 0
    }

    /// Share of all transactions, in percent
    pub fn percentage_of_total(&self, count: usize) -> f64 {
        if self.total_transactions == 0 {
            return 0.0;
        }
        count as f64 / self.total_transactions as f64 * 100.0
    }
}

/// Build the full report in one pass over the grouped records
pub fn aggregate(transactions: &[NormalizedTransaction]) -> AggregateReport {
    if transactions.is_empty() {
        info!("No transactions to aggregate");
        return AggregateReport::default();
    }

    let valid: Vec<&NormalizedTransaction> =
        transactions.iter().filter(|t| t.has_valid_price()).collect();

    let year_range = transactions
        .iter()
        .map(|t| t.year)
        .fold(None, |range: Option<YearRange>, year| match range {
            None => Some(YearRange { min: year, max: year }),
            Some(r) => Some(YearRange {
                min: r.min.min(year),
                max: r.max.max(year),
            }),
        });

    let report = AggregateReport {
        total_transactions: transactions.len(),
        valid_price_transactions: valid.len(),
        valid_land_price_transactions: transactions
            .iter()
            .filter(|t| t.has_valid_land_price())
            .count(),
        year_range,
        financial_stats: financial_stats(&valid),
        by_property_type: by_property_type(transactions),
        by_mutation_nature: by_mutation_nature(transactions),
        vefa_vs_classic: vefa_vs_classic(transactions),
        geographic_stats: Some(geographic_stats(transactions)),
    };

    info!(
        "Aggregated {} transactions ({} with valid price, {} property types)",
        report.total_transactions,
        report.valid_price_transactions,
        report.by_property_type.len()
    );

    report
}

fn financial_stats(valid: &[&NormalizedTransaction]) -> Option<FinancialStats> {
    let prices = Sorted::new(valid.iter().filter_map(|t| t.price_per_built_area))?;
    let land_values = Sorted::new(valid.iter().map(|t| t.land_value))?;
    let built_areas = Sorted::new(valid.iter().map(|t| t.built_area))?;

    Some(FinancialStats {
        price_per_m2: PriceDistribution {
            mean: prices.mean(),
            median: prices.median(),
            min: prices.min(),
            max: prices.max(),
            std_dev: prices.std_dev(),
        },
        land_value: land_values.summary(),
        built_area: built_areas.summary(),
    })
}

fn by_property_type(transactions: &[NormalizedTransaction]) -> BTreeMap<GroupKey, PropertyTypeStats> {
    group_by(transactions, |t| t.property_type_label.as_deref())
        .into_iter()
        .filter_map(|(key, entries)| {
            let valid: Vec<_> = entries.iter().copied().filter(|t| t.has_valid_price()).collect();
            let prices = Sorted::new(valid.iter().filter_map(|t| t.price_per_built_area))?;
            let stats = PropertyTypeStats {
                count: entries.len(),
                valid_price_count: valid.len(),
                price_per_m2: PriceRange {
                    mean: prices.mean(),
                    median: prices.median(),
                    min: prices.min(),
                    max: prices.max(),
                },
                avg_built_area: Sorted::new(valid.iter().map(|t| t.built_area))?.mean(),
                avg_land_value: Sorted::new(valid.iter().map(|t| t.land_value))?.mean(),
            };
            Some((key, stats))
        })
        .collect()
}

fn by_mutation_nature(transactions: &[NormalizedTransaction]) -> BTreeMap<GroupKey, GroupStats> {
    group_by(transactions, |t| t.mutation_nature.as_deref())
        .into_iter()
        .filter_map(|(key, entries)| group_stats(&entries).map(|stats| (key, stats)))
        .collect()
}

fn vefa_vs_classic(transactions: &[NormalizedTransaction]) -> VefaComparison {
    let (vefa, classic): (Vec<&NormalizedTransaction>, Vec<&NormalizedTransaction>) =
        transactions.iter().partition(|t| t.is_vefa);

    VefaComparison {
        vefa: group_stats(&vefa),
        classic: group_stats(&classic),
    }
}

/// Count, valid-price count and averages; `None` without any valid price
fn group_stats(entries: &[&NormalizedTransaction]) -> Option<GroupStats> {
    let valid: Vec<_> = entries.iter().copied().filter(|t| t.has_valid_price()).collect();
    let prices = Sorted::new(valid.iter().filter_map(|t| t.price_per_built_area))?;
    let land_values = Sorted::new(valid.iter().map(|t| t.land_value))?;

    Some(GroupStats {
        count: entries.len(),
        valid_price_count: valid.len(),
        avg_price_per_m2: prices.mean(),
        avg_land_value: land_values.mean(),
    })
}

fn geographic_stats(transactions: &[NormalizedTransaction]) -> GeographicStats {
    let mut departments: BTreeMap<GroupKey, usize> = BTreeMap::new();
    let mut communes: BTreeMap<String, usize> = BTreeMap::new();

    for t in transactions {
        *departments
            .entry(GroupKey::from_option(t.department_code.as_deref()))
            .or_insert(0) += 1;

        // One transaction counts once for every commune it spans
        for code in &t.insee_codes {
            *communes.entry(code.clone()).or_insert(0) += 1;
        }
    }

    GeographicStats {
        unique_departments: departments.len(),
        unique_communes: communes.len(),
        departments,
        communes,
    }
}

fn group_by<'a, F>(
    transactions: &'a [NormalizedTransaction],
    key: F,
) -> BTreeMap<GroupKey, Vec<&'a NormalizedTransaction>>
where
    F: Fn(&NormalizedTransaction) -> Option<&str>,
{
    let mut groups: BTreeMap<GroupKey, Vec<&NormalizedTransaction>> = BTreeMap::new();
    for t in transactions {
        groups
            .entry(GroupKey::from_option(key(t)))
            .or_default()
            .push(t);
    }
    groups
}

/// Non-empty, ascending sequence of values
struct Sorted(Vec<f64>);

impl Sorted {
    fn new(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut values: Vec<f64> = values.into_iter().collect();
        if values.is_empty() {
            return None;
        }
        values.sort_by(f64::total_cmp);
        Some(Sorted(values))
    }

    fn count(&self) -> f64 {
        self.0.len() as f64
    }

    fn total(&self) -> f64 {
        self.0.iter().sum()
    }

    fn mean(&self) -> f64 {
        self.total() / self.count()
    }

    /// Element at index n/2: the upper of the two middle values for even n
    fn median(&self) -> f64 {
        self.0[self.0.len() / 2]
    }

    fn min(&self) -> f64 {
        self.0[0]
    }

    fn max(&self) -> f64 {
        self.0[self.0.len() - 1]
    }

    /// Population standard deviation
    fn std_dev(&self) -> f64 {
        let mean = self.mean();
        let variance = self.0.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / self.count();
        variance.sqrt()
    }

    fn summary(&self) -> ValueSummary {
        ValueSummary {
            mean: self.mean(),
            median: self.median(),
            min: self.min(),
            max: self.max(),
            total: self.total(),
        }
    }
}
