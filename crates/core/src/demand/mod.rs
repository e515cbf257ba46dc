//! Supply-planning rollups of projected purchases.

use std::collections::HashMap;

use tracing::warn;

use crate::dataset::PurchaseDataset;
use crate::domain::forecast::{DemandForecastRow, DemandLevel, DemandWeighting};
use crate::domain::normalize_key;
use crate::domain::restock::RestockPrediction;

/// Bucket used when a prediction cannot be joined to a shipping location.
/// Keeps count-mode totals equal to the number of predictions.
pub const UNASSIGNED_LOCATION: &str = "unassigned";

const MONTH_FORMAT: &str = "%Y-%m";

/// Fixed bin edges used when there are too few rows for tertiles.
const LOW_UNITS_CEILING: u64 = 20;
const MEDIUM_UNITS_CEILING: u64 = 40;

#[derive(Clone, Copy, Debug, Default)]
pub struct DemandAggregator {
    weighting: DemandWeighting,
}

impl DemandAggregator {
    pub fn new(weighting: DemandWeighting) -> Self {
        Self { weighting }
    }

    pub fn weighting(&self) -> DemandWeighting {
        self.weighting
    }

    /// Groups predictions by (location, product, month), ordered by month
    /// ascending then expected units descending.
    pub fn forecast(
        &self,
        predictions: &[RestockPrediction],
        dataset: &PurchaseDataset,
    ) -> Vec<DemandForecastRow> {
        let mut buckets: HashMap<(String, String, String), u64> = HashMap::new();
        let mut display_names: HashMap<String, String> = HashMap::new();

        for prediction in predictions {
            let location = match dataset
                .shipping_location(&prediction.user_id, &prediction.product_name)
            {
                Some(location) => location.trim().to_string(),
                None => {
                    warn!(
                        event_name = "demand.forecast.location_missing",
                        user_id = %prediction.user_id,
                        product_name = %prediction.product_name,
                        "no shipping location on record; using placeholder bucket"
                    );
                    UNASSIGNED_LOCATION.to_string()
                }
            };
            let product_key = normalize_key(&prediction.product_name);
            display_names
                .entry(product_key.clone())
                .or_insert_with(|| prediction.product_name.trim().to_string());
            let month = prediction.predicted_next_date.format(MONTH_FORMAT).to_string();

            let units = match self.weighting {
                DemandWeighting::Count => 1,
                DemandWeighting::Quantity => typical_quantity(prediction, dataset),
            };
            *buckets.entry((location, product_key, month)).or_insert(0) += units;
        }

        let mut rows = buckets
            .into_iter()
            .map(|((shipping_location, product_key, month), expected_units)| DemandForecastRow {
                shipping_location,
                product_name: display_names.get(&product_key).cloned().unwrap_or(product_key),
                month,
                expected_units,
            })
            .collect::<Vec<_>>();

        rows.sort_by(|left, right| {
            left.month
                .cmp(&right.month)
                .then(right.expected_units.cmp(&left.expected_units))
                .then(left.shipping_location.cmp(&right.shipping_location))
                .then(left.product_name.cmp(&right.product_name))
        });
        rows
    }
}

/// Rounded mean quantity per purchase line of the pair, at least one.
fn typical_quantity(prediction: &RestockPrediction, dataset: &PurchaseDataset) -> u64 {
    let product_key = normalize_key(&prediction.product_name);
    let quantities = dataset
        .records_for_user(&prediction.user_id)
        .filter(|record| normalize_key(&record.product_name) == product_key)
        .map(|record| u64::from(record.quantity))
        .collect::<Vec<_>>();
    if quantities.is_empty() {
        return 1;
    }

    let mean = quantities.iter().sum::<u64>() as f64 / quantities.len() as f64;
    (mean.round() as u64).max(1)
}

/// Labels each row Low/Medium/High, in input order.
pub fn classify_demand(rows: &[DemandForecastRow]) -> Vec<DemandLevel> {
    if rows.len() < 3 {
        return rows
            .iter()
            .map(|row| match row.expected_units {
                units if units <= LOW_UNITS_CEILING => DemandLevel::Low,
                units if units <= MEDIUM_UNITS_CEILING => DemandLevel::Medium,
                _ => DemandLevel::High,
            })
            .collect();
    }

    let mut sorted = rows.iter().map(|row| row.expected_units as f64).collect::<Vec<_>>();
    sorted.sort_by(|left, right| left.total_cmp(right));
    let lower = quantile(&sorted, 1.0 / 3.0);
    let upper = quantile(&sorted, 2.0 / 3.0);

    rows.iter()
        .map(|row| {
            let units = row.expected_units as f64;
            if units <= lower {
                DemandLevel::Low
            } else if units <= upper {
                DemandLevel::Medium
            } else {
                DemandLevel::High
            }
        })
        .collect()
}

/// Linear-interpolated quantile of an ascending, non-empty slice.
fn quantile(sorted: &[f64], fraction: f64) -> f64 {
    let position = fraction * (sorted.len() - 1) as f64;
    let below = position.floor() as usize;
    let above = position.ceil() as usize;
    let weight = position - below as f64;
    sorted[below] + (sorted[above] - sorted[below]) * weight
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{classify_demand, DemandAggregator, UNASSIGNED_LOCATION};
    use crate::dataset::fixtures::record;
    use crate::dataset::{PurchaseDataset, SimilarityIndex};
    use crate::domain::forecast::{DemandForecastRow, DemandLevel, DemandWeighting};
    use crate::domain::purchase::{PurchaseRecord, UserId};
    use crate::domain::restock::{start_of_day, RestockPrediction};
    use crate::restock::RestockEstimator;

    fn prediction(user: &str, product: &str, date: (i32, u32, u32)) -> RestockPrediction {
        RestockPrediction {
            user_id: UserId::new(user),
            product_name: product.to_string(),
            estimated_family_size: 1,
            mean_days_between_orders: 5.0,
            predicted_next_date: start_of_day(
                NaiveDate::from_ymd_opt(date.0, date.1, date.2).expect("valid date"),
            ),
            is_overdue: false,
        }
    }

    fn dataset(records: Vec<PurchaseRecord>) -> PurchaseDataset {
        PurchaseDataset::new(records, Vec::new(), SimilarityIndex::new())
    }

    fn row(units: u64) -> DemandForecastRow {
        DemandForecastRow {
            shipping_location: "Los Angeles".to_string(),
            product_name: "1L Milk".to_string(),
            month: "2024-01".to_string(),
            expected_units: units,
        }
    }

    #[test]
    fn three_milk_predictions_in_one_bucket_make_one_row() {
        let data = dataset(vec![
            record("U1", "1L Milk", "Amul", (2024, 1, 1), 1),
            record("U2", "1L Milk", "Amul", (2024, 1, 2), 1),
            record("U3", "1L Milk", "Amul", (2024, 1, 3), 1),
        ]);
        let predictions = vec![
            prediction("U1", "1L Milk", (2024, 1, 10)),
            prediction("U2", "1L Milk", (2024, 1, 20)),
            prediction("U3", "1L Milk", (2024, 1, 30)),
        ];

        let rows = DemandAggregator::default().forecast(&predictions, &data);

        assert_eq!(rows, vec![DemandForecastRow {
            shipping_location: "Los Angeles".to_string(),
            product_name: "1L Milk".to_string(),
            month: "2024-01".to_string(),
            expected_units: 3,
        }]);
    }

    #[test]
    fn count_mode_conserves_prediction_total() {
        let mut records = Vec::new();
        for (user, product) in [("U1", "1L Milk"), ("U2", "Cola 500ml"), ("U3", "Yogurt Cup")] {
            records.push(record(user, product, "Any", (2024, 1, 1), 2));
            records.push(record(user, product, "Any", (2024, 1, 9), 4));
        }
        let data = dataset(records);
        let mut predictions =
            RestockEstimator::as_of_date(NaiveDate::from_ymd_opt(2024, 2, 1).expect("date"))
                .predict_all(&data);
        predictions.push(prediction("ghost", "Bread", (2024, 3, 1)));

        let rows = DemandAggregator::new(DemandWeighting::Count).forecast(&predictions, &data);

        assert_eq!(rows.iter().map(|r| r.expected_units).sum::<u64>(), predictions.len() as u64);
        assert!(rows.iter().any(|r| r.shipping_location == UNASSIGNED_LOCATION));
    }

    #[test]
    fn quantity_mode_sums_typical_purchase_quantity() {
        let data = dataset(vec![
            record("U1", "1L Milk", "Amul", (2024, 1, 1), 2),
            record("U1", "1L Milk", "Amul", (2024, 1, 6), 3),
            record("U2", "1L Milk", "Amul", (2024, 1, 1), 4),
        ]);
        let predictions =
            vec![prediction("U1", "1L Milk", (2024, 1, 11)), prediction("U2", "1L Milk", (2024, 1, 12))];

        let rows = DemandAggregator::new(DemandWeighting::Quantity).forecast(&predictions, &data);

        // U1 averages 2.5 -> 3, U2 averages 4.
        assert_eq!(rows[0].expected_units, 7);
    }

    #[test]
    fn rows_sort_by_month_then_units_descending() {
        let data = dataset(vec![
            record("U1", "1L Milk", "Amul", (2024, 1, 1), 1),
            record("U2", "1L Milk", "Amul", (2024, 1, 1), 1),
            record("U3", "Cola 500ml", "Coke", (2024, 1, 1), 1),
        ]);
        let predictions = vec![
            prediction("U3", "Cola 500ml", (2024, 2, 3)),
            prediction("U1", "1L Milk", (2024, 3, 1)),
            prediction("U1", "1L Milk", (2024, 2, 10)),
            prediction("U2", "1L Milk", (2024, 2, 11)),
        ];

        let rows = DemandAggregator::default().forecast(&predictions, &data);
        let summary = rows
            .iter()
            .map(|r| (r.month.as_str(), r.product_name.as_str(), r.expected_units))
            .collect::<Vec<_>>();

        assert_eq!(summary, vec![
            ("2024-02", "1L Milk", 2),
            ("2024-02", "Cola 500ml", 1),
            ("2024-03", "1L Milk", 1),
        ]);
    }

    #[test]
    fn empty_predictions_yield_no_rows() {
        let rows = DemandAggregator::default().forecast(&[], &dataset(Vec::new()));
        assert!(rows.is_empty());
    }

    #[test]
    fn few_rows_use_fixed_bins() {
        let levels = classify_demand(&[row(5), row(35)]);
        assert_eq!(levels, vec![DemandLevel::Low, DemandLevel::Medium]);
    }

    #[test]
    fn many_rows_use_tertiles() {
        let levels = classify_demand(&[row(1), row(2), row(3), row(4), row(5), row(6)]);
        assert_eq!(levels, vec![
            DemandLevel::Low,
            DemandLevel::Low,
            DemandLevel::Medium,
            DemandLevel::Medium,
            DemandLevel::High,
            DemandLevel::High,
        ]);
    }
}
