//! Reorder interval estimation.
//!
//! For every product a user bought on at least two distinct days the mean gap
//! between consecutive purchase days projects the next purchase. Several
//! records of the same product on one day are one purchase whose quantity is
//! the sum of the lines.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::dataset::PurchaseDataset;
use crate::domain::consumption::ConsumptionProfile;
use crate::domain::normalize_key;
use crate::domain::purchase::UserId;
use crate::domain::restock::{start_of_day, RestockDueItem, RestockPrediction};
use crate::errors::DomainError;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Minimum distinct purchase days before an interval is defined.
pub const MIN_PURCHASES_FOR_INTERVAL: usize = 2;

#[derive(Clone, Copy, Debug)]
pub struct RestockEstimator {
    as_of: NaiveDateTime,
}

/// Purchases of one product by one user, keyed by day.
#[derive(Clone, Debug, Default)]
pub struct PurchaseHistory {
    product_name: String,
    quantities_by_day: BTreeMap<NaiveDate, u64>,
}

impl PurchaseHistory {
    pub fn new(product_name: impl Into<String>) -> Self {
        Self { product_name: product_name.into(), quantities_by_day: BTreeMap::new() }
    }

    pub fn record(&mut self, date: NaiveDate, quantity: u32) {
        *self.quantities_by_day.entry(date).or_insert(0) += u64::from(quantity);
    }

    pub fn purchase_count(&self) -> usize {
        self.quantities_by_day.len()
    }

    fn average_quantity(&self) -> f64 {
        let total: u64 = self.quantities_by_day.values().sum();
        total as f64 / self.quantities_by_day.len().max(1) as f64
    }
}

impl RestockEstimator {
    pub fn new(as_of: NaiveDateTime) -> Self {
        Self { as_of }
    }

    pub fn as_of_date(date: NaiveDate) -> Self {
        Self::new(start_of_day(date))
    }

    pub fn as_of(&self) -> NaiveDateTime {
        self.as_of
    }

    /// Predictions for every product the user bought on two or more days,
    /// ordered by product name.
    pub fn predict_for_user(
        &self,
        user_id: &UserId,
        dataset: &PurchaseDataset,
    ) -> Vec<RestockPrediction> {
        let mut histories: BTreeMap<String, PurchaseHistory> = BTreeMap::new();
        for record in dataset.records_for_user(user_id) {
            histories
                .entry(normalize_key(&record.product_name))
                .or_insert_with(|| PurchaseHistory::new(record.product_name.trim()))
                .record(record.purchase_date, record.quantity);
        }

        histories
            .values()
            .filter_map(|history| {
                let profile = dataset.consumption_profile(&history.product_name);
                match self.estimate(user_id, history, profile) {
                    Ok(prediction) => Some(prediction),
                    Err(error) => {
                        debug!(
                            event_name = "restock.estimate.skipped",
                            user_id = %user_id,
                            product_name = %history.product_name,
                            reason = %error,
                            "pair omitted from restock predictions"
                        );
                        None
                    }
                }
            })
            .collect()
    }

    /// Batch run over every user in the dataset.
    pub fn predict_all(&self, dataset: &PurchaseDataset) -> Vec<RestockPrediction> {
        dataset
            .users()
            .into_iter()
            .flat_map(|user_id| self.predict_for_user(user_id, dataset))
            .collect()
    }

    /// Overdue products for a user, earliest projected date first.
    pub fn due_for_restock(
        &self,
        user_id: &UserId,
        dataset: &PurchaseDataset,
    ) -> Vec<RestockDueItem> {
        due_items(&self.predict_for_user(user_id, dataset), self.as_of)
    }

    pub fn estimate(
        &self,
        user_id: &UserId,
        history: &PurchaseHistory,
        profile: Option<&ConsumptionProfile>,
    ) -> Result<RestockPrediction, DomainError> {
        let purchases = history.purchase_count();
        if purchases < MIN_PURCHASES_FOR_INTERVAL {
            return Err(DomainError::InsufficientHistory {
                user_id: user_id.clone(),
                product_name: history.product_name.clone(),
                purchases,
            });
        }

        let days = history.quantities_by_day.keys().copied().collect::<Vec<_>>();
        let gaps = days.windows(2).map(|pair| (pair[1] - pair[0]).num_days()).collect::<Vec<_>>();
        let mean_days = gaps.iter().sum::<i64>() as f64 / gaps.len() as f64;

        let last_purchase = *days.last().ok_or_else(|| {
            DomainError::InvariantViolation("purchase history without dates".to_string())
        })?;
        let offset = Duration::milliseconds((mean_days * MILLIS_PER_DAY).round() as i64);
        let predicted_next_date = start_of_day(last_purchase) + offset;

        Ok(RestockPrediction {
            user_id: user_id.clone(),
            product_name: history.product_name.clone(),
            estimated_family_size: estimate_family_size(
                history.average_quantity(),
                mean_days,
                profile,
            ),
            mean_days_between_orders: mean_days,
            predicted_next_date,
            is_overdue: predicted_next_date < self.as_of,
        })
    }
}

/// Filters overdue predictions and orders them by projected date.
pub fn due_items(predictions: &[RestockPrediction], as_of: NaiveDateTime) -> Vec<RestockDueItem> {
    let mut overdue = predictions
        .iter()
        .filter(|prediction| prediction.predicted_next_date < as_of)
        .collect::<Vec<_>>();
    overdue.sort_by(|left, right| {
        left.predicted_next_date
            .cmp(&right.predicted_next_date)
            .then(left.product_name.cmp(&right.product_name))
    });

    overdue
        .into_iter()
        .map(|prediction| RestockDueItem {
            product_name: prediction.product_name.clone(),
            predicted_date: prediction.predicted_next_date.date(),
            days_overdue: prediction.days_overdue(as_of),
        })
        .collect()
}

/// People whose combined daily use explains `average_quantity` lasting
/// `mean_days`. Unknown products and degenerate intervals count as one person.
fn estimate_family_size(
    average_quantity: f64,
    mean_days: f64,
    profile: Option<&ConsumptionProfile>,
) -> u32 {
    let Some(profile) = profile else {
        return 1;
    };
    let daily_rate = profile.per_person_daily_consumption;
    if daily_rate <= 0.0 || mean_days <= 0.0 || !daily_rate.is_finite() {
        return 1;
    }

    let people = (average_quantity / (daily_rate * mean_days)).round();
    if !people.is_finite() || people < 1.0 {
        1
    } else {
        people.min(f64::from(u32::MAX)) as u32
    }
}
