//! Descriptive statistics over a user's purchases of one product.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dataset::PurchaseDataset;
use crate::domain::normalize_key;
use crate::domain::purchase::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseFrequency {
    Weekly,
    Monthly,
    Quarterly,
    Rarely,
    Unknown,
}

impl PurchaseFrequency {
    /// Buckets the average span between purchase days.
    pub fn from_average_span(days: Option<f64>) -> Self {
        match days {
            Some(span) if span > 0.0 && span <= 7.0 => Self::Weekly,
            Some(span) if span > 0.0 && span <= 30.0 => Self::Monthly,
            Some(span) if span > 0.0 && span <= 90.0 => Self::Quarterly,
            Some(span) if span > 0.0 => Self::Rarely,
            _ => Self::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Weekly => "Weekly",
            Self::Monthly => "Monthly",
            Self::Quarterly => "Quarterly",
            Self::Rarely => "Rarely",
            Self::Unknown => "Unknown",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    /// Product name as first seen among the matches.
    pub product: String,
    pub total_purchases: usize,
    pub total_quantity: u64,
    pub average_quantity: f64,
    pub last_purchase: Option<NaiveDate>,
    pub frequency: PurchaseFrequency,
}

impl UsageSummary {
    pub fn is_empty(&self) -> bool {
        self.total_purchases == 0
    }
}

/// Summarizes every purchase line whose product name contains `keyword`,
/// case-insensitively.
pub fn product_usage(user_id: &UserId, keyword: &str, dataset: &PurchaseDataset) -> UsageSummary {
    let needle = normalize_key(keyword);
    let matches = dataset
        .records_for_user(user_id)
        .filter(|record| !needle.is_empty() && normalize_key(&record.product_name).contains(&needle))
        .collect::<Vec<_>>();

    let product = matches
        .first()
        .map(|record| record.product_name.trim().to_string())
        .unwrap_or_else(|| keyword.trim().to_string());
    let total_purchases = matches.len();
    let total_quantity = matches.iter().map(|record| u64::from(record.quantity)).sum::<u64>();
    let average_quantity = if total_purchases == 0 {
        0.0
    } else {
        total_quantity as f64 / total_purchases as f64
    };

    let days = matches.iter().map(|record| record.purchase_date).collect::<BTreeSet<_>>();
    let first = days.iter().next().copied();
    let last_purchase = days.iter().next_back().copied();
    let average_span = match (first, last_purchase) {
        (Some(first), Some(last)) if days.len() >= 2 => {
            Some((last - first).num_days() as f64 / (days.len() - 1) as f64)
        }
        _ => None,
    };

    UsageSummary {
        product,
        total_purchases,
        total_quantity,
        average_quantity,
        last_purchase,
        frequency: PurchaseFrequency::from_average_span(average_span),
    }
}

/// The user's most purchased products by line count, ties by name.
pub fn most_purchased(
    user_id: &UserId,
    limit: usize,
    dataset: &PurchaseDataset,
) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, (String, usize)> = HashMap::new();
    for record in dataset.records_for_user(user_id) {
        counts
            .entry(normalize_key(&record.product_name))
            .or_insert_with(|| (record.product_name.trim().to_string(), 0))
            .1 += 1;
    }

    let mut ranked = counts.into_values().collect::<Vec<_>>();
    ranked.sort_by(|left, right| right.1.cmp(&left.1).then(left.0.cmp(&right.0)));
    ranked.truncate(limit);
    ranked
}
