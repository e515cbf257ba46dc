//! Brand recommendations for a product category.
//!
//! Primary brands come from the user's own purchases in the category.
//! Exploratory brands are ones the user never bought: taken from the user's
//! similarity cluster first, and from overall category popularity when the
//! cluster has nothing to offer or the user has no history in the category.

pub mod category;

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use tracing::debug;

use crate::dataset::PurchaseDataset;
use crate::domain::brand::{BrandRecommendation, ExploratorySource};
use crate::domain::normalize_key;
use crate::domain::purchase::{PurchaseRecord, UserId};
use crate::errors::DomainError;

pub use category::{CategoryField, CategoryResolver, CategoryScope};

/// Default number of brands shown per tier by chat surfaces.
pub const DEFAULT_DISPLAY_LIMIT: usize = 5;

pub struct BrandRecommender<'a> {
    dataset: &'a PurchaseDataset,
}

impl<'a> BrandRecommender<'a> {
    pub fn new(dataset: &'a PurchaseDataset) -> Self {
        Self { dataset }
    }

    /// Resolves the category named in `query_text` and ranks brands in it.
    pub fn recommend(
        &self,
        user_id: &UserId,
        query_text: &str,
    ) -> Result<BrandRecommendation, DomainError> {
        let scope = self.dataset.category_resolver().resolve(query_text)?;
        Ok(self.recommend_in_scope(user_id, &scope))
    }

    pub fn recommend_in_scope(&self, user_id: &UserId, scope: &CategoryScope) -> BrandRecommendation {
        let in_scope = self.dataset.records_in_scope(scope).collect::<Vec<_>>();
        if in_scope.is_empty() {
            debug!(
                event_name = "brands.recommend.empty_category",
                user_id = %user_id,
                category = scope.label(),
                "category has no purchase history"
            );
            return BrandRecommendation::empty(user_id.clone(), scope.label());
        }

        let own = in_scope.iter().copied().filter(|record| &record.user_id == user_id);
        let primary = rank_brands(own, &BTreeSet::new());

        if primary.is_empty() {
            let exploratory = rank_brands(in_scope.iter().copied(), &BTreeSet::new());
            return BrandRecommendation {
                user_id: user_id.clone(),
                category: scope.label().to_string(),
                primary_brands: Vec::new(),
                exploratory_brands: exploratory,
                exploratory_source: ExploratorySource::GlobalPopularity,
            };
        }

        let tried = primary.iter().map(|brand| normalize_key(brand)).collect::<BTreeSet<_>>();
        let similar = self.dataset.similar_users(user_id);
        let from_cluster = rank_brands(
            in_scope.iter().copied().filter(|record| similar.contains(&record.user_id)),
            &tried,
        );

        let (exploratory, source) = if !from_cluster.is_empty() {
            (from_cluster, ExploratorySource::SimilarUsers)
        } else {
            let popular = rank_brands(in_scope.iter().copied(), &tried);
            let source = if popular.is_empty() {
                ExploratorySource::None
            } else {
                ExploratorySource::GlobalPopularity
            };
            (popular, source)
        };

        BrandRecommendation {
            user_id: user_id.clone(),
            category: scope.label().to_string(),
            primary_brands: primary,
            exploratory_brands: exploratory,
            exploratory_source: source,
        }
    }
}

#[derive(Debug)]
struct BrandTally {
    display: String,
    purchases: usize,
    latest: NaiveDate,
}

/// Ranks brands by purchase count, then most recent purchase, then name.
fn rank_brands<'r>(
    records: impl Iterator<Item = &'r PurchaseRecord>,
    excluded: &BTreeSet<String>,
) -> Vec<String> {
    let mut tallies: HashMap<String, BrandTally> = HashMap::new();
    for record in records {
        let key = normalize_key(&record.brand);
        if key.is_empty() || excluded.contains(&key) {
            continue;
        }
        let tally = tallies.entry(key).or_insert_with(|| BrandTally {
            display: record.brand.trim().to_string(),
            purchases: 0,
            latest: record.purchase_date,
        });
        tally.purchases += 1;
        tally.latest = tally.latest.max(record.purchase_date);
    }

    let mut ranked = tallies.into_values().collect::<Vec<_>>();
    ranked.sort_by(|left, right| {
        right
            .purchases
            .cmp(&left.purchases)
            .then(right.latest.cmp(&left.latest))
            .then(left.display.cmp(&right.display))
    });
    ranked.into_iter().map(|tally| tally.display).collect()
}
