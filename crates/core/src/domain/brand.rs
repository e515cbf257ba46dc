use serde::{Deserialize, Serialize};

use crate::domain::purchase::UserId;

/// Where the exploratory tier of a recommendation came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExploratorySource {
    /// Brands bought by the user's similarity cluster.
    SimilarUsers,
    /// Brands ranked by purchases of every user in the category.
    GlobalPopularity,
    /// The category has no history to draw from.
    None,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandRecommendation {
    pub user_id: UserId,
    pub category: String,
    /// Brands from the user's own history, most purchased first.
    pub primary_brands: Vec<String>,
    /// Brands the user has never bought, most popular first. Disjoint from
    /// `primary_brands`.
    pub exploratory_brands: Vec<String>,
    pub exploratory_source: ExploratorySource,
}

impl BrandRecommendation {
    pub fn empty(user_id: UserId, category: impl Into<String>) -> Self {
        Self {
            user_id,
            category: category.into(),
            primary_brands: Vec::new(),
            exploratory_brands: Vec::new(),
            exploratory_source: ExploratorySource::None,
        }
    }

    /// Caps each tier at `limit` entries, keeping tier order.
    pub fn truncated(mut self, limit: usize) -> Self {
        self.primary_brands.truncate(limit);
        self.exploratory_brands.truncate(limit);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.primary_brands.is_empty() && self.exploratory_brands.is_empty()
    }
}
