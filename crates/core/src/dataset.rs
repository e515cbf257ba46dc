//! In-memory snapshot of the tabular data source.
//!
//! A `PurchaseDataset` is built once at startup from the loaded purchase
//! history, consumption reference table and similarity lookup, then shared
//! read-only (typically behind an `Arc`) by every request.

use std::collections::{BTreeSet, HashMap};

use crate::brands::category::{CategoryResolver, CategoryScope};
use crate::domain::consumption::ConsumptionProfile;
use crate::domain::normalize_key;
use crate::domain::purchase::{PurchaseRecord, UserId};

static NO_SIMILAR_USERS: BTreeSet<UserId> = BTreeSet::new();

/// Most product names a search returns.
pub const PRODUCT_SEARCH_LIMIT: usize = 10;

/// Precomputed similarity clusters keyed by user.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimilarityIndex {
    clusters: HashMap<UserId, BTreeSet<UserId>>,
}

impl SimilarityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `similar` belongs to the cluster of `user`. Self-links are ignored.
    pub fn insert(&mut self, user: UserId, similar: UserId) {
        if user == similar {
            return;
        }
        self.clusters.entry(user).or_default().insert(similar);
    }

    pub fn similar_to(&self, user: &UserId) -> &BTreeSet<UserId> {
        self.clusters.get(user).unwrap_or(&NO_SIMILAR_USERS)
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

impl FromIterator<(UserId, UserId)> for SimilarityIndex {
    fn from_iter<I: IntoIterator<Item = (UserId, UserId)>>(iter: I) -> Self {
        let mut index = Self::new();
        for (user, similar) in iter {
            index.insert(user, similar);
        }
        index
    }
}

#[derive(Clone, Debug)]
pub struct PurchaseDataset {
    records: Vec<PurchaseRecord>,
    by_user: HashMap<UserId, Vec<usize>>,
    profiles: HashMap<String, ConsumptionProfile>,
    similar_users: SimilarityIndex,
    resolver: CategoryResolver,
    fingerprint: String,
}

impl PurchaseDataset {
    pub fn new(
        records: Vec<PurchaseRecord>,
        profiles: Vec<ConsumptionProfile>,
        similar_users: SimilarityIndex,
    ) -> Self {
        let mut by_user: HashMap<UserId, Vec<usize>> = HashMap::new();
        for (index, record) in records.iter().enumerate() {
            by_user.entry(record.user_id.clone()).or_default().push(index);
        }

        let profiles = profiles
            .into_iter()
            .map(|profile| (normalize_key(&profile.product_name), profile))
            .collect::<HashMap<_, _>>();

        let resolver = CategoryResolver::from_records(&records);
        let fingerprint = fingerprint(&records, &profiles);

        Self { records, by_user, profiles, similar_users, resolver, fingerprint }
    }

    pub fn records(&self) -> &[PurchaseRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every user with at least one purchase, in ascending id order.
    pub fn users(&self) -> Vec<&UserId> {
        let mut users = self.by_user.keys().collect::<Vec<_>>();
        users.sort();
        users
    }

    pub fn records_for_user<'a>(
        &'a self,
        user_id: &UserId,
    ) -> impl Iterator<Item = &'a PurchaseRecord> + 'a {
        self.by_user
            .get(user_id)
            .map(|indexes| indexes.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(move |index| &self.records[*index])
    }

    pub fn records_in_scope<'a>(
        &'a self,
        scope: &'a CategoryScope,
    ) -> impl Iterator<Item = &'a PurchaseRecord> + 'a {
        self.records.iter().filter(move |record| scope.matches(record))
    }

    pub fn consumption_profile(&self, product_name: &str) -> Option<&ConsumptionProfile> {
        self.profiles.get(&normalize_key(product_name))
    }

    pub fn consumption_profile_count(&self) -> usize {
        self.profiles.len()
    }

    pub fn similarity_index(&self) -> &SimilarityIndex {
        &self.similar_users
    }

    pub fn similar_users(&self, user_id: &UserId) -> &BTreeSet<UserId> {
        self.similar_users.similar_to(user_id)
    }

    pub fn category_resolver(&self) -> &CategoryResolver {
        &self.resolver
    }

    /// Latest known shipping location for a (user, product) pair, falling back
    /// to the user's most recent purchase of anything.
    pub fn shipping_location(&self, user_id: &UserId, product_name: &str) -> Option<&str> {
        let product_key = normalize_key(product_name);
        let latest_for_product = self
            .records_for_user(user_id)
            .filter(|record| normalize_key(&record.product_name) == product_key)
            .max_by_key(|record| record.purchase_date);

        latest_for_product
            .or_else(|| self.records_for_user(user_id).max_by_key(|record| record.purchase_date))
            .map(|record| record.shipping_location.as_str())
            .filter(|location| !location.is_empty())
    }

    /// Distinct product names containing `term`, case-insensitively, in
    /// first-seen order. A blank term matches nothing.
    pub fn search_products(&self, term: &str, limit: usize) -> Vec<&str> {
        let needle = normalize_key(term);
        if needle.is_empty() {
            return Vec::new();
        }

        let mut seen = BTreeSet::new();
        self.records
            .iter()
            .map(|record| record.product_name.trim())
            .filter(|name| name.to_lowercase().contains(&needle))
            .filter(|name| seen.insert(normalize_key(name)))
            .take(limit)
            .collect()
    }

    /// Content hash over purchases and consumption profiles. Any change to
    /// the history produces a different value.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

fn fingerprint(records: &[PurchaseRecord], profiles: &HashMap<String, ConsumptionProfile>) -> String {
    let mut lines = records
        .iter()
        .map(|record| {
            format!(
                "{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}",
                record.user_id,
                record.product_name,
                record.category,
                record.subcategory,
                record.brand,
                record.shipping_location,
                record.purchase_date,
                record.quantity
            )
        })
        .collect::<Vec<_>>();
    lines.sort();

    let mut profile_lines = profiles
        .iter()
        .map(|(key, profile)| format!("{key}\u{1f}{}", profile.per_person_daily_consumption))
        .collect::<Vec<_>>();
    profile_lines.sort();

    let mut hasher = blake3::Hasher::new();
    for line in &lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(b"--profiles--\n");
    for line in &profile_lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::NaiveDate;

    use crate::domain::purchase::{PurchaseRecord, UserId};

    pub fn record(
        user: &str,
        product: &str,
        brand: &str,
        date: (i32, u32, u32),
        quantity: u32,
    ) -> PurchaseRecord {
        let (category, subcategory) = match product {
            "1L Milk" | "Yogurt Cup" | "Cheese 200g" => ("Dairy", "Milk"),
            "Herbal Shampoo" | "Anti-dandruff" => ("Personal Care", "Shampoo"),
            "Mint Toothpaste" | "Charcoal Paste" => ("Personal Care", "Toothpaste"),
            "Cola 500ml" | "Energy Drink" => ("Beverages", "Soft Drinks"),
            _ => ("Household", "General"),
        };
        PurchaseRecord {
            user_id: UserId::new(user),
            product_name: product.to_string(),
            category: category.to_string(),
            subcategory: subcategory.to_string(),
            brand: brand.to_string(),
            shipping_location: "Los Angeles".to_string(),
            purchase_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).expect("valid date"),
            quantity,
        }
    }
}
