use chrono::NaiveDateTime;
use tokio::sync::RwLock;

use cartwise_core::domain::purchase::UserId;
use cartwise_core::domain::restock::RestockPrediction;

use super::{PredictionCacheRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryPredictionCache {
    entry: RwLock<Option<(String, Vec<RestockPrediction>)>>,
}

impl InMemoryPredictionCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PredictionCacheRepository for InMemoryPredictionCache {
    async fn load(
        &self,
        fingerprint: &str,
        as_of: NaiveDateTime,
    ) -> Result<Option<Vec<RestockPrediction>>, RepositoryError> {
        let entry = self.entry.read().await;
        Ok(entry.as_ref().filter(|(stored, _)| stored == fingerprint).map(|(_, predictions)| {
            predictions.iter().cloned().map(|prediction| prediction.reevaluate(as_of)).collect()
        }))
    }

    async fn load_for_user(
        &self,
        fingerprint: &str,
        user_id: &UserId,
        as_of: NaiveDateTime,
    ) -> Result<Option<Vec<RestockPrediction>>, RepositoryError> {
        let entry = self.entry.read().await;
        Ok(entry.as_ref().filter(|(stored, _)| stored == fingerprint).map(|(_, predictions)| {
            predictions
                .iter()
                .filter(|prediction| &prediction.user_id == user_id)
                .cloned()
                .map(|prediction| prediction.reevaluate(as_of))
                .collect()
        }))
    }

    async fn store(
        &self,
        fingerprint: &str,
        predictions: &[RestockPrediction],
    ) -> Result<(), RepositoryError> {
        let mut entry = self.entry.write().await;
        *entry = Some((fingerprint.to_string(), predictions.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use cartwise_core::domain::purchase::UserId;
    use cartwise_core::domain::restock::{start_of_day, RestockPrediction};

    use crate::repositories::{InMemoryPredictionCache, PredictionCacheRepository};

    fn day(d: u32) -> chrono::NaiveDateTime {
        start_of_day(NaiveDate::from_ymd_opt(2024, 1, d).expect("date"))
    }

    fn milk(user: &str) -> RestockPrediction {
        RestockPrediction {
            user_id: UserId::new(user),
            product_name: "1L Milk".to_string(),
            estimated_family_size: 2,
            mean_days_between_orders: 5.0,
            predicted_next_date: day(16),
            is_overdue: false,
        }
    }

    #[tokio::test]
    async fn load_misses_on_other_fingerprint() {
        let cache = InMemoryPredictionCache::new();
        cache.store("fp-1", &[milk("U1")]).await.expect("store");

        assert!(cache.load("fp-2", day(12)).await.expect("load").is_none());
        assert_eq!(cache.load("fp-1", day(12)).await.expect("load").map(|p| p.len()), Some(1));
    }

    #[tokio::test]
    async fn load_reevaluates_overdue_flag() {
        let cache = InMemoryPredictionCache::new();
        cache.store("fp-1", &[milk("U1"), milk("U2")]).await.expect("store");

        let loaded = cache
            .load_for_user("fp-1", &UserId::new("U2"), day(20))
            .await
            .expect("load")
            .unwrap_or_default();

        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].is_overdue);
    }

    #[tokio::test]
    async fn new_fingerprint_replaces_previous_entry() {
        let cache = InMemoryPredictionCache::new();
        cache.store("fp-1", &[milk("U1")]).await.expect("store");
        cache.store("fp-2", &[]).await.expect("store");

        assert!(cache.load("fp-1", day(12)).await.expect("load").is_none());
        assert_eq!(cache.load("fp-2", day(12)).await.expect("load"), Some(Vec::new()));
    }
}
