use chrono::{NaiveDateTime, Utc};
use sqlx::Row;
use tracing::{info, warn};

use cartwise_core::dataset::PurchaseDataset;
use cartwise_core::domain::purchase::UserId;
use cartwise_core::domain::restock::{report_datetime, RestockPrediction};
use cartwise_core::restock::RestockEstimator;

use super::{PredictionCacheRepository, RepositoryError};
use crate::DbPool;

pub struct SqlPredictionCache {
    pool: DbPool,
}

impl SqlPredictionCache {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn has_run(&self, fingerprint: &str) -> Result<bool, RepositoryError> {
        let row = sqlx::query(
            "SELECT 1 AS present FROM restock_prediction_cache_run WHERE dataset_fingerprint = ?",
        )
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }
}

fn row_to_prediction(
    row: &sqlx::sqlite::SqliteRow,
    as_of: NaiveDateTime,
) -> Result<RestockPrediction, RepositoryError> {
    let user_id: String =
        row.try_get("user_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let product_name: String =
        row.try_get("product_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let estimated_family_size: i64 =
        row.try_get("estimated_family_size").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let mean_days_between_orders: f64 = row
        .try_get("mean_days_between_orders")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let predicted_next_date: String =
        row.try_get("predicted_next_date").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let predicted_next_date = report_datetime::parse(&predicted_next_date).ok_or_else(|| {
        RepositoryError::Decode(format!("invalid predicted_next_date `{predicted_next_date}`"))
    })?;
    let estimated_family_size = u32::try_from(estimated_family_size).map_err(|_| {
        RepositoryError::Decode(format!("invalid estimated_family_size {estimated_family_size}"))
    })?;

    let prediction = RestockPrediction {
        user_id: UserId::new(user_id),
        product_name,
        estimated_family_size,
        mean_days_between_orders,
        predicted_next_date,
        is_overdue: false,
    };
    Ok(prediction.reevaluate(as_of))
}

#[async_trait::async_trait]
impl PredictionCacheRepository for SqlPredictionCache {
    async fn load(
        &self,
        fingerprint: &str,
        as_of: NaiveDateTime,
    ) -> Result<Option<Vec<RestockPrediction>>, RepositoryError> {
        if !self.has_run(fingerprint).await? {
            return Ok(None);
        }

        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT user_id, product_name, estimated_family_size, mean_days_between_orders,
                    predicted_next_date
             FROM restock_prediction_cache
             WHERE dataset_fingerprint = ?
             ORDER BY position ASC",
        )
        .bind(fingerprint)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| row_to_prediction(row, as_of)).collect::<Result<Vec<_>, _>>().map(Some)
    }

    async fn load_for_user(
        &self,
        fingerprint: &str,
        user_id: &UserId,
        as_of: NaiveDateTime,
    ) -> Result<Option<Vec<RestockPrediction>>, RepositoryError> {
        if !self.has_run(fingerprint).await? {
            return Ok(None);
        }

        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT user_id, product_name, estimated_family_size, mean_days_between_orders,
                    predicted_next_date
             FROM restock_prediction_cache
             WHERE dataset_fingerprint = ? AND user_id = ?
             ORDER BY position ASC",
        )
        .bind(fingerprint)
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| row_to_prediction(row, as_of)).collect::<Result<Vec<_>, _>>().map(Some)
    }

    async fn store(
        &self,
        fingerprint: &str,
        predictions: &[RestockPrediction],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM restock_prediction_cache").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM restock_prediction_cache_run").execute(&mut *tx).await?;

        sqlx::query(
            "INSERT INTO restock_prediction_cache_run (dataset_fingerprint, prediction_count, computed_at)
             VALUES (?, ?, ?)",
        )
        .bind(fingerprint)
        .bind(predictions.len() as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for (position, prediction) in predictions.iter().enumerate() {
            sqlx::query(
                "INSERT INTO restock_prediction_cache (dataset_fingerprint, user_id, product_name,
                                                       estimated_family_size, mean_days_between_orders,
                                                       predicted_next_date, is_overdue, position)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(dataset_fingerprint, user_id, product_name) DO UPDATE SET
                     estimated_family_size = excluded.estimated_family_size,
                     mean_days_between_orders = excluded.mean_days_between_orders,
                     predicted_next_date = excluded.predicted_next_date,
                     is_overdue = excluded.is_overdue,
                     position = excluded.position",
            )
            .bind(fingerprint)
            .bind(prediction.user_id.as_str())
            .bind(&prediction.product_name)
            .bind(i64::from(prediction.estimated_family_size))
            .bind(prediction.mean_days_between_orders)
            .bind(report_datetime::format(&prediction.predicted_next_date))
            .bind(prediction.is_overdue)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

/// All predictions for the dataset, served from `cache` when its fingerprint
/// matches and recomputed (then stored) otherwise. A failing cache never
/// blocks the computation.
pub async fn predictions_with_cache(
    cache: &dyn PredictionCacheRepository,
    estimator: &RestockEstimator,
    dataset: &PurchaseDataset,
) -> Vec<RestockPrediction> {
    let fingerprint = dataset.fingerprint();
    match cache.load(fingerprint, estimator.as_of()).await {
        Ok(Some(predictions)) => {
            info!(
                event_name = "cache.predictions.hit",
                fingerprint,
                predictions = predictions.len(),
                "restock predictions served from cache"
            );
            return predictions;
        }
        Ok(None) => {
            info!(event_name = "cache.predictions.miss", fingerprint, "computing restock predictions");
        }
        Err(error) => {
            warn!(
                event_name = "cache.predictions.load_failed",
                fingerprint,
                error = %error,
                "prediction cache unreadable; recomputing"
            );
        }
    }

    let predictions = estimator.predict_all(dataset);
    if let Err(error) = cache.store(fingerprint, &predictions).await {
        warn!(
            event_name = "cache.predictions.store_failed",
            fingerprint,
            error = %error,
            "could not persist restock predictions"
        );
    }
    predictions
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use cartwise_core::domain::purchase::UserId;
    use cartwise_core::domain::restock::{start_of_day, RestockPrediction};

    use super::SqlPredictionCache;
    use crate::repositories::PredictionCacheRepository;
    use crate::{connect_with_settings, migrations};

    async fn cache() -> SqlPredictionCache {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlPredictionCache::new(pool)
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).expect("date")
    }

    fn prediction(user: &str, product: &str, mean: f64, time: NaiveTime) -> RestockPrediction {
        RestockPrediction {
            user_id: UserId::new(user),
            product_name: product.to_string(),
            estimated_family_size: 2,
            mean_days_between_orders: mean,
            predicted_next_date: date(16).and_time(time),
            is_overdue: false,
        }
    }

    #[tokio::test]
    async fn stored_predictions_round_trip_in_order() {
        let cache = cache().await;
        let noon = NaiveTime::from_hms_opt(12, 0, 0).expect("time");
        let stored = vec![
            prediction("U1", "Yogurt Cup", 5.5, noon),
            prediction("U1", "1L Milk", 5.0, NaiveTime::MIN),
        ];
        cache.store("fp-1", &stored).await.expect("store");

        let loaded = cache.load("fp-1", start_of_day(date(12))).await.expect("load");

        assert_eq!(loaded, Some(stored));
    }

    #[tokio::test]
    async fn unknown_fingerprint_is_a_miss() {
        let cache = cache().await;
        cache.store("fp-1", &[]).await.expect("store");

        assert_eq!(cache.load("fp-1", start_of_day(date(12))).await.expect("load"), Some(vec![]));
        assert_eq!(cache.load("fp-2", start_of_day(date(12))).await.expect("load"), None);
    }

    #[tokio::test]
    async fn overdue_is_reevaluated_on_load() {
        let cache = cache().await;
        cache
            .store("fp-1", &[prediction("U1", "1L Milk", 5.0, NaiveTime::MIN)])
            .await
            .expect("store");

        let later = cache
            .load_for_user("fp-1", &UserId::new("U1"), start_of_day(date(20)))
            .await
            .expect("load")
            .unwrap_or_default();
        let other_user = cache
            .load_for_user("fp-1", &UserId::new("U2"), start_of_day(date(20)))
            .await
            .expect("load")
            .unwrap_or_default();

        assert!(later[0].is_overdue);
        assert!(other_user.is_empty());
    }

    #[tokio::test]
    async fn new_fingerprint_replaces_old_rows() {
        let cache = cache().await;
        cache
            .store("fp-1", &[prediction("U1", "1L Milk", 5.0, NaiveTime::MIN)])
            .await
            .expect("store");
        cache
            .store("fp-2", &[prediction("U2", "1L Milk", 5.0, NaiveTime::MIN)])
            .await
            .expect("store");

        assert_eq!(cache.load("fp-1", start_of_day(date(12))).await.expect("load"), None);
        let current = cache.load("fp-2", start_of_day(date(12))).await.expect("load");
        assert_eq!(current.map(|p| p.len()), Some(1));
    }
}
