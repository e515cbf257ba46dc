use async_trait::async_trait;
use chrono::NaiveDateTime;
use thiserror::Error;

use cartwise_core::domain::purchase::UserId;
use cartwise_core::domain::restock::RestockPrediction;

pub mod memory;
pub mod prediction;

pub use memory::InMemoryPredictionCache;
pub use prediction::{predictions_with_cache, SqlPredictionCache};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Stored restock predictions keyed by the dataset fingerprint they were
/// computed from. Entries for any other fingerprint are stale.
#[async_trait]
pub trait PredictionCacheRepository: Send + Sync {
    /// Every cached prediction for `fingerprint`, with `is_overdue`
    /// re-evaluated against `as_of`. `None` when nothing is cached.
    async fn load(
        &self,
        fingerprint: &str,
        as_of: NaiveDateTime,
    ) -> Result<Option<Vec<RestockPrediction>>, RepositoryError>;

    async fn load_for_user(
        &self,
        fingerprint: &str,
        user_id: &UserId,
        as_of: NaiveDateTime,
    ) -> Result<Option<Vec<RestockPrediction>>, RepositoryError>;

    /// Replaces the whole cache with `predictions` computed for `fingerprint`.
    async fn store(
        &self,
        fingerprint: &str,
        predictions: &[RestockPrediction],
    ) -> Result<(), RepositoryError>;
}
