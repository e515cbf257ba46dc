use std::sync::Arc;

use cartwise_agent::prompts::PromptError;
use cartwise_agent::ChatRouter;
use cartwise_core::config::AppConfig;
use cartwise_db::{
    connect, load_dataset, migrations, CsvTabularSource, DataLoadError, DbPool,
    InMemoryPredictionCache, PredictionCacheRepository, SqlPredictionCache,
};
use thiserror::Error;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub chat_router: Arc<ChatRouter>,
    pub prediction_cache: Arc<dyn PredictionCacheRepository>,
    /// `None` when the cache database was unreachable and the in-memory cache
    /// is serving instead.
    pub db_pool: Option<DbPool>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("dataset load failed: {0}")]
    DataLoad(#[from] DataLoadError),
    #[error("prompt templates failed to load: {0}")]
    Prompts(#[from] PromptError),
}

/// The dataset is required; the prediction cache database is not.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        purchases_path = %config.data.purchases_path.display(),
        "starting application bootstrap"
    );

    let dataset = Arc::new(load_dataset(&CsvTabularSource::from_config(&config.data))?);
    info!(
        event_name = "system.bootstrap.dataset_loaded",
        correlation_id = "bootstrap",
        records = dataset.len(),
        users = dataset.users().len(),
        "purchase dataset loaded"
    );

    let (prediction_cache, db_pool) = open_prediction_cache(&config).await;

    let chat_router = Arc::new(ChatRouter::from_config(dataset, &config)?);
    info!(
        event_name = "system.bootstrap.router_ready",
        correlation_id = "bootstrap",
        ai_enabled = chat_router.ai_enabled(),
        "chat router initialized"
    );

    Ok(Application { config, chat_router, prediction_cache, db_pool })
}

async fn open_prediction_cache(
    config: &AppConfig,
) -> (Arc<dyn PredictionCacheRepository>, Option<DbPool>) {
    let pool = match connect(&config.database).await {
        Ok(pool) => pool,
        Err(error) => {
            warn!(
                event_name = "system.bootstrap.cache_fallback",
                correlation_id = "bootstrap",
                error = %error,
                "cache database unreachable; using in-memory prediction cache"
            );
            return (Arc::new(InMemoryPredictionCache::new()), None);
        }
    };

    if let Err(error) = migrations::run_pending(&pool).await {
        warn!(
            event_name = "system.bootstrap.cache_fallback",
            correlation_id = "bootstrap",
            error = %error,
            "cache migrations failed; using in-memory prediction cache"
        );
        pool.close().await;
        return (Arc::new(InMemoryPredictionCache::new()), None);
    }

    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "prediction cache database ready"
    );
    (Arc::new(SqlPredictionCache::new(pool.clone())), Some(pool))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use cartwise_core::config::{AppConfig, ConfigOverrides, LoadOptions};

    use crate::bootstrap::{bootstrap_with_config, Application, BootstrapError};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("cartwise-server-{name}-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).expect("scratch dir");
        dir
    }

    async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
        bootstrap_with_config(AppConfig::load(options).expect("config")).await
    }

    fn options(dir: &std::path::Path, database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                purchases_path: Some(dir.join("purchases.csv")),
                consumption_path: Some(dir.join("consumption.csv")),
                database_url: Some(database_url.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_when_purchase_file_is_missing() {
        let dir = scratch_dir("missing");

        let result = bootstrap(options(&dir, "sqlite::memory:")).await;

        assert!(matches!(result, Err(BootstrapError::DataLoad(_))));
        fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn bootstrap_wires_dataset_router_and_sql_cache() {
        let dir = scratch_dir("ready");
        fs::write(
            dir.join("purchases.csv"),
            "user_id,product_name,category,subcategory,brand,shipping_location,purchase_date,quantity\n\
             U1,1L Milk,Dairy,Milk,Amul,Austin,2024-01-01,1\n\
             U1,1L Milk,Dairy,Milk,Amul,Austin,2024-01-06,1\n",
        )
        .expect("purchases");
        fs::write(dir.join("consumption.csv"), "product_name,per_person_daily_consumption\n")
            .expect("consumption");

        let app = bootstrap(options(&dir, "sqlite::memory:")).await.expect("bootstrap");

        assert_eq!(app.chat_router.dataset().len(), 2);
        assert!(!app.chat_router.ai_enabled());
        let pool = app.db_pool.expect("sql cache should be active");
        let (tables,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name = 'restock_prediction_cache'",
        )
        .fetch_one(&pool)
        .await
        .expect("cache table lookup");
        assert_eq!(tables, 1);

        pool.close().await;
        fs::remove_dir_all(dir).ok();
    }
}
