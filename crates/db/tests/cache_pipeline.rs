use std::fs;

use chrono::NaiveDate;
use tempfile::TempDir;

use cartwise_core::domain::restock::start_of_day;
use cartwise_core::restock::RestockEstimator;
use cartwise_db::{
    connect_with_settings, load_dataset, migrations, predictions_with_cache, write_predictions,
    CsvTabularSource, InMemoryPredictionCache, PredictionCacheRepository, SqlPredictionCache,
};

const CONSUMPTION: &str = "product_name,per_person_daily_consumption\n1L Milk,0.1\n";

fn write_dataset(dir: &TempDir, purchases: &str) -> CsvTabularSource {
    let purchases_path = dir.path().join("purchases.csv");
    let consumption_path = dir.path().join("consumption.csv");
    fs::write(&purchases_path, purchases).expect("write purchases");
    fs::write(&consumption_path, CONSUMPTION).expect("write consumption");
    CsvTabularSource::new(purchases_path, consumption_path, None)
}

const BASE_HISTORY: &str = "\
user_id,product_name,category,subcategory,brand,shipping_location,purchase_date,quantity
U1,1L Milk,Dairy,Milk,Amul,Los Angeles,2024-01-01,2
U1,1L Milk,Dairy,Milk,Amul,Los Angeles,2024-01-06,2
U1,1L Milk,Dairy,Milk,Amul,Los Angeles,2024-01-11,2
U1,Cola 500ml,Beverages,Soft Drinks,Coke,Los Angeles,2024-01-03,1
";

#[tokio::test]
async fn cache_is_reused_until_history_changes() {
    let dir = TempDir::new().expect("tempdir");
    let estimator =
        RestockEstimator::new(start_of_day(NaiveDate::from_ymd_opt(2024, 1, 12).expect("date")));

    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    let cache = SqlPredictionCache::new(pool);

    let first = load_dataset(&write_dataset(&dir, BASE_HISTORY)).expect("load");
    let computed = predictions_with_cache(&cache, &estimator, &first).await;
    assert_eq!(computed.len(), 1);
    assert_eq!(computed[0].estimated_family_size, 4);

    let cached = cache.load(first.fingerprint(), estimator.as_of()).await.expect("load cache");
    assert_eq!(cached, Some(computed.clone()));

    let grown_history = format!(
        "{BASE_HISTORY}U1,Cola 500ml,Beverages,Soft Drinks,Coke,Los Angeles,2024-01-10,1\n"
    );
    let second = load_dataset(&write_dataset(&dir, &grown_history)).expect("reload");
    assert_ne!(first.fingerprint(), second.fingerprint());

    let recomputed = predictions_with_cache(&cache, &estimator, &second).await;
    assert_eq!(recomputed.len(), 2);
    assert!(cache.load(first.fingerprint(), estimator.as_of()).await.expect("load").is_none());
}

#[tokio::test]
async fn in_memory_cache_matches_sql_semantics() {
    let dir = TempDir::new().expect("tempdir");
    let dataset = load_dataset(&write_dataset(&dir, BASE_HISTORY)).expect("load");
    let estimator =
        RestockEstimator::new(start_of_day(NaiveDate::from_ymd_opt(2024, 1, 20).expect("date")));
    let cache = InMemoryPredictionCache::new();

    let predictions = predictions_with_cache(&cache, &estimator, &dataset).await;
    let served = predictions_with_cache(&cache, &estimator, &dataset).await;

    assert_eq!(predictions, served);
    assert!(served[0].is_overdue);
}

#[tokio::test]
async fn cached_fractional_projection_matches_fresh_computation() {
    let dir = TempDir::new().expect("tempdir");
    let history = [
        "2024-01-01", "2024-01-08", "2024-01-15", "2024-01-22", "2024-01-29", "2024-02-05",
        "2024-02-12", "2024-02-20",
    ]
    .iter()
    .fold(
        "user_id,product_name,category,subcategory,brand,shipping_location,purchase_date,quantity\n"
            .to_string(),
        |mut csv, day| {
            csv.push_str(&format!("U1,1L Milk,Dairy,Milk,Amul,Los Angeles,{day},1\n"));
            csv
        },
    );
    let dataset = load_dataset(&write_dataset(&dir, &history)).expect("load");
    let estimator =
        RestockEstimator::new(start_of_day(NaiveDate::from_ymd_opt(2024, 3, 1).expect("date")));
    let fresh = estimator.predict_all(&dataset);

    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    let cache = SqlPredictionCache::new(pool);
    let stored = predictions_with_cache(&cache, &estimator, &dataset).await;
    let served = predictions_with_cache(&cache, &estimator, &dataset).await;

    assert_eq!(stored, fresh);
    assert_eq!(served, fresh);

    let mut report = Vec::new();
    write_predictions(&mut report, &served).expect("report");
    let report = String::from_utf8(report).expect("utf8");
    assert!(report.contains("2024-02-27 03:25:42.857"), "{report}");
}
