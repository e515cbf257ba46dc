//! CSV-backed tabular data source.
//!
//! Expected purchase columns (header names are case-sensitive, legacy export
//! aliases in parentheses):
//!   user_id (tid), product_name (PRODUCT_NAME), category (CATEGORY),
//!   subcategory (SUBCATEGORY), brand (BRAND), shipping_location
//!   (SHIPPING_LOCATION), purchase_date (RunDate), quantity (QUANTITY)
//!
//! Consumption columns: product_name (Product), per_person_daily_consumption.
//! Similar user columns: user_id, similar_user_id.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use cartwise_core::config::DataConfig;
use cartwise_core::dataset::{PurchaseDataset, SimilarityIndex};
use cartwise_core::domain::consumption::ConsumptionProfile;
use cartwise_core::domain::purchase::{PurchaseRecord, UserId};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d-%m-%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

#[derive(Debug, Error)]
pub enum DataLoadError {
    #[error("could not open `{path}`: {source}")]
    Open { path: PathBuf, source: std::io::Error },
    #[error("could not parse `{path}` at line {line}: {source}")]
    Parse { path: PathBuf, line: u64, source: csv::Error },
    #[error("invalid value in `{path}` at line {line}: {message}")]
    Invalid { path: PathBuf, line: u64, message: String },
}

/// Read-only access to the three startup tables.
pub trait TabularSource {
    fn load_purchase_history(&self) -> Result<Vec<PurchaseRecord>, DataLoadError>;
    fn load_consumption_profiles(&self) -> Result<Vec<ConsumptionProfile>, DataLoadError>;
    fn load_similar_users(&self) -> Result<SimilarityIndex, DataLoadError>;
}

#[derive(Clone, Debug)]
pub struct CsvTabularSource {
    purchases_path: PathBuf,
    consumption_path: PathBuf,
    similar_users_path: Option<PathBuf>,
}

impl CsvTabularSource {
    pub fn new(
        purchases_path: impl Into<PathBuf>,
        consumption_path: impl Into<PathBuf>,
        similar_users_path: Option<PathBuf>,
    ) -> Self {
        Self {
            purchases_path: purchases_path.into(),
            consumption_path: consumption_path.into(),
            similar_users_path,
        }
    }

    pub fn from_config(config: &DataConfig) -> Self {
        Self::new(
            config.purchases_path.clone(),
            config.consumption_path.clone(),
            config.similar_users_path.clone(),
        )
    }
}

impl TabularSource for CsvTabularSource {
    fn load_purchase_history(&self) -> Result<Vec<PurchaseRecord>, DataLoadError> {
        read_purchases(open(&self.purchases_path)?, &self.purchases_path)
    }

    fn load_consumption_profiles(&self) -> Result<Vec<ConsumptionProfile>, DataLoadError> {
        read_consumption_profiles(open(&self.consumption_path)?, &self.consumption_path)
    }

    fn load_similar_users(&self) -> Result<SimilarityIndex, DataLoadError> {
        match &self.similar_users_path {
            Some(path) => read_similar_users(open(path)?, path),
            None => Ok(SimilarityIndex::new()),
        }
    }
}

/// Loads every table and builds the shared snapshot. Any failure is fatal.
pub fn load_dataset(source: &dyn TabularSource) -> Result<PurchaseDataset, DataLoadError> {
    let started = Instant::now();
    info!(event_name = "dataset.load.started", "loading purchase dataset");

    let records = source.load_purchase_history()?;
    let profiles = source.load_consumption_profiles()?;
    let similar_users = source.load_similar_users()?;
    let dataset = PurchaseDataset::new(records, profiles, similar_users);

    info!(
        event_name = "dataset.load.completed",
        purchases = dataset.len(),
        users = dataset.users().len(),
        consumption_profiles = dataset.consumption_profile_count(),
        similarity_clusters = dataset.similarity_index().len(),
        fingerprint = %dataset.fingerprint(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "purchase dataset loaded"
    );
    Ok(dataset)
}

fn open(path: &Path) -> Result<File, DataLoadError> {
    File::open(path).map_err(|source| DataLoadError::Open { path: path.to_path_buf(), source })
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new().has_headers(true).trim(csv::Trim::All).from_reader(reader)
}

#[derive(Debug, Deserialize)]
struct PurchaseRow {
    #[serde(alias = "tid")]
    user_id: Option<String>,
    #[serde(alias = "PRODUCT_NAME")]
    product_name: Option<String>,
    #[serde(alias = "CATEGORY", default)]
    category: Option<String>,
    #[serde(alias = "SUBCATEGORY", default)]
    subcategory: Option<String>,
    #[serde(alias = "BRAND", default)]
    brand: Option<String>,
    #[serde(alias = "SHIPPING_LOCATION", default)]
    shipping_location: Option<String>,
    #[serde(alias = "RunDate")]
    purchase_date: Option<String>,
    #[serde(alias = "QUANTITY", default)]
    quantity: Option<u32>,
}

pub fn read_purchases<R: Read>(reader: R, origin: &Path) -> Result<Vec<PurchaseRecord>, DataLoadError> {
    let mut records = Vec::new();
    let mut skipped = 0_usize;

    for (index, result) in csv_reader(reader).deserialize::<PurchaseRow>().enumerate() {
        let line = index as u64 + 2;
        let row = result.map_err(|source| DataLoadError::Parse {
            path: origin.to_path_buf(),
            line,
            source,
        })?;

        let (Some(user_id), Some(product_name)) = (non_empty(row.user_id), non_empty(row.product_name))
        else {
            skipped += 1;
            continue;
        };

        let raw_date = non_empty(row.purchase_date).ok_or_else(|| DataLoadError::Invalid {
            path: origin.to_path_buf(),
            line,
            message: "purchase_date is required".to_string(),
        })?;
        let purchase_date = parse_purchase_date(&raw_date).ok_or_else(|| DataLoadError::Invalid {
            path: origin.to_path_buf(),
            line,
            message: format!("unrecognized purchase_date `{raw_date}` (expected YYYY-MM-DD)"),
        })?;

        records.push(PurchaseRecord {
            user_id: UserId::new(user_id),
            product_name,
            category: row.category.unwrap_or_default(),
            subcategory: row.subcategory.unwrap_or_default(),
            brand: row.brand.unwrap_or_default(),
            shipping_location: row.shipping_location.unwrap_or_default(),
            purchase_date,
            quantity: row.quantity.unwrap_or(1),
        });
    }

    if skipped > 0 {
        warn!(
            event_name = "dataset.load.rows_skipped",
            path = %origin.display(),
            skipped,
            "purchase rows without user_id or product_name were skipped"
        );
    }
    Ok(records)
}

#[derive(Debug, Deserialize)]
struct ConsumptionRow {
    #[serde(alias = "Product")]
    product_name: String,
    per_person_daily_consumption: f64,
}

pub fn read_consumption_profiles<R: Read>(
    reader: R,
    origin: &Path,
) -> Result<Vec<ConsumptionProfile>, DataLoadError> {
    let mut profiles = Vec::new();
    for (index, result) in csv_reader(reader).deserialize::<ConsumptionRow>().enumerate() {
        let line = index as u64 + 2;
        let row = result.map_err(|source| DataLoadError::Parse {
            path: origin.to_path_buf(),
            line,
            source,
        })?;

        if !row.per_person_daily_consumption.is_finite() || row.per_person_daily_consumption < 0.0
        {
            return Err(DataLoadError::Invalid {
                path: origin.to_path_buf(),
                line,
                message: format!(
                    "per_person_daily_consumption must be a non-negative number, got {}",
                    row.per_person_daily_consumption
                ),
            });
        }
        if row.product_name.is_empty() {
            continue;
        }

        profiles.push(ConsumptionProfile {
            product_name: row.product_name,
            per_person_daily_consumption: row.per_person_daily_consumption,
        });
    }
    Ok(profiles)
}

#[derive(Debug, Deserialize)]
struct SimilarUserRow {
    user_id: Option<String>,
    #[serde(alias = "similar_user")]
    similar_user_id: Option<String>,
}

pub fn read_similar_users<R: Read>(reader: R, origin: &Path) -> Result<SimilarityIndex, DataLoadError> {
    let mut index = SimilarityIndex::new();
    for (position, result) in csv_reader(reader).deserialize::<SimilarUserRow>().enumerate() {
        let row = result.map_err(|source| DataLoadError::Parse {
            path: origin.to_path_buf(),
            line: position as u64 + 2,
            source,
        })?;
        if let (Some(user), Some(similar)) = (non_empty(row.user_id), non_empty(row.similar_user_id))
        {
            index.insert(UserId::new(user), UserId::new(similar));
        }
    }
    Ok(index)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|raw| raw.trim().to_string()).filter(|raw| !raw.is_empty())
}

/// Calendar day of a purchase; any time of day is dropped.
pub fn parse_purchase_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
                .map(|value| value.date())
        })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use chrono::NaiveDate;
    use tempfile::TempDir;

    use cartwise_core::domain::purchase::UserId;

    use super::{
        load_dataset, parse_purchase_date, read_consumption_profiles, read_purchases,
        read_similar_users, CsvTabularSource, DataLoadError,
    };

    const PURCHASES: &str = "\
user_id,product_name,category,subcategory,brand,shipping_location,purchase_date,quantity
U1,1L Milk,Dairy,Milk,Amul,Los Angeles,2024-01-01,2
U1,1L Milk,Dairy,Milk,Amul,Los Angeles,2024-01-06,
,Ghost Row,Dairy,Milk,Amul,Los Angeles,2024-01-06,1
U2,Cola 500ml,Beverages,Soft Drinks,Coke,Fresno,2024-01-03 10:15:00,1
";

    #[test]
    fn purchases_parse_with_default_quantity_and_skip_incomplete_rows() {
        let records =
            read_purchases(PURCHASES.as_bytes(), Path::new("purchases.csv")).expect("parse");

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].quantity, 2);
        assert_eq!(records[1].quantity, 1);
        assert_eq!(records[2].user_id, UserId::new("U2"));
        assert_eq!(records[2].purchase_date, NaiveDate::from_ymd_opt(2024, 1, 3).expect("date"));
    }

    #[test]
    fn legacy_export_headers_are_accepted() {
        let csv = "\
tid,PRODUCT_NAME,CATEGORY,SUBCATEGORY,BRAND,SHIPPING_LOCATION,RunDate
77,Herbal Shampoo,Personal Care,Shampoo,Sunsilk,Austin,2023-11-30
";
        let records = read_purchases(csv.as_bytes(), Path::new("Our_dataset.csv")).expect("parse");

        assert_eq!(records[0].user_id.as_str(), "77");
        assert_eq!(records[0].subcategory, "Shampoo");
        assert_eq!(records[0].shipping_location, "Austin");
    }

    #[test]
    fn unparseable_date_is_fatal_with_line_number() {
        let csv = "\
user_id,product_name,brand,purchase_date
U1,1L Milk,Amul,2024-01-01
U1,1L Milk,Amul,yesterday
";
        let error = read_purchases(csv.as_bytes(), Path::new("p.csv")).unwrap_err();

        assert!(matches!(error, DataLoadError::Invalid { line: 3, .. }), "got {error:?}");
    }

    #[test]
    fn negative_consumption_rate_is_rejected() {
        let csv = "Product,per_person_daily_consumption\n1L Milk,-0.5\n";
        let error = read_consumption_profiles(csv.as_bytes(), Path::new("c.csv")).unwrap_err();

        assert!(matches!(error, DataLoadError::Invalid { line: 2, .. }));
    }

    #[test]
    fn similar_users_skip_blank_pairs() {
        let csv = "user_id,similar_user_id\nU1,U2\nU1,\nU3,U3\n";
        let index = read_similar_users(csv.as_bytes(), Path::new("s.csv")).expect("parse");

        assert_eq!(index.similar_to(&UserId::new("U1")).len(), 1);
        assert!(index.similar_to(&UserId::new("U3")).is_empty());
    }

    #[test]
    fn date_formats_cover_common_exports() {
        let expected = NaiveDate::from_ymd_opt(2024, 2, 29);
        assert_eq!(parse_purchase_date("2024-02-29"), expected);
        assert_eq!(parse_purchase_date("02/29/2024"), expected);
        assert_eq!(parse_purchase_date("2024-02-29T08:00:00"), expected);
        assert_eq!(parse_purchase_date("29th Feb"), None);
    }

    #[test]
    fn missing_file_fails_dataset_load() {
        let dir = TempDir::new().expect("tempdir");
        let source = CsvTabularSource::new(
            dir.path().join("missing.csv"),
            dir.path().join("consumption.csv"),
            None,
        );

        let error = load_dataset(&source).unwrap_err();
        assert!(matches!(error, DataLoadError::Open { .. }));
    }

    #[test]
    fn dataset_loads_from_files() {
        let dir = TempDir::new().expect("tempdir");
        let purchases = dir.path().join("purchases.csv");
        let consumption = dir.path().join("consumption.csv");
        let similar = dir.path().join("similar.csv");
        fs::write(&purchases, PURCHASES).expect("write purchases");
        fs::write(&consumption, "product_name,per_person_daily_consumption\n1L Milk,0.2\n")
            .expect("write consumption");
        fs::write(&similar, "user_id,similar_user_id\nU1,U2\n").expect("write similar");

        let dataset =
            load_dataset(&CsvTabularSource::new(purchases, consumption, Some(similar)))
                .expect("load");

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.consumption_profile_count(), 1);
        assert_eq!(dataset.similar_users(&UserId::new("U1")).len(), 1);
    }
}
