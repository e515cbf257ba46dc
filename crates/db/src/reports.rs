//! CSV exports consumed by warehouse planning.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use cartwise_core::domain::forecast::DemandForecastRow;
use cartwise_core::domain::restock::RestockPrediction;

pub const PREDICTION_COLUMNS: &[&str] = &[
    "user_id",
    "product_name",
    "estimated_family_size",
    "mean_days_between_orders",
    "predicted_next_date",
    "is_overdue",
];

pub const FORECAST_COLUMNS: &[&str] =
    &["shipping_location", "product_name", "month", "expected_units"];

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("could not create report `{path}`: {source}")]
    Create { path: PathBuf, source: std::io::Error },
    #[error("could not write report: {0}")]
    Csv(#[from] csv::Error),
    #[error("could not flush report: {0}")]
    Flush(#[from] std::io::Error),
}

pub fn write_predictions<W: Write>(
    writer: W,
    predictions: &[RestockPrediction],
) -> Result<(), ReportError> {
    write_rows(writer, PREDICTION_COLUMNS, predictions)
}

pub fn write_forecast<W: Write>(writer: W, rows: &[DemandForecastRow]) -> Result<(), ReportError> {
    write_rows(writer, FORECAST_COLUMNS, rows)
}

pub fn write_predictions_to_path(
    path: &Path,
    predictions: &[RestockPrediction],
) -> Result<(), ReportError> {
    write_predictions(create(path)?, predictions)
}

pub fn write_forecast_to_path(path: &Path, rows: &[DemandForecastRow]) -> Result<(), ReportError> {
    write_forecast(create(path)?, rows)
}

fn create(path: &Path) -> Result<File, ReportError> {
    File::create(path).map_err(|source| ReportError::Create { path: path.to_path_buf(), source })
}

/// Header is written explicitly so an empty report still carries its columns.
fn write_rows<W: Write, T: Serialize>(
    writer: W,
    columns: &[&str],
    rows: &[T],
) -> Result<(), ReportError> {
    let mut csv_writer = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    csv_writer.write_record(columns)?;
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}
