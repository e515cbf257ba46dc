pub mod connection;
pub mod migrations;
pub mod reports;
pub mod repositories;
pub mod source;

pub use connection::{connect, connect_with_settings, DbPool};
pub use reports::{
    write_forecast, write_forecast_to_path, write_predictions, write_predictions_to_path, ReportError,
};
pub use repositories::{
    predictions_with_cache, InMemoryPredictionCache, PredictionCacheRepository, RepositoryError,
    SqlPredictionCache,
};
pub use source::{load_dataset, CsvTabularSource, DataLoadError, TabularSource};
