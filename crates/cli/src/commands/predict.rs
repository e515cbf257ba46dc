use std::path::PathBuf;

use tracing::warn;

use cartwise_core::config::AppConfig;
use cartwise_core::dataset::PurchaseDataset;
use cartwise_core::domain::restock::RestockPrediction;
use cartwise_core::restock::RestockEstimator;
use cartwise_db::{
    connect, migrations, predictions_with_cache, write_predictions, write_predictions_to_path,
    ReportError, SqlPredictionCache,
};

use crate::commands::{
    load_config, load_purchases, parse_as_of, parse_user, runtime, CommandResult, DataOptions,
    EXIT_REPORT,
};

#[derive(Clone, Debug, Default)]
pub struct PredictArgs {
    pub data: DataOptions,
    pub user: Option<String>,
    pub as_of: Option<String>,
    pub output: Option<PathBuf>,
    pub no_cache: bool,
}

const COMMAND: &str = "predict";

pub fn run(args: PredictArgs) -> CommandResult {
    execute(args).unwrap_or_else(|failure| failure)
}

fn execute(args: PredictArgs) -> Result<CommandResult, CommandResult> {
    let config = load_config(COMMAND, args.data.load_options())?;
    let as_of = parse_as_of(COMMAND, args.as_of.as_deref())?;
    let dataset = load_purchases(COMMAND, &config)?;
    let estimator = RestockEstimator::new(as_of);

    let predictions = match &args.user {
        Some(user) => estimator.predict_for_user(&parse_user(COMMAND, user)?, &dataset),
        None if args.no_cache => estimator.predict_all(&dataset),
        None => cached_predictions(COMMAND, &config, &estimator, &dataset)?,
    };

    render(&predictions, args.output.as_ref())
}

/// All predictions through the SQLite cache; an unreachable cache database
/// falls back to direct computation.
pub(crate) fn cached_predictions(
    command: &str,
    config: &AppConfig,
    estimator: &RestockEstimator,
    dataset: &PurchaseDataset,
) -> Result<Vec<RestockPrediction>, CommandResult> {
    let runtime = runtime(command)?;
    Ok(runtime.block_on(async {
        let pool = match connect(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                warn!(
                    event_name = "cache.database.unavailable",
                    error = %error,
                    "prediction cache unavailable; computing directly"
                );
                return estimator.predict_all(dataset);
            }
        };
        if let Err(error) = migrations::run_pending(&pool).await {
            warn!(
                event_name = "cache.database.migration_failed",
                error = %error,
                "prediction cache schema unavailable; computing directly"
            );
            pool.close().await;
            return estimator.predict_all(dataset);
        }

        let cache = SqlPredictionCache::new(pool.clone());
        let predictions = predictions_with_cache(&cache, estimator, dataset).await;
        pool.close().await;
        predictions
    }))
}

fn render(
    predictions: &[RestockPrediction],
    output: Option<&PathBuf>,
) -> Result<CommandResult, CommandResult> {
    match output {
        Some(path) => {
            write_predictions_to_path(path, predictions).map_err(report_failure)?;
            Ok(CommandResult::success(
                COMMAND,
                format!("wrote {} predictions to {}", predictions.len(), path.display()),
            ))
        }
        None => {
            let mut buffer = Vec::new();
            write_predictions(&mut buffer, predictions).map_err(report_failure)?;
            Ok(CommandResult::raw(String::from_utf8_lossy(&buffer).trim_end().to_string()))
        }
    }
}

fn report_failure(error: ReportError) -> CommandResult {
    CommandResult::failure(COMMAND, "report_write", error.to_string(), EXIT_REPORT)
}
