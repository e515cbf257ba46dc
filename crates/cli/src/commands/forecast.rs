use std::path::PathBuf;

use cartwise_core::demand::DemandAggregator;
use cartwise_core::domain::forecast::{DemandForecastRow, DemandWeighting, ForecastFilter};
use cartwise_core::restock::RestockEstimator;
use cartwise_db::{write_forecast, write_forecast_to_path, ReportError};

use crate::commands::predict::cached_predictions;
use crate::commands::{
    load_config, load_purchases, parse_as_of, CommandResult, DataOptions, EXIT_INVALID_INPUT,
    EXIT_REPORT,
};

const COMMAND: &str = "forecast";

#[derive(Clone, Debug, Default)]
pub struct ForecastArgs {
    pub data: DataOptions,
    pub as_of: Option<String>,
    /// `count` or `quantity`; the configured weighting when absent.
    pub weighting: Option<String>,
    pub filter: ForecastFilter,
    pub output: Option<PathBuf>,
    pub no_cache: bool,
}

pub fn run(args: ForecastArgs) -> CommandResult {
    execute(args).unwrap_or_else(|failure| failure)
}

fn execute(args: ForecastArgs) -> Result<CommandResult, CommandResult> {
    let config = load_config(COMMAND, args.data.load_options())?;
    let weighting = match args.weighting.as_deref() {
        Some(raw) => raw.parse::<DemandWeighting>().map_err(|message| {
            CommandResult::failure(COMMAND, "invalid_input", message, EXIT_INVALID_INPUT)
        })?,
        None => config.assistant.forecast_weighting,
    };
    args.filter.validate().map_err(|message| {
        CommandResult::failure(COMMAND, "invalid_input", message, EXIT_INVALID_INPUT)
    })?;
    let as_of = parse_as_of(COMMAND, args.as_of.as_deref())?;
    let dataset = load_purchases(COMMAND, &config)?;

    let estimator = RestockEstimator::new(as_of);
    let predictions = if args.no_cache {
        estimator.predict_all(&dataset)
    } else {
        cached_predictions(COMMAND, &config, &estimator, &dataset)?
    };
    let rows = args.filter.apply(DemandAggregator::new(weighting).forecast(&predictions, &dataset));

    render(&rows, args.output.as_ref())
}

fn render(rows: &[DemandForecastRow], output: Option<&PathBuf>) -> Result<CommandResult, CommandResult> {
    match output {
        Some(path) => {
            write_forecast_to_path(path, rows).map_err(report_failure)?;
            Ok(CommandResult::success(
                COMMAND,
                format!("wrote {} forecast rows to {}", rows.len(), path.display()),
            ))
        }
        None => {
            let mut buffer = Vec::new();
            write_forecast(&mut buffer, rows).map_err(report_failure)?;
            Ok(CommandResult::raw(String::from_utf8_lossy(&buffer).trim_end().to_string()))
        }
    }
}

fn report_failure(error: ReportError) -> CommandResult {
    CommandResult::failure(COMMAND, "report_write", error.to_string(), EXIT_REPORT)
}
