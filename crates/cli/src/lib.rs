pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use cartwise_core::domain::forecast::ForecastFilter;
use clap::{Args, Parser, Subcommand};

use commands::chat::ChatArgs;
use commands::forecast::ForecastArgs;
use commands::predict::PredictArgs;
use commands::recommend::RecommendArgs;
use commands::restock::RestockArgs;
use commands::usage::UsageArgs;
use commands::{CommandResult, DataOptions};

#[derive(Debug, Parser)]
#[command(
    name = "cartwise",
    about = "Cartwise operator CLI",
    long_about = "Restock predictions, brand suggestions, demand forecasts and chat over a purchase history.",
    after_help = "Examples:\n  cartwise predict --as-of 2024-01-20 --output predictions.csv\n  cartwise restock --user U1\n  cartwise chat --user U1 \"Suggest brands for cola\"\n  cartwise doctor --json"
)]
pub struct Cli {
    #[command(flatten)]
    data: DataArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct DataArgs {
    #[arg(long, global = true, help = "Config file (defaults to cartwise.toml or config/cartwise.toml)")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Purchase history CSV")]
    purchases: Option<PathBuf>,
    #[arg(long, global = true, help = "Consumption reference CSV")]
    consumption: Option<PathBuf>,
    #[arg(long, global = true, help = "Similar-users CSV")]
    similar_users: Option<PathBuf>,
}

impl DataArgs {
    fn options(&self) -> DataOptions {
        DataOptions {
            config_path: self.config.clone(),
            purchases: self.purchases.clone(),
            consumption: self.consumption.clone(),
            similar_users: self.similar_users.clone(),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Export restock predictions as CSV")]
    Predict {
        #[arg(long, help = "Only this user's predictions")]
        user: Option<String>,
        #[arg(long, help = "Reference date YYYY-MM-DD (defaults to now)")]
        as_of: Option<String>,
        #[arg(long, help = "Write the report here instead of stdout")]
        output: Option<PathBuf>,
        #[arg(long, help = "Bypass the SQLite prediction cache")]
        no_cache: bool,
    },
    #[command(about = "List a user's overdue products")]
    Restock {
        #[arg(long)]
        user: String,
        #[arg(long, help = "Reference date YYYY-MM-DD (defaults to now)")]
        as_of: Option<String>,
    },
    #[command(about = "Suggest brands for a product category")]
    Recommend {
        #[arg(long)]
        user: String,
        #[arg(help = "Free text naming the category, e.g. \"brands for cola\"")]
        query: String,
        #[arg(long, help = "Brands per tier (defaults to assistant.display_limit)")]
        limit: Option<usize>,
    },
    #[command(about = "Export the (location, product, month) demand forecast as CSV")]
    Forecast {
        #[arg(long, help = "Reference date YYYY-MM-DD (defaults to now)")]
        as_of: Option<String>,
        #[arg(long, help = "count or quantity (defaults to assistant.forecast_weighting)")]
        weighting: Option<String>,
        #[arg(long, help = "Keep rows for this shipping location (\"All\" keeps every location)")]
        location: Option<String>,
        #[arg(long, help = "Keep rows for this month, YYYY-MM")]
        month: Option<String>,
        #[arg(long, help = "Keep rows whose product name contains this text, case-insensitively")]
        product_search: Option<String>,
        #[arg(long, help = "Write the report here instead of stdout")]
        output: Option<PathBuf>,
        #[arg(long, help = "Bypass the SQLite prediction cache")]
        no_cache: bool,
    },
    #[command(about = "Purchase statistics for a product, or the most purchased products")]
    Usage {
        #[arg(long)]
        user: String,
        #[arg(long)]
        product: Option<String>,
        #[arg(long)]
        top: Option<usize>,
    },
    #[command(about = "Send one chat message through the query router")]
    Chat {
        #[arg(long)]
        user: String,
        message: String,
        #[arg(long, help = "Reference date YYYY-MM-DD for restock checks")]
        as_of: Option<String>,
    },
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
    #[command(about = "Validate config, dataset readability, cache database and AI readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let data = cli.data.options();

    let result = match cli.command {
        Command::Predict { user, as_of, output, no_cache } => {
            commands::predict::run(PredictArgs { data, user, as_of, output, no_cache })
        }
        Command::Restock { user, as_of } => {
            commands::restock::run(RestockArgs { data, user, as_of })
        }
        Command::Recommend { user, query, limit } => {
            commands::recommend::run(RecommendArgs { data, user, query, limit })
        }
        Command::Forecast { as_of, weighting, location, month, product_search, output, no_cache } => {
            commands::forecast::run(ForecastArgs {
                data,
                as_of,
                weighting,
                filter: ForecastFilter { location, month, product_search },
                output,
                no_cache,
            })
        }
        Command::Usage { user, product, top } => {
            commands::usage::run(UsageArgs { data, user, product, top })
        }
        Command::Chat { user, message, as_of } => {
            commands::chat::run(ChatArgs { data, user, message, as_of })
        }
        Command::Config => {
            CommandResult { exit_code: 0, output: commands::config::run(data.load_options()) }
        }
        Command::Doctor { json } => {
            let (exit_code, output) = commands::doctor::run(data.load_options(), json);
            CommandResult { exit_code, output }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
