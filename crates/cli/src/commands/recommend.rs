use cartwise_agent::router::format_brands;
use cartwise_core::brands::BrandRecommender;

use crate::commands::{
    load_config, load_purchases, parse_user, CommandResult, DataOptions, EXIT_INVALID_INPUT,
};

const COMMAND: &str = "recommend";

#[derive(Clone, Debug, Default)]
pub struct RecommendArgs {
    pub data: DataOptions,
    pub user: String,
    pub query: String,
    pub limit: Option<usize>,
}

pub fn run(args: RecommendArgs) -> CommandResult {
    execute(args).unwrap_or_else(|failure| failure)
}

fn execute(args: RecommendArgs) -> Result<CommandResult, CommandResult> {
    let user_id = parse_user(COMMAND, &args.user)?;
    let config = load_config(COMMAND, args.data.load_options())?;
    let dataset = load_purchases(COMMAND, &config)?;
    let limit = args.limit.unwrap_or(config.assistant.display_limit);

    match BrandRecommender::new(&dataset).recommend(&user_id, &args.query) {
        Ok(recommendation) => {
            Ok(CommandResult::success(COMMAND, format_brands(&recommendation.truncated(limit))))
        }
        Err(error) => Err(CommandResult::failure(
            COMMAND,
            "ambiguous_query",
            error.clarification().unwrap_or_else(|| error.to_string()),
            EXIT_INVALID_INPUT,
        )),
    }
}
