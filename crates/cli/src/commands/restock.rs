use cartwise_agent::router::format_restock;
use cartwise_core::restock::RestockEstimator;

use crate::commands::{
    load_config, load_purchases, parse_as_of, parse_user, CommandResult, DataOptions,
};

const COMMAND: &str = "restock";

#[derive(Clone, Debug, Default)]
pub struct RestockArgs {
    pub data: DataOptions,
    pub user: String,
    pub as_of: Option<String>,
}

pub fn run(args: RestockArgs) -> CommandResult {
    execute(args).unwrap_or_else(|failure| failure)
}

fn execute(args: RestockArgs) -> Result<CommandResult, CommandResult> {
    let user_id = parse_user(COMMAND, &args.user)?;
    let config = load_config(COMMAND, args.data.load_options())?;
    let as_of = parse_as_of(COMMAND, args.as_of.as_deref())?;
    let dataset = load_purchases(COMMAND, &config)?;

    let due = RestockEstimator::new(as_of).due_for_restock(&user_id, &dataset);
    Ok(CommandResult::success(COMMAND, format_restock(&due)))
}
