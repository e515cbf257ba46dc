use cartwise_agent::advice::{most_purchased_text, usage_summary_text};
use cartwise_core::usage::{most_purchased, product_usage};

use crate::commands::{load_config, load_purchases, parse_user, CommandResult, DataOptions};

const COMMAND: &str = "usage";

#[derive(Clone, Debug, Default)]
pub struct UsageArgs {
    pub data: DataOptions,
    pub user: String,
    /// Product keyword; without it the user's most purchased products are listed.
    pub product: Option<String>,
    pub top: Option<usize>,
}

pub fn run(args: UsageArgs) -> CommandResult {
    execute(args).unwrap_or_else(|failure| failure)
}

fn execute(args: UsageArgs) -> Result<CommandResult, CommandResult> {
    let user_id = parse_user(COMMAND, &args.user)?;
    let config = load_config(COMMAND, args.data.load_options())?;
    let dataset = load_purchases(COMMAND, &config)?;

    let message = match args.product.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        Some(product) => usage_summary_text(product, &product_usage(&user_id, product, &dataset)),
        None => {
            let limit = args.top.unwrap_or(config.assistant.display_limit);
            most_purchased_text(&most_purchased(&user_id, limit, &dataset))
        }
    };
    Ok(CommandResult::success(COMMAND, message))
}
