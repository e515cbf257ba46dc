use std::sync::Arc;

use serde::Serialize;

use cartwise_agent::router::{ChatReply, ChatRouter, RouterSettings};
use cartwise_agent::llm::build_client;

use crate::commands::{
    load_config, load_purchases, parse_as_of, parse_user, runtime, CommandResult, DataOptions,
    EXIT_RUNTIME,
};

const COMMAND: &str = "chat";

#[derive(Clone, Debug, Default)]
pub struct ChatArgs {
    pub data: DataOptions,
    pub user: String,
    pub message: String,
    pub as_of: Option<String>,
}

#[derive(Serialize)]
struct ChatOutput<'a> {
    command: &'a str,
    status: &'a str,
    #[serde(flatten)]
    reply: &'a ChatReply,
}

pub fn run(args: ChatArgs) -> CommandResult {
    execute(args).unwrap_or_else(|failure| failure)
}

fn execute(args: ChatArgs) -> Result<CommandResult, CommandResult> {
    let user_id = parse_user(COMMAND, &args.user)?;
    let config = load_config(COMMAND, args.data.load_options())?;
    let as_of = args.as_of.as_deref().map(|raw| parse_as_of(COMMAND, Some(raw))).transpose()?;
    let dataset = Arc::new(load_purchases(COMMAND, &config)?);

    let settings = RouterSettings { as_of, ..RouterSettings::from_config(&config) };
    let router = ChatRouter::new(dataset, build_client(&config.llm), settings).map_err(|error| {
        CommandResult::failure(COMMAND, "prompt_templates", error.to_string(), EXIT_RUNTIME)
    })?;

    let reply = runtime(COMMAND)?.block_on(router.handle(&user_id, &args.message));
    let output = serde_json::to_string(&ChatOutput { command: COMMAND, status: "ok", reply: &reply })
        .map_err(|error| {
            CommandResult::failure(COMMAND, "serialization", error.to_string(), EXIT_RUNTIME)
        })?;
    Ok(CommandResult::raw(output))
}
