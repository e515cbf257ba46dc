use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use cartwise_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run(options: LoadOptions) -> String {
    let explicit_path = options.config_path.clone();
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = explicit_path.or_else(detect_config_path);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let similar_users = config
        .data
        .similar_users_path
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<unset>".to_string());
    let llm_api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };

    let entries = [
        (
            "data.purchases_path",
            config.data.purchases_path.display().to_string(),
            source("data.purchases_path", &["CARTWISE_DATA_PURCHASES_PATH"]),
        ),
        (
            "data.consumption_path",
            config.data.consumption_path.display().to_string(),
            source("data.consumption_path", &["CARTWISE_DATA_CONSUMPTION_PATH"]),
        ),
        (
            "data.similar_users_path",
            similar_users,
            source("data.similar_users_path", &["CARTWISE_DATA_SIMILAR_USERS_PATH"]),
        ),
        ("database.url", config.database.url.clone(), source("database.url", &["CARTWISE_DATABASE_URL"])),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            source("database.max_connections", &["CARTWISE_DATABASE_MAX_CONNECTIONS"]),
        ),
        (
            "llm.enabled",
            config.llm.enabled.to_string(),
            source("llm.enabled", &["CARTWISE_LLM_ENABLED"]),
        ),
        (
            "llm.provider",
            config.llm.provider.as_str().to_string(),
            source("llm.provider", &["CARTWISE_LLM_PROVIDER"]),
        ),
        ("llm.model", config.llm.model.clone(), source("llm.model", &["CARTWISE_LLM_MODEL"])),
        (
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            source("llm.base_url", &["CARTWISE_LLM_BASE_URL"]),
        ),
        ("llm.api_key", llm_api_key.to_string(), source("llm.api_key", &["CARTWISE_LLM_API_KEY"])),
        (
            "llm.timeout_secs",
            config.llm.timeout_secs.to_string(),
            source("llm.timeout_secs", &["CARTWISE_LLM_TIMEOUT_SECS"]),
        ),
        (
            "assistant.wake_word",
            config.assistant.wake_word.clone(),
            source("assistant.wake_word", &["CARTWISE_ASSISTANT_WAKE_WORD"]),
        ),
        (
            "assistant.display_limit",
            config.assistant.display_limit.to_string(),
            source("assistant.display_limit", &["CARTWISE_ASSISTANT_DISPLAY_LIMIT"]),
        ),
        (
            "assistant.forecast_weighting",
            config.assistant.forecast_weighting.as_str().to_string(),
            source("assistant.forecast_weighting", &["CARTWISE_ASSISTANT_FORECAST_WEIGHTING"]),
        ),
        (
            "server.bind_address",
            config.server.bind_address.clone(),
            source("server.bind_address", &["CARTWISE_SERVER_BIND_ADDRESS"]),
        ),
        (
            "server.port",
            config.server.port.to_string(),
            source("server.port", &["CARTWISE_SERVER_PORT"]),
        ),
        (
            "logging.level",
            config.logging.level.clone(),
            source("logging.level", &["CARTWISE_LOGGING_LEVEL", "CARTWISE_LOG_LEVEL"]),
        ),
        (
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            source("logging.format", &["CARTWISE_LOGGING_FORMAT", "CARTWISE_LOG_FORMAT"]),
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(entries.iter().map(|(key, value, source)| render_line(key, value, source)));
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    ["cartwise.toml", "config/cartwise.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: &str) -> String {
    format!("- {key} = {value} (source: {source})")
}
