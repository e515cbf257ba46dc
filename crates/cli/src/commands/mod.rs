pub mod chat;
pub mod config;
pub mod doctor;
pub mod forecast;
pub mod predict;
pub mod recommend;
pub mod restock;
pub mod usage;

use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;

use cartwise_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use cartwise_core::dataset::PurchaseDataset;
use cartwise_core::domain::purchase::UserId;
use cartwise_core::domain::restock::start_of_day;
use cartwise_db::{load_dataset, CsvTabularSource};

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DATA_LOAD: u8 = 4;
pub const EXIT_INVALID_INPUT: u8 = 5;
pub const EXIT_REPORT: u8 = 6;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Raw output such as a CSV report.
    pub fn raw(output: String) -> Self {
        Self { exit_code: 0, output }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Options shared by every subcommand that reads the purchase history.
#[derive(Clone, Debug, Default)]
pub struct DataOptions {
    pub config_path: Option<PathBuf>,
    pub purchases: Option<PathBuf>,
    pub consumption: Option<PathBuf>,
    pub similar_users: Option<PathBuf>,
}

impl DataOptions {
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config_path.clone(),
            require_file: self.config_path.is_some(),
            overrides: ConfigOverrides {
                purchases_path: self.purchases.clone(),
                consumption_path: self.consumption.clone(),
                similar_users_path: self.similar_users.clone(),
                ..ConfigOverrides::default()
            },
        }
    }
}

pub(crate) fn load_config(
    command: &str,
    options: LoadOptions,
) -> Result<AppConfig, CommandResult> {
    AppConfig::load(options).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    })
}

pub(crate) fn load_purchases(
    command: &str,
    config: &AppConfig,
) -> Result<PurchaseDataset, CommandResult> {
    load_dataset(&CsvTabularSource::from_config(&config.data)).map_err(|error| {
        CommandResult::failure(command, "data_load", error.to_string(), EXIT_DATA_LOAD)
    })
}

pub(crate) fn runtime(command: &str) -> Result<tokio::runtime::Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            EXIT_RUNTIME,
        )
    })
}

/// `--as-of` as the start of that day, or the current instant.
pub(crate) fn parse_as_of(
    command: &str,
    raw: Option<&str>,
) -> Result<NaiveDateTime, CommandResult> {
    match raw {
        None => Ok(Utc::now().naive_utc()),
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map(start_of_day).map_err(
            |_| {
                CommandResult::failure(
                    command,
                    "invalid_input",
                    format!("`--as-of` must be YYYY-MM-DD, got `{raw}`"),
                    EXIT_INVALID_INPUT,
                )
            },
        ),
    }
}

pub(crate) fn parse_user(command: &str, raw: &str) -> Result<UserId, CommandResult> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CommandResult::failure(
            command,
            "invalid_input",
            "`--user` must not be empty",
            EXIT_INVALID_INPUT,
        ));
    }
    Ok(UserId::new(trimmed))
}
