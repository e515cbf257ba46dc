use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use cartwise_cli::commands::chat::{self, ChatArgs};
use cartwise_cli::commands::forecast::{self, ForecastArgs};
use cartwise_cli::commands::predict::{self, PredictArgs};
use cartwise_cli::commands::recommend::{self, RecommendArgs};
use cartwise_cli::commands::restock::{self, RestockArgs};
use cartwise_cli::commands::usage::{self, UsageArgs};
use cartwise_cli::commands::{config, doctor, DataOptions};
use cartwise_core::domain::forecast::ForecastFilter;
use serde_json::Value;
use tempfile::TempDir;

const PURCHASES: &str = "\
user_id,product_name,category,subcategory,brand,shipping_location,purchase_date,quantity
U1,1L Milk,Dairy,Milk,Amul,Los Angeles,2024-01-01,2
U1,1L Milk,Dairy,Milk,Amul,Los Angeles,2024-01-06,2
U1,1L Milk,Dairy,Milk,Amul,Los Angeles,2024-01-11,2
U1,Cola 500ml,Beverages,Soft Drinks,Coke,Los Angeles,2024-01-02,1
U2,Cola 500ml,Beverages,Soft Drinks,Pepsi,Chicago,2024-01-03,1
";

const CONSUMPTION: &str = "product_name,per_person_daily_consumption\n1L Milk,0.1\n";

const PREDICTION_HEADER: &str =
    "user_id,product_name,estimated_family_size,mean_days_between_orders,predicted_next_date,is_overdue";

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("purchases.csv"), PURCHASES).expect("write purchases");
        fs::write(dir.path().join("consumption.csv"), CONSUMPTION).expect("write consumption");
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn data(&self) -> DataOptions {
        DataOptions {
            config_path: None,
            purchases: Some(self.path().join("purchases.csv")),
            consumption: Some(self.path().join("consumption.csv")),
            similar_users: None,
        }
    }
}

#[test]
fn predict_prints_report_rows_for_repeat_purchases() {
    with_env(&[("CARTWISE_DATABASE_URL", "sqlite::memory:")], || {
        let fixture = Fixture::new();
        let result = predict::run(PredictArgs {
            data: fixture.data(),
            as_of: Some("2024-01-20".to_string()),
            no_cache: true,
            ..PredictArgs::default()
        });

        assert_eq!(result.exit_code, 0);
        assert_eq!(
            result.output,
            format!("{PREDICTION_HEADER}\nU1,1L Milk,4,5.0,2024-01-16,true")
        );
    });
}

#[test]
fn predict_serves_identical_rows_through_the_cache() {
    let fixture = Fixture::new();
    let db_url = format!("sqlite://{}", fixture.path().join("cache.db").display());
    with_env(&[("CARTWISE_DATABASE_URL", db_url.as_str())], || {
        let args = PredictArgs {
            data: fixture.data(),
            as_of: Some("2024-01-20".to_string()),
            ..PredictArgs::default()
        };

        let first = predict::run(args.clone());
        let second = predict::run(args);

        assert_eq!(first.exit_code, 0);
        assert_eq!(first.output, second.output);
        assert!(second.output.ends_with("U1,1L Milk,4,5.0,2024-01-16,true"));
    });
}

#[test]
fn forecast_writes_csv_with_requested_weighting() {
    with_env(&[("CARTWISE_DATABASE_URL", "sqlite::memory:")], || {
        let fixture = Fixture::new();
        let output = fixture.path().join("forecast.csv");
        let result = forecast::run(ForecastArgs {
            data: fixture.data(),
            as_of: Some("2024-01-20".to_string()),
            weighting: Some("quantity".to_string()),
            output: Some(output.clone()),
            no_cache: true,
            ..ForecastArgs::default()
        });

        assert_eq!(result.exit_code, 0, "{}", result.output);
        assert_eq!(parse_payload(&result.output)["status"], "ok");
        assert_eq!(
            fs::read_to_string(&output).expect("report"),
            "shipping_location,product_name,month,expected_units\nLos Angeles,1L Milk,2024-01,2\n"
        );
    });
}

#[test]
fn forecast_rejects_unknown_weighting() {
    with_env(&[], || {
        let fixture = Fixture::new();
        let result = forecast::run(ForecastArgs {
            data: fixture.data(),
            weighting: Some("volume".to_string()),
            no_cache: true,
            ..ForecastArgs::default()
        });

        assert_eq!(result.exit_code, 5);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
    });
}

#[test]
fn forecast_filters_rows_by_location_month_and_product() {
    with_env(&[("CARTWISE_DATABASE_URL", "sqlite::memory:")], || {
        let fixture = Fixture::new();
        let run = |filter: ForecastFilter| {
            forecast::run(ForecastArgs {
                data: fixture.data(),
                as_of: Some("2024-01-20".to_string()),
                filter,
                no_cache: true,
                ..ForecastArgs::default()
            })
        };

        let matching = run(ForecastFilter {
            location: Some("All".to_string()),
            month: Some("2024-01".to_string()),
            product_search: Some("MILK".to_string()),
        });
        assert_eq!(matching.exit_code, 0, "{}", matching.output);
        assert_eq!(
            matching.output,
            "shipping_location,product_name,month,expected_units\nLos Angeles,1L Milk,2024-01,1"
        );

        let elsewhere =
            run(ForecastFilter { location: Some("Chicago".to_string()), ..ForecastFilter::default() });
        assert_eq!(elsewhere.output, "shipping_location,product_name,month,expected_units");
    });
}

#[test]
fn forecast_rejects_malformed_month_filter() {
    with_env(&[], || {
        let fixture = Fixture::new();
        let result = forecast::run(ForecastArgs {
            data: fixture.data(),
            filter: ForecastFilter { month: Some("January".to_string()), ..ForecastFilter::default() },
            no_cache: true,
            ..ForecastArgs::default()
        });

        assert_eq!(result.exit_code, 5);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
    });
}

#[test]
fn restock_lists_overdue_products() {
    with_env(&[], || {
        let fixture = Fixture::new();
        let result = restock::run(RestockArgs {
            data: fixture.data(),
            user: "U1".to_string(),
            as_of: Some("2024-01-20".to_string()),
        });

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "restock");
        assert_eq!(
            payload["message"],
            "Products that need restocking:\n\n- 1L Milk - due since 2024-01-16 (4 days overdue)\n\nTotal items to restock: 1"
        );
    });
}

#[test]
fn restock_rejects_malformed_as_of() {
    with_env(&[], || {
        let fixture = Fixture::new();
        let result = restock::run(RestockArgs {
            data: fixture.data(),
            user: "U1".to_string(),
            as_of: Some("20/01/2024".to_string()),
        });

        assert_eq!(result.exit_code, 5);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
    });
}

#[test]
fn recommend_returns_primary_and_exploratory_brands() {
    with_env(&[], || {
        let fixture = Fixture::new();
        let result = recommend::run(RecommendArgs {
            data: fixture.data(),
            user: "U1".to_string(),
            query: "brands for cola".to_string(),
            limit: None,
        });

        assert_eq!(result.exit_code, 0);
        assert_eq!(
            parse_payload(&result.output)["message"],
            "Brand suggestions for cola:\nYour preferred brands: Coke\nTry these brands: Pepsi"
        );
    });
}

#[test]
fn recommend_reports_unresolvable_category() {
    with_env(&[], || {
        let fixture = Fixture::new();
        let result = recommend::run(RecommendArgs {
            data: fixture.data(),
            user: "U1".to_string(),
            query: "something nice".to_string(),
            limit: None,
        });

        let payload = parse_payload(&result.output);
        assert_eq!(result.exit_code, 5);
        assert_eq!(payload["error_class"], "ambiguous_query");
        assert!(payload["message"].as_str().unwrap_or_default().contains("Suggest brands for cola"));
    });
}

#[test]
fn usage_lists_most_purchased_without_product() {
    with_env(&[], || {
        let fixture = Fixture::new();
        let result = usage::run(UsageArgs {
            data: fixture.data(),
            user: "U1".to_string(),
            product: None,
            top: Some(2),
        });

        assert_eq!(
            parse_payload(&result.output)["message"],
            "Your top 2 purchased products:\n1. 1L Milk: 3 purchases\n2. Cola 500ml: 1 purchases"
        );
    });
}

#[test]
fn chat_reports_intent_and_reply() {
    with_env(&[], || {
        let fixture = Fixture::new();
        let result = chat::run(ChatArgs {
            data: fixture.data(),
            user: "U1".to_string(),
            message: "Check if to be restocked".to_string(),
            as_of: Some("2024-01-20".to_string()),
        });

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "chat");
        assert_eq!(payload["intent"], "restock_check");
        assert_eq!(payload["degraded"], false);
        assert!(payload["reply"].as_str().unwrap_or_default().contains("1L Milk"));
    });
}

#[test]
fn missing_purchase_file_is_a_data_load_failure() {
    with_env(&[], || {
        let fixture = Fixture::new();
        let mut data = fixture.data();
        data.purchases = Some(fixture.path().join("absent.csv"));

        let result = usage::run(UsageArgs { data, user: "U1".to_string(), ..UsageArgs::default() });

        assert_eq!(result.exit_code, 4);
        assert_eq!(parse_payload(&result.output)["error_class"], "data_load");
    });
}

#[test]
fn config_attributes_env_sources() {
    with_env(&[("CARTWISE_LLM_MODEL", "gpt-4o-mini"), ("CARTWISE_LOG_LEVEL", "debug")], || {
        let output = config::run(Default::default());

        assert!(output.contains("- llm.model = gpt-4o-mini (source: env (CARTWISE_LLM_MODEL))"));
        assert!(output.contains("- logging.level = debug (source: env (CARTWISE_LOG_LEVEL))"));
        assert!(output.contains("- llm.api_key = <unset> (source: default)"));
    });
}

#[test]
fn doctor_warns_when_ai_is_disabled() {
    with_env(&[("CARTWISE_DATABASE_URL", "sqlite::memory:")], || {
        let fixture = Fixture::new();
        let (exit_code, output) = doctor::run(fixture.data().load_options(), true);

        let report = parse_payload(&output);
        assert_eq!(exit_code, 0);
        assert_eq!(report["overall_status"], "warn");
        assert_eq!(report["checks"][1]["name"], "dataset_load");
        assert_eq!(report["checks"][1]["status"], "pass");
        assert_eq!(report["checks"][3]["status"], "warn");
    });
}

#[test]
fn doctor_fails_on_invalid_config() {
    with_env(&[("CARTWISE_SERVER_PORT", "not-a-port")], || {
        let (exit_code, output) = doctor::run(Default::default(), true);

        let report = parse_payload(&output);
        assert_eq!(exit_code, 1);
        assert_eq!(report["overall_status"], "fail");
        assert_eq!(report["checks"][1]["status"], "skipped");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "CARTWISE_DATA_PURCHASES_PATH",
        "CARTWISE_DATA_CONSUMPTION_PATH",
        "CARTWISE_DATA_SIMILAR_USERS_PATH",
        "CARTWISE_DATABASE_URL",
        "CARTWISE_DATABASE_MAX_CONNECTIONS",
        "CARTWISE_DATABASE_TIMEOUT_SECS",
        "CARTWISE_LLM_ENABLED",
        "CARTWISE_LLM_PROVIDER",
        "CARTWISE_LLM_API_KEY",
        "CARTWISE_LLM_BASE_URL",
        "CARTWISE_LLM_MODEL",
        "CARTWISE_LLM_TIMEOUT_SECS",
        "CARTWISE_LLM_MAX_RETRIES",
        "CARTWISE_ASSISTANT_WAKE_WORD",
        "CARTWISE_ASSISTANT_DISPLAY_LIMIT",
        "CARTWISE_ASSISTANT_FORECAST_WEIGHTING",
        "CARTWISE_SERVER_BIND_ADDRESS",
        "CARTWISE_SERVER_PORT",
        "CARTWISE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "CARTWISE_LOGGING_LEVEL",
        "CARTWISE_LOGGING_FORMAT",
        "CARTWISE_LOG_LEVEL",
        "CARTWISE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
