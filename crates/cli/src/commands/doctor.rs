use cartwise_core::config::{AppConfig, LoadOptions};
use cartwise_db::{connect, load_dataset, migrations, CsvTabularSource};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(options: LoadOptions, json_output: bool) -> (u8, String) {
    let report = build_report(options);
    let exit_code = if report.overall_status == CheckStatus::Fail { 1 } else { 0 };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return (exit_code, output);
    }

    (exit_code, render_human(&report))
}

fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_dataset(&config));
            checks.push(check_prediction_cache(&config));
            checks.push(check_ai_capability(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["dataset_load", "prediction_cache", "ai_capability"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let warned = checks.iter().any(|check| check.status == CheckStatus::Warn);
    let (overall_status, summary) = if failed {
        (CheckStatus::Fail, "doctor: one or more readiness checks failed")
    } else if warned {
        (CheckStatus::Warn, "doctor: ready with degraded capabilities")
    } else {
        (CheckStatus::Pass, "doctor: all readiness checks passed")
    };

    DoctorReport { overall_status, summary: summary.to_string(), checks }
}

fn check_dataset(config: &AppConfig) -> DoctorCheck {
    match load_dataset(&CsvTabularSource::from_config(&config.data)) {
        Ok(dataset) => DoctorCheck {
            name: "dataset_load",
            status: CheckStatus::Pass,
            details: format!(
                "{} purchase records, {} users, {} consumption profiles",
                dataset.len(),
                dataset.users().len(),
                dataset.consumption_profile_count()
            ),
        },
        Err(error) => {
            DoctorCheck { name: "dataset_load", status: CheckStatus::Fail, details: error.to_string() }
        }
    }
}

/// The cache is optional, so an unreachable database only warns.
fn check_prediction_cache(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "prediction_cache",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| format!("failed to connect to cache database: {error}"))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| format!("failed to migrate cache database: {error}"))?;
        pool.close().await;
        Ok::<(), String>(())
    });

    match result {
        Ok(()) => DoctorCheck {
            name: "prediction_cache",
            status: CheckStatus::Pass,
            details: format!("cache ready at `{}`", config.database.url),
        },
        Err(error) => {
            DoctorCheck { name: "prediction_cache", status: CheckStatus::Warn, details: error }
        }
    }
}

fn check_ai_capability(config: &AppConfig) -> DoctorCheck {
    if !config.llm.enabled {
        return DoctorCheck {
            name: "ai_capability",
            status: CheckStatus::Warn,
            details: "disabled; chat answers use local fallbacks".to_string(),
        };
    }
    DoctorCheck {
        name: "ai_capability",
        status: CheckStatus::Pass,
        details: format!("{} model `{}`", config.llm.provider.as_str(), config.llm.model),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
