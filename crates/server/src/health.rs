use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use cartwise_agent::ChatRouter;
use cartwise_db::DbPool;
use chrono::Utc;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    pub chat_router: Arc<ChatRouter>,
    pub db_pool: Option<DbPool>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub dataset: HealthCheck,
    pub prediction_cache: HealthCheck,
    pub ai: HealthCheck,
    pub checked_at: String,
}

/// Only an unreachable cache database degrades the service; a disabled AI
/// capability is reported but still counts as ready.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let dataset = state.chat_router.dataset();
    let dataset_check = HealthCheck {
        status: "ready",
        detail: format!("{} purchase records, {} users", dataset.len(), dataset.users().len()),
    };
    let prediction_cache = match &state.db_pool {
        Some(pool) => database_check(pool).await,
        None => HealthCheck { status: "ready", detail: "in-memory prediction cache".to_string() },
    };
    let ai = if state.chat_router.ai_enabled() {
        HealthCheck { status: "ready", detail: "generative answers enabled".to_string() }
    } else {
        HealthCheck { status: "disabled", detail: "chat answers use local fallbacks".to_string() }
    };

    let ready = prediction_cache.status == "ready";
    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        dataset: dataset_check,
        prediction_cache,
        ai,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "cache database query succeeded".to_string() },
        Err(error) => HealthCheck {
            status: "degraded",
            detail: format!("cache database query failed: {error}"),
        },
    }
}
