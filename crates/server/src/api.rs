//! JSON endpoints over the chat router and the core estimators.
//!
//! - `POST /chat`                         route one chat message
//! - `GET  /users/{user_id}/restock`      overdue products (`?as_of=YYYY-MM-DD`)
//! - `GET  /users/{user_id}/predictions`  every restock prediction for the user
//! - `GET  /users/{user_id}/brands`       brand suggestions (`?query=...&limit=N`)
//! - `GET  /forecast`                     demand forecast with Low/Medium/High levels
//!                                         (`?location=&month=YYYY-MM&product_search=`)
//! - `GET  /products`                     product names matching `?search=`, at most ten
//!
//! Every response carries a `correlation_id` that also tags the log events.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use cartwise_agent::router::{format_brands, format_restock};
use cartwise_agent::{ChatReply, ChatRouter};
use cartwise_core::brands::BrandRecommender;
use cartwise_core::domain::brand::BrandRecommendation;
use cartwise_core::dataset::PRODUCT_SEARCH_LIMIT;
use cartwise_core::domain::forecast::{
    DemandForecastRow, DemandLevel, DemandWeighting, ForecastFilter,
};
use cartwise_core::domain::purchase::UserId;
use cartwise_core::domain::restock::{start_of_day, RestockDueItem, RestockPrediction};
use cartwise_core::errors::{ApplicationError, InterfaceError};
use cartwise_core::restock::{due_items, RestockEstimator};
use cartwise_core::{classify_demand, DemandAggregator};
use cartwise_db::{predictions_with_cache, PredictionCacheRepository};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::health::{self, HealthState};

#[derive(Clone)]
pub struct ApiState {
    pub chat_router: Arc<ChatRouter>,
    pub prediction_cache: Arc<dyn PredictionCacheRepository>,
    pub display_limit: usize,
    pub forecast_weighting: DemandWeighting,
}

pub fn router(state: ApiState, health_state: HealthState) -> Router {
    let health_routes =
        Router::new().route("/health", get(health::health)).with_state(health_state);

    Router::new()
        .route("/chat", post(chat))
        .route("/users/{user_id}/restock", get(restock))
        .route("/users/{user_id}/predictions", get(predictions))
        .route("/users/{user_id}/brands", get(brands))
        .route("/forecast", get(forecast))
        .route("/products", get(products))
        .with_state(state)
        .merge(health_routes)
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub correlation_id: String,
    #[serde(flatten)]
    pub reply: ChatReply,
}

#[derive(Debug, Default, Deserialize)]
pub struct AsOfQuery {
    pub as_of: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RestockResponse {
    pub correlation_id: String,
    pub user_id: UserId,
    pub as_of: NaiveDate,
    pub items: Vec<RestockDueItem>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct PredictionsResponse {
    pub correlation_id: String,
    pub user_id: UserId,
    pub predictions: Vec<RestockPrediction>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BrandsQuery {
    pub query: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct BrandsResponse {
    pub correlation_id: String,
    pub recommendation: BrandRecommendation,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ForecastQuery {
    pub as_of: Option<String>,
    pub weighting: Option<String>,
    pub location: Option<String>,
    pub month: Option<String>,
    pub product_search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ForecastEntry {
    #[serde(flatten)]
    pub row: DemandForecastRow,
    pub level: DemandLevel,
}

#[derive(Debug, Serialize)]
pub struct ForecastResponse {
    pub correlation_id: String,
    pub weighting: DemandWeighting,
    pub rows: Vec<ForecastEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductSearchQuery {
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProductSearchResponse {
    pub correlation_id: String,
    pub products: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error_class: &'static str,
    pub message: String,
    pub correlation_id: String,
}

/// Interface-layer failure rendered as a JSON error body. Only bad requests
/// echo their detail; other classes answer with the user-safe message.
#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl From<InterfaceError> for ApiError {
    fn from(value: InterfaceError) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_class, message) = match &self.0 {
            InterfaceError::BadRequest { message, .. } => {
                (StatusCode::BAD_REQUEST, "bad_request", message.clone())
            }
            InterfaceError::ServiceUnavailable { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                self.0.user_message().to_string(),
            ),
            InterfaceError::Internal { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                self.0.user_message().to_string(),
            ),
        };
        let body =
            ErrorBody { error_class, message, correlation_id: self.0.correlation_id().to_string() };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn chat(
    State(state): State<ApiState>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let correlation_id = new_correlation_id();
    let user_id = parse_user(&body.user_id, &correlation_id)?;

    let reply = state.chat_router.handle(&user_id, &body.message).await;
    info!(
        event_name = "api.chat.replied",
        correlation_id = %correlation_id,
        user_id = %user_id,
        intent = %reply.intent,
        degraded = reply.degraded,
        "chat message routed"
    );

    Ok(Json(ChatResponse { correlation_id, reply }))
}

pub async fn restock(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<RestockResponse>, ApiError> {
    let correlation_id = new_correlation_id();
    let user_id = parse_user(&user_id, &correlation_id)?;
    let as_of = parse_as_of(query.as_of.as_deref(), &correlation_id)?;

    let predictions = user_predictions(&state, &user_id, as_of).await;
    let items = due_items(&predictions, as_of);
    info!(
        event_name = "api.restock.listed",
        correlation_id = %correlation_id,
        user_id = %user_id,
        due = items.len(),
        "restock due list served"
    );

    Ok(Json(RestockResponse {
        correlation_id,
        user_id,
        as_of: as_of.date(),
        message: format_restock(&items),
        items,
    }))
}

pub async fn predictions(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<PredictionsResponse>, ApiError> {
    let correlation_id = new_correlation_id();
    let user_id = parse_user(&user_id, &correlation_id)?;
    let as_of = parse_as_of(query.as_of.as_deref(), &correlation_id)?;

    let predictions = user_predictions(&state, &user_id, as_of).await;
    Ok(Json(PredictionsResponse { correlation_id, user_id, predictions }))
}

pub async fn brands(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
    Query(query): Query<BrandsQuery>,
) -> Result<Json<BrandsResponse>, ApiError> {
    let correlation_id = new_correlation_id();
    let user_id = parse_user(&user_id, &correlation_id)?;
    let text = query.query.as_deref().map(str::trim).unwrap_or_default();
    if text.is_empty() {
        return Err(bad_request("query parameter `query` is required", &correlation_id));
    }

    let recommendation = BrandRecommender::new(state.chat_router.dataset())
        .recommend(&user_id, text)
        .map_err(|error| {
            warn!(
                event_name = "api.brands.unresolved",
                correlation_id = %correlation_id,
                user_id = %user_id,
                error = %error,
                "brand query did not resolve to a category"
            );
            ApiError::from(ApplicationError::from(error).into_interface(correlation_id.clone()))
        })?
        .truncated(query.limit.unwrap_or(state.display_limit));

    Ok(Json(BrandsResponse {
        correlation_id,
        message: format_brands(&recommendation),
        recommendation,
    }))
}

pub async fn forecast(
    State(state): State<ApiState>,
    Query(query): Query<ForecastQuery>,
) -> Result<Json<ForecastResponse>, ApiError> {
    let correlation_id = new_correlation_id();
    let as_of = parse_as_of(query.as_of.as_deref(), &correlation_id)?;
    let weighting = match query.weighting.as_deref() {
        Some(raw) => raw
            .parse::<DemandWeighting>()
            .map_err(|message| bad_request(message, &correlation_id))?,
        None => state.forecast_weighting,
    };
    let filter = ForecastFilter {
        location: query.location,
        month: query.month,
        product_search: query.product_search,
    };
    filter.validate().map_err(|message| bad_request(message, &correlation_id))?;

    let dataset = state.chat_router.dataset();
    let predictions = predictions_with_cache(
        state.prediction_cache.as_ref(),
        &RestockEstimator::new(as_of),
        dataset,
    )
    .await;
    let rows = filter.apply(DemandAggregator::new(weighting).forecast(&predictions, dataset));
    let levels = classify_demand(&rows);
    info!(
        event_name = "api.forecast.built",
        correlation_id = %correlation_id,
        weighting = weighting.as_str(),
        rows = rows.len(),
        filtered = !filter.is_empty(),
        "demand forecast served"
    );

    let rows =
        rows.into_iter().zip(levels).map(|(row, level)| ForecastEntry { row, level }).collect();
    Ok(Json(ForecastResponse { correlation_id, weighting, rows }))
}

pub async fn products(
    State(state): State<ApiState>,
    Query(query): Query<ProductSearchQuery>,
) -> Json<ProductSearchResponse> {
    let correlation_id = new_correlation_id();
    let products = state
        .chat_router
        .dataset()
        .search_products(query.search.as_deref().unwrap_or_default(), PRODUCT_SEARCH_LIMIT)
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    Json(ProductSearchResponse { correlation_id, products })
}

/// Reads the user's slice of the cached run. A miss computes and stores the
/// full run; an unreadable cache falls back to this user's history alone.
async fn user_predictions(
    state: &ApiState,
    user_id: &UserId,
    as_of: NaiveDateTime,
) -> Vec<RestockPrediction> {
    let dataset = state.chat_router.dataset();
    let estimator = RestockEstimator::new(as_of);

    match state.prediction_cache.load_for_user(dataset.fingerprint(), user_id, as_of).await {
        Ok(Some(predictions)) => predictions,
        Ok(None) => predictions_with_cache(state.prediction_cache.as_ref(), &estimator, dataset)
            .await
            .into_iter()
            .filter(|prediction| &prediction.user_id == user_id)
            .collect(),
        Err(error) => {
            warn!(
                event_name = "cache.predictions.load_failed",
                user_id = %user_id,
                error = %error,
                "prediction cache read failed; computing this user's predictions"
            );
            estimator.predict_for_user(user_id, dataset)
        }
    }
}

fn new_correlation_id() -> String {
    format!("req-{}", Uuid::new_v4())
}

fn bad_request(message: impl Into<String>, correlation_id: &str) -> ApiError {
    ApiError(InterfaceError::BadRequest {
        message: message.into(),
        correlation_id: correlation_id.to_string(),
    })
}

fn parse_user(raw: &str, correlation_id: &str) -> Result<UserId, ApiError> {
    let user_id = UserId::new(raw);
    if user_id.as_str().is_empty() {
        return Err(bad_request("`user_id` must not be empty", correlation_id));
    }
    Ok(user_id)
}

fn parse_as_of(raw: Option<&str>, correlation_id: &str) -> Result<NaiveDateTime, ApiError> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(Utc::now().naive_utc()),
        Some(value) => NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map(start_of_day)
            .map_err(|_| bad_request(format!("`as_of` must be YYYY-MM-DD, got `{value}`"), correlation_id)),
    }
}
