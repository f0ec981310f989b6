use axum::{
    extract::{rejection::JsonRejection, Path, Query, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{debug, error, info, info_span, Instrument};

use super::correlation::{correlation_id_middleware, CorrelationId};
use crate::domain::entities::reward::{CreateRewardRequest, Reward};
use crate::domain::entities::valuation::{HistoricalInr, Pagination, Portfolio, Stats, StatsScope};
use crate::domain::errors::RewardError;
use crate::domain::services::reward_service::RewardService;
use crate::rate_limit::{rate_limit_middleware, UserRateLimiter, USER_ID_HEADER};

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
pub const REPLAYED_HEADER: &str = "idempotent-replayed";

const MAX_BODY_BYTES: usize = 64 * 1024;
const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RewardService>,
}

/// Build the API with its middleware stack
pub fn router(state: AppState, limiter: UserRateLimiter) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/reward", post(create_reward))
        .route("/api/v1/today-stocks/:user_id", get(get_today_stocks))
        .route("/api/v1/historical-inr/:user_id", get(get_historical_inr))
        .route("/api/v1/stats/:user_id", get(get_stats))
        .route("/api/v1/portfolio/:user_id", get(get_portfolio))
        .with_state(state)
        .layer(middleware::from_fn(move |request: Request, next: Next| {
            rate_limit_middleware(limiter.clone(), request, next)
        }))
        .layer(middleware::from_fn(correlation_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
}

/// Reward admission body. Missing fields deserialize as empty and are
/// rejected by validation.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateRewardBody {
    pub stock_symbol: String,
    pub shares: String,
    pub rewarded_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateRewardResponse {
    pub status: String,
    pub reward_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_id: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
            code: "VALIDATION".to_string(),
            reward_id: None,
        }),
    )
}

fn error_response(err: RewardError) -> ApiError {
    let (status, reward_id) = match &err {
        RewardError::Validation(_) => (StatusCode::BAD_REQUEST, None),
        RewardError::Conflict { existing_id } => (StatusCode::CONFLICT, Some(existing_id.clone())),
        RewardError::InProgress { .. } => (StatusCode::CONFLICT, None),
        RewardError::PriceUnavailable { .. } | RewardError::Storage(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, None)
        }
    };

    if status.is_server_error() {
        error!("Request failed: {}", err);
    } else {
        debug!("Request rejected: {}", err);
    }

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: err.code().to_string(),
            reward_id,
        }),
    )
}

/// Correlation id set by the middleware, `-` when the route runs without it
fn correlation_of(correlation: &Option<Extension<CorrelationId>>) -> &str {
    correlation
        .as_ref()
        .map(|Extension(id)| id.0.as_str())
        .unwrap_or("-")
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// Health check endpoint
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Record a reward for the user in `X-User-ID`
pub async fn create_reward(
    State(state): State<AppState>,
    correlation: Option<Extension<CorrelationId>>,
    headers: HeaderMap,
    body: Result<Json<CreateRewardBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body.map_err(|rejection| bad_request(rejection.body_text()))?;
    let correlation_id = correlation_of(&correlation);
    let user_id = header_str(&headers, USER_ID_HEADER);

    let request = CreateRewardRequest {
        stock_symbol: body.stock_symbol,
        shares: body.shares,
        rewarded_at: body.rewarded_at,
    };

    let receipt = state
        .service
        .create_reward(user_id, &request, header_str(&headers, IDEMPOTENCY_KEY_HEADER))
        .instrument(info_span!(
            "create_reward",
            correlation_id = %correlation_id,
            user_id = %user_id
        ))
        .await
        .map_err(error_response)?;

    info!(
        correlation_id = %correlation_id,
        "Reward {} admitted (replayed: {})",
        receipt.reward_id,
        receipt.replayed
    );

    let mut response = (
        StatusCode::CREATED,
        Json(CreateRewardResponse {
            status: "success".to_string(),
            reward_id: receipt.reward_id,
        }),
    )
        .into_response();
    if receipt.replayed {
        response
            .headers_mut()
            .insert(REPLAYED_HEADER, HeaderValue::from_static("true"));
    }
    Ok(response)
}

#[derive(Debug, Deserialize)]
pub struct TodayQuery {
    /// YYYY-MM-DD, defaults to today (UTC)
    pub date: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RewardsResponse {
    pub user_id: String,
    pub date: NaiveDate,
    pub rewards: Vec<Reward>,
}

pub async fn get_today_stocks(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<TodayQuery>,
) -> Result<Json<RewardsResponse>, ApiError> {
    let date = match params.date.as_deref() {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| bad_request(format!("Invalid date '{}': expected YYYY-MM-DD", raw)))?,
        None => Utc::now().date_naive(),
    };

    let rewards = state
        .service
        .list_rewards_for_date(&user_id, date)
        .await
        .map_err(error_response)?;

    Ok(Json(RewardsResponse {
        user_id,
        date,
        rewards,
    }))
}

#[derive(Debug, Deserialize)]
pub struct HistoricalQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoricalResponse {
    pub user_id: String,
    pub historical_inr: Vec<HistoricalInr>,
}

/// RFC3339 timestamp, or a bare date meaning the start (or end) of that day
fn parse_bound(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, ApiError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        bad_request(format!(
            "Invalid bound '{}': expected RFC3339 or YYYY-MM-DD",
            raw
        ))
    })?;
    let time = if end_of_day {
        NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    }
    .unwrap_or_default();
    Ok(date.and_time(time).and_utc())
}

pub async fn get_historical_inr(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<HistoricalQuery>,
) -> Result<Json<HistoricalResponse>, ApiError> {
    let from = params
        .from
        .as_deref()
        .map(|raw| parse_bound(raw, false))
        .transpose()?;
    let to = params
        .to
        .as_deref()
        .map(|raw| parse_bound(raw, true))
        .transpose()?;

    let page = if params.page.is_some() || params.size.is_some() {
        Some(Pagination::new(
            params.page.unwrap_or(1),
            params.size.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE),
        ))
    } else {
        None
    };

    let historical_inr = state
        .service
        .get_historical_inr(&user_id, from, to, page)
        .await
        .map_err(error_response)?;

    Ok(Json(HistoricalResponse {
        user_id,
        historical_inr,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    /// "all" (default) or "today"
    pub scope: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub stats: Stats,
}

pub async fn get_stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<StatsQuery>,
) -> Result<Json<StatsResponse>, ApiError> {
    let scope = match params.scope.as_deref() {
        Some(raw) => StatsScope::parse(raw)
            .ok_or_else(|| bad_request(format!("Unknown stats scope '{}'", raw)))?,
        None => StatsScope::default(),
    };

    let stats = state
        .service
        .get_stats(&user_id, scope)
        .await
        .map_err(error_response)?;

    Ok(Json(StatsResponse { stats }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PortfolioResponse {
    pub portfolio: Portfolio,
}

pub async fn get_portfolio(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<PortfolioResponse>, ApiError> {
    let portfolio = state
        .service
        .get_portfolio(&user_id)
        .await
        .map_err(error_response)?;

    Ok(Json(PortfolioResponse { portfolio }))
}
