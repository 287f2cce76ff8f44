//! REST endpoints for rule management, routing and delivery logs.
//!
//! The caller's identity comes from the `x-owner-id` header, set by the
//! trusted gateway in front of the relay. Requests without it get 401.
//! Rules are returned with per-action secrets masked.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::RoutingError;
use crate::routing::RoutingEngine;
use crate::routing::model::{DeliveryLogEntry, DeliveryReport, RoutingRule, RuleDraft};

/// Header carrying the authenticated owner id.
pub const OWNER_HEADER: &str = "x-owner-id";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RoutingEngine>,
}

/// Build the Axum router with every relay route.
pub fn router(engine: Arc<RoutingEngine>) -> Router {
    let state = AppState { engine };

    Router::new()
        .route("/health", get(health))
        .route("/api/rules", get(list_rules).post(create_rule))
        .route("/api/rules/test", post(test_rule))
        .route(
            "/api/rules/{id}",
            get(get_rule).put(update_rule).delete(delete_rule),
        )
        .route("/api/rules/{id}/toggle", post(toggle_rule))
        .route("/api/route", post(route_content))
        .route("/api/delivery-logs", get(delivery_logs))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

// ── Errors ──────────────────────────────────────────────────────────

/// Error returned by handlers, rendered as `{"error": ...}` JSON.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    Routing(RoutingError),
}

impl From<RoutingError> for ApiError {
    fn from(err: RoutingError) -> Self {
        Self::Routing(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                serde_json::json!({"error": format!("Missing {OWNER_HEADER} header")}),
            ),
            Self::Routing(RoutingError::Validation { field, message }) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({"error": message, "field": field}),
            ),
            Self::Routing(err @ RoutingError::NotFound { .. }) => (
                StatusCode::NOT_FOUND,
                serde_json::json!({"error": err.to_string()}),
            ),
            Self::Routing(RoutingError::Database(e)) => {
                tracing::error!("Database error while handling request: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({"error": "Internal storage error"}),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Routing(RoutingError::validation("body", rejection.body_text()))
    }
}

// ── Extractors ──────────────────────────────────────────────────────

/// `Json` whose rejections render as 400 `{error, field}` like other
/// validation failures.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// Owner id taken from the `x-owner-id` header.
pub struct Owner(pub String);

impl<S: Send + Sync> FromRequestParts<S> for Owner {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Owner(v.to_string()))
            .ok_or(ApiError::Unauthorized)
    }
}

// ── Health ──────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

// ── Rules ───────────────────────────────────────────────────────────

async fn list_rules(
    State(state): State<AppState>,
    Owner(owner): Owner,
) -> Result<Json<Vec<RoutingRule>>, ApiError> {
    let rules = state.engine.list_rules(&owner).await?;
    Ok(Json(rules.into_iter().map(RoutingRule::redacted).collect()))
}

async fn create_rule(
    State(state): State<AppState>,
    Owner(owner): Owner,
    ApiJson(draft): ApiJson<RuleDraft>,
) -> Result<(StatusCode, Json<RoutingRule>), ApiError> {
    let rule = state.engine.create_rule(&owner, draft).await?;
    Ok((StatusCode::CREATED, Json(rule.redacted())))
}

async fn get_rule(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<Uuid>,
) -> Result<Json<RoutingRule>, ApiError> {
    Ok(Json(state.engine.get_rule(id, &owner).await?.redacted()))
}

async fn update_rule(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<Uuid>,
    ApiJson(draft): ApiJson<RuleDraft>,
) -> Result<Json<RoutingRule>, ApiError> {
    Ok(Json(state.engine.update_rule(id, &owner, draft).await?.redacted()))
}

async fn delete_rule(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.engine.delete_rule(id, &owner).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_rule(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<Uuid>,
) -> Result<Json<RoutingRule>, ApiError> {
    Ok(Json(state.engine.toggle_rule(id, &owner).await?.redacted()))
}

#[derive(Debug, Deserialize)]
struct TestRuleRequest {
    rule_id: Uuid,
    content: String,
}

/// POST /api/rules/test
///
/// Dry run: reports whether the rule matches without dispatching anything.
async fn test_rule(
    State(state): State<AppState>,
    Owner(owner): Owner,
    ApiJson(req): ApiJson<TestRuleRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let matches = state
        .engine
        .test_rule_by_id(req.rule_id, &owner, &req.content)
        .await?;
    Ok(Json(serde_json::json!({"matches": matches})))
}

// ── Routing ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RouteRequest {
    content: String,
}

async fn route_content(
    State(state): State<AppState>,
    Owner(owner): Owner,
    ApiJson(req): ApiJson<RouteRequest>,
) -> Result<Json<DeliveryReport>, ApiError> {
    Ok(Json(state.engine.route(&owner, &req.content).await?))
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    limit: Option<usize>,
}

async fn delivery_logs(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<DeliveryLogEntry>>, ApiError> {
    Ok(Json(state.engine.delivery_logs(&owner, query.limit).await?))
}
