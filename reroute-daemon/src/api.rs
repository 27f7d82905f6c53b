//! Control API
//!
//! JSON HTTP surface over the rewrite service: rule CRUD and the master
//! switch (the popup UI's intents), observation ingestion for whatever
//! feeds the sniffer, and read-only inspection of the installed engine
//! rules. CORS is permissive so a local UI served from another origin can
//! talk to it.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use reroute_core::{
    AppState, CompiledRule, InMemoryEngine, JsonFileStore, RewriteService, Rule, RuleUpdate,
    ServiceError,
};

type Service = RewriteService<JsonFileStore, InMemoryEngine>;

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<Service>,
    pub engine: Arc<InMemoryEngine>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/state", get(get_state))
        .route("/rules", post(add_rule))
        .route("/rules/:id", put(update_rule).delete(delete_rule))
        .route("/switch", post(set_switch))
        .route("/observe", post(observe))
        .route("/compiled", get(compiled))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn get_state(State(state): State<ApiState>) -> Result<Json<AppState>, ApiError> {
    Ok(Json(state.service.state().await?))
}

#[derive(Debug, Deserialize)]
struct AddRuleRequest {
    search: String,
    replace: String,
}

async fn add_rule(
    State(state): State<ApiState>,
    Json(request): Json<AddRuleRequest>,
) -> Result<(StatusCode, Json<Rule>), ApiError> {
    let rule = state
        .service
        .add_rule(request.search, request.replace)
        .await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn update_rule(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(update): Json<RuleUpdate>,
) -> Result<Json<Rule>, ApiError> {
    Ok(Json(state.service.update_rule(&id, update).await?))
}

async fn delete_rule(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.service.delete_rule(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct SwitchRequest {
    on: bool,
}

async fn set_switch(
    State(state): State<ApiState>,
    Json(request): Json<SwitchRequest>,
) -> Result<StatusCode, ApiError> {
    state.service.set_master_switch(request.on).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct ObserveRequest {
    url: String,
    #[serde(default)]
    headers: Vec<(String, String)>,
}

async fn observe(State(state): State<ApiState>, Json(request): Json<ObserveRequest>) -> StatusCode {
    state
        .service
        .observe_request(&request.url, &request.headers)
        .await;
    StatusCode::ACCEPTED
}

async fn compiled(State(state): State<ApiState>) -> Json<Vec<CompiledRule>> {
    Json(state.engine.snapshot().await)
}

struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ServiceError::UnknownRule(_) => StatusCode::NOT_FOUND,
            ServiceError::EmptySearch => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
