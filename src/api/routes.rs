//! API route definitions.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::state::AppState;
use crate::registry::RegistryError;
use crate::storage::{Account, CredentialBlob, StoreError};
use crate::supervisor::TriggerError;

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/owners", post(register_owner))
        .route("/accounts", post(register_account).get(list_accounts))
        .route("/accounts/{id}/boost", post(trigger_boost))
        .route("/accounts/{id}/disable", post(disable_account))
        .route("/accounts/{id}/history", get(account_history))
        .route("/stats", get(owner_stats))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "live_tasks": state.supervisor.live_task_count().await,
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

#[derive(Deserialize)]
struct RegisterOwnerBody {
    owner_id: i64,
    name: String,
}

async fn register_owner(
    State(state): State<AppState>,
    Json(body): Json<RegisterOwnerBody>,
) -> ApiResult {
    state
        .registry
        .add_owner(body.owner_id, &body.name)
        .map_err(registry_error)?;
    Ok(Json(json!({ "data": { "owner_id": body.owner_id } })))
}

#[derive(Deserialize)]
struct RegisterAccountBody {
    owner_id: i64,
    name: String,
    credential_blob: String,
}

async fn register_account(
    State(state): State<AppState>,
    Json(body): Json<RegisterAccountBody>,
) -> ApiResult {
    let id = state
        .registry
        .register(
            body.owner_id,
            &body.name,
            CredentialBlob::new(body.credential_blob),
        )
        .await
        .map_err(registry_error)?;
    Ok(Json(json!({ "data": { "id": id } })))
}

#[derive(Deserialize)]
struct OwnerQuery {
    owner_id: i64,
}

async fn list_accounts(
    State(state): State<AppState>,
    Query(query): Query<OwnerQuery>,
) -> ApiResult {
    let accounts = state.registry.list(query.owner_id).map_err(registry_error)?;
    let rows: Vec<Value> = accounts.iter().map(account_row).collect();
    Ok(Json(json!({ "data": rows, "meta": { "total": rows.len() } })))
}

async fn trigger_boost(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult {
    let record = state
        .supervisor
        .trigger_now(id)
        .await
        .map_err(trigger_error)?;
    Ok(Json(json!({
        "data": {
            "outcome": record.outcome,
            "detail": record.detail,
            "diagnostic_ref": record.diagnostic_ref,
            "occurred_at": record.occurred_at.to_rfc3339(),
        }
    })))
}

async fn disable_account(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult {
    state.registry.disable(id).await.map_err(registry_error)?;
    Ok(Json(json!({ "data": { "id": id, "status": "disabled" } })))
}

#[derive(Deserialize)]
struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    limit: usize,
}

fn default_history_limit() -> usize {
    20
}

async fn account_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult {
    // 404 for ids that never existed, instead of an empty log.
    state.store.load(id).map_err(store_error)?;

    let records = state.store.history(id, query.limit).map_err(store_error)?;
    Ok(Json(json!({ "data": records, "meta": { "total": records.len() } })))
}

async fn owner_stats(State(state): State<AppState>, Query(query): Query<OwnerQuery>) -> ApiResult {
    let stats = state.store.owner_stats(query.owner_id).map_err(store_error)?;
    let recent = state
        .store
        .recent_history(query.owner_id, 5)
        .map_err(store_error)?;

    let recent: Vec<Value> = recent
        .iter()
        .map(|(name, record)| {
            json!({
                "account": name,
                "outcome": record.outcome,
                "detail": record.detail,
                "occurred_at": record.occurred_at.to_rfc3339(),
            })
        })
        .collect();

    Ok(Json(json!({
        "data": {
            "total_accounts": stats.total_accounts,
            "active_accounts": stats.active_accounts,
            "total_boosts": stats.total_boosts,
            "live_tasks": state.supervisor.live_task_count().await,
            "recent": recent,
        }
    })))
}

fn account_row(account: &Account) -> Value {
    json!({
        "id": account.id,
        "name": account.display_name,
        "status": account.status,
        "run_count": account.run_count,
        "last_run_at": account.last_run_at.map(|t| t.to_rfc3339()),
        "next_run_at": account.next_run_at.map(|t| t.to_rfc3339()),
        "interval_seconds": account.interval_seconds,
    })
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn error_body(status: StatusCode, message: String) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message })))
}

fn registry_error(e: RegistryError) -> (StatusCode, Json<Value>) {
    let status = match &e {
        RegistryError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        RegistryError::LimitExceeded { .. } => StatusCode::CONFLICT,
        RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
        RegistryError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    error_body(status, e.to_string())
}

fn trigger_error(e: TriggerError) -> (StatusCode, Json<Value>) {
    let status = match &e {
        TriggerError::Busy(_) => StatusCode::CONFLICT,
        TriggerError::NotFound(_) => StatusCode::NOT_FOUND,
        TriggerError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    error_body(status, e.to_string())
}

fn store_error(e: StoreError) -> (StatusCode, Json<Value>) {
    let status = match &e {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::LimitExceeded { .. } => StatusCode::CONFLICT,
        StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    error_body(status, e.to_string())
}
