/// `/memory/*` handlers. Each one takes the authenticated [`Tenant`] and
/// forwards to the memory service.
use {
    axum::{
        Json,
        extract::{
            Query, State,
            rejection::{JsonRejection, QueryRejection},
        },
        response::IntoResponse,
    },
    chrono::{DateTime, Utc},
    persisto_memory::{MemoryError, Metadata},
    serde::Deserialize,
    serde_json::json,
};

use crate::{auth::Tenant, error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct SaveRequest {
    pub namespace: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub ttl_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub namespace: String,
    pub query: String,
    #[serde(default)]
    pub filters: Metadata,
    pub mode: Option<String>,
    pub k: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub namespace: String,
    pub content: Option<String>,
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Deserialize)]
pub struct QueriesParams {
    pub namespace: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(v)| v)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

pub async fn save(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    body: Result<Json<SaveRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = json_body(body)?;
    let receipt = state
        .memory
        .save(
            &tenant,
            &req.namespace,
            &req.content,
            req.metadata,
            req.ttl_seconds,
        )
        .await?;
    Ok(Json(json!({
        "status": "saved",
        "fragments": receipt.fragments(),
        "ids": receipt.ids,
    })))
}

pub async fn query(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = json_body(body)?;
    let results = state
        .memory
        .query(
            &tenant,
            &req.namespace,
            &req.query,
            req.filters,
            req.mode.as_deref(),
            req.k,
        )
        .await?;
    Ok(Json(json!({ "results": results })))
}

pub async fn delete(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    body: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = json_body(body)?;
    let count = state
        .memory
        .delete(
            &tenant,
            &req.namespace,
            req.content.as_deref(),
            req.metadata,
        )
        .await?;
    if count == 0 {
        return Err(MemoryError::NotFound.into());
    }
    Ok(Json(json!({ "status": "deleted", "count": count })))
}

pub async fn namespaces(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
) -> Result<impl IntoResponse, ApiError> {
    let namespaces = state.memory.list_namespaces(&tenant).await?;
    Ok(Json(json!({ "namespaces": namespaces })))
}

pub async fn queries(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    params: Result<Query<QueriesParams>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let queries = state
        .memory
        .list_queries(
            &tenant,
            params.namespace.as_deref(),
            params.start,
            params.end,
        )
        .await?;
    Ok(Json(json!({ "queries": queries })))
}
