use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use http::{header, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::{
    engine::{EngineHealth, WorkflowEngine},
    metrics,
    store::{NewWorkflow, Workflow, WorkflowSummary},
    workflow::WorkflowStatus,
    Error, Result,
};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
    pub status: Option<String>,
}

pub async fn health(State(engine): State<Arc<WorkflowEngine>>) -> Json<EngineHealth> {
    Json(engine.health().await)
}

pub async fn start_workflow(
    State(engine): State<Arc<WorkflowEngine>>,
    payload: std::result::Result<Json<NewWorkflow>, JsonRejection>,
) -> Result<Response> {
    let Json(payload) = payload.map_err(|e| Error::Validation(format!("Invalid request body: {}", e.body_text())))?;

    let started = engine.start(payload).await?;
    info!("Accepted workflow {}", started.id);

    Ok((StatusCode::ACCEPTED, Json(started)).into_response())
}

pub async fn get_workflow(
    State(engine): State<Arc<WorkflowEngine>>,
    Path(id): Path<String>,
) -> Result<Json<Workflow>> {
    // A malformed id can never have been issued
    let id = Uuid::parse_str(&id).map_err(|_| Error::NotFound(format!("workflow {}", id)))?;
    Ok(Json(engine.get(id).await?))
}

pub async fn list_workflows(
    State(engine): State<Arc<WorkflowEngine>>,
    query: std::result::Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<WorkflowSummary>>> {
    let Query(query) = query.map_err(|e| Error::Validation(format!("Invalid query: {}", e.body_text())))?;
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::parse::<WorkflowStatus>)
        .transpose()?;

    Ok(Json(engine.list(status, query.limit).await?))
}

pub async fn metrics() -> Result<Response> {
    let body = metrics::gather_metrics()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}
