//! Job endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use dagforge_core::job::JobSpec;
use dagforge_core::render::RenderedAssetSet;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/projects/{project}/jobs", get(list_jobs).post(register_job))
        .route(
            "/projects/{project}/jobs/{job}",
            get(get_job).delete(delete_job),
        )
        .route("/projects/{project}/jobs/{job}/compiled", get(compiled_job))
        .route("/projects/{project}/jobs/{job}/assets", get(job_assets))
}

async fn list_jobs(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> Result<Json<Vec<JobSpec>>, ApiError> {
    let ctx = state.call_context();
    let jobs = state.service.list_jobs(&ctx, &project).await?;
    Ok(Json(jobs))
}

async fn register_job(
    State(state): State<AppState>,
    Path(project): Path<String>,
    Json(job): Json<JobSpec>,
) -> Result<(StatusCode, Json<JobSpec>), ApiError> {
    let ctx = state.call_context();
    state.service.register_job(&ctx, &project, &job).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

async fn get_job(
    State(state): State<AppState>,
    Path((project, job)): Path<(String, String)>,
) -> Result<Json<JobSpec>, ApiError> {
    let ctx = state.call_context();
    let job = state.service.get_job(&ctx, &project, &job).await?;
    Ok(Json(job))
}

async fn delete_job(
    State(state): State<AppState>,
    Path((project, job)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let ctx = state.call_context();
    state.service.delete_job(&ctx, &project, &job).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
struct CompiledResponse {
    job: String,
    path: String,
    content_hash: String,
    content: String,
}

async fn compiled_job(
    State(state): State<AppState>,
    Path((project, job)): Path<(String, String)>,
) -> Result<Json<CompiledResponse>, ApiError> {
    let ctx = state.call_context();
    let artifact = state.service.compile_job(&ctx, &project, &job).await?;
    let content_hash = artifact.content_hash();
    let content = String::from_utf8(artifact.payload.to_vec())
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(CompiledResponse {
        job: artifact.job,
        path: artifact.path,
        content_hash,
        content,
    }))
}

#[derive(Debug, Deserialize)]
struct AssetsQuery {
    /// RFC 3339 time of the run.
    scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct AssetsResponse {
    project: String,
    job: String,
    scheduled_at: DateTime<Utc>,
    assets: RenderedAssetSet,
}

/// Assets rendered for one run; fetched by running tasks and hooks.
async fn job_assets(
    State(state): State<AppState>,
    Path((project, job)): Path<(String, String)>,
    Query(query): Query<AssetsQuery>,
) -> Result<Json<AssetsResponse>, ApiError> {
    let ctx = state.call_context();
    let assets = state
        .service
        .render_assets(&ctx, &project, &job, query.scheduled_at)
        .await?;
    Ok(Json(AssetsResponse {
        project,
        job,
        scheduled_at: query.scheduled_at,
        assets,
    }))
}
