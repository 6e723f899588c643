//! Project endpoints: registration, secrets, bootstrap, graph and deploy.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use dagforge_core::graph::DependencyGraph;
use dagforge_core::project::ProjectSpec;
use dagforge_core::secret::SecretValue;
use dagforge_deployer::SyncReport;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/{project}", get(get_project))
        .route("/projects/{project}/secrets", post(put_secret))
        .route("/projects/{project}/bootstrap", post(bootstrap_project))
        .route("/projects/{project}/graph", get(project_graph))
        .route("/projects/{project}/deploy", post(deploy_project))
}

#[derive(Debug, Serialize)]
struct ProjectResponse {
    id: String,
    name: String,
    config: BTreeMap<String, String>,
    /// Names only; values never leave the server.
    secrets: Vec<String>,
}

impl From<ProjectSpec> for ProjectResponse {
    fn from(p: ProjectSpec) -> Self {
        Self {
            id: p.id.to_string(),
            name: p.name,
            config: p.config,
            secrets: p.secrets.into_keys().collect(),
        }
    }
}

async fn list_projects(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProjectResponse>>, ApiError> {
    let ctx = state.call_context();
    let projects = state.service.list_projects(&ctx).await?;
    Ok(Json(projects.into_iter().map(ProjectResponse::from).collect()))
}

#[derive(Debug, Deserialize)]
struct CreateProjectRequest {
    name: String,
    #[serde(default)]
    config: BTreeMap<String, String>,
    #[serde(default)]
    secrets: BTreeMap<String, String>,
}

async fn create_project(
    State(state): State<AppState>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectResponse>), ApiError> {
    let ctx = state.call_context();
    let mut project = ProjectSpec::new(req.name);
    project.config = req.config;
    for (name, value) in req.secrets {
        project = project.with_secret(name, value.as_str());
    }
    state.service.register_project(&ctx, &project).await?;

    let stored = state.service.get_project(&ctx, &project.name).await?;
    Ok((StatusCode::CREATED, Json(stored.into())))
}

async fn get_project(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> Result<Json<ProjectResponse>, ApiError> {
    let ctx = state.call_context();
    let project = state.service.get_project(&ctx, &project).await?;
    Ok(Json(project.into()))
}

#[derive(Debug, Deserialize)]
struct SecretRequest {
    name: String,
    value: String,
}

async fn put_secret(
    State(state): State<AppState>,
    Path(project): Path<String>,
    Json(req): Json<SecretRequest>,
) -> Result<StatusCode, ApiError> {
    let ctx = state.call_context();
    state
        .service
        .register_secret(&ctx, &project, &req.name, &SecretValue::from(req.value.as_str()))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
struct BootstrapResponse {
    project: String,
    status: &'static str,
}

async fn bootstrap_project(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> Result<Json<BootstrapResponse>, ApiError> {
    let ctx = state.call_context();
    state.bootstrapper.bootstrap_project(&ctx, &project).await?;
    Ok(Json(BootstrapResponse {
        project,
        status: "ok",
    }))
}

#[derive(Debug, Serialize)]
struct GraphResponse {
    graph: DependencyGraph,
    /// Priority weight keyed by `project/job`.
    weights: BTreeMap<String, u32>,
}

async fn project_graph(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> Result<Json<GraphResponse>, ApiError> {
    let ctx = state.call_context();
    let resolved = state.service.resolve_project(&ctx, &project).await?;
    let weights = resolved
        .weights
        .iter()
        .map(|(key, weight)| (key.to_string(), *weight))
        .collect();
    Ok(Json(GraphResponse {
        graph: resolved.graph,
        weights,
    }))
}

async fn deploy_project(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> Result<Json<SyncReport>, ApiError> {
    let report = state
        .deploys
        .request(&project, Some(state.deploy_deadline()))
        .await?;
    Ok(Json(report))
}
