//! Deploy-all endpoint.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use dagforge_core::{Error, JobFailure};
use dagforge_deployer::SyncReport;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/deploy", post(deploy_all))
}

/// Outcome of one project's pass. Failed projects never hide the others.
#[derive(Debug, Serialize)]
struct ProjectDeployment {
    project: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<SyncReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failures: Vec<JobFailure>,
}

async fn deploy_all(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProjectDeployment>>, ApiError> {
    let ctx = state.call_context();
    let projects = state.service.list_projects(&ctx).await?;

    let deploys = &state.deploys;
    let deadline = state.deploy_deadline();
    let results = futures::future::join_all(projects.into_iter().map(|project| async move {
        let result = deploys.request(&project.name, Some(deadline)).await;
        match result {
            Ok(report) => ProjectDeployment {
                project: project.name,
                status: "ok",
                report: Some(report),
                error: None,
                failures: Vec::new(),
            },
            Err(err) => {
                let failures = match err.as_ref() {
                    Error::Deployment(f) => f.failures.clone(),
                    _ => Vec::new(),
                };
                ProjectDeployment {
                    project: project.name,
                    status: "failed",
                    report: None,
                    error: Some(err.to_string()),
                    failures,
                }
            }
        }
    }))
    .await;

    Ok(Json(results))
}
