//! API routes.

pub mod deploy;
pub mod health;
pub mod jobs;
pub mod projects;

use crate::AppState;
use axum::Router;

/// Build the main API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_router())
        .merge(health::router())
        .with_state(state)
}

fn api_router() -> Router<AppState> {
    Router::new()
        .merge(projects::router())
        .merge(jobs::router())
        .merge(deploy::router())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode};
    use dagforge_config::MacroRenderer;
    use dagforge_core::repository::SpecRepository;
    use dagforge_db::MemorySpecRepository;
    use dagforge_deployer::{
        Bootstrapper, MemoryBackend, ProjectLocks, ProjectStoreFactory, StoreRegistry,
    };
    use dagforge_scheduler::{
        AirflowScheduler, DeployQueue, JobService, ServiceConfig, ServiceParts, WorkerPool,
        builtin_hooks, builtin_tasks,
    };
    use serde_json::{Value, json};
    use crate::state::DEFAULT_DEPLOY_TIMEOUT;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        backend: Arc<MemoryBackend>,
        _workers: WorkerPool,
    }

    fn app() -> TestApp {
        app_with_deploy_timeout(DEFAULT_DEPLOY_TIMEOUT)
    }

    fn app_with_deploy_timeout(deploy_timeout: Duration) -> TestApp {
        let repo: Arc<dyn SpecRepository> = Arc::new(MemorySpecRepository::new());
        let backend = Arc::new(MemoryBackend::new());
        let stores = Arc::new(ProjectStoreFactory::new(
            StoreRegistry::new().with(backend.clone()).unwrap(),
        ));
        let scheduler = Arc::new(AirflowScheduler::new(stores.clone()));
        let locks = ProjectLocks::new();
        let service = Arc::new(
            JobService::new(
                ServiceParts {
                    repo: repo.clone(),
                    scheduler: scheduler.clone(),
                    stores,
                    renderer: Arc::new(MacroRenderer::new()),
                    tasks: builtin_tasks().unwrap(),
                    hooks: builtin_hooks().unwrap(),
                    locks: locks.clone(),
                },
                ServiceConfig {
                    ingress_host: "dagforge.test".into(),
                    ..Default::default()
                },
            )
            .unwrap(),
        );
        let bootstrapper = Arc::new(Bootstrapper::new(repo, scheduler, locks));
        let shutdown = CancellationToken::new();
        let deploys = Arc::new(DeployQueue::default());
        let workers = WorkerPool::spawn(2, deploys.clone(), service.clone(), shutdown.clone());

        TestApp {
            router: router(
                AppState::new(service, bootstrapper, deploys, shutdown)
                    .with_deploy_timeout(deploy_timeout),
            ),
            backend,
            _workers: workers,
        }
    }

    async fn call(app: &TestApp, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn job(name: &str, deps: &[&str]) -> Value {
        json!({
            "name": name,
            "owner": "data@example.com",
            "schedule": { "start_date": "2024-01-01", "interval": "@daily" },
            "task": { "unit": "shell" },
            "dependencies": deps,
        })
    }

    async fn seed_project(app: &TestApp, name: &str) {
        let (status, _) = call(
            app,
            Method::POST,
            "/api/v1/projects",
            Some(json!({
                "name": name,
                "config": { "storage-path": format!("mem://{}", name) },
                "secrets": { "STORAGE_SECRET": "token" },
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_ping() {
        let app = app();
        let request = Request::builder().uri("/ping").body(Body::empty()).unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"pong");
    }

    #[tokio::test]
    async fn test_project_secrets_are_not_returned() {
        let app = app();
        seed_project(&app, "acme").await;

        let (status, body) = call(&app, Method::GET, "/api/v1/projects/acme", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["secrets"], json!(["STORAGE_SECRET"]));
        assert!(!body.to_string().contains("token"));

        let (status, _) = call(&app, Method::GET, "/api/v1/projects/ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_register_resolve_and_deploy() {
        let app = app();
        seed_project(&app, "acme").await;
        for (name, deps) in [("a", vec![]), ("b", vec!["a"]), ("c", vec!["a"])] {
            let (status, _) = call(
                &app,
                Method::POST,
                "/api/v1/projects/acme/jobs",
                Some(job(name, &deps)),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) = call(&app, Method::GET, "/api/v1/projects/acme/graph", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["weights"]["acme/a"], 21);
        assert_eq!(body["graph"]["edges"].as_array().unwrap().len(), 2);

        let (status, body) = call(&app, Method::POST, "/api/v1/projects/acme/deploy", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["written"], json!(["a", "b", "c"]));
        assert_eq!(app.backend.store("mem://acme").paths().await.len(), 3);

        let (status, body) = call(
            &app,
            Method::GET,
            "/api/v1/projects/acme/jobs/b/compiled",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["path"], "dags/b.py");
        assert!(body["content"].as_str().unwrap().contains("wait_acme__a"));
    }

    #[tokio::test]
    async fn test_cycle_is_unprocessable() {
        let app = app();
        seed_project(&app, "acme").await;
        call(&app, Method::POST, "/api/v1/projects/acme/jobs", Some(job("d", &["d"]))).await;

        let (status, body) = call(&app, Method::GET, "/api/v1/projects/acme/graph", None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("d -> d"));
    }

    #[tokio::test]
    async fn test_invalid_job_rejected() {
        let app = app();
        seed_project(&app, "acme").await;
        let bad = job("Bad Name", &[]);
        let (status, _) = call(&app, Method::POST, "/api/v1/projects/acme/jobs", Some(bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_deploy_failure_breakdown() {
        let app = app();
        seed_project(&app, "acme").await;
        call(&app, Method::POST, "/api/v1/projects/acme/jobs", Some(job("a", &[]))).await;
        call(&app, Method::POST, "/api/v1/projects/acme/jobs", Some(job("b", &[]))).await;
        app.backend.store("mem://acme").fail_path("dags/b.py");

        let (status, body) = call(&app, Method::POST, "/api/v1/projects/acme/deploy", None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["written"], 1);
        assert_eq!(body["failures"][0]["job"], "b");
        assert_eq!(body["failures"][0]["stage"], "write");
    }

    #[tokio::test]
    async fn test_deploy_all_isolates_projects() {
        let app = app();
        seed_project(&app, "acme").await;
        call(&app, Method::POST, "/api/v1/projects/acme/jobs", Some(job("a", &[]))).await;
        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/projects",
            Some(json!({ "name": "bare" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(&app, Method::POST, "/api/v1/deploy", None).await;
        assert_eq!(status, StatusCode::OK);
        let results = body.as_array().unwrap();
        assert_eq!(results[0]["project"], "acme");
        assert_eq!(results[0]["status"], "ok");
        assert_eq!(results[1]["project"], "bare");
        assert_eq!(results[1]["status"], "failed");
    }

    #[tokio::test]
    async fn test_bootstrap_single_project() {
        let app = app();
        seed_project(&app, "acme").await;

        let (status, body) = call(&app, Method::POST, "/api/v1/projects/acme/bootstrap", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(
            app.backend.store("mem://acme").paths().await,
            vec!["dags/__lib.py"]
        );
    }

    #[tokio::test]
    async fn test_delete_job() {
        let app = app();
        seed_project(&app, "acme").await;
        call(&app, Method::POST, "/api/v1/projects/acme/jobs", Some(job("a", &[]))).await;

        let (status, _) = call(&app, Method::DELETE, "/api/v1/projects/acme/jobs/a", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, Method::GET, "/api/v1/projects/acme/jobs/a", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_deploy_gives_up_at_request_deadline() {
        let app = app_with_deploy_timeout(Duration::ZERO);
        seed_project(&app, "acme").await;
        call(&app, Method::POST, "/api/v1/projects/acme/jobs", Some(job("a", &[]))).await;

        let (status, body) = call(&app, Method::POST, "/api/v1/projects/acme/deploy", None).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert!(body["error"].as_str().unwrap().contains("deadline"));
    }

    #[tokio::test]
    async fn test_assets_rendered_for_requested_run() {
        let app = app();
        seed_project(&app, "acme").await;
        let mut spec = job("orders", &[]);
        spec["assets"] = json!({ "query.sql": "where ts >= '${dstart}' and ts < '${dend}'" });
        let (status, _) = call(&app, Method::POST, "/api/v1/projects/acme/jobs", Some(spec)).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(
            &app,
            Method::GET,
            "/api/v1/projects/acme/jobs/orders/assets?scheduled_at=2024-03-05T02%3A00%3A00%2B00%3A00",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["assets"]["query.sql"],
            "where ts >= '2024-03-04T00:00:00Z' and ts < '2024-03-05T00:00:00Z'"
        );

        let (status, _) = call(&app, Method::GET, "/api/v1/projects/acme/jobs/orders/assets", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(
            &app,
            Method::GET,
            "/api/v1/projects/acme/jobs/ghost/assets?scheduled_at=2024-03-05T02:00:00Z",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
