//! dagforge API Server

use clap::Parser;
use dagforge_api::{AppState, ServerArgs, routes};
use dagforge_config::MacroRenderer;
use dagforge_core::deadline::{CallContext, DEFAULT_CALL_TIMEOUT};
use dagforge_core::secret::ApplicationKey;
use dagforge_db::{PgSpecRepository, create_pool, run_migrations};
use dagforge_deployer::{
    Bootstrapper, FileBackend, GcsBackend, MemoryBackend, ProjectLocks, ProjectStoreFactory,
    StoreRegistry, SyncOptions,
};
use dagforge_scheduler::worker::DEFAULT_WORKER_COUNT;
use dagforge_scheduler::{
    AirflowScheduler, DeployQueue, JobService, ServiceConfig, ServiceParts, WorkerPool,
    builtin_hooks, builtin_tasks,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Validate everything before touching the network
    let settings = ServerArgs::parse().validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)),
        )
        .init();

    let app_key = ApplicationKey::new(&settings.app_key)?;

    info!("Connecting to database...");
    let pool = create_pool(
        settings.database.url()?.as_str(),
        settings.database.max_open,
        settings.database.max_idle,
    )
    .await?;
    run_migrations(&pool).await?;
    info!("Database connected");

    let repo = Arc::new(PgSpecRepository::new(pool, app_key));
    let registry = StoreRegistry::new()
        .with(Arc::new(GcsBackend::new()))?
        .with(Arc::new(FileBackend::new()))?
        .with(Arc::new(MemoryBackend::new()))?;
    info!(schemes = ?registry.schemes(), "storage backends registered");
    let stores = Arc::new(ProjectStoreFactory::new(registry));
    let scheduler = Arc::new(AirflowScheduler::new(stores.clone()));
    let locks = ProjectLocks::new();

    let service = Arc::new(JobService::new(
        ServiceParts {
            repo: repo.clone(),
            scheduler: scheduler.clone(),
            stores,
            renderer: Arc::new(MacroRenderer::new()),
            tasks: builtin_tasks()?,
            hooks: builtin_hooks()?,
            locks: locks.clone(),
        },
        ServiceConfig {
            ingress_host: settings.ingress_host.clone(),
            inference: settings.inference,
            sync: SyncOptions::default(),
        },
    )?);

    let shutdown = install_shutdown_handler()?;

    // Bootstrap failures are per project and never stop startup
    let bootstrapper = Arc::new(Bootstrapper::new(repo, scheduler, locks));
    let ctx = CallContext::new(shutdown.child_token(), DEFAULT_CALL_TIMEOUT);
    match bootstrapper.bootstrap_all(&ctx).await {
        Ok(outcomes) => {
            let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
            info!(projects = outcomes.len(), failed, "bootstrap complete");
        }
        Err(e) => error!(error = %e, "could not list projects for bootstrap"),
    }

    let deploys = Arc::new(DeployQueue::default());
    let workers = WorkerPool::spawn(
        DEFAULT_WORKER_COUNT,
        deploys.clone(),
        service.clone(),
        shutdown.child_token(),
    );

    let state = AppState::new(service, bootstrapper, deploys, shutdown.clone());
    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr = settings.bind_address();
    info!("Starting server on {}", addr);
    let listener = TcpListener::bind(&addr).await?;

    let signal = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { signal.cancelled().await })
            .await
    });

    shutdown.cancelled().await;
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        workers.shutdown().await;
        server.await
    })
    .await;
    match drained {
        Ok(Ok(Ok(()))) => info!("server stopped"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task failed"),
        Err(_) => warn!(grace = ?SHUTDOWN_GRACE, "grace period elapsed, exiting"),
    }

    Ok(())
}

/// Cancel the returned token on SIGTERM or SIGINT.
fn install_shutdown_handler() -> anyhow::Result<CancellationToken> {
    let token = CancellationToken::new();
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
        }
        cancel.cancel();
    });

    Ok(token)
}
