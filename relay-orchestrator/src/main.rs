use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relay_orchestrator::api::{self, AppState};
use relay_orchestrator::artifact::{ArtifactStore, FsArtifactStore};
use relay_orchestrator::config::Config;
use relay_orchestrator::engine::{Executors, Orchestrator};
use relay_orchestrator::executor::{BuildExecutor, DeployExecutor, SourceExecutor};
use relay_orchestrator::repository::{InMemoryRunRepository, PgRunRepository, RunRepository};
use relay_orchestrator::traffic::{CommandHookInvoker, CommandProvisioner, TrafficController};
use relay_orchestrator::{db, pipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Relay Orchestrator...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let definition = pipeline::load(&config).context("Failed to load pipeline definition")?;
    tracing::info!(
        "Loaded pipeline {} with {} stage(s), triggered by branch {}",
        definition.name,
        definition.stages.len(),
        config.trigger_branch
    );

    let repository: Arc<dyn RunRepository> = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let pool = db::create_pool(database_url)
                .await
                .context("Failed to create database pool")?;
            db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;
            Arc::new(PgRunRepository::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, runs are kept in memory");
            Arc::new(InMemoryRunRepository::new())
        }
    };

    let store: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(&config.artifact_root));

    let traffic = Arc::new(TrafficController::new(
        Arc::new(CommandProvisioner::new(
            &config.deploy_command,
            &config.workspace_root,
        )),
        Arc::new(CommandHookInvoker::new(
            &config.hook_command,
            &config.public_url,
        )),
        config.traffic_shift.clone(),
        config.hook_timeout,
    )
    .with_retention(config.deployment_retention));
    tracing::info!(
        "Traffic shift policy: {}, hook timeout: {:?}",
        config.traffic_shift,
        config.hook_timeout
    );

    let orchestrator = Arc::new(Orchestrator::new(
        definition,
        config.trigger_branch.clone(),
        repository,
        Executors {
            source: Arc::new(SourceExecutor::new(store.clone())),
            build: Arc::new(BuildExecutor::new(
                store,
                &config.build_command,
                &config.workspace_root,
            )),
            deploy: Arc::new(DeployExecutor::new(traffic.clone())),
        },
    ));

    // Build router with all API endpoints
    let app = api::create_router(AppState {
        orchestrator,
        traffic,
    });

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
