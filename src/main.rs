use std::net::SocketAddr;
use std::sync::Arc;

use filing_analysis_backend::app;
use filing_analysis_backend::config::PipelineConfig;
use filing_analysis_backend::external::edgar::EdgarClient;
use filing_analysis_backend::external::filing_source::FilingSource;
use filing_analysis_backend::logging::{init_logging, LoggingConfig};
use filing_analysis_backend::services::batch_coordinator::BatchCoordinator;
use filing_analysis_backend::services::filing_pipeline::FilingPipeline;
use filing_analysis_backend::services::job_scheduler_service::JobSchedulerService;
use filing_analysis_backend::services::llm_service::{build_provider, LlmConfig};
use filing_analysis_backend::state::AppState;
use filing_analysis_backend::store::{FilingStore, InMemoryFilingStore, PgFilingStore};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize logging FIRST
    init_logging(LoggingConfig::from_env())?;

    let config = PipelineConfig::from_env();

    let store: Arc<dyn FilingStore> = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(&database_url)
                .await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            info!("🗄️ Using Postgres filing store");
            Arc::new(PgFilingStore::new(pool))
        }
        Err(_) => {
            warn!("DATABASE_URL not set, using in-memory filing store (nothing survives a restart)");
            Arc::new(InMemoryFilingStore::new())
        }
    };

    let source: Arc<dyn FilingSource> = Arc::new(EdgarClient::new(config.edgar.clone())?);
    let llm = build_provider(&LlmConfig::from_env());

    let pipeline = Arc::new(FilingPipeline::new(source, store, llm, &config));
    let coordinator = Arc::new(BatchCoordinator::new(pipeline.clone(), config.batch));

    let mut scheduler = JobSchedulerService::new(
        coordinator.clone(),
        config.watchlist.clone(),
        config.batch.options(),
    )
    .await?;
    if let Err(e) = scheduler.start(&config.refresh_cron).await {
        error!("Job scheduler failed to start: {}", e);
    }

    let state = AppState {
        pipeline,
        coordinator,
    };
    let app = app::create_app(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(&addr).await?;
    info!("🚀 Filing analysis backend running at http://{}/", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = scheduler.stop().await {
        error!("Job scheduler did not stop cleanly: {}", e);
    }
    info!("👋 Filing analysis backend stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("🛑 Shutdown signal received");
}
