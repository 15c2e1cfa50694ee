use crate::errors::AppError;
use crate::jobs::filing_refresh_job;
use crate::models::BatchOptions;
use crate::services::batch_coordinator::BatchCoordinator;
use chrono::Utc;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

// Context passed to job functions
#[derive(Clone)]
pub struct JobContext {
    pub coordinator: Arc<BatchCoordinator>,
    pub watchlist: Arc<Vec<String>>,
    pub batch_options: BatchOptions,
}

#[derive(Debug)]
pub struct JobResult {
    pub items_processed: i32,
    pub items_failed: i32,
}

pub struct JobSchedulerService {
    scheduler: JobScheduler,
    context: JobContext,
    running: bool,
}

impl JobSchedulerService {
    pub async fn new(
        coordinator: Arc<BatchCoordinator>,
        watchlist: Vec<String>,
        batch_options: BatchOptions,
    ) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self {
            scheduler,
            context: JobContext {
                coordinator,
                watchlist: Arc::new(watchlist),
                batch_options,
            },
            running: false,
        })
    }

    /// Registers the watchlist refresh and starts the scheduler.
    /// Nothing is scheduled when the watchlist is empty.
    pub async fn start(&mut self, refresh_cron: &str) -> Result<(), AppError> {
        if self.context.watchlist.is_empty() {
            info!("No FILING_WATCHLIST configured, filing refresh not scheduled");
            return Ok(());
        }

        info!("🚀 Starting job scheduler...");

        // format: sec min hour day month weekday
        self.schedule_job(
            refresh_cron,
            "filing_refresh",
            "Watchlist filing refresh",
            filing_refresh_job::refresh_watchlist_filings,
        )
        .await?;

        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to start scheduler: {}", e)))?;
        self.running = true;

        info!(
            "✅ Job scheduler started ({} watchlist tickers)",
            self.context.watchlist.len()
        );
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Shuts the scheduler down; a no-op when it was never started.
    pub async fn stop(&mut self) -> Result<(), AppError> {
        if !self.running {
            return Ok(());
        }
        info!("🛑 Stopping job scheduler...");
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to stop scheduler: {}", e)))?;
        self.running = false;
        info!("✅ Job scheduler stopped");
        Ok(())
    }

    async fn schedule_job<F, Fut>(
        &mut self,
        schedule: &str,
        job_name: &'static str,
        description: &str,
        job_fn: F,
    ) -> Result<(), AppError>
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<JobResult, AppError>> + Send + 'static,
    {
        let context = self.context.clone();
        let job_fn = Arc::new(job_fn);

        let job = Job::new_async(schedule, move |_uuid, _l| {
            let context = context.clone();
            let job_fn = job_fn.clone();
            Box::pin(async move {
                execute_job_with_tracking(job_name, context, job_fn).await;
            })
        })
        .map_err(|e| AppError::Internal(format!("Failed to create job {}: {}", job_name, e)))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to add job {}: {}", job_name, e)))?;

        info!("📅 Scheduled: {} - {} [cron: {}]", job_name, description, schedule);
        Ok(())
    }
}

async fn execute_job_with_tracking<F, Fut>(job_name: &str, context: JobContext, job_fn: Arc<F>)
where
    F: Fn(JobContext) -> Fut,
    Fut: std::future::Future<Output = Result<JobResult, AppError>>,
{
    info!("🏃 Starting job: {}", job_name);
    let started_at = Utc::now();

    let result = job_fn(context).await;
    let duration_ms = (Utc::now() - started_at).num_milliseconds();

    match result {
        Ok(job_result) => info!(
            "✅ Job completed: {} (processed: {}, failed: {}, duration: {}ms)",
            job_name, job_result.items_processed, job_result.items_failed, duration_ms
        ),
        Err(e) => error!("❌ Job failed: {} - {} ({}ms)", job_name, e, duration_ms),
    }
}
