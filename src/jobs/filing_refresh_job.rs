use crate::errors::AppError;
use crate::services::job_scheduler_service::{JobContext, JobResult};
use tracing::{info, warn};

/// Runs the batch coordinator over the configured watchlist.
///
/// Already analyzed filings short-circuit on the identity check, so repeated
/// runs only pay for tickers that published something new.
pub async fn refresh_watchlist_filings(ctx: JobContext) -> Result<JobResult, AppError> {
    if ctx.watchlist.is_empty() {
        info!("No watchlist tickers to refresh");
        return Ok(JobResult {
            items_processed: 0,
            items_failed: 0,
        });
    }

    info!("Refreshing filings for {} watchlist tickers", ctx.watchlist.len());

    let run = ctx.coordinator.run(&ctx.watchlist, ctx.batch_options).await;

    let failed = run.results.iter().filter(|r| !r.is_ok()).count();
    let processed = run.results.len() - failed;
    let new_analyses = run
        .results
        .iter()
        .filter(|r| matches!(r, crate::models::BatchItemResult::Ok { deduped: false, .. }))
        .count();

    if run.partial {
        warn!(
            "Filing refresh stopped at its soft deadline; not started: {}",
            run.remaining.join(", ")
        );
    }
    info!(
        "Filing refresh done: {} ok ({} new), {} failed",
        processed, new_analyses, failed
    );

    Ok(JobResult {
        items_processed: processed as i32,
        items_failed: failed as i32,
    })
}
