use std::collections::{HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::BatchDefaults;
use crate::errors::AppError;
use crate::models::{AnalyzeOutcome, BatchItemResult, BatchOptions, BatchRun};
use crate::services::filing_pipeline::FilingPipeline;
use crate::services::ticker_resolver::normalize_ticker;

/// Single-ticker unit of batch work
#[async_trait]
pub trait TickerAnalyzer: Send + Sync {
    async fn analyze_ticker(&self, ticker: &str) -> Result<AnalyzeOutcome, AppError>;
}

#[async_trait]
impl TickerAnalyzer for FilingPipeline {
    async fn analyze_ticker(&self, ticker: &str) -> Result<AnalyzeOutcome, AppError> {
        self.analyze_latest_filing(ticker).await
    }
}

/// Fixed-size worker pool over one shared queue with a soft deadline.
///
/// Workers check the deadline before taking a ticker; in-flight work is never cancelled.
pub struct BatchCoordinator {
    analyzer: Arc<dyn TickerAnalyzer>,
    defaults: BatchDefaults,
}

impl BatchCoordinator {
    pub fn new(analyzer: Arc<dyn TickerAnalyzer>, defaults: BatchDefaults) -> Self {
        Self { analyzer, defaults }
    }

    pub fn default_options(&self) -> BatchOptions {
        self.defaults.options()
    }

    pub async fn run(&self, tickers: &[String], options: BatchOptions) -> BatchRun {
        let queue = dedupe_tickers(tickers);
        if queue.is_empty() {
            return BatchRun {
                results: Vec::new(),
                partial: false,
                remaining: Vec::new(),
            };
        }

        let workers = options
            .max_concurrency
            .clamp(1, self.defaults.max_concurrency_cap.max(1))
            .min(queue.len());
        let deadline = Instant::now() + Duration::from_millis(options.soft_deadline_ms);
        let total = queue.len();

        info!(
            "📦 Starting batch of {} tickers ({} workers, soft deadline {}ms)",
            total, workers, options.soft_deadline_ms
        );

        let shared_queue = Mutex::new(queue);
        let shared_results = Mutex::new(Vec::with_capacity(total));
        {
            let (queue, results) = (&shared_queue, &shared_results);
            join_all((0..workers).map(|id| self.worker(id, queue, results, deadline))).await;
        }

        let remaining: Vec<String> = shared_queue.into_inner().into_iter().collect();
        let results = shared_results.into_inner();
        let failed = results.iter().filter(|r| !r.is_ok()).count();

        if remaining.is_empty() {
            info!("📦 Batch finished: {} ok, {} failed", results.len() - failed, failed);
        } else {
            warn!(
                "📦 Batch hit its soft deadline: {} done ({} failed), {} not started",
                results.len(),
                failed,
                remaining.len()
            );
        }

        BatchRun {
            partial: !remaining.is_empty(),
            results,
            remaining,
        }
    }

    async fn worker(
        &self,
        id: usize,
        queue: &Mutex<VecDeque<String>>,
        results: &Mutex<Vec<BatchItemResult>>,
        deadline: Instant,
    ) {
        loop {
            if Instant::now() >= deadline {
                break;
            }
            let Some(ticker) = queue.lock().pop_front() else {
                break;
            };

            let outcome = AssertUnwindSafe(self.analyzer.analyze_ticker(&ticker))
                .catch_unwind()
                .await;

            let item = match outcome {
                Ok(Ok(outcome)) => BatchItemResult::Ok {
                    ticker,
                    event_id: outcome.event_id,
                    deduped: outcome.deduped,
                    feed_row: outcome.feed_row,
                },
                Ok(Err(e)) => {
                    error!("Batch worker {}: {} failed: {}", id, ticker, e);
                    BatchItemResult::Error {
                        ticker,
                        error: e.kind().to_string(),
                        message: e.to_string(),
                        retryable: e.is_retryable(),
                    }
                }
                Err(_) => {
                    error!("Batch worker {}: {} panicked", id, ticker);
                    BatchItemResult::Error {
                        ticker,
                        error: "internal".to_string(),
                        message: "unexpected failure while analyzing".to_string(),
                        retryable: false,
                    }
                }
            };
            results.lock().push(item);
        }
    }
}

/// Normalizes, drops blanks and keeps the first occurrence of each ticker
pub fn dedupe_tickers(tickers: &[String]) -> VecDeque<String> {
    let mut seen = HashSet::new();
    tickers
        .iter()
        .map(|t| normalize_ticker(t))
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}
