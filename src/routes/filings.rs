use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::info;

use crate::errors::AppError;
use crate::models::{
    AnalyzeOutcome, AnalyzeTickerRequest, AnalyzeUrlRequest, BatchOptions, BatchRequest,
    BatchRun, FeedRow, FilingEvent,
};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/analyze", post(analyze_latest))
        .route("/analyze-url", post(analyze_url))
        .route("/batch", post(analyze_batch))
        .route("/events/:event_id", get(get_event))
        .route("/feed/:event_id", get(get_feed_row))
}

/// POST /api/filings/analyze
/// Analyze the latest quarterly (else annual) filing for a ticker
pub async fn analyze_latest(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeTickerRequest>,
) -> Result<Json<AnalyzeOutcome>, AppError> {
    info!("POST /api/filings/analyze - {}", req.ticker);

    let outcome = state.pipeline.analyze_latest_filing(&req.ticker).await?;
    Ok(Json(outcome))
}

/// POST /api/filings/analyze-url
pub async fn analyze_url(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeUrlRequest>,
) -> Result<Json<AnalyzeOutcome>, AppError> {
    info!("POST /api/filings/analyze-url - {} {}", req.ticker, req.url);

    let outcome = state
        .pipeline
        .analyze_filing_at_url(&req.ticker, &req.url, req.form.as_deref())
        .await?;
    Ok(Json(outcome))
}

/// POST /api/filings/batch
/// Per-ticker failures are reported inside the result, never as an HTTP error
pub async fn analyze_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> Result<Json<BatchRun>, AppError> {
    info!("POST /api/filings/batch - {} tickers", req.tickers.len());

    if req.tickers.iter().all(|t| t.trim().is_empty()) {
        return Err(AppError::Validation("tickers must not be empty".to_string()));
    }

    let defaults = state.coordinator.default_options();
    let options = BatchOptions {
        max_concurrency: req.max_concurrency.unwrap_or(defaults.max_concurrency),
        soft_deadline_ms: req.soft_deadline_ms.unwrap_or(defaults.soft_deadline_ms),
    };

    let run = state.coordinator.run(&req.tickers, options).await;
    Ok(Json(run))
}

/// GET /api/filings/events/:event_id
pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<Json<FilingEvent>, AppError> {
    info!("GET /api/filings/events/{}", event_id);

    Ok(Json(state.pipeline.event(&event_id).await?))
}

/// GET /api/filings/feed/:event_id
pub async fn get_feed_row(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<Json<FeedRow>, AppError> {
    info!("GET /api/filings/feed/{}", event_id);

    Ok(Json(state.pipeline.feed_row(&event_id).await?))
}
