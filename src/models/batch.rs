use serde::{Deserialize, Serialize};

use super::feed::FeedRow;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BatchOptions {
    pub max_concurrency: usize,
    pub soft_deadline_ms: u64,
}

/// Per-ticker batch result. Failures are captured, never propagated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BatchItemResult {
    Ok {
        ticker: String,
        event_id: String,
        deduped: bool,
        feed_row: FeedRow,
    },
    Error {
        ticker: String,
        error: String,
        message: String,
        retryable: bool,
    },
}

impl BatchItemResult {
    pub fn ticker(&self) -> &str {
        match self {
            BatchItemResult::Ok { ticker, .. } => ticker,
            BatchItemResult::Error { ticker, .. } => ticker,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, BatchItemResult::Ok { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchRun {
    pub results: Vec<BatchItemResult>,
    /// Set when the soft deadline left tickers unstarted
    pub partial: bool,
    pub remaining: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeTickerRequest {
    pub ticker: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeUrlRequest {
    pub ticker: String,
    pub url: String,
    pub form: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequest {
    pub tickers: Vec<String>,
    pub max_concurrency: Option<usize>,
    pub soft_deadline_ms: Option<u64>,
}
