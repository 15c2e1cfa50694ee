use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OverallSentiment {
    Bullish,
    Neutral,
    Bearish,
}

/// Read-optimized view of one analyzed filing. Derived on demand, never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedRow {
    pub date: NaiveDate,
    pub ticker: String,
    pub name: String,
    pub quarter: String,
    pub insights: String,
    pub ai_tags: Vec<String>,
    pub overall_sentiment: OverallSentiment,
    pub source_url: String,
}

/// What callers of the single-filing operations get back
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyzeOutcome {
    pub event_id: String,
    pub feed_row: FeedRow,
    pub deduped: bool,
}
