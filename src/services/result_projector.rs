use std::sync::Arc;

use chrono::{Datelike, NaiveDate};

use crate::errors::AppError;
use crate::models::{AnalysisSummary, FeedRow, FilingForm, OverallSentiment, Theme};
use crate::store::FilingStore;

const BULLISH_THRESHOLD: f64 = 0.15;
const BEARISH_THRESHOLD: f64 = -0.15;
const MAX_AI_TAGS: usize = 3;
const INSIGHTS_FALLBACK: &str = "No summary available";

/// Builds feed rows from the ledger, the stored analysis and company metadata
pub struct ResultProjector {
    store: Arc<dyn FilingStore>,
}

impl ResultProjector {
    pub fn new(store: Arc<dyn FilingStore>) -> Self {
        Self { store }
    }

    /// `fallback_name` is used when the company table has no entry for the ticker.
    pub async fn to_feed_row(
        &self,
        event_id: &str,
        fallback_name: Option<&str>,
    ) -> Result<FeedRow, AppError> {
        let event = self.store.get_event(event_id).await?;
        let analysis_id = event
            .as_ref()
            .and_then(|e| e.analysis_event_id.clone())
            .unwrap_or_else(|| event_id.to_string());

        let analysis = self
            .store
            .get_analysis(&analysis_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("no analysis for event {}", event_id)))?;

        // The event's own metadata wins over the analysis it borrowed
        let (ticker, form, date, source_url) = match &event {
            Some(e) => (e.ticker.clone(), e.form, e.filing_date, e.document_url.clone()),
            None => (
                analysis.ticker.clone(),
                analysis.form,
                analysis.filing_date,
                analysis.provenance.source_url.clone(),
            ),
        };

        let name = match self.store.get_company(&ticker).await? {
            Some(company) => company.name,
            None => fallback_name
                .filter(|n| !n.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| ticker.clone()),
        };

        Ok(FeedRow {
            date,
            quarter: quarter_label(form, date),
            insights: select_insights(&analysis.summary),
            ai_tags: ai_tags(&analysis.themes),
            overall_sentiment: overall_sentiment(&analysis.themes),
            ticker,
            name,
            source_url,
        })
    }
}

/// Fixed-threshold rule over the mean theme sentiment. No themes means neutral.
pub fn overall_sentiment(themes: &[Theme]) -> OverallSentiment {
    if themes.is_empty() {
        return OverallSentiment::Neutral;
    }
    let mean = themes.iter().map(|t| t.sentiment).sum::<f64>() / themes.len() as f64;
    if mean > BULLISH_THRESHOLD {
        OverallSentiment::Bullish
    } else if mean < BEARISH_THRESHOLD {
        OverallSentiment::Bearish
    } else {
        OverallSentiment::Neutral
    }
}

pub fn quarter_label(form: FilingForm, date: NaiveDate) -> String {
    match form {
        FilingForm::Quarterly => format!("Q{} {}", date.month0() / 3 + 1, date.year()),
        FilingForm::Annual => date.year().to_string(),
    }
}

/// tldr, else the first two bullets, else a fixed placeholder
pub fn select_insights(summary: &AnalysisSummary) -> String {
    let tldr = summary.tldr.trim();
    if !tldr.is_empty() {
        return tldr.to_string();
    }

    let bullets: Vec<&str> = summary
        .bullets
        .iter()
        .map(|b| b.trim())
        .filter(|b| !b.is_empty())
        .take(2)
        .collect();
    if !bullets.is_empty() {
        return bullets.join(" ");
    }

    INSIGHTS_FALLBACK.to_string()
}

pub fn ai_tags(themes: &[Theme]) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for theme in themes {
        let topic = theme.topic.trim();
        if topic.is_empty() || tags.iter().any(|t| t.eq_ignore_ascii_case(topic)) {
            continue;
        }
        tags.push(topic.to_string());
        if tags.len() == MAX_AI_TAGS {
            break;
        }
    }
    tags
}
