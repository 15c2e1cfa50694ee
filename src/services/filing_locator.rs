use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::external::filing_source::{FilingHistory, FilingSource};
use crate::models::{FilingForm, FilingMetadata, RegistryEntry};

/// Finds the newest periodic report for a company
pub struct FilingLocator {
    source: Arc<dyn FilingSource>,
}

impl FilingLocator {
    pub fn new(source: Arc<dyn FilingSource>) -> Self {
        Self { source }
    }

    pub async fn latest_filing(&self, entry: &RegistryEntry) -> Result<FilingMetadata, AppError> {
        let history = self.source.filing_history(&entry.registry_id).await?;
        let filing = select_latest(&history, &entry.ticker, &entry.registry_id)?;

        info!(
            "Located {} for {} filed {} ({})",
            filing.form.label(),
            filing.ticker,
            filing.filing_date,
            filing.filing_identifier
        );
        Ok(filing)
    }
}

/// Scans the (newest-first) history for the first quarterly report, falling
/// back to the first annual report.
pub fn select_latest(
    history: &FilingHistory,
    ticker: &str,
    registry_id: &str,
) -> Result<FilingMetadata, AppError> {
    let len = history
        .form
        .len()
        .min(history.filing_date.len())
        .min(history.filing_identifier.len())
        .min(history.primary_document_ref.len());

    if len < history.form.len() {
        warn!(
            "Filing history for {} has ragged arrays; scanning first {} of {} rows",
            ticker,
            len,
            history.form.len()
        );
    }

    let index = [FilingForm::Quarterly, FilingForm::Annual]
        .iter()
        .find_map(|preferred| {
            (0..len).find(|&i| FilingForm::from_code(&history.form[i]) == Some(*preferred))
        })
        .ok_or_else(|| {
            AppError::NoFilingFound(format!("no 10-Q or 10-K on record for {}", ticker))
        })?;

    let form = FilingForm::from_code(&history.form[index])
        .ok_or_else(|| AppError::NoFilingFound(format!("unrecognized form for {}", ticker)))?;

    let filing_date = NaiveDate::parse_from_str(&history.filing_date[index], "%Y-%m-%d")
        .map_err(|e| {
            AppError::UpstreamUnavailable(format!(
                "unparseable filing date '{}' for {}: {}",
                history.filing_date[index], ticker, e
            ))
        })?;

    Ok(FilingMetadata {
        ticker: ticker.to_uppercase(),
        registry_id: registry_id.to_string(),
        form,
        filing_date,
        filing_identifier: history.filing_identifier[index].clone(),
        primary_document_ref: history.primary_document_ref[index].clone(),
    })
}
