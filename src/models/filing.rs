use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::AppError;

/// Periodic report forms the pipeline analyzes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FilingForm {
    #[serde(rename = "10-q")]
    Quarterly,
    #[serde(rename = "10-k")]
    Annual,
}

impl FilingForm {
    pub fn label(&self) -> &'static str {
        match self {
            FilingForm::Quarterly => "10-Q",
            FilingForm::Annual => "10-K",
        }
    }

    /// Parses a registry form code. Amendments ("10-Q/A") are not accepted.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_uppercase().as_str() {
            "10-Q" => Some(FilingForm::Quarterly),
            "10-K" => Some(FilingForm::Annual),
            _ => None,
        }
    }

    /// Lenient label parsing for caller-supplied hints; unknown labels mean quarterly.
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(|l| l.trim().to_uppercase()) {
            Some(l) if l == "10-K" || l == "ANNUAL" => FilingForm::Annual,
            _ => FilingForm::Quarterly,
        }
    }

    pub fn as_db_str(&self) -> &'static str {
        match self {
            FilingForm::Quarterly => "10-q",
            FilingForm::Annual => "10-k",
        }
    }

    pub fn from_db_str(value: &str) -> Option<Self> {
        match value {
            "10-q" => Some(FilingForm::Quarterly),
            "10-k" => Some(FilingForm::Annual),
            _ => None,
        }
    }
}

/// Ticker directory entry from the registry snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryEntry {
    pub ticker: String,
    /// Zero-padded to 10 digits
    pub registry_id: String,
    pub company_name: String,
}

/// Metadata for one located filing. Produced per lookup, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilingMetadata {
    pub ticker: String,
    pub registry_id: String,
    pub form: FilingForm,
    pub filing_date: NaiveDate,
    pub filing_identifier: String,
    pub primary_document_ref: String,
}

impl FilingMetadata {
    /// `{base}/{registryIdNoLeadingZeros}/{identifierNoDashes}/{primaryDocumentRef}`
    pub fn document_url(&self, archives_base: &str) -> String {
        let trimmed_id = self.registry_id.trim_start_matches('0');
        let trimmed_id = if trimmed_id.is_empty() { "0" } else { trimmed_id };
        format!(
            "{}/{}/{}/{}",
            archives_base.trim_end_matches('/'),
            trimmed_id,
            self.filing_identifier.replace('-', ""),
            self.primary_document_ref
        )
    }

    pub fn event_id(&self) -> String {
        event_id_for_filing(&self.ticker, &self.filing_identifier)
    }
}

/// Deterministic id for a discovered filing: same (ticker, identifier) always maps to the same id.
pub fn event_id_for_filing(ticker: &str, filing_identifier: &str) -> String {
    format!(
        "{}-{}",
        ticker.trim().to_uppercase(),
        filing_identifier.replace('-', "")
    )
}

/// Deterministic id for a caller-supplied document URL.
pub fn event_id_for_url(ticker: &str, url: &str) -> String {
    let digest = Sha256::digest(url.trim().as_bytes());
    let hex = hex::encode(digest);
    format!("{}-URL-{}", ticker.trim().to_uppercase(), &hex[..16])
}

/// Ledger lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Ingesting,
    Analyzed,
    Failed,
}

impl EventStatus {
    /// Forward-only transitions. FAILED may only return to INGESTING via a fresh claim.
    pub fn can_advance_to(current: Option<EventStatus>, next: EventStatus) -> bool {
        match (current, next) {
            (None, EventStatus::Ingesting) => true,
            (None, _) => false,
            (Some(EventStatus::Ingesting), _) => true,
            (Some(EventStatus::Analyzed), _) => false,
            (Some(EventStatus::Failed), EventStatus::Failed) => true,
            (Some(EventStatus::Failed), _) => false,
        }
    }

    pub fn as_db_str(&self) -> &'static str {
        match self {
            EventStatus::Ingesting => "ingesting",
            EventStatus::Analyzed => "analyzed",
            EventStatus::Failed => "failed",
        }
    }

    pub fn from_db_str(value: &str) -> Option<Self> {
        match value {
            "ingesting" => Some(EventStatus::Ingesting),
            "analyzed" => Some(EventStatus::Analyzed),
            "failed" => Some(EventStatus::Failed),
            _ => None,
        }
    }
}

/// Ledger row tracking one filing's analysis lifecycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilingEvent {
    pub event_id: String,
    pub ticker: String,
    pub form: FilingForm,
    pub filing_date: NaiveDate,
    pub document_url: String,
    pub status: EventStatus,
    pub content_hash: Option<String>,
    /// Which stored analysis this event resolves to. Differs from `event_id`
    /// when the content was already analyzed under another event.
    pub analysis_event_id: Option<String>,
    pub error: Option<String>,
    /// `AppError::kind()` of the recorded failure
    pub error_kind: Option<String>,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FilingEvent {
    pub fn ingesting(
        event_id: String,
        ticker: String,
        form: FilingForm,
        filing_date: NaiveDate,
        document_url: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            event_id,
            ticker,
            form,
            filing_date,
            document_url,
            status: EventStatus::Ingesting,
            content_hash: None,
            analysis_event_id: None,
            error: None,
            error_kind: None,
            attempts: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merges a partial update in place. Returns false (and leaves the row
    /// untouched) when the status change is not a forward transition.
    pub fn apply(&mut self, patch: &EventPatch) -> bool {
        if let Some(next) = patch.status {
            if next != self.status && !EventStatus::can_advance_to(Some(self.status), next) {
                return false;
            }
            if self.status == EventStatus::Analyzed {
                return false;
            }
            self.status = next;
        } else if self.status == EventStatus::Analyzed {
            return false;
        }
        if let Some(hash) = &patch.content_hash {
            self.content_hash = Some(hash.clone());
        }
        if let Some(target) = &patch.analysis_event_id {
            self.analysis_event_id = Some(target.clone());
        }
        if let Some(error) = &patch.error {
            self.error = Some(error.clone());
        }
        if let Some(kind) = &patch.error_kind {
            self.error_kind = Some(kind.clone());
        }
        if patch.status == Some(EventStatus::Analyzed) {
            self.error = None;
            self.error_kind = None;
        }
        self.updated_at = Utc::now();
        true
    }
}

/// Partial ledger update for create-or-merge upserts
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventPatch {
    pub status: Option<EventStatus>,
    pub content_hash: Option<String>,
    pub analysis_event_id: Option<String>,
    pub error: Option<String>,
    pub error_kind: Option<String>,
}

impl EventPatch {
    pub fn analyzed(content_hash: &str, analysis_event_id: &str) -> Self {
        Self {
            status: Some(EventStatus::Analyzed),
            content_hash: Some(content_hash.to_string()),
            analysis_event_id: Some(analysis_event_id.to_string()),
            error: None,
            error_kind: None,
        }
    }

    pub fn failed(error: &AppError) -> Self {
        Self {
            status: Some(EventStatus::Failed),
            error: Some(error.to_string()),
            error_kind: Some(error.kind().to_string()),
            ..Default::default()
        }
    }
}

/// Outcome of a conditional ledger claim
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// This caller owns the work
    Claimed(FilingEvent),
    /// Another caller holds (or finished) the event
    Existing(FilingEvent),
}

/// Content-addressed back-pointer; created once per unique content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentFingerprint {
    pub content_hash: String,
    pub event_id: String,
    pub created_at: DateTime<Utc>,
}

/// Read-only company display data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct CompanyMetadata {
    pub ticker: String,
    pub name: String,
    pub sector: Option<String>,
}
