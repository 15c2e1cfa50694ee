use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::errors::AppError;
use crate::models::{
    ClaimOutcome, CompanyMetadata, ContentFingerprint, EventPatch, EventStatus, FilingAnalysis,
    FilingEvent,
};
use crate::store::FilingStore;

/// Process-local store. Used when no database is configured and in tests.
#[derive(Clone, Default)]
pub struct InMemoryFilingStore {
    events: Arc<DashMap<String, FilingEvent>>,
    analyses: Arc<DashMap<String, FilingAnalysis>>,
    fingerprints: Arc<DashMap<String, ContentFingerprint>>,
    companies: Arc<DashMap<String, CompanyMetadata>>,
    analysis_writes: Arc<AtomicUsize>,
}

impl InMemoryFilingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_company(&self, company: CompanyMetadata) {
        self.companies.insert(company.ticker.to_uppercase(), company);
    }

    pub fn analysis_count(&self) -> usize {
        self.analyses.len()
    }

    pub fn fingerprint_count(&self) -> usize {
        self.fingerprints.len()
    }

    /// Successful analysis inserts (not attempts)
    pub fn analysis_writes(&self) -> usize {
        self.analysis_writes.load(Ordering::SeqCst)
    }
}

fn is_reclaimable(existing: &FilingEvent, stale_after: Duration) -> bool {
    match existing.status {
        EventStatus::Failed => true,
        EventStatus::Analyzed => false,
        EventStatus::Ingesting => {
            let age = Utc::now() - existing.updated_at;
            age.to_std().map(|age| age >= stale_after).unwrap_or(false)
        }
    }
}

#[async_trait]
impl FilingStore for InMemoryFilingStore {
    async fn claim_event(
        &self,
        event: &FilingEvent,
        stale_after: Duration,
    ) -> Result<ClaimOutcome, AppError> {
        match self.events.entry(event.event_id.clone()) {
            Entry::Vacant(slot) => {
                let mut fresh = event.clone();
                fresh.status = EventStatus::Ingesting;
                fresh.attempts = 1;
                slot.insert(fresh.clone());
                Ok(ClaimOutcome::Claimed(fresh))
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                if is_reclaimable(existing, stale_after) {
                    existing.status = EventStatus::Ingesting;
                    existing.attempts += 1;
                    existing.error = None;
                    existing.error_kind = None;
                    existing.document_url = event.document_url.clone();
                    existing.updated_at = Utc::now();
                    Ok(ClaimOutcome::Claimed(existing.clone()))
                } else {
                    Ok(ClaimOutcome::Existing(existing.clone()))
                }
            }
        }
    }

    async fn get_event(&self, event_id: &str) -> Result<Option<FilingEvent>, AppError> {
        Ok(self.events.get(event_id).map(|e| e.value().clone()))
    }

    async fn upsert_event(
        &self,
        event_id: &str,
        seed: Option<&FilingEvent>,
        patch: &EventPatch,
    ) -> Result<Option<FilingEvent>, AppError> {
        match self.events.entry(event_id.to_string()) {
            Entry::Occupied(mut slot) => {
                slot.get_mut().apply(patch);
                Ok(Some(slot.get().clone()))
            }
            Entry::Vacant(slot) => {
                let Some(seed) = seed else {
                    return Ok(None);
                };
                let mut fresh = seed.clone();
                fresh.event_id = event_id.to_string();
                fresh.status = EventStatus::Ingesting;
                fresh.apply(patch);
                slot.insert(fresh.clone());
                Ok(Some(fresh))
            }
        }
    }

    async fn get_analysis(&self, event_id: &str) -> Result<Option<FilingAnalysis>, AppError> {
        Ok(self.analyses.get(event_id).map(|a| a.value().clone()))
    }

    async fn insert_analysis(&self, analysis: &FilingAnalysis) -> Result<bool, AppError> {
        match self.analyses.entry(analysis.event_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(analysis.clone());
                self.analysis_writes.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
        }
    }

    async fn get_fingerprint(
        &self,
        content_hash: &str,
    ) -> Result<Option<ContentFingerprint>, AppError> {
        Ok(self.fingerprints.get(content_hash).map(|f| f.value().clone()))
    }

    async fn insert_fingerprint(
        &self,
        fingerprint: &ContentFingerprint,
    ) -> Result<ContentFingerprint, AppError> {
        let stored = self
            .fingerprints
            .entry(fingerprint.content_hash.clone())
            .or_insert_with(|| fingerprint.clone());
        Ok(stored.value().clone())
    }

    async fn get_company(&self, ticker: &str) -> Result<Option<CompanyMetadata>, AppError> {
        Ok(self
            .companies
            .get(&ticker.to_uppercase())
            .map(|c| c.value().clone()))
    }
}
