//! Persistence surface for the ingestion pipeline.
//!
//! Four collections: the event ledger (by event id), analyses (by event id),
//! content fingerprints (by content hash) and company metadata (by ticker,
//! read-only here). Writes are conditional so concurrent pipelines can race
//! safely: the first writer wins and later writers observe its row.

pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::AppError;
use crate::models::{
    ClaimOutcome, CompanyMetadata, ContentFingerprint, EventPatch, FilingAnalysis, FilingEvent,
};

pub use memory::InMemoryFilingStore;
pub use postgres::PgFilingStore;

#[async_trait]
pub trait FilingStore: Send + Sync {
    /// Atomically creates the ledger row in INGESTING, or re-claims it when it
    /// is FAILED or an INGESTING claim older than `stale_after`.
    async fn claim_event(
        &self,
        event: &FilingEvent,
        stale_after: Duration,
    ) -> Result<ClaimOutcome, AppError>;

    async fn get_event(&self, event_id: &str) -> Result<Option<FilingEvent>, AppError>;

    /// Create-or-merge. Creating requires `seed`; status changes that are not
    /// forward transitions leave the row untouched. Returns the stored row.
    async fn upsert_event(
        &self,
        event_id: &str,
        seed: Option<&FilingEvent>,
        patch: &EventPatch,
    ) -> Result<Option<FilingEvent>, AppError>;

    async fn get_analysis(&self, event_id: &str) -> Result<Option<FilingAnalysis>, AppError>;

    /// Insert-if-absent. Returns false when an analysis already existed.
    async fn insert_analysis(&self, analysis: &FilingAnalysis) -> Result<bool, AppError>;

    async fn get_fingerprint(&self, content_hash: &str)
        -> Result<Option<ContentFingerprint>, AppError>;

    /// Insert-if-absent. Returns whichever fingerprint is stored afterwards.
    async fn insert_fingerprint(
        &self,
        fingerprint: &ContentFingerprint,
    ) -> Result<ContentFingerprint, AppError>;

    async fn get_company(&self, ticker: &str) -> Result<Option<CompanyMetadata>, AppError>;
}
