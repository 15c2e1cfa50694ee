use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::error;

use crate::db::{
    company_queries, content_fingerprint_queries, filing_analysis_queries, filing_event_queries,
};
use crate::errors::AppError;
use crate::models::{
    ClaimOutcome, CompanyMetadata, ContentFingerprint, EventPatch, FilingAnalysis, FilingEvent,
};
use crate::store::FilingStore;

/// Postgres-backed system of record
#[derive(Clone)]
pub struct PgFilingStore {
    pool: PgPool,
}

impl PgFilingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FilingStore for PgFilingStore {
    async fn claim_event(
        &self,
        event: &FilingEvent,
        stale_after: Duration,
    ) -> Result<ClaimOutcome, AppError> {
        let claimed = filing_event_queries::claim(&self.pool, event, stale_after.as_secs_f64())
            .await
            .map_err(|e| {
                error!("Failed to claim event {}: {}", event.event_id, e);
                AppError::Db(e)
            })?;

        if let Some(row) = claimed {
            return Ok(ClaimOutcome::Claimed(row.try_into()?));
        }

        let existing = filing_event_queries::get_by_event_id(&self.pool, &event.event_id)
            .await?
            .ok_or_else(|| {
                AppError::Db(sqlx::Error::RowNotFound)
            })?;
        Ok(ClaimOutcome::Existing(existing.try_into()?))
    }

    async fn get_event(&self, event_id: &str) -> Result<Option<FilingEvent>, AppError> {
        let row = filing_event_queries::get_by_event_id(&self.pool, event_id).await?;
        Ok(row.map(FilingEvent::try_from).transpose()?)
    }

    async fn upsert_event(
        &self,
        event_id: &str,
        seed: Option<&FilingEvent>,
        patch: &EventPatch,
    ) -> Result<Option<FilingEvent>, AppError> {
        if let Some(seed) = seed {
            let mut seed = seed.clone();
            seed.event_id = event_id.to_string();
            filing_event_queries::insert_if_absent(&self.pool, &seed).await?;
        }

        filing_event_queries::merge(&self.pool, event_id, patch)
            .await
            .map_err(|e| {
                error!("Failed to update event {}: {}", event_id, e);
                AppError::Db(e)
            })?;

        self.get_event(event_id).await
    }

    async fn get_analysis(&self, event_id: &str) -> Result<Option<FilingAnalysis>, AppError> {
        let row = filing_analysis_queries::get_by_event_id(&self.pool, event_id).await?;
        Ok(row.map(FilingAnalysis::try_from).transpose()?)
    }

    async fn insert_analysis(&self, analysis: &FilingAnalysis) -> Result<bool, AppError> {
        filing_analysis_queries::insert_if_absent(&self.pool, analysis)
            .await
            .map_err(|e| {
                error!("Failed to persist analysis {}: {}", analysis.event_id, e);
                AppError::Db(e)
            })
    }

    async fn get_fingerprint(
        &self,
        content_hash: &str,
    ) -> Result<Option<ContentFingerprint>, AppError> {
        let row = content_fingerprint_queries::get_by_hash(&self.pool, content_hash).await?;
        Ok(row.map(ContentFingerprint::from))
    }

    async fn insert_fingerprint(
        &self,
        fingerprint: &ContentFingerprint,
    ) -> Result<ContentFingerprint, AppError> {
        let row = content_fingerprint_queries::insert_if_absent(&self.pool, fingerprint).await?;
        Ok(row.into())
    }

    async fn get_company(&self, ticker: &str) -> Result<Option<CompanyMetadata>, AppError> {
        Ok(company_queries::get_by_ticker(&self.pool, ticker).await?)
    }
}
