use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::errors::AppError;
use crate::models::{ContentFingerprint, EventStatus, FilingAnalysis};
use crate::store::FilingStore;

/// Two cost-ordered lookups: by event identity (before any download) and by
/// content hash (after download, before the model call).
pub struct DedupIndex {
    store: Arc<dyn FilingStore>,
}

/// What an identity or hash hit resolves to
#[derive(Debug, Clone)]
pub struct DedupHit {
    /// Event id the stored analysis lives under
    pub analysis_event_id: String,
    pub analysis: FilingAnalysis,
}

impl DedupIndex {
    pub fn new(store: Arc<dyn FilingStore>) -> Self {
        Self { store }
    }

    /// Cheapest check. Hits when the event is ANALYZED (possibly pointing at
    /// another event's analysis) or an analysis is stored under this id.
    pub async fn by_identity(&self, event_id: &str) -> Result<Option<DedupHit>, AppError> {
        if let Some(event) = self.store.get_event(event_id).await? {
            if event.status == EventStatus::Analyzed {
                let target = event
                    .analysis_event_id
                    .clone()
                    .unwrap_or_else(|| event.event_id.clone());
                if let Some(analysis) = self.store.get_analysis(&target).await? {
                    info!("Identity hit for {} (analysis {})", event_id, target);
                    return Ok(Some(DedupHit {
                        analysis_event_id: target,
                        analysis,
                    }));
                }
            }
        }

        if let Some(analysis) = self.store.get_analysis(event_id).await? {
            info!("Identity hit for {} (analysis row)", event_id);
            return Ok(Some(DedupHit {
                analysis_event_id: event_id.to_string(),
                analysis,
            }));
        }

        Ok(None)
    }

    /// Hits when identical normalized content was already analyzed under any event
    pub async fn by_content_hash(&self, content_hash: &str) -> Result<Option<DedupHit>, AppError> {
        let Some(fingerprint) = self.store.get_fingerprint(content_hash).await? else {
            return Ok(None);
        };

        match self.store.get_analysis(&fingerprint.event_id).await? {
            Some(analysis) => {
                info!(
                    "Content hash hit {} -> analysis {}",
                    &content_hash[..content_hash.len().min(12)],
                    fingerprint.event_id
                );
                Ok(Some(DedupHit {
                    analysis_event_id: fingerprint.event_id,
                    analysis,
                }))
            }
            None => Ok(None),
        }
    }

    /// Records the back-pointer for freshly analyzed content. If another
    /// pipeline won the race, its pointer is kept and returned.
    pub async fn record(
        &self,
        content_hash: &str,
        event_id: &str,
    ) -> Result<ContentFingerprint, AppError> {
        self.store
            .insert_fingerprint(&ContentFingerprint {
                content_hash: content_hash.to_string(),
                event_id: event_id.to_string(),
                created_at: Utc::now(),
            })
            .await
    }
}
