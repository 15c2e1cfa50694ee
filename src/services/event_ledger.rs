use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::models::{ClaimOutcome, EventPatch, EventStatus, FilingEvent};
use crate::store::FilingStore;

/// Status record per event id.
///
/// Work is claimed before any expensive step so a crash leaves an inspectable
/// INGESTING/FAILED row, and concurrent callers for the same filing wait on
/// the winner instead of repeating its work.
pub struct EventLedger {
    store: Arc<dyn FilingStore>,
    stale_after: Duration,
    poll_interval: Duration,
    wait_timeout: Duration,
}

impl EventLedger {
    pub fn new(
        store: Arc<dyn FilingStore>,
        stale_after: Duration,
        poll_interval: Duration,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            store,
            stale_after,
            poll_interval,
            wait_timeout,
        }
    }

    pub async fn claim(&self, event: &FilingEvent) -> Result<ClaimOutcome, AppError> {
        let outcome = self.store.claim_event(event, self.stale_after).await?;
        match &outcome {
            ClaimOutcome::Claimed(row) => {
                info!("Claimed {} (attempt {})", row.event_id, row.attempts)
            }
            ClaimOutcome::Existing(row) => {
                info!("{} already held with status {:?}", row.event_id, row.status)
            }
        }
        Ok(outcome)
    }

    /// Create-or-merge. `seed` supplies the full row when the event does not exist yet.
    pub async fn upsert(
        &self,
        event_id: &str,
        seed: Option<&FilingEvent>,
        patch: EventPatch,
    ) -> Result<Option<FilingEvent>, AppError> {
        let stored = self.store.upsert_event(event_id, seed, &patch).await?;

        if let (Some(row), Some(wanted)) = (&stored, patch.status) {
            if row.status != wanted {
                warn!(
                    "Ignored non-forward transition for {}: {:?} -> {:?}",
                    event_id, row.status, wanted
                );
            }
        }
        Ok(stored)
    }

    pub async fn get(&self, event_id: &str) -> Result<Option<FilingEvent>, AppError> {
        self.store.get_event(event_id).await
    }

    /// Records a failure without ever masking the original error
    pub async fn mark_failed(&self, event_id: &str, error: &AppError) {
        if let Err(e) = self
            .upsert(event_id, None, EventPatch::failed(error))
            .await
        {
            warn!("Could not record failure for {}: {}", event_id, e);
        }
    }

    /// Polls an event held by another worker until it settles.
    pub async fn wait_for_settled(&self, event_id: &str) -> Result<FilingEvent, AppError> {
        let deadline = Instant::now() + self.wait_timeout;

        loop {
            if let Some(event) = self.store.get_event(event_id).await? {
                match event.status {
                    EventStatus::Analyzed => return Ok(event),
                    EventStatus::Failed => {
                        let reason = event.error.as_deref().unwrap_or("unknown error");
                        warn!("Event {} failed under another worker: {}", event_id, reason);
                        return Err(AppError::from_recorded(event.error_kind.as_deref(), reason));
                    }
                    EventStatus::Ingesting => {}
                }
            }

            if Instant::now() + self.poll_interval > deadline {
                return Err(AppError::InProgress(event_id.to_string()));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
