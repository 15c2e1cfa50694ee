use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::errors::AppError;
use crate::external::filing_source::FilingSource;
use crate::models::RegistryEntry;

/// Ticker -> canonical registry id, backed by a lazily loaded directory snapshot
pub struct TickerResolver {
    source: Arc<dyn FilingSource>,
    snapshot: RwLock<Option<Arc<HashMap<String, RegistryEntry>>>>,
}

impl TickerResolver {
    pub fn new(source: Arc<dyn FilingSource>) -> Self {
        Self {
            source,
            snapshot: RwLock::new(None),
        }
    }

    pub async fn resolve(&self, ticker: &str) -> Result<RegistryEntry, AppError> {
        let key = normalize_ticker(ticker);
        if key.is_empty() {
            return Err(AppError::Validation("ticker must not be empty".to_string()));
        }

        let snapshot = self.snapshot().await?;
        snapshot
            .get(&key)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("unknown ticker {}", key)))
    }

    async fn snapshot(&self) -> Result<Arc<HashMap<String, RegistryEntry>>, AppError> {
        if let Some(snapshot) = self.snapshot.read().await.as_ref() {
            return Ok(snapshot.clone());
        }

        let mut slot = self.snapshot.write().await;
        // Another task may have loaded it while we waited for the write lock
        if let Some(snapshot) = slot.as_ref() {
            return Ok(snapshot.clone());
        }

        let entries = self.source.registry_snapshot().await?;
        let map: HashMap<String, RegistryEntry> = entries
            .into_iter()
            .map(|entry| (normalize_ticker(&entry.ticker), entry))
            .collect();
        info!("Registry snapshot cached ({} tickers)", map.len());

        let snapshot = Arc::new(map);
        *slot = Some(snapshot.clone());
        Ok(snapshot)
    }
}

pub fn normalize_ticker(ticker: &str) -> String {
    ticker.trim().to_uppercase()
}
