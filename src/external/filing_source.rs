use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::RegistryEntry;

/// Filing history as published by the registry: parallel arrays, newest first.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct FilingHistory {
    pub form: Vec<String>,
    pub filing_date: Vec<String>,
    pub filing_identifier: Vec<String>,
    pub primary_document_ref: Vec<String>,
}

/// Latest reported value per numeric concept (e.g. "Revenues" -> 1.2e9)
pub type KeyFacts = BTreeMap<String, f64>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(String),

    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited")]
    RateLimited,

    #[error("not found: {0}")]
    NotFound(String),
}

/// The three read-only registry endpoints plus the best-effort facts endpoint.
#[async_trait]
pub trait FilingSource: Send + Sync {
    /// Full ticker directory. Callers cache it.
    async fn registry_snapshot(&self) -> Result<Vec<RegistryEntry>, SourceError>;

    async fn filing_history(&self, registry_id: &str) -> Result<FilingHistory, SourceError>;

    async fn fetch_document(&self, url: &str) -> Result<Vec<u8>, SourceError>;

    async fn key_facts(&self, registry_id: &str) -> Result<KeyFacts, SourceError>;
}
