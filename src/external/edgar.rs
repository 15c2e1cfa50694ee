use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::EdgarConfig;
use crate::external::filing_source::{FilingHistory, FilingSource, KeyFacts, SourceError};
use crate::models::RegistryEntry;
use crate::services::rate_limiter::RateLimiter;

const MAX_ATTEMPTS: u32 = 3;
const MAX_IN_FLIGHT: usize = 4;

/// Concepts pulled from the company-facts document for prompt context
const KEY_CONCEPTS: &[&str] = &[
    "Revenues",
    "NetIncomeLoss",
    "EarningsPerShareDiluted",
    "OperatingIncomeLoss",
    "CashAndCashEquivalentsAtCarryingValue",
    "LongTermDebt",
];

/// HTTP client for the filing registry (ticker directory, submissions,
/// archives and XBRL company facts).
pub struct EdgarClient {
    client: Client,
    config: EdgarConfig,
    limiter: Arc<RateLimiter>,
}

#[derive(Debug, Deserialize)]
struct CompanyTicker {
    cik_str: u64,
    ticker: String,
    title: String,
}

#[derive(Debug, Deserialize)]
struct Submissions {
    filings: SubmissionFilings,
}

#[derive(Debug, Deserialize)]
struct SubmissionFilings {
    recent: RecentFilings,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecentFilings {
    accession_number: Vec<String>,
    form: Vec<String>,
    filing_date: Vec<String>,
    primary_document: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CompanyFacts {
    #[serde(default)]
    facts: HashMap<String, HashMap<String, ConceptFacts>>,
}

#[derive(Debug, Deserialize)]
struct ConceptFacts {
    #[serde(default)]
    units: HashMap<String, Vec<FactValue>>,
}

#[derive(Debug, Deserialize)]
struct FactValue {
    val: f64,
    #[serde(default)]
    filed: Option<String>,
}

impl EdgarClient {
    pub fn new(config: EdgarConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SourceError::Network(format!("Failed to build HTTP client: {}", e)))?;

        let limiter = Arc::new(RateLimiter::new(MAX_IN_FLIGHT, config.requests_per_second));

        Ok(Self {
            client,
            config,
            limiter,
        })
    }

    pub fn pad_registry_id(id: &str) -> String {
        format!("{:0>10}", id.trim())
    }

    async fn get_with_retry(&self, url: &str) -> Result<reqwest::Response, SourceError> {
        let mut attempt = 0;
        let mut delay = Duration::from_secs(1);

        loop {
            attempt += 1;
            match self.get_once(url).await {
                Ok(response) => return Ok(response),
                Err(e @ (SourceError::RateLimited | SourceError::Network(_)))
                    if attempt < MAX_ATTEMPTS =>
                {
                    warn!(
                        "Registry request failed (attempt {}/{}): {}. Retrying in {:?}...",
                        attempt, MAX_ATTEMPTS, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once(&self, url: &str) -> Result<reqwest::Response, SourceError> {
        let _guard = self.limiter.acquire().await;

        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.config.user_agent)
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(url.to_string()));
        }
        if status.is_server_error() {
            return Err(SourceError::Network(format!("{} returned {}", url, status)));
        }
        if !status.is_success() {
            return Err(SourceError::BadResponse(format!("{} returned {}", url, status)));
        }

        Ok(response)
    }
}

#[async_trait]
impl FilingSource for EdgarClient {
    async fn registry_snapshot(&self) -> Result<Vec<RegistryEntry>, SourceError> {
        info!("Loading ticker directory from {}", self.config.registry_url);

        let response = self.get_with_retry(&self.config.registry_url).await?;
        let data: HashMap<String, CompanyTicker> = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))?;

        let entries: Vec<RegistryEntry> = data
            .into_values()
            .map(|company| RegistryEntry {
                ticker: company.ticker.to_uppercase(),
                registry_id: Self::pad_registry_id(&company.cik_str.to_string()),
                company_name: company.title,
            })
            .collect();

        info!("Ticker directory loaded: {} entries", entries.len());
        Ok(entries)
    }

    async fn filing_history(&self, registry_id: &str) -> Result<FilingHistory, SourceError> {
        let url = format!(
            "{}/CIK{}.json",
            self.config.submissions_base.trim_end_matches('/'),
            Self::pad_registry_id(registry_id)
        );

        let response = self.get_with_retry(&url).await?;
        let submissions: Submissions = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))?;

        let recent = submissions.filings.recent;
        Ok(FilingHistory {
            form: recent.form,
            filing_date: recent.filing_date,
            filing_identifier: recent.accession_number,
            primary_document_ref: recent.primary_document,
        })
    }

    async fn fetch_document(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        info!("📄 Fetching filing document: {}", url);

        let response = self.get_with_retry(url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SourceError::Network(format!("Failed to read document body: {}", e)))?;

        info!("📄 Downloaded {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }

    async fn key_facts(&self, registry_id: &str) -> Result<KeyFacts, SourceError> {
        let url = format!(
            "{}/CIK{}.json",
            self.config.facts_base.trim_end_matches('/'),
            Self::pad_registry_id(registry_id)
        );

        let response = self.get_with_retry(&url).await?;
        let facts: CompanyFacts = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))?;

        Ok(reduce_key_facts(&facts))
    }
}

/// Latest filed value per key concept, preferring USD units
fn reduce_key_facts(facts: &CompanyFacts) -> KeyFacts {
    let mut out = KeyFacts::new();
    let Some(gaap) = facts.facts.get("us-gaap") else {
        return out;
    };

    for concept in KEY_CONCEPTS {
        let Some(concept_facts) = gaap.get(*concept) else {
            continue;
        };
        let values = concept_facts
            .units
            .get("USD")
            .or_else(|| concept_facts.units.get("USD/shares"))
            .or_else(|| concept_facts.units.values().next());

        let latest = values.and_then(|vals| {
            vals.iter()
                .max_by(|a, b| a.filed.as_deref().unwrap_or("").cmp(b.filed.as_deref().unwrap_or("")))
        });

        if let Some(fact) = latest {
            out.insert(concept.to_string(), fact.val);
        }
    }

    out
}
