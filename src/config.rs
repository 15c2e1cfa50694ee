use std::time::Duration;

use tracing::warn;

use crate::models::BatchOptions;

/// How the analysis engine treats model output that does not match the schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisPolicy {
    /// Default-fill missing or mistyped fields and keep going
    Lenient,
    /// Reject with `AnalysisMalformed`
    Strict,
}

impl AnalysisPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "lenient" => Some(AnalysisPolicy::Lenient),
            "strict" => Some(AnalysisPolicy::Strict),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EdgarConfig {
    pub user_agent: String,
    pub registry_url: String,
    pub submissions_base: String,
    pub archives_base: String,
    pub facts_base: String,
    pub requests_per_second: u32,
}

impl Default for EdgarConfig {
    fn default() -> Self {
        Self {
            user_agent: "FilingFeed/1.0 (ops@filingfeed.dev)".to_string(),
            registry_url: "https://www.sec.gov/files/company_tickers.json".to_string(),
            submissions_base: "https://data.sec.gov/submissions".to_string(),
            archives_base: "https://www.sec.gov/Archives/edgar/data".to_string(),
            facts_base: "https://data.sec.gov/api/xbrl/companyfacts".to_string(),
            requests_per_second: 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub edgar: EdgarConfig,
    pub trusted_host: String,
    /// Hosts equal to or under this domain are also accepted; empty disables
    pub trusted_domain: String,
    pub min_document_chars: usize,
    pub max_prompt_chars: usize,
    pub analysis_policy: AnalysisPolicy,
    pub claim_stale_after: Duration,
    pub claim_poll_interval: Duration,
    pub claim_wait_timeout: Duration,
    pub batch: BatchDefaults,
    pub watchlist: Vec<String>,
    pub refresh_cron: String,
}

#[derive(Debug, Clone, Copy)]
pub struct BatchDefaults {
    pub max_concurrency: usize,
    pub max_concurrency_cap: usize,
    pub soft_deadline_ms: u64,
}

impl BatchDefaults {
    pub fn options(&self) -> BatchOptions {
        BatchOptions {
            max_concurrency: self.max_concurrency,
            soft_deadline_ms: self.soft_deadline_ms,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            edgar: EdgarConfig::default(),
            trusted_host: "www.sec.gov".to_string(),
            trusted_domain: "sec.gov".to_string(),
            min_document_chars: 5000,
            max_prompt_chars: 60_000,
            analysis_policy: AnalysisPolicy::Lenient,
            claim_stale_after: Duration::from_secs(900),
            claim_poll_interval: Duration::from_millis(500),
            claim_wait_timeout: Duration::from_millis(30_000),
            batch: BatchDefaults {
                max_concurrency: 3,
                max_concurrency_cap: 8,
                soft_deadline_ms: 45_000,
            },
            watchlist: Vec::new(),
            refresh_cron: "0 0 6 * * *".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let analysis_policy = match std::env::var("ANALYSIS_POLICY") {
            Ok(raw) => AnalysisPolicy::parse(&raw).unwrap_or_else(|| {
                warn!("Unknown ANALYSIS_POLICY '{}', falling back to lenient", raw);
                AnalysisPolicy::Lenient
            }),
            Err(_) => defaults.analysis_policy,
        };

        Self {
            edgar: EdgarConfig {
                user_agent: env_or("EDGAR_USER_AGENT", defaults.edgar.user_agent),
                registry_url: env_or("EDGAR_REGISTRY_URL", defaults.edgar.registry_url),
                submissions_base: env_or("EDGAR_SUBMISSIONS_BASE", defaults.edgar.submissions_base),
                archives_base: env_or("EDGAR_ARCHIVES_BASE", defaults.edgar.archives_base),
                facts_base: env_or("EDGAR_FACTS_BASE", defaults.edgar.facts_base),
                requests_per_second: env_parse(
                    "EDGAR_REQUESTS_PER_SECOND",
                    defaults.edgar.requests_per_second,
                ),
            },
            trusted_host: env_or("FILING_TRUSTED_HOST", defaults.trusted_host),
            trusted_domain: env_or("FILING_TRUSTED_DOMAIN", defaults.trusted_domain),
            min_document_chars: env_parse("FILING_MIN_CHARS", defaults.min_document_chars),
            max_prompt_chars: env_parse("FILING_MAX_PROMPT_CHARS", defaults.max_prompt_chars),
            analysis_policy,
            claim_stale_after: Duration::from_secs(env_parse("CLAIM_STALE_AFTER_SECS", 900)),
            claim_poll_interval: Duration::from_millis(env_parse("CLAIM_POLL_INTERVAL_MS", 500)),
            claim_wait_timeout: Duration::from_millis(env_parse("CLAIM_WAIT_TIMEOUT_MS", 30_000)),
            batch: BatchDefaults {
                max_concurrency: env_parse("BATCH_MAX_CONCURRENCY", defaults.batch.max_concurrency),
                max_concurrency_cap: env_parse(
                    "BATCH_MAX_CONCURRENCY_CAP",
                    defaults.batch.max_concurrency_cap,
                ),
                soft_deadline_ms: env_parse("BATCH_SOFT_DEADLINE_MS", defaults.batch.soft_deadline_ms),
            },
            watchlist: std::env::var("FILING_WATCHLIST")
                .map(|raw| parse_ticker_list(&raw))
                .unwrap_or_default(),
            refresh_cron: env_or("FILING_REFRESH_CRON", defaults.refresh_cron),
        }
    }
}

/// Splits a comma separated ticker list, dropping blanks
pub fn parse_ticker_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
