#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use filing_analysis_backend::config::{AnalysisPolicy, PipelineConfig};
use filing_analysis_backend::errors::LlmError;
use filing_analysis_backend::external::filing_source::{
    FilingHistory, FilingSource, KeyFacts, SourceError,
};
use filing_analysis_backend::models::RegistryEntry;
use filing_analysis_backend::services::filing_pipeline::FilingPipeline;
use filing_analysis_backend::services::llm_service::LlmProvider;
use filing_analysis_backend::store::InMemoryFilingStore;

pub const ACME_DOC_URL: &str =
    "https://www.sec.gov/Archives/edgar/data/123/000012325000045/acme10q.htm";
pub const ACME_EVENT_ID: &str = "ACME-000000012325000045";

pub const ANALYSIS_JSON: &str = r#"{
    "summary": {"tldr": "Revenue grew 12% on strong cloud demand.", "bullets": ["Cloud revenue +30%", "Operating margin 21%"]},
    "themes": [{"topic": "Cloud growth", "sentiment": 0.8}, {"topic": "FX headwinds", "sentiment": -0.2}],
    "kpis": [{"name": "Revenue", "value": 1250.0, "unit": "USD m", "yoyDelta": 0.12, "qoqDelta": 0.03}],
    "risks": [{"label": "Customer concentration", "severity": "medium"}],
    "flags": {"guidanceChange": false, "liquidityConcern": false, "marginInflection": true}
}"#;

/// HTML filing whose normalized text is comfortably above the minimum length
pub fn filing_html(company: &str) -> String {
    let paragraph = format!(
        "<p>{} reported quarterly results. Revenue increased compared with the prior year \
         period, driven by subscription growth and higher services attach rates. Operating \
         expenses grew more slowly than revenue.</p>\n",
        company
    );
    format!(
        "<html><head><title>10-Q</title><style>p {{ margin: 0 }}</style></head>\
         <body><nav>Menu</nav><h1>Quarterly Report</h1>{}<script>track()</script></body></html>",
        paragraph.repeat(40)
    )
}

/// In-memory registry, history, document and facts endpoints that count every call
#[derive(Default)]
pub struct FakeSource {
    registry: Vec<RegistryEntry>,
    histories: HashMap<String, FilingHistory>,
    documents: Mutex<HashMap<String, String>>,
    facts: HashMap<String, KeyFacts>,
    pub registry_calls: AtomicUsize,
    pub history_calls: AtomicUsize,
    pub document_fetches: AtomicUsize,
    pub facts_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// ACME with one 8-K, then the 10-Q at `ACME_DOC_URL`, then an older 10-K
    pub fn with_acme() -> Self {
        Self::new()
            .company("ACME", "0000000123", "Acme Corp")
            .history(
                "0000000123",
                &[
                    ("8-K", "2025-08-10", "0000000123-25-000050", "acme8k.htm"),
                    ("10-Q", "2025-08-01", "0000000123-25-000045", "acme10q.htm"),
                    ("10-K", "2025-02-15", "0000000123-25-000010", "acme10k.htm"),
                ],
            )
            .document(ACME_DOC_URL, &filing_html("Acme Corp"))
    }

    pub fn company(mut self, ticker: &str, registry_id: &str, name: &str) -> Self {
        self.registry.push(RegistryEntry {
            ticker: ticker.to_string(),
            registry_id: registry_id.to_string(),
            company_name: name.to_string(),
        });
        self
    }

    pub fn history(mut self, registry_id: &str, rows: &[(&str, &str, &str, &str)]) -> Self {
        let mut history = FilingHistory::default();
        for (form, date, identifier, doc) in rows {
            history.form.push(form.to_string());
            history.filing_date.push(date.to_string());
            history.filing_identifier.push(identifier.to_string());
            history.primary_document_ref.push(doc.to_string());
        }
        self.histories.insert(registry_id.to_string(), history);
        self
    }

    pub fn document(self, url: &str, body: &str) -> Self {
        self.documents.lock().insert(url.to_string(), body.to_string());
        self
    }

    pub fn facts(mut self, registry_id: &str, facts: &[(&str, f64)]) -> Self {
        self.facts.insert(
            registry_id.to_string(),
            facts.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        );
        self
    }

    pub fn network_calls(&self) -> usize {
        self.registry_calls.load(Ordering::SeqCst)
            + self.history_calls.load(Ordering::SeqCst)
            + self.document_fetches.load(Ordering::SeqCst)
            + self.facts_calls.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.document_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FilingSource for FakeSource {
    async fn registry_snapshot(&self) -> Result<Vec<RegistryEntry>, SourceError> {
        self.registry_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.registry.clone())
    }

    async fn filing_history(&self, registry_id: &str) -> Result<FilingHistory, SourceError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        self.histories
            .get(registry_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("CIK{}", registry_id)))
    }

    async fn fetch_document(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        self.document_fetches.fetch_add(1, Ordering::SeqCst);
        self.documents
            .lock()
            .get(url)
            .map(|body| body.clone().into_bytes())
            .ok_or_else(|| SourceError::NotFound(url.to_string()))
    }

    async fn key_facts(&self, registry_id: &str) -> Result<KeyFacts, SourceError> {
        self.facts_calls.fetch_add(1, Ordering::SeqCst);
        self.facts
            .get(registry_id)
            .cloned()
            .ok_or_else(|| SourceError::Network("companyfacts timed out".to_string()))
    }
}

/// Scripted model: fixed response, optional latency, switchable failure
pub struct FakeLlm {
    response: Mutex<String>,
    delay: Duration,
    failing: AtomicBool,
    pub calls: AtomicUsize,
    pub last_prompt: Mutex<Option<String>>,
}

impl FakeLlm {
    pub fn new(response: &str) -> Self {
        Self {
            response: Mutex::new(response.to_string()),
            delay: Duration::ZERO,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for FakeLlm {
    fn vendor(&self) -> String {
        "fake/test-model".to_string()
    }

    async fn complete_json(&self, _system: &str, prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock() = Some(prompt.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(LlmError::NetworkError("connection reset".to_string()));
        }
        Ok(self.response.lock().clone())
    }
}

pub fn test_config(policy: AnalysisPolicy) -> PipelineConfig {
    PipelineConfig {
        analysis_policy: policy,
        claim_poll_interval: Duration::from_millis(10),
        claim_wait_timeout: Duration::from_secs(5),
        ..PipelineConfig::default()
    }
}

pub struct Harness {
    pub pipeline: Arc<FilingPipeline>,
    pub source: Arc<FakeSource>,
    pub llm: Arc<FakeLlm>,
    pub store: Arc<InMemoryFilingStore>,
}

pub fn harness(source: FakeSource, llm: FakeLlm, policy: AnalysisPolicy) -> Harness {
    let source = Arc::new(source);
    let llm = Arc::new(llm);
    let store = Arc::new(InMemoryFilingStore::new());
    let pipeline = Arc::new(FilingPipeline::new(
        source.clone(),
        store.clone(),
        llm.clone(),
        &test_config(policy),
    ));
    Harness {
        pipeline,
        source,
        llm,
        store,
    }
}
