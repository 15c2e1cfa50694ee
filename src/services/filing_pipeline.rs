use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};
use url::Url;

use crate::config::PipelineConfig;
use crate::errors::AppError;
use crate::external::filing_source::{FilingSource, KeyFacts};
use crate::models::{
    event_id_for_url, AnalyzeOutcome, ClaimOutcome, EventPatch, EventStatus, FeedRow,
    FilingEvent, FilingForm,
};
use crate::services::analysis_engine::{AnalysisContext, AnalysisEngine};
use crate::services::dedup_index::DedupIndex;
use crate::services::document_fetcher::DocumentFetcher;
use crate::services::event_ledger::EventLedger;
use crate::services::filing_locator::FilingLocator;
use crate::services::fingerprint::content_hash;
use crate::services::llm_service::LlmProvider;
use crate::services::result_projector::ResultProjector;
use crate::services::ticker_resolver::{normalize_ticker, TickerResolver};
use crate::store::FilingStore;

/// One filing to ingest, however it was discovered
#[derive(Debug, Clone)]
struct IngestJob {
    event_id: String,
    ticker: String,
    registry_id: Option<String>,
    company_name: Option<String>,
    form: FilingForm,
    filing_date: NaiveDate,
    document_url: String,
}

/// resolve -> locate -> identity check -> claim -> fetch -> hash -> hash check
/// -> analyze -> persist -> project
pub struct FilingPipeline {
    source: Arc<dyn FilingSource>,
    store: Arc<dyn FilingStore>,
    resolver: TickerResolver,
    locator: FilingLocator,
    fetcher: DocumentFetcher,
    dedup: DedupIndex,
    ledger: EventLedger,
    engine: AnalysisEngine,
    projector: ResultProjector,
    archives_base: String,
    trusted_host: String,
    trusted_domain: String,
}

impl FilingPipeline {
    pub fn new(
        source: Arc<dyn FilingSource>,
        store: Arc<dyn FilingStore>,
        llm: Arc<dyn LlmProvider>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            resolver: TickerResolver::new(source.clone()),
            locator: FilingLocator::new(source.clone()),
            fetcher: DocumentFetcher::new(source.clone(), config.min_document_chars),
            dedup: DedupIndex::new(store.clone()),
            ledger: EventLedger::new(
                store.clone(),
                config.claim_stale_after,
                config.claim_poll_interval,
                config.claim_wait_timeout,
            ),
            engine: AnalysisEngine::new(llm, config.analysis_policy, config.max_prompt_chars),
            projector: ResultProjector::new(store.clone()),
            archives_base: config.edgar.archives_base.clone(),
            trusted_host: config.trusted_host.to_lowercase(),
            trusted_domain: config.trusted_domain.to_lowercase(),
            source,
            store,
        }
    }

    /// Analyzes the newest quarterly (else annual) filing for `ticker`.
    pub async fn analyze_latest_filing(&self, ticker: &str) -> Result<AnalyzeOutcome, AppError> {
        info!("🔍 Analyzing latest filing for {}", ticker);

        let entry = self.resolver.resolve(ticker).await?;
        let filing = self.locator.latest_filing(&entry).await?;

        let job = IngestJob {
            event_id: filing.event_id(),
            document_url: filing.document_url(&self.archives_base),
            ticker: entry.ticker.to_uppercase(),
            registry_id: Some(entry.registry_id),
            company_name: Some(entry.company_name),
            form: filing.form,
            filing_date: filing.filing_date,
        };
        self.ingest(job).await
    }

    /// Analyzes a caller-supplied document. Only the trusted filing host is accepted,
    /// and that is checked before any network call.
    pub async fn analyze_filing_at_url(
        &self,
        ticker: &str,
        url: &str,
        form_label: Option<&str>,
    ) -> Result<AnalyzeOutcome, AppError> {
        let ticker = normalize_ticker(ticker);
        if ticker.is_empty() {
            return Err(AppError::Validation("ticker must not be empty".to_string()));
        }
        let url = validate_source(url, &self.trusted_host, &self.trusted_domain)?;
        info!("🔍 Analyzing {} filing at {}", ticker, url);

        // Registry data only feeds the display name and facts, so a miss is tolerated
        let entry = match self.resolver.resolve(&ticker).await {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Could not resolve {} for URL submission: {}", ticker, e);
                None
            }
        };

        let job = IngestJob {
            event_id: event_id_for_url(&ticker, url.as_str()),
            registry_id: entry.as_ref().map(|e| e.registry_id.clone()),
            company_name: entry.map(|e| e.company_name),
            form: FilingForm::from_label(form_label),
            filing_date: Utc::now().date_naive(),
            document_url: url.to_string(),
            ticker,
        };
        self.ingest(job).await
    }

    pub async fn event(&self, event_id: &str) -> Result<FilingEvent, AppError> {
        self.ledger
            .get(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("event {}", event_id)))
    }

    pub async fn feed_row(&self, event_id: &str) -> Result<FeedRow, AppError> {
        self.projector.to_feed_row(event_id, None).await
    }

    async fn ingest(&self, job: IngestJob) -> Result<AnalyzeOutcome, AppError> {
        if self.dedup.by_identity(&job.event_id).await?.is_some() {
            info!("♻️ {} already analyzed, skipping fetch", job.event_id);
            return self.outcome(&job, true).await;
        }

        let seed = FilingEvent::ingesting(
            job.event_id.clone(),
            job.ticker.clone(),
            job.form,
            job.filing_date,
            job.document_url.clone(),
        );

        match self.ledger.claim(&seed).await? {
            ClaimOutcome::Claimed(_) => {}
            ClaimOutcome::Existing(existing) if existing.status == EventStatus::Analyzed => {
                return self.outcome(&job, true).await;
            }
            ClaimOutcome::Existing(_) => {
                self.ledger.wait_for_settled(&job.event_id).await?;
                return self.outcome(&job, true).await;
            }
        }

        match self.run_claimed(&job).await {
            Ok(deduped) => {
                info!("✅ {} analyzed (deduped: {})", job.event_id, deduped);
                self.outcome(&job, deduped).await
            }
            Err(e) => {
                warn!("❌ {} failed: {}", job.event_id, e);
                self.ledger.mark_failed(&job.event_id, &e).await;
                Err(e)
            }
        }
    }

    /// Work done while holding the claim. Returns whether an existing analysis was reused.
    async fn run_claimed(&self, job: &IngestJob) -> Result<bool, AppError> {
        let text = self.fetcher.fetch_normalized_text(&job.document_url).await?;
        let hash = content_hash(&text);

        if let Some(hit) = self.dedup.by_content_hash(&hash).await? {
            info!(
                "♻️ {} has the same content as {}, reusing its analysis",
                job.event_id, hit.analysis_event_id
            );
            self.ledger
                .upsert(
                    &job.event_id,
                    None,
                    EventPatch::analyzed(&hash, &hit.analysis_event_id),
                )
                .await?;
            return Ok(true);
        }

        let (facts, ctx) = tokio::join!(self.optional_facts(job), async {
            AnalysisContext {
                event_id: job.event_id.clone(),
                ticker: job.ticker.clone(),
                form: job.form,
                filing_date: job.filing_date,
                source_url: job.document_url.clone(),
                content_hash: hash.clone(),
            }
        });

        let analysis = self.engine.analyze(&ctx, &text, facts.as_ref()).await?;
        if !self.store.insert_analysis(&analysis).await? {
            warn!("Analysis for {} was already stored, keeping the first write", job.event_id);
        }

        let fingerprint = self.dedup.record(&hash, &job.event_id).await?;
        if fingerprint.event_id != job.event_id {
            info!(
                "Content hash for {} was recorded first by {}",
                job.event_id, fingerprint.event_id
            );
        }

        self.ledger
            .upsert(&job.event_id, None, EventPatch::analyzed(&hash, &job.event_id))
            .await?;
        Ok(false)
    }

    /// Best-effort numeric facts; any failure is logged and treated as absent
    async fn optional_facts(&self, job: &IngestJob) -> Option<KeyFacts> {
        let registry_id = job.registry_id.as_deref()?;
        match self.source.key_facts(registry_id).await {
            Ok(facts) if !facts.is_empty() => Some(facts),
            Ok(_) => None,
            Err(e) => {
                warn!("Key facts unavailable for {}: {}", job.ticker, e);
                None
            }
        }
    }

    async fn outcome(&self, job: &IngestJob, deduped: bool) -> Result<AnalyzeOutcome, AppError> {
        let feed_row = self
            .projector
            .to_feed_row(&job.event_id, job.company_name.as_deref())
            .await?;
        Ok(AnalyzeOutcome {
            event_id: job.event_id.clone(),
            feed_row,
            deduped,
        })
    }
}

/// Accepts http(s) URLs on the trusted host, or on the configured trusted domain
/// and its subdomains. The domain is never derived from the host.
pub fn validate_source(
    raw: &str,
    trusted_host: &str,
    trusted_domain: &str,
) -> Result<Url, AppError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| AppError::InvalidSource(format!("{}: {}", raw.trim(), e)))?;

    if !matches!(url.scheme(), "https" | "http") {
        return Err(AppError::InvalidSource(format!(
            "unsupported scheme {}",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .map(str::to_lowercase)
        .ok_or_else(|| AppError::InvalidSource(format!("{} has no host", url)))?;

    let trusted = trusted_host.trim().to_lowercase();
    let domain = trusted_domain.trim().trim_start_matches('.').to_lowercase();
    let in_domain =
        !domain.is_empty() && (host == domain || host.ends_with(&format!(".{}", domain)));

    if host == trusted || in_domain {
        Ok(url)
    } else {
        Err(AppError::InvalidSource(format!("host {} is not {}", host, trusted)))
    }
}
