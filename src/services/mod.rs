pub mod analysis_engine;
pub mod batch_coordinator;
pub mod dedup_index;
pub mod document_fetcher;
pub mod event_ledger;
pub mod filing_locator;
pub mod filing_pipeline;
pub mod fingerprint;
pub mod job_scheduler_service;
pub mod llm_service;
pub mod rate_limiter;
pub mod result_projector;
pub mod ticker_resolver;
