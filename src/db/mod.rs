pub mod company_queries;
pub mod content_fingerprint_queries;
pub mod filing_analysis_queries;
pub mod filing_event_queries;
