mod analysis;
mod batch;
mod feed;
mod filing;

pub use analysis::{
    AnalysisBody, AnalysisFlags, AnalysisSummary, FilingAnalysis, Kpi, Provenance, Risk,
    RiskSeverity, Theme,
};
pub use batch::{
    AnalyzeTickerRequest, AnalyzeUrlRequest, BatchItemResult, BatchOptions, BatchRequest,
    BatchRun,
};
pub use feed::{AnalyzeOutcome, FeedRow, OverallSentiment};
pub use filing::{
    event_id_for_filing, event_id_for_url, ClaimOutcome, CompanyMetadata, ContentFingerprint,
    EventPatch, EventStatus, FilingEvent, FilingForm, FilingMetadata, RegistryEntry,
};
