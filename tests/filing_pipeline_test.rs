/// End-to-end pipeline tests against fake registry/model endpoints and the
/// in-memory store. Every external call is counted.
mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{harness, FakeLlm, FakeSource, ACME_DOC_URL, ACME_EVENT_ID, ANALYSIS_JSON};
use filing_analysis_backend::config::AnalysisPolicy;
use filing_analysis_backend::errors::AppError;
use filing_analysis_backend::models::{BatchItemResult, CompanyMetadata, EventStatus, OverallSentiment};
use filing_analysis_backend::services::batch_coordinator::BatchCoordinator;
use filing_analysis_backend::store::FilingStore;

const ACME_COPY_URL: &str =
    "https://www.sec.gov/Archives/edgar/data/123/000012325000045/acme10q-copy.htm";

// ---------------------------------------------------------------------------
// Idempotence and dedup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_call_is_deduped_without_fetching() {
    let h = harness(FakeSource::with_acme(), FakeLlm::new(ANALYSIS_JSON), AnalysisPolicy::Lenient);

    let first = h.pipeline.analyze_latest_filing("acme").await.unwrap();
    assert_eq!(first.event_id, ACME_EVENT_ID);
    assert!(!first.deduped);
    assert_eq!(h.source.fetches(), 1);

    let second = h.pipeline.analyze_latest_filing("ACME").await.unwrap();
    assert_eq!(second.event_id, first.event_id);
    assert!(second.deduped);
    assert_eq!(second.feed_row, first.feed_row);

    assert_eq!(h.source.fetches(), 1, "second call must not download the document");
    assert_eq!(h.llm.call_count(), 1);
    assert_eq!(h.store.analysis_count(), 1);
}

#[tokio::test]
async fn first_run_records_ledger_fingerprint_and_feed_row() {
    let h = harness(FakeSource::with_acme(), FakeLlm::new(ANALYSIS_JSON), AnalysisPolicy::Lenient);

    let outcome = h.pipeline.analyze_latest_filing("ACME").await.unwrap();

    let event = h.store.get_event(ACME_EVENT_ID).await.unwrap().unwrap();
    assert_eq!(event.status, EventStatus::Analyzed);
    assert_eq!(event.document_url, ACME_DOC_URL);
    assert_eq!(event.analysis_event_id.as_deref(), Some(ACME_EVENT_ID));
    let hash = event.content_hash.expect("hash recorded");

    let fingerprint = h.store.get_fingerprint(&hash).await.unwrap().unwrap();
    assert_eq!(fingerprint.event_id, ACME_EVENT_ID);

    let analysis = h.store.get_analysis(ACME_EVENT_ID).await.unwrap().unwrap();
    assert_eq!(analysis.provenance.vendor, "fake/test-model");
    assert_eq!(analysis.provenance.content_hash, hash);
    assert!(!analysis.malformed);

    let row = outcome.feed_row;
    assert_eq!(row.ticker, "ACME");
    assert_eq!(row.name, "Acme Corp");
    assert_eq!(row.quarter, "Q3 2025");
    assert_eq!(row.insights, "Revenue grew 12% on strong cloud demand.");
    assert_eq!(row.ai_tags, vec!["Cloud growth", "FX headwinds"]);
    assert_eq!(row.overall_sentiment, OverallSentiment::Bullish);
    assert_eq!(row.source_url, ACME_DOC_URL);
}

#[tokio::test]
async fn url_submission_and_discovery_share_one_analysis() {
    let source = FakeSource::with_acme().document(ACME_COPY_URL, &common::filing_html("Acme Corp"));
    let h = harness(source, FakeLlm::new(ANALYSIS_JSON), AnalysisPolicy::Lenient);

    let by_url = h
        .pipeline
        .analyze_filing_at_url("ACME", ACME_COPY_URL, Some("10-Q"))
        .await
        .unwrap();
    assert!(!by_url.deduped);
    assert!(by_url.event_id.starts_with("ACME-URL-"));

    let discovered = h.pipeline.analyze_latest_filing("ACME").await.unwrap();
    assert_ne!(discovered.event_id, by_url.event_id);
    assert!(discovered.deduped, "same content must reuse the stored analysis");
    assert_eq!(h.source.fetches(), 2, "hash dedup happens after the download");
    assert_eq!(h.llm.call_count(), 1);
    assert_eq!(h.store.analysis_count(), 1);

    let event = h.store.get_event(&discovered.event_id).await.unwrap().unwrap();
    assert_eq!(event.status, EventStatus::Analyzed);
    assert_eq!(event.analysis_event_id.as_deref(), Some(by_url.event_id.as_str()));

    // The discovered event keeps its own metadata
    assert_eq!(discovered.feed_row.source_url, ACME_DOC_URL);
    assert_eq!(discovered.feed_row.insights, by_url.feed_row.insights);
    assert_eq!(
        discovered.feed_row.overall_sentiment,
        by_url.feed_row.overall_sentiment
    );
}

#[tokio::test]
async fn concurrent_identical_requests_call_the_model_once() {
    let llm = FakeLlm::new(ANALYSIS_JSON).with_delay(Duration::from_millis(150));
    let h = harness(FakeSource::with_acme(), llm, AnalysisPolicy::Lenient);

    let (a, b) = tokio::join!(
        h.pipeline.analyze_latest_filing("ACME"),
        h.pipeline.analyze_latest_filing("ACME")
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.event_id, b.event_id);
    assert_eq!(h.llm.call_count(), 1);
    assert_eq!(h.source.fetches(), 1);
    assert_eq!(h.store.analysis_writes(), 1);
    assert!(a.deduped != b.deduped, "exactly one caller did the work");
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

#[tokio::test]
async fn untrusted_url_is_rejected_before_any_network_call() {
    let h = harness(FakeSource::with_acme(), FakeLlm::new(ANALYSIS_JSON), AnalysisPolicy::Lenient);

    for url in [
        "https://evil.example.com/acme10q.htm",
        "https://www.sec.gov.evil.example/acme10q.htm",
        "ftp://www.sec.gov/acme10q.htm",
        "acme10q.htm",
    ] {
        let err = h
            .pipeline
            .analyze_filing_at_url("ACME", url, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidSource(_)), "{}", url);
    }

    assert_eq!(h.source.network_calls(), 0);
    assert_eq!(h.llm.call_count(), 0);
}

#[tokio::test]
async fn short_document_fails_before_hashing_and_marks_event_failed() {
    let source = FakeSource::with_acme().document(
        ACME_DOC_URL,
        "<html><body><p>Please enable JavaScript to continue.</p></body></html>",
    );
    let h = harness(source, FakeLlm::new(ANALYSIS_JSON), AnalysisPolicy::Lenient);

    let err = h.pipeline.analyze_latest_filing("ACME").await.unwrap_err();
    assert!(matches!(err, AppError::TooShort { min: 5000, .. }));

    assert_eq!(h.llm.call_count(), 0);
    assert_eq!(h.store.analysis_count(), 0);
    assert_eq!(h.store.fingerprint_count(), 0);

    let event = h.store.get_event(ACME_EVENT_ID).await.unwrap().unwrap();
    assert_eq!(event.status, EventStatus::Failed);
    assert!(event.error.unwrap().contains("too short"));
}

#[tokio::test]
async fn unknown_ticker_and_missing_filing_are_not_found() {
    let source = FakeSource::with_acme()
        .company("NOPE", "0000000999", "Nope Holdings")
        .history("0000000999", &[("8-K", "2025-07-01", "0000000999-25-000001", "nope8k.htm")]);
    let h = harness(source, FakeLlm::new(ANALYSIS_JSON), AnalysisPolicy::Lenient);

    let err = h.pipeline.analyze_latest_filing("ZZZZ").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = h.pipeline.analyze_latest_filing("NOPE").await.unwrap_err();
    assert!(matches!(err, AppError::NoFilingFound(_)));

    assert_eq!(h.source.fetches(), 0);
}

// ---------------------------------------------------------------------------
// Model output handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_output_is_default_filled_under_lenient_policy() {
    let h = harness(
        FakeSource::with_acme(),
        FakeLlm::new("I could not produce JSON for this filing."),
        AnalysisPolicy::Lenient,
    );

    let outcome = h.pipeline.analyze_latest_filing("ACME").await.unwrap();
    assert_eq!(outcome.feed_row.insights, "No summary available");
    assert_eq!(outcome.feed_row.overall_sentiment, OverallSentiment::Neutral);
    assert!(outcome.feed_row.ai_tags.is_empty());

    let analysis = h.store.get_analysis(ACME_EVENT_ID).await.unwrap().unwrap();
    assert!(analysis.malformed);
    assert!(analysis.themes.is_empty());
    assert!(!analysis.flags.guidance_change);
}

#[tokio::test]
async fn malformed_output_is_rejected_under_strict_policy() {
    let h = harness(
        FakeSource::with_acme(),
        FakeLlm::new(r#"{"summary": "just a string"}"#),
        AnalysisPolicy::Strict,
    );

    let err = h.pipeline.analyze_latest_filing("ACME").await.unwrap_err();
    assert!(matches!(err, AppError::AnalysisMalformed(_)));
    assert_eq!(h.store.analysis_count(), 0);

    let event = h.store.get_event(ACME_EVENT_ID).await.unwrap().unwrap();
    assert_eq!(event.status, EventStatus::Failed);
    assert_eq!(event.error_kind.as_deref(), Some("analysis_malformed"));
}

const OFF_SCHEMA_JSON: &str = r#"{
    "summary": {"tldr": "Cloud carried the quarter.", "bullets": []},
    "themes": [{"topic": "Cloud", "sentiment": 7.5}],
    "kpis": [42, "Revenue"],
    "risks": [{"label": "FX", "severity": "catastrophic"}],
    "flags": {"guidanceChange": "yes", "liquidityConcern": 1, "marginInflection": false}
}"#;

#[tokio::test]
async fn off_schema_values_are_rejected_under_strict_policy() {
    let h = harness(
        FakeSource::with_acme(),
        FakeLlm::new(OFF_SCHEMA_JSON),
        AnalysisPolicy::Strict,
    );

    let err = h.pipeline.analyze_latest_filing("ACME").await.unwrap_err();
    assert!(matches!(err, AppError::AnalysisMalformed(_)));
    assert_eq!(h.store.analysis_count(), 0);
}

#[tokio::test]
async fn off_schema_values_are_flagged_under_lenient_policy() {
    let h = harness(
        FakeSource::with_acme(),
        FakeLlm::new(OFF_SCHEMA_JSON),
        AnalysisPolicy::Lenient,
    );

    h.pipeline.analyze_latest_filing("ACME").await.unwrap();
    let analysis = h.store.get_analysis(ACME_EVENT_ID).await.unwrap().unwrap();
    assert!(analysis.malformed);
    assert_eq!(analysis.themes[0].sentiment, 1.0);
    assert!(analysis.kpis.is_empty());
    assert!(!analysis.flags.guidance_change);
}

#[tokio::test]
async fn failed_event_is_retried_on_next_call() {
    let h = harness(FakeSource::with_acme(), FakeLlm::new(ANALYSIS_JSON), AnalysisPolicy::Lenient);
    h.llm.set_failing(true);

    let err = h.pipeline.analyze_latest_filing("ACME").await.unwrap_err();
    assert!(err.is_retryable());
    let event = h.store.get_event(ACME_EVENT_ID).await.unwrap().unwrap();
    assert_eq!(event.status, EventStatus::Failed);

    h.llm.set_failing(false);
    let outcome = h.pipeline.analyze_latest_filing("ACME").await.unwrap();
    assert!(!outcome.deduped);

    let event = h.store.get_event(ACME_EVENT_ID).await.unwrap().unwrap();
    assert_eq!(event.status, EventStatus::Analyzed);
    assert_eq!(event.attempts, 2);
    assert!(event.error.is_none());
}

#[tokio::test]
async fn facts_are_passed_to_the_model_when_available() {
    let source = FakeSource::with_acme().facts("0000000123", &[("Revenues", 1_250_000_000.0)]);
    let h = harness(source, FakeLlm::new(ANALYSIS_JSON), AnalysisPolicy::Lenient);

    h.pipeline.analyze_latest_filing("ACME").await.unwrap();

    let prompt = h.llm.last_prompt.lock().clone().unwrap();
    assert!(prompt.contains("Revenues"));
    assert!(prompt.contains("Form: 10-Q"));
}

#[tokio::test]
async fn facts_failure_does_not_fail_the_pipeline() {
    // FakeSource reports a network error for companies without facts
    let h = harness(FakeSource::with_acme(), FakeLlm::new(ANALYSIS_JSON), AnalysisPolicy::Lenient);

    let outcome = h.pipeline.analyze_latest_filing("ACME").await.unwrap();
    assert!(!outcome.deduped);
    assert_eq!(h.source.facts_calls.load(Ordering::SeqCst), 1);

    let prompt = h.llm.last_prompt.lock().clone().unwrap();
    assert!(!prompt.contains("XBRL facts"));
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sentiment_is_identical_across_entry_points() {
    let source = FakeSource::with_acme().document(ACME_COPY_URL, &common::filing_html("Acme Corp"));
    let h = harness(source, FakeLlm::new(ANALYSIS_JSON), AnalysisPolicy::Lenient);

    let discovered = h.pipeline.analyze_latest_filing("ACME").await.unwrap();
    let by_url = h
        .pipeline
        .analyze_filing_at_url("ACME", ACME_COPY_URL, None)
        .await
        .unwrap();
    let read_back = h.pipeline.feed_row(&by_url.event_id).await.unwrap();

    assert_eq!(discovered.feed_row.overall_sentiment, OverallSentiment::Bullish);
    assert_eq!(by_url.feed_row.overall_sentiment, OverallSentiment::Bullish);
    assert_eq!(read_back.overall_sentiment, OverallSentiment::Bullish);
}

#[tokio::test]
async fn company_table_name_wins_over_registry_name() {
    let h = harness(FakeSource::with_acme(), FakeLlm::new(ANALYSIS_JSON), AnalysisPolicy::Lenient);
    h.store.add_company(CompanyMetadata {
        ticker: "ACME".to_string(),
        name: "Acme Corporation Inc.".to_string(),
        sector: Some("Technology".to_string()),
    });

    let outcome = h.pipeline.analyze_latest_filing("ACME").await.unwrap();
    assert_eq!(outcome.feed_row.name, "Acme Corporation Inc.");
}

#[tokio::test]
async fn annual_url_submission_is_labelled_by_year() {
    let source = FakeSource::with_acme().document(ACME_COPY_URL, &common::filing_html("Acme Annual"));
    let h = harness(source, FakeLlm::new(ANALYSIS_JSON), AnalysisPolicy::Lenient);

    let outcome = h
        .pipeline
        .analyze_filing_at_url("ACME", ACME_COPY_URL, Some("10-K"))
        .await
        .unwrap();
    assert_eq!(outcome.feed_row.quarter, outcome.feed_row.date.format("%Y").to_string());
}

// ---------------------------------------------------------------------------
// Batch over the real pipeline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn batch_captures_per_ticker_failures() {
    let h = harness(FakeSource::with_acme(), FakeLlm::new(ANALYSIS_JSON), AnalysisPolicy::Lenient);
    let coordinator = BatchCoordinator::new(
        h.pipeline.clone(),
        common::test_config(AnalysisPolicy::Lenient).batch,
    );

    let tickers: Vec<String> = ["ACME", "ZZZZ", "acme"].iter().map(|s| s.to_string()).collect();
    let run = coordinator.run(&tickers, coordinator.default_options()).await;

    assert!(!run.partial);
    assert_eq!(run.results.len(), 2, "duplicate tickers are collapsed");

    let failed = run
        .results
        .iter()
        .find(|r| r.ticker() == "ZZZZ")
        .expect("ZZZZ result");
    match failed {
        BatchItemResult::Error { error, retryable, .. } => {
            assert_eq!(error, "not_found");
            assert!(!retryable);
        }
        other => panic!("expected error, got {:?}", other),
    }

    let ok = run.results.iter().find(|r| r.ticker() == "ACME").unwrap();
    assert!(ok.is_ok());
}
