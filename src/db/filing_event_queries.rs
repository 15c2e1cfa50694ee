use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use crate::models::{EventPatch, EventStatus, FilingEvent, FilingForm};

const EVENT_COLUMNS: &str = "event_id, ticker, form, filing_date, document_url, status, \
     content_hash, analysis_event_id, error, error_kind, attempts, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
pub struct FilingEventRow {
    pub event_id: String,
    pub ticker: String,
    pub form: String,
    pub filing_date: NaiveDate,
    pub document_url: String,
    pub status: String,
    pub content_hash: Option<String>,
    pub analysis_event_id: Option<String>,
    pub error: Option<String>,
    pub error_kind: Option<String>,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<FilingEventRow> for FilingEvent {
    type Error = sqlx::Error;

    fn try_from(row: FilingEventRow) -> Result<Self, Self::Error> {
        let form = FilingForm::from_db_str(&row.form)
            .ok_or_else(|| sqlx::Error::Decode(format!("unknown form '{}'", row.form).into()))?;
        let status = EventStatus::from_db_str(&row.status)
            .ok_or_else(|| sqlx::Error::Decode(format!("unknown status '{}'", row.status).into()))?;

        Ok(FilingEvent {
            event_id: row.event_id,
            ticker: row.ticker,
            form,
            filing_date: row.filing_date,
            document_url: row.document_url,
            status,
            content_hash: row.content_hash,
            analysis_event_id: row.analysis_event_id,
            error: row.error,
            error_kind: row.error_kind,
            attempts: row.attempts,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Get a ledger row by event id
pub async fn get_by_event_id(
    pool: &PgPool,
    event_id: &str,
) -> Result<Option<FilingEventRow>, sqlx::Error> {
    sqlx::query_as::<_, FilingEventRow>(&format!(
        "SELECT {} FROM filing_events WHERE event_id = $1",
        EVENT_COLUMNS
    ))
    .bind(event_id)
    .fetch_optional(pool)
    .await
}

/// Conditionally claim an event for work.
///
/// Inserts a fresh INGESTING row, or flips an existing row back to INGESTING
/// when it FAILED or its INGESTING claim is older than `stale_after_secs`.
/// Returns `None` when another caller holds the event.
pub async fn claim(
    pool: &PgPool,
    event: &FilingEvent,
    stale_after_secs: f64,
) -> Result<Option<FilingEventRow>, sqlx::Error> {
    sqlx::query_as::<_, FilingEventRow>(&format!(
        r#"
        INSERT INTO filing_events (event_id, ticker, form, filing_date, document_url, status, attempts, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, 'ingesting', 1, NOW(), NOW())
        ON CONFLICT (event_id)
        DO UPDATE SET
            status = 'ingesting',
            attempts = filing_events.attempts + 1,
            error = NULL,
            error_kind = NULL,
            document_url = EXCLUDED.document_url,
            updated_at = NOW()
        WHERE filing_events.status = 'failed'
           OR (filing_events.status = 'ingesting'
               AND filing_events.updated_at < NOW() - make_interval(secs => $6))
        RETURNING {}
        "#,
        EVENT_COLUMNS
    ))
    .bind(&event.event_id)
    .bind(&event.ticker)
    .bind(event.form.as_db_str())
    .bind(event.filing_date)
    .bind(&event.document_url)
    .bind(stale_after_secs)
    .fetch_optional(pool)
    .await
}

/// Insert a seed row if none exists (status INGESTING)
pub async fn insert_if_absent(pool: &PgPool, event: &FilingEvent) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO filing_events (event_id, ticker, form, filing_date, document_url, status, attempts)
        VALUES ($1, $2, $3, $4, $5, 'ingesting', $6)
        ON CONFLICT (event_id) DO NOTHING
        "#,
    )
    .bind(&event.event_id)
    .bind(&event.ticker)
    .bind(event.form.as_db_str())
    .bind(event.filing_date)
    .bind(&event.document_url)
    .bind(event.attempts)
    .execute(pool)
    .await?;
    Ok(())
}

/// Merge a partial update. Only forward status transitions are applied and
/// ANALYZED rows are never touched.
pub async fn merge(
    pool: &PgPool,
    event_id: &str,
    patch: &EventPatch,
) -> Result<Option<FilingEventRow>, sqlx::Error> {
    sqlx::query_as::<_, FilingEventRow>(&format!(
        r#"
        UPDATE filing_events SET
            status = COALESCE($2::text, status),
            content_hash = COALESCE($3, content_hash),
            analysis_event_id = COALESCE($4, analysis_event_id),
            error = CASE WHEN $2::text = 'analyzed' THEN NULL ELSE COALESCE($5, error) END,
            error_kind = CASE WHEN $2::text = 'analyzed' THEN NULL ELSE COALESCE($6, error_kind) END,
            updated_at = NOW()
        WHERE event_id = $1
          AND status <> 'analyzed'
          AND ($2::text IS NULL OR $2::text = status OR status = 'ingesting')
        RETURNING {}
        "#,
        EVENT_COLUMNS
    ))
    .bind(event_id)
    .bind(patch.status.map(|s| s.as_db_str()))
    .bind(patch.content_hash.as_deref())
    .bind(patch.analysis_event_id.as_deref())
    .bind(patch.error.as_deref())
    .bind(patch.error_kind.as_deref())
    .fetch_optional(pool)
    .await
}
