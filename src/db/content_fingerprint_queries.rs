use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::ContentFingerprint;

#[derive(Debug, sqlx::FromRow)]
pub struct ContentFingerprintRow {
    pub content_hash: String,
    pub event_id: String,
    pub created_at: DateTime<Utc>,
}

impl From<ContentFingerprintRow> for ContentFingerprint {
    fn from(row: ContentFingerprintRow) -> Self {
        ContentFingerprint {
            content_hash: row.content_hash,
            event_id: row.event_id,
            created_at: row.created_at,
        }
    }
}

/// Look up the back-pointer for a content hash
pub async fn get_by_hash(
    pool: &PgPool,
    content_hash: &str,
) -> Result<Option<ContentFingerprintRow>, sqlx::Error> {
    sqlx::query_as::<_, ContentFingerprintRow>(
        r#"
        SELECT content_hash, event_id, created_at
        FROM content_fingerprints
        WHERE content_hash = $1
        "#,
    )
    .bind(content_hash)
    .fetch_optional(pool)
    .await
}

/// Record a fingerprint; the first writer wins. Returns the stored row.
pub async fn insert_if_absent(
    pool: &PgPool,
    fingerprint: &ContentFingerprint,
) -> Result<ContentFingerprintRow, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO content_fingerprints (content_hash, event_id, created_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (content_hash) DO NOTHING
        "#,
    )
    .bind(&fingerprint.content_hash)
    .bind(&fingerprint.event_id)
    .bind(fingerprint.created_at)
    .execute(pool)
    .await?;

    get_by_hash(pool, &fingerprint.content_hash)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
}
