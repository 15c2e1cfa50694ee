use sqlx::PgPool;

use crate::models::CompanyMetadata;

/// Get company display metadata by ticker
pub async fn get_by_ticker(
    pool: &PgPool,
    ticker: &str,
) -> Result<Option<CompanyMetadata>, sqlx::Error> {
    sqlx::query_as::<_, CompanyMetadata>(
        r#"
        SELECT ticker, name, sector
        FROM companies
        WHERE ticker = $1
        "#,
    )
    .bind(ticker.to_uppercase())
    .fetch_optional(pool)
    .await
}
