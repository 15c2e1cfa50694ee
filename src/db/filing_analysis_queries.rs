use chrono::NaiveDate;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::{
    AnalysisFlags, AnalysisSummary, FilingAnalysis, FilingForm, Kpi, Provenance, Risk, Theme,
};

#[derive(Debug, sqlx::FromRow)]
pub struct FilingAnalysisRow {
    pub event_id: String,
    pub ticker: String,
    pub form: String,
    pub filing_date: NaiveDate,
    pub summary: Json<AnalysisSummary>,
    pub themes: Json<Vec<Theme>>,
    pub kpis: Json<Vec<Kpi>>,
    pub risks: Json<Vec<Risk>>,
    pub flags: Json<AnalysisFlags>,
    pub provenance: Json<Provenance>,
    pub malformed: bool,
}

impl TryFrom<FilingAnalysisRow> for FilingAnalysis {
    type Error = sqlx::Error;

    fn try_from(row: FilingAnalysisRow) -> Result<Self, Self::Error> {
        let form = FilingForm::from_db_str(&row.form)
            .ok_or_else(|| sqlx::Error::Decode(format!("unknown form '{}'", row.form).into()))?;

        Ok(FilingAnalysis {
            event_id: row.event_id,
            ticker: row.ticker,
            form,
            filing_date: row.filing_date,
            summary: row.summary.0,
            themes: row.themes.0,
            kpis: row.kpis.0,
            risks: row.risks.0,
            flags: row.flags.0,
            provenance: row.provenance.0,
            malformed: row.malformed,
        })
    }
}

/// Get the analysis stored under an event id
pub async fn get_by_event_id(
    pool: &PgPool,
    event_id: &str,
) -> Result<Option<FilingAnalysisRow>, sqlx::Error> {
    sqlx::query_as::<_, FilingAnalysisRow>(
        r#"
        SELECT event_id, ticker, form, filing_date, summary, themes, kpis, risks, flags, provenance, malformed
        FROM filing_analyses
        WHERE event_id = $1
        "#,
    )
    .bind(event_id)
    .fetch_optional(pool)
    .await
}

/// Insert an analysis unless one already exists. Returns true when inserted.
pub async fn insert_if_absent(pool: &PgPool, analysis: &FilingAnalysis) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO filing_analyses (event_id, ticker, form, filing_date, summary, themes, kpis, risks, flags, provenance, malformed)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (event_id) DO NOTHING
        "#,
    )
    .bind(&analysis.event_id)
    .bind(&analysis.ticker)
    .bind(analysis.form.as_db_str())
    .bind(analysis.filing_date)
    .bind(Json(&analysis.summary))
    .bind(Json(&analysis.themes))
    .bind(Json(&analysis.kpis))
    .bind(Json(&analysis.risks))
    .bind(Json(&analysis.flags))
    .bind(Json(&analysis.provenance))
    .bind(analysis.malformed)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}
