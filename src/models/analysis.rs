use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::filing::FilingForm;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnalysisSummary {
    pub tldr: String,
    pub bullets: Vec<String>,
}

/// A discussed topic with sentiment in [-1.0, 1.0]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Theme {
    pub topic: String,
    pub sentiment: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Kpi {
    pub name: String,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub yoy_delta: Option<f64>,
    pub qoq_delta: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskSeverity {
    Low,
    Medium,
    High,
}

impl RiskSeverity {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "low" => Some(RiskSeverity::Low),
            "medium" | "moderate" => Some(RiskSeverity::Medium),
            "high" | "critical" => Some(RiskSeverity::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Risk {
    pub label: String,
    pub severity: RiskSeverity,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalysisFlags {
    pub guidance_change: bool,
    pub liquidity_concern: bool,
    pub margin_inflection: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Provenance {
    pub vendor: String,
    pub source_url: String,
    pub content_hash: String,
    pub retrieved_at: DateTime<Utc>,
}

/// Structured model output for one filing. Append-only: written once per event id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilingAnalysis {
    pub event_id: String,
    pub ticker: String,
    pub form: FilingForm,
    pub filing_date: NaiveDate,
    pub summary: AnalysisSummary,
    pub themes: Vec<Theme>,
    pub kpis: Vec<Kpi>,
    pub risks: Vec<Risk>,
    pub flags: AnalysisFlags,
    pub provenance: Provenance,
    /// True when the model response needed default-filling
    pub malformed: bool,
}

/// The model-derived part of an analysis, before event metadata is attached
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisBody {
    pub summary: AnalysisSummary,
    pub themes: Vec<Theme>,
    pub kpis: Vec<Kpi>,
    pub risks: Vec<Risk>,
    pub flags: AnalysisFlags,
    pub malformed: bool,
}
