use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::config::AnalysisPolicy;
use crate::errors::AppError;
use crate::external::filing_source::KeyFacts;
use crate::models::{
    AnalysisBody, AnalysisFlags, AnalysisSummary, FilingAnalysis, FilingForm, Kpi, Provenance,
    Risk, RiskSeverity, Theme,
};
use crate::services::llm_service::LlmProvider;

const SYSTEM_INSTRUCTION: &str = r#"You are an equity research assistant that reads periodic regulatory filings.
Respond with a single JSON object and nothing else: no markdown, no commentary.
The object MUST match this schema exactly:
{
  "summary": { "tldr": string, "bullets": [string] },
  "themes": [ { "topic": string, "sentiment": number between -1 and 1 } ],
  "kpis": [ { "name": string, "value": number|null, "unit": string|null, "yoyDelta": number|null, "qoqDelta": number|null } ],
  "risks": [ { "label": string, "severity": "low"|"medium"|"high" } ],
  "flags": { "guidanceChange": boolean, "liquidityConcern": boolean, "marginInflection": boolean }
}
Use empty arrays when a section has nothing to report. Never invent numbers that are not in the filing or the supplied facts."#;

const MAX_BULLETS: usize = 8;
const MAX_THEMES: usize = 12;

/// Event metadata the analysis is filed under
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    pub event_id: String,
    pub ticker: String,
    pub form: FilingForm,
    pub filing_date: NaiveDate,
    pub source_url: String,
    pub content_hash: String,
}

/// Turns filing text into a validated `FilingAnalysis` through one model call
pub struct AnalysisEngine {
    llm: Arc<dyn LlmProvider>,
    policy: AnalysisPolicy,
    max_prompt_chars: usize,
}

impl AnalysisEngine {
    pub fn new(llm: Arc<dyn LlmProvider>, policy: AnalysisPolicy, max_prompt_chars: usize) -> Self {
        Self {
            llm,
            policy,
            max_prompt_chars,
        }
    }

    pub async fn analyze(
        &self,
        ctx: &AnalysisContext,
        text: &str,
        facts: Option<&KeyFacts>,
    ) -> Result<FilingAnalysis, AppError> {
        let prompt = build_prompt(&ctx.ticker, ctx.form.label(), text, facts, self.max_prompt_chars);
        info!(
            "🤖 Analyzing {} {} ({} prompt chars, facts: {})",
            ctx.ticker,
            ctx.form.label(),
            prompt.len(),
            facts.map(|f| f.len()).unwrap_or(0)
        );

        let raw = self.llm.complete_json(SYSTEM_INSTRUCTION, &prompt).await?;
        let body = coerce_analysis(&raw, self.policy)?;

        if body.malformed {
            warn!(
                "Model output for {} was malformed; persisting default-filled analysis",
                ctx.event_id
            );
        }

        Ok(FilingAnalysis {
            event_id: ctx.event_id.clone(),
            ticker: ctx.ticker.clone(),
            form: ctx.form,
            filing_date: ctx.filing_date,
            summary: body.summary,
            themes: body.themes,
            kpis: body.kpis,
            risks: body.risks,
            flags: body.flags,
            provenance: Provenance {
                vendor: self.llm.vendor(),
                source_url: ctx.source_url.clone(),
                content_hash: ctx.content_hash.clone(),
                retrieved_at: Utc::now(),
            },
            malformed: body.malformed,
        })
    }
}

pub fn build_prompt(
    ticker: &str,
    form_label: &str,
    text: &str,
    facts: Option<&KeyFacts>,
    max_chars: usize,
) -> String {
    let excerpt = truncate_chars(text, max_chars);
    let mut prompt = format!("Company ticker: {}\nForm: {}\n", ticker, form_label);

    if let Some(facts) = facts.filter(|f| !f.is_empty()) {
        prompt.push_str("\nReported XBRL facts (latest values):\n");
        for (concept, value) in facts {
            prompt.push_str(&format!("- {}: {}\n", concept, value));
        }
    }

    prompt.push_str(&format!(
        "\nFiling text{}:\n{}",
        if excerpt.len() < text.len() { " (truncated)" } else { "" },
        excerpt
    ));
    prompt
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Removes a ```json fence some models wrap around their output
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        return rest.trim_end_matches("```").trim();
    }
    trimmed
}

/// Validates an untyped model response into an `AnalysisBody`.
///
/// Lenient: anything missing or mistyped is defaulted and `malformed` is set.
/// Strict: any defect is reported as `AnalysisMalformed`.
pub fn coerce_analysis(raw: &str, policy: AnalysisPolicy) -> Result<AnalysisBody, AppError> {
    let cleaned = strip_code_fence(raw);

    let value: Value = match serde_json::from_str(cleaned) {
        Ok(value) => value,
        Err(e) => return reject_or_default(policy, format!("response is not JSON: {}", e)),
    };
    let Some(obj) = value.as_object() else {
        return reject_or_default(policy, "response is not a JSON object".to_string());
    };

    let mut defects: Vec<String> = Vec::new();
    let summary = coerce_summary(obj.get("summary"), &mut defects);
    let themes = coerce_themes(obj.get("themes"), &mut defects);
    let kpis = coerce_kpis(obj.get("kpis"), &mut defects);
    let risks = coerce_risks(obj.get("risks"), &mut defects);
    let flags = coerce_flags(obj.get("flags"), &mut defects);

    if !defects.is_empty() {
        if policy == AnalysisPolicy::Strict {
            return Err(AppError::AnalysisMalformed(defects.join("; ")));
        }
        warn!("Defaulted model output fields: {}", defects.join("; "));
    }

    Ok(AnalysisBody {
        summary,
        themes,
        kpis,
        risks,
        flags,
        malformed: !defects.is_empty(),
    })
}

fn reject_or_default(policy: AnalysisPolicy, reason: String) -> Result<AnalysisBody, AppError> {
    match policy {
        AnalysisPolicy::Strict => Err(AppError::AnalysisMalformed(reason)),
        AnalysisPolicy::Lenient => {
            warn!("Model output unusable ({}); using empty analysis", reason);
            Ok(AnalysisBody {
                malformed: true,
                ..AnalysisBody::default()
            })
        }
    }
}

/// Reads a field under its camelCase or snake_case name
fn field<'a>(obj: &'a Map<String, Value>, camel: &str, snake: &str) -> Option<&'a Value> {
    obj.get(camel).or_else(|| obj.get(snake))
}

fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .trim_end_matches('%')
            .replace(',', "")
            .parse::<f64>()
            .ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn coerce_summary(value: Option<&Value>, defects: &mut Vec<String>) -> AnalysisSummary {
    match value {
        Some(Value::Object(obj)) => {
            let tldr = non_empty_str(obj.get("tldr")).unwrap_or_else(|| {
                defects.push("summary.tldr missing".to_string());
                String::new()
            });
            let bullets = match obj.get("bullets") {
                Some(Value::Array(items)) => {
                    let bullets: Vec<String> = items
                        .iter()
                        .filter_map(|b| non_empty_str(Some(b)))
                        .take(MAX_BULLETS)
                        .collect();
                    if bullets.len() < items.len().min(MAX_BULLETS) {
                        defects.push("summary.bullets had non-string entries".to_string());
                    }
                    bullets
                }
                _ => {
                    defects.push("summary.bullets missing".to_string());
                    Vec::new()
                }
            };
            AnalysisSummary { tldr, bullets }
        }
        Some(Value::String(s)) => {
            defects.push("summary was a bare string".to_string());
            AnalysisSummary {
                tldr: s.trim().to_string(),
                bullets: Vec::new(),
            }
        }
        _ => {
            defects.push("summary missing".to_string());
            AnalysisSummary::default()
        }
    }
}

fn coerce_themes(value: Option<&Value>, defects: &mut Vec<String>) -> Vec<Theme> {
    let Some(Value::Array(items)) = value else {
        defects.push("themes missing".to_string());
        return Vec::new();
    };

    let mut themes = Vec::new();
    for item in items.iter().take(MAX_THEMES) {
        let Some(obj) = item.as_object() else {
            defects.push("themes entry was not an object".to_string());
            continue;
        };
        let Some(topic) = non_empty_str(obj.get("topic")) else {
            defects.push("themes entry without topic".to_string());
            continue;
        };
        let sentiment = match obj.get("sentiment").and_then(as_number) {
            Some(s) if (-1.0..=1.0).contains(&s) => s,
            Some(s) => {
                defects.push(format!("theme '{}' sentiment {} out of range", topic, s));
                s.clamp(-1.0, 1.0)
            }
            None => {
                defects.push(format!("theme '{}' had no numeric sentiment", topic));
                0.0
            }
        };
        themes.push(Theme { topic, sentiment });
    }
    themes
}

fn coerce_kpis(value: Option<&Value>, defects: &mut Vec<String>) -> Vec<Kpi> {
    let Some(Value::Array(items)) = value else {
        defects.push("kpis missing".to_string());
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let Some(obj) = item.as_object() else {
                defects.push("kpis entry was not an object".to_string());
                return None;
            };
            let Some(name) = non_empty_str(obj.get("name")) else {
                defects.push("kpis entry without name".to_string());
                return None;
            };
            let mut number = |key: &str, value: Option<&Value>| match value {
                None | Some(Value::Null) => None,
                Some(v) => {
                    let parsed = as_number(v);
                    if parsed.is_none() {
                        defects.push(format!("kpi '{}' {} was not numeric", name, key));
                    }
                    parsed
                }
            };
            let value = number("value", obj.get("value"));
            let yoy_delta = number("yoyDelta", field(obj, "yoyDelta", "yoy_delta"));
            let qoq_delta = number("qoqDelta", field(obj, "qoqDelta", "qoq_delta"));
            Some(Kpi {
                unit: non_empty_str(obj.get("unit")),
                name,
                value,
                yoy_delta,
                qoq_delta,
            })
        })
        .collect()
}

fn coerce_risks(value: Option<&Value>, defects: &mut Vec<String>) -> Vec<Risk> {
    let Some(Value::Array(items)) = value else {
        defects.push("risks missing".to_string());
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(label) if !label.trim().is_empty() => {
                defects.push(format!("risk '{}' had no severity", label.trim()));
                Some(Risk {
                    label: label.trim().to_string(),
                    severity: RiskSeverity::Medium,
                })
            }
            Value::Object(obj) => {
                let Some(label) = non_empty_str(obj.get("label")) else {
                    defects.push("risks entry without label".to_string());
                    return None;
                };
                let severity = match obj.get("severity").and_then(Value::as_str) {
                    Some(raw) => RiskSeverity::parse(raw).unwrap_or_else(|| {
                        defects.push(format!("risk '{}' has unknown severity '{}'", label, raw));
                        RiskSeverity::Medium
                    }),
                    None => {
                        defects.push(format!("risk '{}' had no severity", label));
                        RiskSeverity::Medium
                    }
                };
                Some(Risk { label, severity })
            }
            _ => {
                defects.push("risks entry unusable".to_string());
                None
            }
        })
        .collect()
}

fn coerce_flags(value: Option<&Value>, defects: &mut Vec<String>) -> AnalysisFlags {
    let Some(Value::Object(obj)) = value else {
        defects.push("flags missing".to_string());
        return AnalysisFlags::default();
    };

    let mut flag = |camel: &str, snake: &str| match field(obj, camel, snake) {
        Some(Value::Bool(b)) => *b,
        Some(other) => {
            defects.push(format!("flags.{} was not a boolean: {}", camel, other));
            false
        }
        None => {
            defects.push(format!("flags.{} missing", camel));
            false
        }
    };

    AnalysisFlags {
        guidance_change: flag("guidanceChange", "guidance_change"),
        liquidity_concern: flag("liquidityConcern", "liquidity_concern"),
        margin_inflection: flag("marginInflection", "margin_inflection"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WELL_FORMED: &str = r#"{
        "summary": {"tldr": "Revenue up 12% on cloud demand.", "bullets": ["Cloud +30%", "Margins flat"]},
        "themes": [{"topic": "Cloud", "sentiment": 0.8}, {"topic": "FX", "sentiment": -0.7}],
        "kpis": [{"name": "Revenue", "value": "1,250.5", "unit": "USD m", "yoyDelta": 0.12, "qoqDelta": null}],
        "risks": [{"label": "Customer concentration", "severity": "HIGH"}, {"label": "Supply chain", "severity": "low"}],
        "flags": {"guidanceChange": true, "liquidityConcern": false, "marginInflection": false}
    }"#;

    #[test]
    fn test_well_formed_response() {
        let body = coerce_analysis(WELL_FORMED, AnalysisPolicy::Strict).unwrap();
        assert!(!body.malformed);
        assert_eq!(body.summary.tldr, "Revenue up 12% on cloud demand.");
        assert_eq!(body.summary.bullets.len(), 2);
        assert_eq!(body.themes[1].sentiment, -0.7);
        assert_eq!(body.kpis[0].value, Some(1250.5));
        assert_eq!(body.kpis[0].yoy_delta, Some(0.12));
        assert_eq!(body.kpis[0].qoq_delta, None);
        assert_eq!(body.risks[0].severity, RiskSeverity::High);
        assert_eq!(body.risks[1].severity, RiskSeverity::Low);
        assert!(body.flags.guidance_change);
    }

    #[test]
    fn test_fenced_response_is_unwrapped() {
        let fenced = format!("```json\n{}\n```", WELL_FORMED);
        let body = coerce_analysis(&fenced, AnalysisPolicy::Strict).unwrap();
        assert_eq!(body.themes.len(), 2);
    }

    #[test]
    fn test_non_json_lenient_defaults_everything() {
        let body = coerce_analysis("Sorry, I can't help with that.", AnalysisPolicy::Lenient).unwrap();
        assert!(body.malformed);
        assert!(body.summary.tldr.is_empty());
        assert!(body.summary.bullets.is_empty());
        assert!(body.themes.is_empty());
        assert!(body.kpis.is_empty());
        assert!(body.risks.is_empty());
        assert_eq!(body.flags, AnalysisFlags::default());
    }

    #[test]
    fn test_non_json_strict_is_rejected() {
        let err = coerce_analysis("not json", AnalysisPolicy::Strict).unwrap_err();
        assert!(matches!(err, AppError::AnalysisMalformed(_)));

        let err = coerce_analysis("[1, 2, 3]", AnalysisPolicy::Strict).unwrap_err();
        assert!(matches!(err, AppError::AnalysisMalformed(_)));
    }

    #[test]
    fn test_partial_object_is_default_filled() {
        let body = coerce_analysis(
            r#"{"summary": {"tldr": "Quiet quarter."}, "themes": "none"}"#,
            AnalysisPolicy::Lenient,
        )
        .unwrap();
        assert!(body.malformed);
        assert_eq!(body.summary.tldr, "Quiet quarter.");
        assert!(body.summary.bullets.is_empty());
        assert!(body.themes.is_empty());
        assert!(!body.flags.liquidity_concern);
    }

    #[test]
    fn test_partial_object_strict_lists_defects() {
        let err = coerce_analysis(r#"{"summary": {"tldr": "x", "bullets": []}}"#, AnalysisPolicy::Strict)
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("themes missing"));
        assert!(message.contains("flags missing"));
    }

    const VALID_PREFIX: &str = r#""summary": {"tldr": "x", "bullets": []}"#;

    fn with_defect(themes: &str, kpis: &str, risks: &str, flags: &str) -> String {
        format!(
            r#"{{{}, "themes": {}, "kpis": {}, "risks": {}, "flags": {}}}"#,
            VALID_PREFIX, themes, kpis, risks, flags
        )
    }

    const NO_FLAGS: &str =
        r#"{"guidanceChange": false, "liquidityConcern": false, "marginInflection": false}"#;

    fn assert_rejected_then_flagged(raw: &str, expected: &str) -> AnalysisBody {
        let err = coerce_analysis(raw, AnalysisPolicy::Strict).unwrap_err();
        assert!(matches!(err, AppError::AnalysisMalformed(_)));
        assert!(err.to_string().contains(expected), "{} not in {}", expected, err);

        let body = coerce_analysis(raw, AnalysisPolicy::Lenient).unwrap();
        assert!(body.malformed);
        body
    }

    #[test]
    fn test_out_of_range_sentiment_is_a_defect() {
        let raw = with_defect(r#"[{"topic": "Cloud", "sentiment": 7.5}]"#, "[]", "[]", NO_FLAGS);
        let body = assert_rejected_then_flagged(&raw, "out of range");
        assert_eq!(body.themes[0].sentiment, 1.0);
    }

    #[test]
    fn test_non_object_kpis_are_a_defect() {
        let raw = with_defect("[]", r#"[42, "Revenue"]"#, "[]", NO_FLAGS);
        let body = assert_rejected_then_flagged(&raw, "kpis entry was not an object");
        assert!(body.kpis.is_empty());

        let raw = with_defect("[]", r#"[{"name": "EPS", "value": "n/a"}]"#, "[]", NO_FLAGS);
        let body = assert_rejected_then_flagged(&raw, "not numeric");
        assert_eq!(body.kpis[0].value, None);
    }

    #[test]
    fn test_unknown_severity_is_a_defect() {
        let raw = with_defect("[]", "[]", r#"[{"label": "FX", "severity": "catastrophic"}]"#, NO_FLAGS);
        let body = assert_rejected_then_flagged(&raw, "unknown severity");
        assert_eq!(body.risks[0].severity, RiskSeverity::Medium);

        let raw = with_defect("[]", "[]", r#"["Supply chain"]"#, NO_FLAGS);
        assert_rejected_then_flagged(&raw, "had no severity");
    }

    #[test]
    fn test_non_boolean_flags_are_a_defect() {
        let raw = with_defect(
            "[]",
            "[]",
            "[]",
            r#"{"guidanceChange": "yes", "liquidityConcern": 1, "marginInflection": false}"#,
        );
        let body = assert_rejected_then_flagged(&raw, "flags.guidanceChange was not a boolean");
        assert_eq!(body.flags, AnalysisFlags::default());

        let raw = with_defect("[]", "[]", "[]", r#"{"guidanceChange": true}"#);
        let body = assert_rejected_then_flagged(&raw, "flags.liquidityConcern missing");
        assert!(body.flags.guidance_change);
    }

    #[test]
    fn test_snake_case_keys_accepted() {
        let body = coerce_analysis(
            r#"{"summary": {"tldr": "x", "bullets": []}, "themes": [], "kpis": [{"name": "EPS", "value": 1.2, "yoy_delta": "5%"}],
                "risks": [], "flags": {"liquidity_concern": true}}"#,
            AnalysisPolicy::Lenient,
        )
        .unwrap();
        assert_eq!(body.kpis[0].yoy_delta, Some(5.0));
        assert!(body.flags.liquidity_concern);
    }

    #[test]
    fn test_prompt_truncates_and_lists_facts() {
        let mut facts = KeyFacts::new();
        facts.insert("Revenues".to_string(), 1000.0);
        let text = "é".repeat(100);

        let prompt = build_prompt("ACME", "10-Q", &text, Some(&facts), 10);
        assert!(prompt.contains("Form: 10-Q"));
        assert!(prompt.contains("- Revenues: 1000"));
        assert!(prompt.contains("(truncated)"));
        assert!(prompt.ends_with(&"é".repeat(10)));
        assert!(!prompt.contains(&"é".repeat(11)));
    }
}
