use axum::http::{HeaderMap, HeaderValue};
use axum::response::IntoResponse;
use axum::Json;
use reqwest::StatusCode;
use thiserror::Error;

use crate::external::filing_source::SourceError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Db(sqlx::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("No qualifying filing found: {0}")]
    NoFilingFound(String),
    #[error("Untrusted filing source: {0}")]
    InvalidSource(String),
    #[error("Document too short: {chars} chars (minimum {min})")]
    TooShort { chars: usize, min: usize },
    #[error("Invalid document content: {0}")]
    InvalidContent(String),
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("Rate limited by external provider")]
    RateLimited,
    #[error("Malformed analysis: {0}")]
    AnalysisMalformed(String),
    #[error("Filing {0} is being analyzed by another worker")]
    InProgress(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable tag used in batch item errors and JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Db(_) => "db",
            AppError::Validation(_) => "validation",
            AppError::NotFound(_) => "not_found",
            AppError::NoFilingFound(_) => "no_filing_found",
            AppError::InvalidSource(_) => "invalid_source",
            AppError::TooShort { .. } => "too_short",
            AppError::InvalidContent(_) => "invalid_content",
            AppError::UpstreamUnavailable(_) => "upstream_unavailable",
            AppError::RateLimited => "rate_limited",
            AppError::AnalysisMalformed(_) => "analysis_malformed",
            AppError::InProgress(_) => "in_progress",
            AppError::Internal(_) => "internal",
        }
    }

    /// Rebuilds a failure recorded on the ledger from its `kind()` tag so that
    /// a caller observing someone else's attempt sees the same classification.
    /// Unknown or missing kinds are reported as upstream failures.
    pub fn from_recorded(kind: Option<&str>, reason: &str) -> AppError {
        let message = format!("previous attempt failed: {}", reason);
        match kind.unwrap_or_default() {
            "db" => AppError::Db(sqlx::Error::Protocol(message)),
            "validation" => AppError::Validation(message),
            "not_found" => AppError::NotFound(message),
            "no_filing_found" => AppError::NoFilingFound(message),
            "invalid_source" => AppError::InvalidSource(message),
            "too_short" => {
                let mut numbers = reason
                    .split(|c: char| !c.is_ascii_digit())
                    .filter_map(|n| n.parse::<usize>().ok());
                AppError::TooShort {
                    chars: numbers.next().unwrap_or(0),
                    min: numbers.next().unwrap_or(0),
                }
            }
            "invalid_content" => AppError::InvalidContent(message),
            "rate_limited" => AppError::RateLimited,
            "analysis_malformed" => AppError::AnalysisMalformed(message),
            "in_progress" => AppError::InProgress(message),
            "internal" => AppError::Internal(message),
            _ => AppError::UpstreamUnavailable(message),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::UpstreamUnavailable(_)
                | AppError::RateLimited
                | AppError::InProgress(_)
                | AppError::Db(_)
        )
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) | AppError::NoFilingFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) | AppError::InvalidSource(_) => StatusCode::BAD_REQUEST,
            AppError::TooShort { .. }
            | AppError::InvalidContent(_)
            | AppError::AnalysisMalformed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InProgress(_) => StatusCode::CONFLICT,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::Db(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let message = match &self {
            AppError::Db(_) | AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        let body = Json(serde_json::json!({
            "error": self.kind(),
            "message": message,
        }));

        if let AppError::RateLimited = self {
            let mut headers = HeaderMap::new();
            headers.insert("Retry-After", HeaderValue::from_static("60"));
            return (status, headers, body).into_response();
        }

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(value: sqlx::Error) -> Self {
        AppError::Db(value)
    }
}

impl From<SourceError> for AppError {
    fn from(value: SourceError) -> Self {
        match value {
            SourceError::RateLimited => AppError::RateLimited,
            SourceError::NotFound(what) => AppError::NotFound(what),
            other => AppError::UpstreamUnavailable(other.to_string()),
        }
    }
}

impl From<LlmError> for AppError {
    fn from(value: LlmError) -> Self {
        match value {
            LlmError::RateLimited => AppError::RateLimited,
            other => AppError::UpstreamUnavailable(format!("model call failed: {}", other)),
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM features are disabled")]
    Disabled,
    #[error("LLM request timed out")]
    Timeout,
    #[error("LLM provider rate limited the request")]
    RateLimited,
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}
