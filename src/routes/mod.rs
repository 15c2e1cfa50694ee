pub(crate) mod filings;
pub(crate) mod health;
