//! Background Jobs Module
//!
//! Jobs registered with the job scheduler service. Each one is idempotent and
//! logs its own progress; the scheduler records duration and item counts.
//!
//! # Available Jobs
//!
//! - `filing_refresh_job` - Re-runs the filing pipeline over the configured watchlist

pub mod filing_refresh_job;
