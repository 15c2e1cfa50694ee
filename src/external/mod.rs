pub mod edgar;
pub mod filing_source;
