//! Retrieval operations against the remote portal
//!
//! This module defines the typed failure taxonomy, the request descriptor,
//! and the `FetchClient` trait that the orchestrator drives. The client is
//! stateless per call and performs no retry of its own; retry policy belongs
//! to the orchestrator. The actual render/automation layer is opaque behind
//! the trait: the production implementation is HTTP-based, tests script one.

mod http;
mod parser;

pub use http::{build_http_client, HttpFetchClient};
pub use parser::{parse_countries, parse_listing, parse_report};

use crate::model::{Country, ReportBundle};
use std::fmt;
use thiserror::Error;

/// Typed failure of a single retrieval operation
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network trouble, timeout, or rate limiting; safe to retry
    #[error("transient failure for {unit}: {reason}")]
    Transient { unit: String, reason: String },

    /// The unit does not exist at the source; terminal, never retried
    #[error("not found at source: {unit}")]
    NotFound { unit: String },

    /// The response did not match the expected structure; terminal, logged
    #[error("malformed response for {unit}: {context}")]
    Malformed { unit: String, context: String },
}

impl FetchError {
    /// Returns true if retrying this failure could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Short reason tag recorded in the checkpoint store
    pub fn reason_tag(&self) -> &'static str {
        match self {
            Self::Transient { .. } => "transient",
            Self::NotFound { .. } => "not_found",
            Self::Malformed { .. } => "malformed",
        }
    }
}

/// Result type for fetch operations
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Request descriptor handed to the render layer
///
/// Identifies one retrievable item. Optional fields narrow the request from
/// country enumeration down to a single follow-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub disease_id: u32,
    pub country_code: Option<String>,
    pub year: Option<u16>,
    pub report_id: Option<String>,
    pub follow_up_seq: Option<u32>,
}

impl FetchRequest {
    /// Enumerate the countries reporting this disease
    pub fn countries(disease_id: u32) -> Self {
        Self {
            disease_id,
            country_code: None,
            year: None,
            report_id: None,
            follow_up_seq: None,
        }
    }

    /// List report ids for one country and year
    pub fn listing(disease_id: u32, country_code: &str, year: u16) -> Self {
        Self {
            disease_id,
            country_code: Some(country_code.to_string()),
            year: Some(year),
            report_id: None,
            follow_up_seq: None,
        }
    }

    /// Fetch one report's detail page; seq 0 is the initial report,
    /// higher values select that follow-up in the chain
    pub fn report(disease_id: u32, country_code: &str, report_id: &str, seq: u32) -> Self {
        Self {
            disease_id,
            country_code: Some(country_code.to_string()),
            year: None,
            report_id: Some(report_id.to_string()),
            follow_up_seq: (seq > 0).then_some(seq),
        }
    }
}

impl fmt::Display for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "disease {}", self.disease_id)?;
        if let Some(country) = &self.country_code {
            write!(f, " country {country}")?;
        }
        if let Some(year) = self.year {
            write!(f, " year {year}")?;
        }
        if let Some(report_id) = &self.report_id {
            write!(f, " report {report_id}")?;
        }
        if let Some(seq) = self.follow_up_seq {
            write!(f, " follow-up {seq}")?;
        }
        Ok(())
    }
}

/// One logical retrieval operation against the remote source
///
/// Implementations own whatever session resource the render layer needs and
/// must not be shared across concurrent callers; the orchestrator drives one
/// client from one loop.
#[allow(async_fn_in_trait)]
pub trait FetchClient {
    /// Enumerates the countries that reported the disease
    async fn list_countries(&self, disease_id: u32) -> FetchResult<Vec<Country>>;

    /// Lists the report ids published by one country in one year
    async fn list_reports(
        &self,
        disease_id: u32,
        country_code: &str,
        year: u16,
    ) -> FetchResult<Vec<String>>;

    /// Fetches one report (seq 0) or one of its follow-ups (seq > 0) as a
    /// parsed bundle
    async fn fetch_report(
        &self,
        disease_id: u32,
        country_code: &str,
        report_id: &str,
        seq: u32,
    ) -> FetchResult<ReportBundle>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_tags() {
        let transient = FetchError::Transient {
            unit: "x".to_string(),
            reason: "timeout".to_string(),
        };
        let not_found = FetchError::NotFound {
            unit: "x".to_string(),
        };
        let malformed = FetchError::Malformed {
            unit: "x".to_string(),
            context: "no tables".to_string(),
        };

        assert!(transient.is_transient());
        assert!(!not_found.is_transient());
        assert!(!malformed.is_transient());
        assert_eq!(transient.reason_tag(), "transient");
        assert_eq!(not_found.reason_tag(), "not_found");
        assert_eq!(malformed.reason_tag(), "malformed");
    }

    #[test]
    fn test_request_display() {
        let request = FetchRequest::report(12, "DEU", "9001", 2);
        let text = request.to_string();
        assert!(text.contains("disease 12"));
        assert!(text.contains("country DEU"));
        assert!(text.contains("report 9001"));
        assert!(text.contains("follow-up 2"));
    }

    #[test]
    fn test_initial_report_request_has_no_seq() {
        let request = FetchRequest::report(12, "DEU", "9001", 0);
        assert_eq!(request.follow_up_seq, None);
    }
}
