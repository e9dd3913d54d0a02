//! Shared record schema for retrieved outbreak data
//!
//! Everything the fetch stage persists and the tabulate stage reads lives
//! here: the report/outbreak/lab-test hierarchy, the per-listing index of
//! report ids, and the year-range parser used by the CLI.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A reporting country as enumerated from the portal
///
/// The code is the portal's stable identifier and is what unit keys and
/// record paths are derived from; the name is display-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub code: String,
    pub name: String,
}

/// Whether a report is the initial notification or an amendment to one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    Immediate,
    FollowUp,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::FollowUp => "follow_up",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Publication status of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Draft,
    Final,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Final => "final",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One outbreak notification
///
/// Follow-up reports carry a back-reference to their initial report id; this
/// is an identifier-based relation, never an embedded object, so the
/// compilation stage can resolve chains through an index even when the corpus
/// arrived out of order or incomplete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Report id, unique within (country, disease)
    pub report_id: String,
    pub disease_id: u32,
    pub country_code: String,
    pub country_name: String,
    pub report_type: ReportType,
    pub status: ReportStatus,
    pub published: Option<NaiveDate>,
    /// Position in the follow-up chain; 0 for the initial report
    pub sequence: u32,
    /// Initial report id this follow-up amends; None for initial reports
    pub initial_report_id: Option<String>,
    /// Number of follow-ups in this report's chain, as stated on the
    /// detail page. Drives follow-up unit enumeration.
    pub follow_up_count: u32,
    /// Portal URL the record was rendered from
    pub source_url: String,
}

impl Report {
    /// The id the whole chain is grouped under: the initial report's own id,
    /// or the back-reference for a follow-up.
    pub fn chain_id(&self) -> &str {
        self.initial_report_id.as_deref().unwrap_or(&self.report_id)
    }
}

/// A location/time-bounded occurrence of disease within one report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outbreak {
    /// Outbreak id, unique within its report
    pub outbreak_id: String,
    pub location: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub species: String,
    pub cases: Option<u64>,
    pub deaths: Option<u64>,
    pub destroyed: Option<u64>,
}

/// A diagnostic test within one outbreak
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabTest {
    /// Test id, unique within its outbreak
    pub test_id: String,
    /// Outbreak this test belongs to
    pub outbreak_id: String,
    pub laboratory: String,
    pub test_type: String,
    pub agent: String,
    pub result: String,
}

/// The parsed payload persisted for one retrieved report or follow-up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportBundle {
    pub report: Report,
    pub outbreaks: Vec<Outbreak>,
    pub tests: Vec<LabTest>,
}

/// The report ids listed for one (country, disease, year)
///
/// Persisted alongside the report records so a resumed run can re-enumerate
/// the unit space without re-fetching completed listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub country_code: String,
    pub disease_id: u32,
    pub year: u16,
    pub report_ids: Vec<String>,
}

/// Inclusive year range, parsed from `MIN-MAX` CLI syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearRange {
    pub min: u16,
    pub max: u16,
}

impl YearRange {
    pub fn new(min: u16, max: u16) -> Option<Self> {
        (min <= max).then_some(Self { min, max })
    }

    /// Iterates the years in the range, inclusive on both ends
    pub fn years(&self) -> impl Iterator<Item = u16> {
        self.min..=self.max
    }
}

impl FromStr for YearRange {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (min, max) = s
            .split_once('-')
            .ok_or_else(|| format!("expected MIN-MAX, e.g. 2007-2016, got '{s}'"))?;
        let min: u16 = min
            .trim()
            .parse()
            .map_err(|_| format!("invalid minimum year '{min}'"))?;
        let max: u16 = max
            .trim()
            .parse()
            .map_err(|_| format!("invalid maximum year '{max}'"))?;
        YearRange::new(min, max).ok_or_else(|| format!("minimum year {min} exceeds maximum {max}"))
    }
}

impl fmt::Display for YearRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}
