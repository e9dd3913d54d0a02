//! Corpus compilation into flat tables
//!
//! Scans every persisted record, rebuilds the report → outbreak → lab-test
//! hierarchy through an id index, and flattens it into three related tables
//! (one row per report, per outbreak, per test) joined by foreign-key ids.
//! Malformed records are counted and skipped, never fatal. A follow-up whose
//! initial report is absent from the corpus is emitted with a flag, never
//! dropped. Row order is fully deterministic, so compiling an unchanged
//! corpus twice produces an identical artifact.

mod workbook;

pub use workbook::write_workbook;

use crate::corpus::{load_bundle, RecordStore};
use crate::model::{ReportBundle, ReportType};
use crate::Result;
use chrono::NaiveDate;
use std::collections::HashSet;

/// One row of the reports sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub country_code: String,
    pub country_name: String,
    pub disease_id: u32,
    pub report_id: String,
    pub report_type: String,
    pub sequence: u32,
    /// Initial report id for follow-ups; empty for initial reports
    pub initial_report_id: String,
    /// True when this is a follow-up whose initial report is not in the corpus
    pub missing_initial: bool,
    pub status: String,
    pub published: Option<NaiveDate>,
    pub source_url: String,
}

/// One row of the outbreaks sheet, carrying its owning report id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutbreakRow {
    pub report_id: String,
    pub outbreak_id: String,
    pub country_code: String,
    pub disease_id: u32,
    pub location: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub species: String,
    pub cases: Option<u64>,
    pub deaths: Option<u64>,
    pub destroyed: Option<u64>,
}

/// One row of the tests sheet, carrying its owning outbreak id and the
/// denormalized report id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRow {
    pub report_id: String,
    pub outbreak_id: String,
    pub test_id: String,
    pub laboratory: String,
    pub test_type: String,
    pub agent: String,
    pub result: String,
}

/// The three flattened tables
#[derive(Debug, Default)]
pub struct CompiledTables {
    pub reports: Vec<ReportRow>,
    pub outbreaks: Vec<OutbreakRow>,
    pub tests: Vec<TestRow>,
}

/// Outcome tally of one compilation pass
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CompileSummary {
    pub records_scanned: u64,
    pub malformed_skipped: u64,
    pub missing_initial_flagged: u64,
}

/// Prints a compilation summary to stdout
pub fn print_summary(summary: &CompileSummary, tables: &CompiledTables) {
    println!("=== Tabulate Summary ===\n");
    println!("  Records scanned: {}", summary.records_scanned);
    println!("  Malformed records skipped: {}", summary.malformed_skipped);
    println!(
        "  Follow-ups missing their initial report: {}",
        summary.missing_initial_flagged
    );
    println!("  Rows: {} reports, {} outbreaks, {} tests", tables.reports.len(), tables.outbreaks.len(), tables.tests.len());
}

/// Compiles the record corpus into the three tables
///
/// # Arguments
///
/// * `records` - The record store to scan
pub fn compile(records: &RecordStore) -> Result<(CompiledTables, CompileSummary)> {
    let mut summary = CompileSummary::default();
    let mut bundles = Vec::new();

    for path in records.record_files()? {
        summary.records_scanned += 1;
        match load_bundle(&path) {
            Ok(bundle) => bundles.push(bundle),
            Err(e) => {
                tracing::warn!("Skipping malformed record {}: {e}", path.display());
                summary.malformed_skipped += 1;
            }
        }
    }

    // Index of every report present, for follow-up chain resolution
    let present: HashSet<(String, u32, String)> = bundles
        .iter()
        .map(|b| {
            (
                b.report.country_code.clone(),
                b.report.disease_id,
                b.report.report_id.clone(),
            )
        })
        .collect();

    // Reports sort by country, disease, then chain: the initial report and
    // its follow-ups group together, ordered by sequence. Outbreaks and
    // tests inherit their parent's position, then sort by their own id.
    bundles.sort_by(|a, b| {
        report_sort_key(a)
            .cmp(&report_sort_key(b))
    });

    let mut tables = CompiledTables::default();

    for bundle in &bundles {
        let report = &bundle.report;

        let is_follow_up = report.report_type == ReportType::FollowUp;
        let missing_initial = is_follow_up
            && !present.contains(&(
                report.country_code.clone(),
                report.disease_id,
                report.chain_id().to_string(),
            ));
        if missing_initial {
            summary.missing_initial_flagged += 1;
        }

        tables.reports.push(ReportRow {
            country_code: report.country_code.clone(),
            country_name: report.country_name.clone(),
            disease_id: report.disease_id,
            report_id: report.report_id.clone(),
            report_type: report.report_type.to_string(),
            sequence: report.sequence,
            initial_report_id: if is_follow_up {
                report.chain_id().to_string()
            } else {
                String::new()
            },
            missing_initial,
            status: report.status.to_string(),
            published: report.published,
            source_url: report.source_url.clone(),
        });

        let mut outbreaks: Vec<_> = bundle.outbreaks.iter().collect();
        outbreaks.sort_by_key(|o| id_sort_key(&o.outbreak_id));
        for outbreak in outbreaks {
            tables.outbreaks.push(OutbreakRow {
                report_id: report.report_id.clone(),
                outbreak_id: outbreak.outbreak_id.clone(),
                country_code: report.country_code.clone(),
                disease_id: report.disease_id,
                location: outbreak.location.clone(),
                start_date: outbreak.start_date,
                end_date: outbreak.end_date,
                species: outbreak.species.clone(),
                cases: outbreak.cases,
                deaths: outbreak.deaths,
                destroyed: outbreak.destroyed,
            });
        }

        let mut tests: Vec<_> = bundle.tests.iter().collect();
        tests.sort_by_key(|t| (id_sort_key(&t.outbreak_id), id_sort_key(&t.test_id)));
        for test in tests {
            tables.tests.push(TestRow {
                report_id: report.report_id.clone(),
                outbreak_id: test.outbreak_id.clone(),
                test_id: test.test_id.clone(),
                laboratory: test.laboratory.clone(),
                test_type: test.test_type.clone(),
                agent: test.agent.clone(),
                result: test.result.clone(),
            });
        }
    }

    Ok((tables, summary))
}

fn report_sort_key(bundle: &ReportBundle) -> (String, u32, (u64, String), u32, String) {
    let report = &bundle.report;
    (
        report.country_code.clone(),
        report.disease_id,
        id_sort_key(report.chain_id()),
        report.sequence,
        report.report_id.clone(),
    )
}

/// Sorts ids numerically when they are numeric, lexically otherwise, so
/// "10" comes after "9" instead of after "1"
fn id_sort_key(id: &str) -> (u64, String) {
    (id.parse::<u64>().unwrap_or(u64::MAX), id.to_string())
}
