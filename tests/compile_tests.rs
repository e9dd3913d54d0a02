//! Integration tests for the compilation stage
//!
//! Build small corpora on disk, compile them, and check the flattened
//! tables' referential integrity and ordering, plus the workbook artifact.

use chrono::NaiveDate;
use std::collections::HashSet;
use tempfile::TempDir;
use wahis_harvest::compile::{compile, write_workbook};
use wahis_harvest::corpus::RecordStore;
use wahis_harvest::model::{
    LabTest, Outbreak, Report, ReportBundle, ReportStatus, ReportType,
};

const DISEASE: u32 = 12;

fn report(report_id: &str, seq: u32, initial: Option<&str>) -> Report {
    Report {
        report_id: report_id.to_string(),
        disease_id: DISEASE,
        country_code: "DEU".to_string(),
        country_name: "Germany".to_string(),
        report_type: if seq == 0 {
            ReportType::Immediate
        } else {
            ReportType::FollowUp
        },
        status: ReportStatus::Final,
        published: NaiveDate::from_ymd_opt(2020, 3, 2),
        sequence: seq,
        initial_report_id: initial.map(str::to_string),
        follow_up_count: 0,
        source_url: String::new(),
    }
}

fn outbreak(outbreak_id: &str, species: &str, cases: Option<u64>) -> Outbreak {
    Outbreak {
        outbreak_id: outbreak_id.to_string(),
        location: "Brandenburg, Germany".to_string(),
        start_date: NaiveDate::from_ymd_opt(2020, 2, 20),
        end_date: None,
        species: species.to_string(),
        cases,
        deaths: None,
        destroyed: None,
    }
}

fn lab_test(test_id: &str, outbreak_id: &str) -> LabTest {
    LabTest {
        test_id: test_id.to_string(),
        outbreak_id: outbreak_id.to_string(),
        laboratory: "National reference laboratory".to_string(),
        test_type: "PCR".to_string(),
        agent: "ASFV".to_string(),
        result: "Positive".to_string(),
    }
}

#[test]
fn test_star_schema_scenario() {
    // R1 with two outbreaks; O1 has one lab test, O2 has none
    let dir = TempDir::new().unwrap();
    let store = RecordStore::open(dir.path()).unwrap();
    store
        .write_bundle(
            "DEU",
            DISEASE,
            "R1",
            0,
            &ReportBundle {
                report: report("R1", 0, None),
                outbreaks: vec![outbreak("O1", "Swine", Some(12)), outbreak("O2", "Wild boar", None)],
                tests: vec![lab_test("1", "O1")],
            },
        )
        .unwrap();

    let (tables, summary) = compile(&store).unwrap();

    assert_eq!(tables.reports.len(), 1);
    assert_eq!(tables.reports[0].report_id, "R1");

    assert_eq!(tables.outbreaks.len(), 2);
    assert!(tables.outbreaks.iter().all(|o| o.report_id == "R1"));

    assert_eq!(tables.tests.len(), 1);
    assert_eq!(tables.tests[0].outbreak_id, "O1");
    assert_eq!(tables.tests[0].report_id, "R1");

    assert_eq!(summary.malformed_skipped, 0);
    assert_eq!(summary.missing_initial_flagged, 0);
}

#[test]
fn test_referential_integrity_of_flattened_tables() {
    let dir = TempDir::new().unwrap();
    let store = RecordStore::open(dir.path()).unwrap();

    store
        .write_bundle(
            "DEU",
            DISEASE,
            "100",
            0,
            &ReportBundle {
                report: report("100", 0, None),
                outbreaks: vec![outbreak("1", "Swine", Some(3))],
                tests: vec![lab_test("1", "1"), lab_test("2", "1")],
            },
        )
        .unwrap();
    store
        .write_bundle(
            "DEU",
            DISEASE,
            "100",
            1,
            &ReportBundle {
                report: report("101", 1, Some("100")),
                outbreaks: vec![outbreak("1", "Swine", Some(5))],
                tests: vec![lab_test("1", "1")],
            },
        )
        .unwrap();

    let (tables, _) = compile(&store).unwrap();

    let report_ids: HashSet<_> = tables.reports.iter().map(|r| r.report_id.as_str()).collect();
    for outbreak_row in &tables.outbreaks {
        assert!(report_ids.contains(outbreak_row.report_id.as_str()));
    }

    let outbreak_keys: HashSet<_> = tables
        .outbreaks
        .iter()
        .map(|o| (o.report_id.as_str(), o.outbreak_id.as_str()))
        .collect();
    for test_row in &tables.tests {
        assert!(outbreak_keys.contains(&(test_row.report_id.as_str(), test_row.outbreak_id.as_str())));
    }
}

#[test]
fn test_orphaned_follow_up_is_flagged_and_emitted() {
    // R2 references initial report R0, which is absent from the corpus
    let dir = TempDir::new().unwrap();
    let store = RecordStore::open(dir.path()).unwrap();
    store
        .write_bundle(
            "DEU",
            DISEASE,
            "R0",
            1,
            &ReportBundle {
                report: report("R2", 1, Some("R0")),
                outbreaks: vec![],
                tests: vec![],
            },
        )
        .unwrap();

    let (tables, summary) = compile(&store).unwrap();

    assert_eq!(tables.reports.len(), 1);
    let row = &tables.reports[0];
    assert_eq!(row.report_id, "R2");
    assert_eq!(row.initial_report_id, "R0");
    assert!(row.missing_initial);
    assert_eq!(summary.missing_initial_flagged, 1);
}

#[test]
fn test_two_compilations_produce_identical_tables() {
    let dir = TempDir::new().unwrap();
    let store = RecordStore::open(dir.path()).unwrap();
    for id in ["30", "7", "19"] {
        store
            .write_bundle(
                "DEU",
                DISEASE,
                id,
                0,
                &ReportBundle {
                    report: report(id, 0, None),
                    outbreaks: vec![outbreak("2", "Swine", None), outbreak("1", "Swine", Some(1))],
                    tests: vec![lab_test("2", "1"), lab_test("1", "1")],
                },
            )
            .unwrap();
    }

    let (first, _) = compile(&store).unwrap();
    let (second, _) = compile(&store).unwrap();
    assert_eq!(first.reports, second.reports);
    assert_eq!(first.outbreaks, second.outbreaks);
    assert_eq!(first.tests, second.tests);

    // Numeric-aware ordering of reports and children
    let ids: Vec<_> = first.reports.iter().map(|r| r.report_id.as_str()).collect();
    assert_eq!(ids, vec!["7", "19", "30"]);
    let outbreak_ids: Vec<_> = first
        .outbreaks
        .iter()
        .take(2)
        .map(|o| o.outbreak_id.as_str())
        .collect();
    assert_eq!(outbreak_ids, vec!["1", "2"]);
}

#[test]
fn test_workbook_written_from_compiled_corpus() {
    let dir = TempDir::new().unwrap();
    let store = RecordStore::open(dir.path()).unwrap();
    store
        .write_bundle(
            "DEU",
            DISEASE,
            "R1",
            0,
            &ReportBundle {
                report: report("R1", 0, None),
                outbreaks: vec![outbreak("1", "Swine", Some(12))],
                tests: vec![lab_test("1", "1")],
            },
        )
        .unwrap();

    let (tables, _) = compile(&store).unwrap();
    let xlsx = dir.path().join("reports.xlsx");
    write_workbook(&tables, &xlsx).unwrap();
    assert!(std::fs::metadata(&xlsx).unwrap().len() > 0);
}

#[test]
fn test_malformed_records_do_not_abort_compilation() {
    let dir = TempDir::new().unwrap();
    let store = RecordStore::open(dir.path()).unwrap();
    store
        .write_bundle(
            "DEU",
            DISEASE,
            "R1",
            0,
            &ReportBundle {
                report: report("R1", 0, None),
                outbreaks: vec![],
                tests: vec![],
            },
        )
        .unwrap();
    std::fs::write(dir.path().join("records/damaged.json"), b"not json at all").unwrap();

    let (tables, summary) = compile(&store).unwrap();
    assert_eq!(tables.reports.len(), 1);
    assert_eq!(summary.records_scanned, 2);
    assert_eq!(summary.malformed_skipped, 1);
}
