//! Spreadsheet artifact writer
//!
//! Writes the three compiled tables into one xlsx workbook with linked
//! sheets: `reports`, `outbreaks`, `tests`. Dates are written as ISO strings
//! and optional counts as blank cells, so the artifact is byte-stable for an
//! unchanged corpus.

use crate::compile::CompiledTables;
use crate::Result;
use chrono::NaiveDate;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::path::Path;

const REPORT_HEADERS: [&str; 11] = [
    "Country code",
    "Country",
    "Disease ID",
    "Report ID",
    "Report type",
    "Sequence",
    "Initial report ID",
    "Initial missing",
    "Status",
    "Report date",
    "Url",
];

const OUTBREAK_HEADERS: [&str; 11] = [
    "Report ID",
    "Outbreak ID",
    "Country code",
    "Disease ID",
    "Location",
    "Start date",
    "End date",
    "Species",
    "Cases",
    "Deaths",
    "Destroyed",
];

const TEST_HEADERS: [&str; 7] = [
    "Report ID",
    "Outbreak ID",
    "Test ID",
    "Laboratory name and type",
    "Test type",
    "Agent",
    "Result",
];

/// Writes the compiled tables as a three-sheet workbook
///
/// # Arguments
///
/// * `tables` - The compiled tables
/// * `path` - Destination of the xlsx file
pub fn write_workbook(tables: &CompiledTables, path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    let sheet = workbook.add_worksheet();
    sheet.set_name("reports")?;
    write_headers(sheet, &REPORT_HEADERS, &header_format)?;
    for (i, row) in tables.reports.iter().enumerate() {
        let r = (i + 1) as u32;
        sheet.write_string(r, 0, &row.country_code)?;
        sheet.write_string(r, 1, &row.country_name)?;
        sheet.write_number(r, 2, row.disease_id as f64)?;
        sheet.write_string(r, 3, &row.report_id)?;
        sheet.write_string(r, 4, &row.report_type)?;
        sheet.write_number(r, 5, row.sequence as f64)?;
        sheet.write_string(r, 6, &row.initial_report_id)?;
        sheet.write_boolean(r, 7, row.missing_initial)?;
        sheet.write_string(r, 8, &row.status)?;
        write_date(sheet, r, 9, row.published)?;
        sheet.write_string(r, 10, &row.source_url)?;
    }

    let sheet = workbook.add_worksheet();
    sheet.set_name("outbreaks")?;
    write_headers(sheet, &OUTBREAK_HEADERS, &header_format)?;
    for (i, row) in tables.outbreaks.iter().enumerate() {
        let r = (i + 1) as u32;
        sheet.write_string(r, 0, &row.report_id)?;
        sheet.write_string(r, 1, &row.outbreak_id)?;
        sheet.write_string(r, 2, &row.country_code)?;
        sheet.write_number(r, 3, row.disease_id as f64)?;
        sheet.write_string(r, 4, &row.location)?;
        write_date(sheet, r, 5, row.start_date)?;
        write_date(sheet, r, 6, row.end_date)?;
        sheet.write_string(r, 7, &row.species)?;
        write_count(sheet, r, 8, row.cases)?;
        write_count(sheet, r, 9, row.deaths)?;
        write_count(sheet, r, 10, row.destroyed)?;
    }

    let sheet = workbook.add_worksheet();
    sheet.set_name("tests")?;
    write_headers(sheet, &TEST_HEADERS, &header_format)?;
    for (i, row) in tables.tests.iter().enumerate() {
        let r = (i + 1) as u32;
        sheet.write_string(r, 0, &row.report_id)?;
        sheet.write_string(r, 1, &row.outbreak_id)?;
        sheet.write_string(r, 2, &row.test_id)?;
        sheet.write_string(r, 3, &row.laboratory)?;
        sheet.write_string(r, 4, &row.test_type)?;
        sheet.write_string(r, 5, &row.agent)?;
        sheet.write_string(r, 6, &row.result)?;
    }

    workbook.save(path)?;
    tracing::info!("Wrote workbook to {}", path.display());
    Ok(())
}

fn write_headers(sheet: &mut Worksheet, headers: &[&str], format: &Format) -> Result<()> {
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, format)?;
    }
    Ok(())
}

fn write_date(sheet: &mut Worksheet, row: u32, col: u16, date: Option<NaiveDate>) -> Result<()> {
    if let Some(date) = date {
        sheet.write_string(row, col, date.format("%Y-%m-%d").to_string())?;
    }
    Ok(())
}

fn write_count(sheet: &mut Worksheet, row: u32, col: u16, count: Option<u64>) -> Result<()> {
    if let Some(count) = count {
        sheet.write_number(row, col, count as f64)?;
    }
    Ok(())
}
