//! Rendered-page parsing
//!
//! Turns the portal's rendered HTML into typed entities. The portal presents
//! everything as HTML tables: a key/value detail table per report, an
//! "Outbreak N" table followed by its species table for each outbreak, and a
//! lab-results table headed "Laboratory name and type". Anything that does
//! not match these shapes is a `Malformed` failure carrying enough context
//! to diagnose the page.

use crate::fetch::{FetchError, FetchRequest, FetchResult};
use crate::model::{Country, LabTest, Outbreak, Report, ReportBundle, ReportStatus, ReportType};
use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};

/// Marker the portal emits on its own server-side failures
const APPLICATION_ERROR: &str = "Application Error";

/// Parses the country enumeration page
///
/// Countries are the options of the `country` select element; the option
/// value is the stable country code, the text the display name.
pub fn parse_countries(html: &str, request: &FetchRequest) -> FetchResult<Vec<Country>> {
    check_application_error(html, request)?;

    let document = Html::parse_document(html);

    let mut countries = Vec::new();
    if let Ok(selector) = Selector::parse("select#country option") {
        for option in document.select(&selector) {
            let code = option.value().attr("value").unwrap_or("").trim();
            if code.is_empty() {
                // Placeholder option ("-- select --")
                continue;
            }
            let name = element_text(&option);
            countries.push(Country {
                code: code.to_string(),
                name: if name.is_empty() {
                    code.to_string()
                } else {
                    name
                },
            });
        }
    }

    if countries.is_empty() {
        return Err(FetchError::Malformed {
            unit: request.to_string(),
            context: "no country options found on enumeration page".to_string(),
        });
    }

    Ok(countries)
}

/// Parses a summary listing page into the report ids it links to
///
/// Report links are the "Full report" anchors; the id is the `reportid`
/// query parameter of the link target. A page with no report links is a
/// valid empty listing (the country simply reported nothing that year).
pub fn parse_listing(html: &str, request: &FetchRequest) -> FetchResult<Vec<String>> {
    check_application_error(html, request)?;

    let document = Html::parse_document(html);

    let mut report_ids = Vec::new();
    if let Ok(selector) = Selector::parse("a") {
        for anchor in document.select(&selector) {
            if element_text(&anchor) != "Full report" {
                continue;
            }
            let href = anchor.value().attr("href").unwrap_or("");
            if let Some(id) = report_id_from_href(href) {
                report_ids.push(id);
            }
        }
    }

    Ok(report_ids)
}

/// Parses a report detail page into a typed bundle
///
/// # Arguments
///
/// * `html` - The rendered page
/// * `request` - The request descriptor, used for ids and diagnostics
/// * `source_url` - The URL the page was rendered from, kept on the record
pub fn parse_report(html: &str, request: &FetchRequest, source_url: &str) -> FetchResult<ReportBundle> {
    check_application_error(html, request)?;

    let report_id = request.report_id.clone().ok_or_else(|| FetchError::Malformed {
        unit: request.to_string(),
        context: "report request without a report id".to_string(),
    })?;

    let tables = extract_tables(html);
    if tables.is_empty() {
        return Err(FetchError::Malformed {
            unit: request.to_string(),
            context: "no tables found on report page".to_string(),
        });
    }

    let details = detail_rows(&tables);
    let report = build_report(&details, request, &report_id, source_url)?;
    let outbreaks = build_outbreaks(&tables);
    let tests = build_tests(&tables);

    Ok(ReportBundle {
        report,
        outbreaks,
        tests,
    })
}

fn check_application_error(html: &str, request: &FetchRequest) -> FetchResult<()> {
    if html.contains(APPLICATION_ERROR) {
        return Err(FetchError::Malformed {
            unit: request.to_string(),
            context: "portal returned an Application Error page".to_string(),
        });
    }
    Ok(())
}

/// Collapses an element's text nodes into one trimmed string
fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Extracts every table on the page as rows of trimmed cell strings
fn extract_tables(html: &str) -> Vec<Vec<Vec<String>>> {
    let document = Html::parse_document(html);
    let (Ok(table_selector), Ok(row_selector), Ok(cell_selector)) = (
        Selector::parse("table"),
        Selector::parse("tr"),
        Selector::parse("th, td"),
    ) else {
        return Vec::new();
    };

    let mut tables = Vec::new();
    for table in document.select(&table_selector) {
        let mut rows = Vec::new();
        for row in table.select(&row_selector) {
            let cells: Vec<String> = row.select(&cell_selector).map(|c| element_text(&c)).collect();
            if !cells.is_empty() {
                rows.push(cells);
            }
        }
        if !rows.is_empty() {
            tables.push(rows);
        }
    }
    tables
}

/// Gathers key/value pairs from every two-column row of every table that is
/// not an outbreak, species, or lab table
fn detail_rows(tables: &[Vec<Vec<String>>]) -> Vec<(String, String)> {
    let mut details = Vec::new();
    for table in tables {
        let first_cell = table[0][0].as_str();
        if parse_outbreak_number(first_cell).is_some()
            || first_cell == "Species"
            || first_cell == "Laboratory name and type"
        {
            continue;
        }
        for row in table {
            if row.len() == 2 {
                details.push((row[0].clone(), row[1].clone()));
            }
        }
    }
    details
}

fn detail_value<'a>(details: &'a [(String, String)], key: &str) -> Option<&'a str> {
    details
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn build_report(
    details: &[(String, String)],
    request: &FetchRequest,
    report_id: &str,
    source_url: &str,
) -> FetchResult<Report> {
    let type_text = detail_value(details, "Report type").ok_or_else(|| FetchError::Malformed {
        unit: request.to_string(),
        context: "report page has no 'Report type' row".to_string(),
    })?;

    let report_type = if type_text.starts_with("Immediate") {
        ReportType::Immediate
    } else if type_text.starts_with("Follow-up") {
        ReportType::FollowUp
    } else {
        return Err(FetchError::Malformed {
            unit: request.to_string(),
            context: format!("unrecognized report type '{type_text}'"),
        });
    };

    let initial_report_id = detail_value(details, "Initial report").map(str::to_string);
    if report_type == ReportType::FollowUp && initial_report_id.is_none() {
        return Err(FetchError::Malformed {
            unit: request.to_string(),
            context: "follow-up report page has no 'Initial report' row".to_string(),
        });
    }

    let sequence = detail_value(details, "Follow-up number")
        .and_then(|v| v.parse().ok())
        .or(request.follow_up_seq)
        .unwrap_or(0);

    let status = match detail_value(details, "Report status") {
        Some(s) if s.eq_ignore_ascii_case("draft") => ReportStatus::Draft,
        _ => ReportStatus::Final,
    };

    let country_code = request.country_code.clone().unwrap_or_default();
    let country_name = detail_value(details, "Country")
        .map(str::to_string)
        .unwrap_or_else(|| country_code.clone());

    Ok(Report {
        report_id: report_id.to_string(),
        disease_id: request.disease_id,
        country_code,
        country_name,
        report_type,
        status,
        published: detail_value(details, "Report date").and_then(parse_date),
        sequence,
        initial_report_id,
        follow_up_count: detail_value(details, "Number of follow-ups")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        source_url: source_url.to_string(),
    })
}

/// Builds outbreaks from "Outbreak N" tables and the species table that
/// follows each one
///
/// A species table with a single data row yields one outbreak with id N.
/// Multiple species rows in one outbreak table yield ids `N-1`, `N-2`, ...
/// so outbreak ids stay unique within the report.
fn build_outbreaks(tables: &[Vec<Vec<String>>]) -> Vec<Outbreak> {
    let mut outbreaks = Vec::new();

    for (index, table) in tables.iter().enumerate() {
        let Some(number) = parse_outbreak_number(&table[0][0]) else {
            continue;
        };

        let location = table[0].get(1).cloned().unwrap_or_default();
        let mut start_date = None;
        let mut end_date = None;
        for row in &table[1..] {
            if row.len() != 2 {
                continue;
            }
            match row[0].as_str() {
                "Start date" => start_date = parse_date(&row[1]),
                "End date" => end_date = parse_date(&row[1]),
                _ => {}
            }
        }

        let species_rows = tables
            .get(index + 1)
            .filter(|t| t[0][0] == "Species")
            .map(|t| species_table_rows(t))
            .unwrap_or_default();

        if species_rows.is_empty() {
            outbreaks.push(Outbreak {
                outbreak_id: number.to_string(),
                location: location.clone(),
                start_date,
                end_date,
                species: String::new(),
                cases: None,
                deaths: None,
                destroyed: None,
            });
            continue;
        }

        let single = species_rows.len() == 1;
        for (i, (species, cases, deaths, destroyed)) in species_rows.into_iter().enumerate() {
            let outbreak_id = if single {
                number.to_string()
            } else {
                format!("{number}-{}", i + 1)
            };
            outbreaks.push(Outbreak {
                outbreak_id,
                location: location.clone(),
                start_date,
                end_date,
                species,
                cases,
                deaths,
                destroyed,
            });
        }
    }

    outbreaks
}

type SpeciesRow = (String, Option<u64>, Option<u64>, Option<u64>);

/// Reads the data rows of a species table under its header
/// (Species | Cases | Deaths | Destroyed)
fn species_table_rows(table: &[Vec<String>]) -> Vec<SpeciesRow> {
    let header = &table[0];
    let column = |name: &str| header.iter().position(|c| c == name);
    let cases_col = column("Cases");
    let deaths_col = column("Deaths");
    let destroyed_col = column("Destroyed");

    table[1..]
        .iter()
        .map(|row| {
            let count = |col: Option<usize>| col.and_then(|c| parse_count(row.get(c)?));
            (
                row.first().cloned().unwrap_or_default(),
                count(cases_col),
                count(deaths_col),
                count(destroyed_col),
            )
        })
        .collect()
}

/// Builds lab tests from the table headed "Laboratory name and type"
///
/// Columns after the header: Laboratory name and type | Outbreak | Test type
/// | Agent | Result. Test ids are 1-based row positions, unique within the
/// report's test table.
fn build_tests(tables: &[Vec<Vec<String>>]) -> Vec<LabTest> {
    let Some(table) = tables.iter().find(|t| t[0][0] == "Laboratory name and type") else {
        return Vec::new();
    };

    let header = &table[0];
    let column = |name: &str| header.iter().position(|c| c == name);
    let outbreak_col = column("Outbreak");
    let type_col = column("Test type");
    let agent_col = column("Agent");
    let result_col = column("Result");

    table[1..]
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let cell = |col: Option<usize>| {
                col.and_then(|c| row.get(c))
                    .cloned()
                    .unwrap_or_default()
            };
            LabTest {
                test_id: (i + 1).to_string(),
                outbreak_id: cell(outbreak_col),
                laboratory: row.first().cloned().unwrap_or_default(),
                test_type: cell(type_col),
                agent: cell(agent_col),
                result: cell(result_col),
            }
        })
        .collect()
}

/// Extracts N from a cell starting "Outbreak N"
fn parse_outbreak_number(cell: &str) -> Option<u32> {
    let rest = cell.strip_prefix("Outbreak ")?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Extracts the reportid query parameter from a link target
fn report_id_from_href(href: &str) -> Option<String> {
    let (_, rest) = href.split_once("reportid=")?;
    let id: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    (!id.is_empty()).then_some(id)
}

/// Parses the portal's day/month/year date format
fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%d/%m/%Y").ok()
}

/// Parses a count cell; empty or dash cells mean "not reported"
fn parse_count(s: &str) -> Option<u64> {
    let trimmed = s.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return None;
    }
    trimmed.replace(',', "").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_request() -> FetchRequest {
        FetchRequest::report(12, "DEU", "9001", 0)
    }

    fn sample_report_page() -> String {
        r#"<html><body>
        <table>
            <tr><td>Report type</td><td>Immediate notification</td></tr>
            <tr><td>Report date</td><td>02/03/2020</td></tr>
            <tr><td>Report status</td><td>Final</td></tr>
            <tr><td>Country</td><td>Germany</td></tr>
            <tr><td>Number of follow-ups</td><td>2</td></tr>
        </table>
        <table>
            <tr><td>Outbreak 1</td><td>Brandenburg</td></tr>
            <tr><td>Start date</td><td>20/02/2020</td></tr>
            <tr><td>End date</td><td>28/02/2020</td></tr>
        </table>
        <table>
            <tr><th>Species</th><th>Cases</th><th>Deaths</th><th>Destroyed</th></tr>
            <tr><td>Swine</td><td>12</td><td>3</td><td>9</td></tr>
        </table>
        <table>
            <tr><td>Outbreak 2</td><td>Saxony</td></tr>
            <tr><td>Start date</td><td>22/02/2020</td></tr>
        </table>
        <table>
            <tr><th>Species</th><th>Cases</th><th>Deaths</th><th>Destroyed</th></tr>
            <tr><td>Wild boar</td><td>4</td><td>4</td><td>-</td></tr>
        </table>
        <table>
            <tr><th>Laboratory name and type</th><th>Outbreak</th><th>Test type</th><th>Agent</th><th>Result</th></tr>
            <tr><td>National reference laboratory</td><td>1</td><td>PCR</td><td>ASFV</td><td>Positive</td></tr>
        </table>
        </body></html>"#
            .to_string()
    }

    #[test]
    fn test_parse_full_report_page() {
        let bundle =
            parse_report(&sample_report_page(), &report_request(), "https://x.test/r").unwrap();

        assert_eq!(bundle.report.report_id, "9001");
        assert_eq!(bundle.report.report_type, ReportType::Immediate);
        assert_eq!(bundle.report.country_name, "Germany");
        assert_eq!(bundle.report.follow_up_count, 2);
        assert_eq!(
            bundle.report.published,
            NaiveDate::from_ymd_opt(2020, 3, 2)
        );

        assert_eq!(bundle.outbreaks.len(), 2);
        assert_eq!(bundle.outbreaks[0].outbreak_id, "1");
        assert_eq!(bundle.outbreaks[0].species, "Swine");
        assert_eq!(bundle.outbreaks[0].cases, Some(12));
        assert_eq!(bundle.outbreaks[1].outbreak_id, "2");
        assert_eq!(bundle.outbreaks[1].destroyed, None);

        assert_eq!(bundle.tests.len(), 1);
        assert_eq!(bundle.tests[0].outbreak_id, "1");
        assert_eq!(bundle.tests[0].test_type, "PCR");
    }

    #[test]
    fn test_parse_follow_up_page() {
        let html = r#"<table>
            <tr><td>Report type</td><td>Follow-up report</td></tr>
            <tr><td>Initial report</td><td>8000</td></tr>
            <tr><td>Follow-up number</td><td>1</td></tr>
        </table>"#;
        let request = FetchRequest::report(12, "DEU", "9001", 1);
        let bundle = parse_report(html, &request, "https://x.test/r").unwrap();

        assert_eq!(bundle.report.report_type, ReportType::FollowUp);
        assert_eq!(bundle.report.initial_report_id.as_deref(), Some("8000"));
        assert_eq!(bundle.report.sequence, 1);
    }

    #[test]
    fn test_follow_up_without_back_reference_is_malformed() {
        let html = r#"<table>
            <tr><td>Report type</td><td>Follow-up report</td></tr>
        </table>"#;
        let request = FetchRequest::report(12, "DEU", "9001", 1);
        let err = parse_report(html, &request, "https://x.test/r").unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));
    }

    #[test]
    fn test_application_error_page_is_malformed() {
        let err = parse_report("Application Error", &report_request(), "https://x.test/r")
            .unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));
    }

    #[test]
    fn test_page_without_tables_is_malformed() {
        let err = parse_report("<html><body>nothing</body></html>", &report_request(), "u")
            .unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));
    }

    #[test]
    fn test_multi_species_outbreak_gets_suffixed_ids() {
        let html = r#"
        <table><tr><td>Report type</td><td>Immediate notification</td></tr></table>
        <table>
            <tr><td>Outbreak 3</td><td>Bavaria</td></tr>
        </table>
        <table>
            <tr><th>Species</th><th>Cases</th><th>Deaths</th><th>Destroyed</th></tr>
            <tr><td>Swine</td><td>5</td><td>1</td><td>4</td></tr>
            <tr><td>Wild boar</td><td>2</td><td>2</td><td>0</td></tr>
        </table>"#;
        let bundle = parse_report(html, &report_request(), "u").unwrap();
        assert_eq!(bundle.outbreaks.len(), 2);
        assert_eq!(bundle.outbreaks[0].outbreak_id, "3-1");
        assert_eq!(bundle.outbreaks[1].outbreak_id, "3-2");
    }

    #[test]
    fn test_parse_listing() {
        let html = r#"
        <a href="/wahid.php/Reviewreport/Review?reportid=9001">Full report</a>
        <a href="/wahid.php/Reviewreport/Review?reportid=9002">Full report</a>
        <a href="/somewhere-else">Summary</a>"#;
        let ids = parse_listing(html, &FetchRequest::listing(12, "DEU", 2020)).unwrap();
        assert_eq!(ids, vec!["9001", "9002"]);
    }

    #[test]
    fn test_empty_listing_is_not_an_error() {
        let ids = parse_listing("<html><body></body></html>", &FetchRequest::listing(12, "DEU", 2020))
            .unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn test_parse_countries() {
        let html = r#"<select id="country">
            <option value="">-- select --</option>
            <option value="DEU">Germany</option>
            <option value="POL">Poland</option>
        </select>"#;
        let countries = parse_countries(html, &FetchRequest::countries(12)).unwrap();
        assert_eq!(countries.len(), 2);
        assert_eq!(countries[0].code, "DEU");
        assert_eq!(countries[1].name, "Poland");
    }

    #[test]
    fn test_countries_page_without_select_is_malformed() {
        let err = parse_countries("<html></html>", &FetchRequest::countries(12)).unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));
    }

    #[test]
    fn test_count_parsing() {
        assert_eq!(parse_count("1,234"), Some(1234));
        assert_eq!(parse_count("-"), None);
        assert_eq!(parse_count(""), None);
        assert_eq!(parse_count("n/a"), None);
    }
}
