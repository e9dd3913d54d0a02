//! HTTP implementation of the fetch client
//!
//! Wraps all transport concerns: client construction, portal URL building,
//! the courtesy delay between requests, and classification of HTTP/network
//! outcomes into the typed failure taxonomy.
//!
//! Classification:
//!
//! | Condition | Failure |
//! |-----------|---------|
//! | Timeout, connect error, other network error | Transient |
//! | HTTP 429, HTTP 5xx | Transient |
//! | HTTP 404, 410 | NotFound |
//! | Any other non-success status | Malformed |
//! | Body does not parse as the expected page | Malformed |

use crate::config::{FetchConfig, PortalConfig};
use crate::fetch::{parser, FetchError, FetchRequest, FetchResult};
use crate::model::{Country, ReportBundle};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

const COUNTRIES_PATH: &str = "wahis_2/public/wahid.php/Diseaseinformation/Countrylist";
const SUMMARY_PATH: &str = "wahis_2/public/wahid.php/Diseaseinformation/Immsummary";
const REPORT_PATH: &str = "wahis_2/public/wahid.php/Reviewreport/Review";

/// Builds an HTTP client with the portal configuration applied
///
/// # Arguments
///
/// * `portal` - Portal identification (user agent)
/// * `fetch` - Timeout settings
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(portal: &PortalConfig, fetch: &FetchConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(portal.user_agent.clone())
        .timeout(Duration::from_secs(fetch.request_timeout_secs))
        .connect_timeout(Duration::from_secs(fetch.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetch client backed by plain HTTP requests against the portal
///
/// Owns one client; not shared across concurrent callers.
pub struct HttpFetchClient {
    client: Client,
    base_url: Url,
    courtesy_delay: Duration,
}

impl HttpFetchClient {
    /// Creates a new HTTP fetch client
    ///
    /// # Arguments
    ///
    /// * `portal` - Portal base URL and user agent
    /// * `fetch` - Timeout and pacing settings
    pub fn new(portal: &PortalConfig, fetch: &FetchConfig) -> Result<Self, FetchError> {
        let base_url = Url::parse(&portal.base_url).map_err(|e| FetchError::Malformed {
            unit: portal.base_url.clone(),
            context: format!("invalid base url: {e}"),
        })?;

        let client = build_http_client(portal, fetch).map_err(|e| FetchError::Transient {
            unit: portal.base_url.clone(),
            reason: format!("failed to build HTTP client: {e}"),
        })?;

        Ok(Self {
            client,
            base_url,
            courtesy_delay: Duration::from_millis(fetch.courtesy_delay_ms),
        })
    }

    /// Builds the portal URL for a request descriptor
    fn request_url(&self, request: &FetchRequest) -> Url {
        let mut url = self.base_url.clone();

        if let Some(report_id) = &request.report_id {
            url.set_path(REPORT_PATH);
            url.query_pairs_mut().append_pair("reportid", report_id);
            if let Some(seq) = request.follow_up_seq {
                url.query_pairs_mut().append_pair("fu", &seq.to_string());
            }
        } else if let Some(year) = request.year {
            url.set_path(SUMMARY_PATH);
            url.query_pairs_mut()
                .append_pair("disease_id", &request.disease_id.to_string())
                .append_pair("year", &year.to_string());
            if let Some(country) = &request.country_code {
                url.query_pairs_mut().append_pair("country", country);
            }
        } else {
            url.set_path(COUNTRIES_PATH);
            url.query_pairs_mut()
                .append_pair("disease_id", &request.disease_id.to_string());
        }

        url
    }

    /// Performs one GET and classifies the outcome
    async fn get_page(&self, request: &FetchRequest) -> FetchResult<String> {
        if !self.courtesy_delay.is_zero() {
            tokio::time::sleep(self.courtesy_delay).await;
        }

        let url = self.request_url(request);
        let unit = request.to_string();
        tracing::debug!("GET {url}");

        let response = self.client.get(url).send().await.map_err(|e| {
            let reason = if e.is_timeout() {
                "request timeout".to_string()
            } else if e.is_connect() {
                "connection failed".to_string()
            } else {
                e.to_string()
            };
            FetchError::Transient {
                unit: unit.clone(),
                reason,
            }
        })?;

        let status = response.status();
        match status {
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                return Err(FetchError::NotFound { unit })
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(FetchError::Transient {
                    unit,
                    reason: "rate limited (HTTP 429)".to_string(),
                })
            }
            s if s.is_server_error() => {
                return Err(FetchError::Transient {
                    unit,
                    reason: format!("HTTP {s}"),
                })
            }
            s if !s.is_success() => {
                return Err(FetchError::Malformed {
                    unit,
                    context: format!("unexpected HTTP {s}"),
                })
            }
            _ => {}
        }

        response.text().await.map_err(|e| FetchError::Transient {
            unit,
            reason: format!("failed to read body: {e}"),
        })
    }
}

impl super::FetchClient for HttpFetchClient {
    async fn list_countries(&self, disease_id: u32) -> FetchResult<Vec<Country>> {
        let request = FetchRequest::countries(disease_id);
        let html = self.get_page(&request).await?;
        parser::parse_countries(&html, &request)
    }

    async fn list_reports(
        &self,
        disease_id: u32,
        country_code: &str,
        year: u16,
    ) -> FetchResult<Vec<String>> {
        let request = FetchRequest::listing(disease_id, country_code, year);
        let html = self.get_page(&request).await?;
        parser::parse_listing(&html, &request)
    }

    async fn fetch_report(
        &self,
        disease_id: u32,
        country_code: &str,
        report_id: &str,
        seq: u32,
    ) -> FetchResult<ReportBundle> {
        let request = FetchRequest::report(disease_id, country_code, report_id, seq);
        let html = self.get_page(&request).await?;
        let url = self.request_url(&request);
        parser::parse_report(&html, &request, url.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> HttpFetchClient {
        let portal = PortalConfig {
            base_url: "https://portal.example.test".to_string(),
            user_agent: "TestHarvester/1.0".to_string(),
        };
        HttpFetchClient::new(&portal, &FetchConfig::default()).unwrap()
    }

    #[test]
    fn test_countries_url() {
        let client = test_client();
        let url = client.request_url(&FetchRequest::countries(12));
        assert!(url.path().ends_with("Countrylist"));
        assert!(url.query().unwrap().contains("disease_id=12"));
    }

    #[test]
    fn test_listing_url() {
        let client = test_client();
        let url = client.request_url(&FetchRequest::listing(12, "DEU", 2020));
        assert!(url.path().ends_with("Immsummary"));
        let query = url.query().unwrap();
        assert!(query.contains("disease_id=12"));
        assert!(query.contains("year=2020"));
        assert!(query.contains("country=DEU"));
    }

    #[test]
    fn test_report_url_initial_and_follow_up() {
        let client = test_client();

        let initial = client.request_url(&FetchRequest::report(12, "DEU", "9001", 0));
        assert!(initial.path().ends_with("Review"));
        assert!(initial.query().unwrap().contains("reportid=9001"));
        assert!(!initial.query().unwrap().contains("fu="));

        let follow_up = client.request_url(&FetchRequest::report(12, "DEU", "9001", 2));
        assert!(follow_up.query().unwrap().contains("fu=2"));
    }

    #[test]
    fn test_rejects_unparseable_base_url() {
        let portal = PortalConfig {
            base_url: "not a url".to_string(),
            user_agent: "TestHarvester/1.0".to_string(),
        };
        assert!(HttpFetchClient::new(&portal, &FetchConfig::default()).is_err());
    }
}
