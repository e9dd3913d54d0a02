//! Retrieval orchestration
//!
//! The orchestrator enumerates the full unit-of-work space (every reporting
//! country crossed with the requested year range), filters it through the
//! checkpoint store, and drives the fetch client unit by unit:
//! listing first, then each listed report, then that report's follow-up
//! chain in sequence order. Every successful fetch is persisted to the
//! record store *before* its unit is marked done, so a crash between the two
//! re-fetches the unit and overwrites the record cleanly.
//!
//! No unit's failure aborts the run; failures are recorded with their reason
//! and tallied. Only checkpoint or record store I/O errors propagate.

mod retry;

pub use retry::{with_retry, RetryPolicy};

use crate::checkpoint::{CheckpointStore, UnitKey};
use crate::corpus::RecordStore;
use crate::fetch::{FetchClient, FetchError};
use crate::model::{Country, Listing, YearRange};
use crate::Result;
use std::collections::HashMap;

/// Outcome tally of one retrieval pass
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Units fetched and persisted during this run
    pub fetched: u64,
    /// Units skipped because an earlier run already completed them
    pub skipped: u64,
    /// Units that failed this run, by reason tag
    pub failed: HashMap<String, u64>,
    /// Store-wide done count after the run
    pub total_done: u64,
}

impl RunSummary {
    fn record_failure(&mut self, error: &FetchError) {
        *self.failed.entry(error.reason_tag().to_string()).or_insert(0) += 1;
    }

    pub fn failure_count(&self) -> u64 {
        self.failed.values().sum()
    }
}

/// Prints a run summary to stdout
pub fn print_summary(summary: &RunSummary) {
    println!("=== Harvest Summary ===\n");
    println!("  Units fetched this run: {}", summary.fetched);
    println!("  Units already done (skipped): {}", summary.skipped);
    println!("  Units done in store: {}", summary.total_done);

    if summary.failed.is_empty() {
        println!("  Failures: none");
    } else {
        println!("  Failures ({} total):", summary.failure_count());
        let mut reasons: Vec<_> = summary.failed.iter().collect();
        reasons.sort_by(|a, b| a.0.cmp(b.0));
        for (reason, count) in reasons {
            println!("    {reason}: {count}");
        }
    }
}

/// Drives one retrieval pass over the unit space
///
/// Owns the fetch client for the whole run; the underlying render session is
/// not reentrant, so units are processed sequentially.
pub struct Orchestrator<C: FetchClient> {
    client: C,
    checkpoints: CheckpointStore,
    records: RecordStore,
    policy: RetryPolicy,
    disease_id: u32,
    years: YearRange,
}

impl<C: FetchClient> Orchestrator<C> {
    pub fn new(
        client: C,
        checkpoints: CheckpointStore,
        records: RecordStore,
        policy: RetryPolicy,
        disease_id: u32,
        years: YearRange,
    ) -> Self {
        Self {
            client,
            checkpoints,
            records,
            policy,
            disease_id,
            years,
        }
    }

    /// Runs the pass to completion over the pending set
    ///
    /// Country enumeration itself is the one retrieval that must succeed:
    /// without it there is no unit space, so its failure (after retries) is
    /// fatal. Everything after is downgraded to a recorded outcome.
    pub async fn run(&mut self, config_hash: &str) -> Result<RunSummary> {
        let run_id = self
            .checkpoints
            .create_run(config_hash, self.disease_id, self.years)?;
        tracing::info!(
            "Starting harvest run {run_id}: disease {}, years {}",
            self.disease_id,
            self.years
        );

        let mut countries =
            with_retry(&self.policy, || self.client.list_countries(self.disease_id)).await?;
        countries.sort_by(|a, b| a.code.cmp(&b.code));
        tracing::info!("Enumerated {} reporting countries", countries.len());

        let mut summary = RunSummary::default();

        for country in &countries {
            let report_ids = self.country_listings(country, &mut summary).await?;
            tracing::debug!(
                "Country {}: {} reports across {}",
                country.code,
                report_ids.len(),
                self.years
            );

            for report_id in &report_ids {
                let Some(chain_len) = self.report_unit(country, report_id, &mut summary).await?
                else {
                    // Report unavailable this run; its chain length is
                    // unknown, so the follow-ups stay pending too.
                    continue;
                };

                for seq in 1..=chain_len {
                    self.follow_up_unit(country, report_id, seq, &mut summary)
                        .await?;
                }
            }
        }

        self.checkpoints.complete_run(run_id)?;
        summary.total_done = self.checkpoints.count_done()?;

        tracing::info!(
            "Run {run_id} complete: {} fetched, {} skipped, {} failed",
            summary.fetched,
            summary.skipped,
            summary.failure_count()
        );

        Ok(summary)
    }

    /// Access to the checkpoint store, for inspection after a run
    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Access to the fetch client, for inspection after a run
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Collects the report ids for one country across the year range,
    /// fetching pending listings and reading completed ones back from the
    /// corpus
    async fn country_listings(
        &mut self,
        country: &Country,
        summary: &mut RunSummary,
    ) -> Result<Vec<String>> {
        let mut report_ids = Vec::new();

        for year in self.years.years() {
            let key = UnitKey::listing(&country.code, self.disease_id, year);

            if self.checkpoints.is_done(&key) {
                if let Some(listing) =
                    self.records
                        .read_listing(&country.code, self.disease_id, year)?
                {
                    summary.skipped += 1;
                    report_ids.extend(listing.report_ids);
                    continue;
                }
                // Done but the file is gone: the record was removed to force
                // a re-fetch, so fall through and fetch it again.
                tracing::warn!("Listing {key} marked done but record missing, re-fetching");
            }

            let fetched = with_retry(&self.policy, || {
                self.client
                    .list_reports(self.disease_id, &country.code, year)
            })
            .await;

            match fetched {
                Ok(ids) => {
                    let listing = Listing {
                        country_code: country.code.clone(),
                        disease_id: self.disease_id,
                        year,
                        report_ids: ids.clone(),
                    };
                    // Persist first, then mark done
                    self.records.write_listing(&listing)?;
                    self.checkpoints.mark_done(&key)?;
                    summary.fetched += 1;
                    report_ids.extend(ids);
                }
                Err(e) => {
                    tracing::warn!("Listing {key} failed: {e}");
                    self.checkpoints.mark_failed(&key, e.reason_tag())?;
                    summary.record_failure(&e);
                }
            }
        }

        report_ids.sort();
        report_ids.dedup();
        Ok(report_ids)
    }

    /// Processes one initial-report unit
    ///
    /// Returns the report's follow-up chain length when the record is
    /// available (freshly fetched or read back from the corpus), or None
    /// when the unit failed this run.
    async fn report_unit(
        &mut self,
        country: &Country,
        report_id: &str,
        summary: &mut RunSummary,
    ) -> Result<Option<u32>> {
        let key = UnitKey::report(&country.code, self.disease_id, report_id);

        if self.checkpoints.is_done(&key) {
            if let Some(bundle) = self
                .records
                .read_bundle(&country.code, self.disease_id, report_id, 0)?
            {
                summary.skipped += 1;
                return Ok(Some(bundle.report.follow_up_count));
            }
            tracing::warn!("Report {key} marked done but record missing, re-fetching");
        }

        let fetched = with_retry(&self.policy, || {
            self.client
                .fetch_report(self.disease_id, &country.code, report_id, 0)
        })
        .await;

        match fetched {
            Ok(bundle) => {
                let chain_len = bundle.report.follow_up_count;
                self.records
                    .write_bundle(&country.code, self.disease_id, report_id, 0, &bundle)?;
                self.checkpoints.mark_done(&key)?;
                summary.fetched += 1;
                Ok(Some(chain_len))
            }
            Err(e) => {
                tracing::warn!("Report {key} failed: {e}");
                self.checkpoints.mark_failed(&key, e.reason_tag())?;
                summary.record_failure(&e);
                Ok(None)
            }
        }
    }

    /// Processes one follow-up unit in a report's chain
    async fn follow_up_unit(
        &mut self,
        country: &Country,
        report_id: &str,
        seq: u32,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let key = UnitKey::follow_up(&country.code, self.disease_id, report_id, seq);

        if self.checkpoints.is_done(&key) {
            if self
                .records
                .read_bundle(&country.code, self.disease_id, report_id, seq)?
                .is_some()
            {
                summary.skipped += 1;
                return Ok(());
            }
            tracing::warn!("Follow-up {key} marked done but record missing, re-fetching");
        }

        let fetched = with_retry(&self.policy, || {
            self.client
                .fetch_report(self.disease_id, &country.code, report_id, seq)
        })
        .await;

        match fetched {
            Ok(bundle) => {
                self.records
                    .write_bundle(&country.code, self.disease_id, report_id, seq, &bundle)?;
                self.checkpoints.mark_done(&key)?;
                summary.fetched += 1;
            }
            Err(e) => {
                tracing::warn!("Follow-up {key} failed: {e}");
                self.checkpoints.mark_failed(&key, e.reason_tag())?;
                summary.record_failure(&e);
            }
        }

        Ok(())
    }
}
