//! On-disk record corpus
//!
//! The record store is the directory of persisted payloads the fetch stage
//! produces and the tabulate stage reads. Every record has a deterministic
//! path derived from (country, disease, report id, follow-up sequence), so a
//! re-fetch of the same unit overwrites its file instead of duplicating it.
//! Writes go through a temp file and a rename; a record either exists whole
//! or not at all.
//!
//! Layout under the output directory:
//!
//! ```text
//! out_dir/
//!   checkpoints.db            (checkpoint store, managed elsewhere)
//!   listings/CC_D_YYYY.json   (report ids listed per country and year)
//!   records/CC_D_RID.json     (initial report bundles)
//!   records/CC_D_RID_fuN.json (follow-up bundles)
//! ```

use crate::model::{Listing, ReportBundle};
use crate::{HarvestError, Result};
use std::fs;
use std::path::{Path, PathBuf};

const LISTINGS_DIR: &str = "listings";
const RECORDS_DIR: &str = "records";

/// Read/write access to the record corpus
pub struct RecordStore {
    root: PathBuf,
}

impl RecordStore {
    /// Opens the record store under the output directory, creating the
    /// subdirectories if needed
    pub fn open(out_dir: &Path) -> Result<Self> {
        let store = Self {
            root: out_dir.to_path_buf(),
        };
        fs::create_dir_all(store.listings_dir()).map_err(|e| store.io_error(&store.listings_dir(), e))?;
        fs::create_dir_all(store.records_dir()).map_err(|e| store.io_error(&store.records_dir(), e))?;
        Ok(store)
    }

    fn listings_dir(&self) -> PathBuf {
        self.root.join(LISTINGS_DIR)
    }

    fn records_dir(&self) -> PathBuf {
        self.root.join(RECORDS_DIR)
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> HarvestError {
        HarvestError::RecordIo {
            path: path.display().to_string(),
            source,
        }
    }

    /// Deterministic path of one listing
    pub fn listing_path(&self, country: &str, disease: u32, year: u16) -> PathBuf {
        self.listings_dir()
            .join(format!("{}_{disease}_{year}.json", sanitize(country)))
    }

    /// Deterministic path of one report or follow-up record
    pub fn record_path(&self, country: &str, disease: u32, report_id: &str, seq: u32) -> PathBuf {
        let stem = if seq == 0 {
            format!("{}_{disease}_{}", sanitize(country), sanitize(report_id))
        } else {
            format!(
                "{}_{disease}_{}_fu{seq}",
                sanitize(country),
                sanitize(report_id)
            )
        };
        self.records_dir().join(format!("{stem}.json"))
    }

    /// Persists a listing, overwriting any previous copy
    pub fn write_listing(&self, listing: &Listing) -> Result<()> {
        let path = self.listing_path(&listing.country_code, listing.disease_id, listing.year);
        let json = serde_json::to_vec_pretty(listing).map_err(|e| HarvestError::RecordEncode {
            key: path.display().to_string(),
            source: e,
        })?;
        self.write_atomic(&path, &json)
    }

    /// Reads a listing back; None if it was never persisted (or was removed
    /// to force a re-fetch)
    pub fn read_listing(&self, country: &str, disease: u32, year: u16) -> Result<Option<Listing>> {
        let path = self.listing_path(country, disease, year);
        self.read_json(&path)
    }

    /// Persists a report bundle, overwriting any previous copy
    pub fn write_bundle(
        &self,
        country: &str,
        disease: u32,
        report_id: &str,
        seq: u32,
        bundle: &ReportBundle,
    ) -> Result<()> {
        let path = self.record_path(country, disease, report_id, seq);
        let json = serde_json::to_vec_pretty(bundle).map_err(|e| HarvestError::RecordEncode {
            key: path.display().to_string(),
            source: e,
        })?;
        self.write_atomic(&path, &json)
    }

    /// Reads a report bundle back; None if absent
    pub fn read_bundle(
        &self,
        country: &str,
        disease: u32,
        report_id: &str,
        seq: u32,
    ) -> Result<Option<ReportBundle>> {
        let path = self.record_path(country, disease, report_id, seq);
        self.read_json(&path)
    }

    /// Lists every record file in the corpus, sorted by path for
    /// deterministic scan order
    pub fn record_files(&self) -> Result<Vec<PathBuf>> {
        let dir = self.records_dir();
        let mut files = Vec::new();
        let entries = fs::read_dir(&dir).map_err(|e| self.io_error(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| self.io_error(&dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes).map_err(|e| self.io_error(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| self.io_error(path, e))?;
        Ok(())
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(path, e)),
        };
        let value = serde_json::from_str(&content).map_err(|e| HarvestError::RecordEncode {
            key: path.display().to_string(),
            source: e,
        })?;
        Ok(Some(value))
    }
}

/// Restricts path components to a safe character set
fn sanitize(component: &str) -> String {
    component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Loads one record file for compilation; the caller decides what a parse
/// failure means (the compile stage counts and skips them)
pub fn load_bundle(path: &Path) -> std::result::Result<ReportBundle, String> {
    let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&content).map_err(|e| e.to_string())
}
