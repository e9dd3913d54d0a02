//! Durable checkpoint store for retrieval units
//!
//! Records which units of work have already been retrieved so an interrupted
//! run resumes instead of re-fetching. Backed by SQLite in the output
//! directory, separate from the record payloads. Every status change is a
//! single upsert, so a torn write can never be observed as `done` on the
//! next run, and marking a unit twice is the same as marking it once.

use crate::model::YearRange;
use crate::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

/// Identity of one unit of work, stable across runs
///
/// The string encoding is the checkpoint primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnitKey {
    /// The report-id listing for one (country, disease, year)
    Listing {
        country: String,
        disease: u32,
        year: u16,
    },
    /// One initial report's detail page
    Report {
        country: String,
        disease: u32,
        report_id: String,
    },
    /// One follow-up in a report's chain, by sequence number
    FollowUp {
        country: String,
        disease: u32,
        report_id: String,
        seq: u32,
    },
}

impl UnitKey {
    pub fn listing(country: &str, disease: u32, year: u16) -> Self {
        Self::Listing {
            country: country.to_string(),
            disease,
            year,
        }
    }

    pub fn report(country: &str, disease: u32, report_id: &str) -> Self {
        Self::Report {
            country: country.to_string(),
            disease,
            report_id: report_id.to_string(),
        }
    }

    pub fn follow_up(country: &str, disease: u32, report_id: &str, seq: u32) -> Self {
        Self::FollowUp {
            country: country.to_string(),
            disease,
            report_id: report_id.to_string(),
            seq,
        }
    }

    /// The stable string form used as the checkpoint primary key
    pub fn encode(&self) -> String {
        match self {
            Self::Listing {
                country,
                disease,
                year,
            } => format!("listing/{country}/{disease}/{year}"),
            Self::Report {
                country,
                disease,
                report_id,
            } => format!("report/{country}/{disease}/{report_id}"),
            Self::FollowUp {
                country,
                disease,
                report_id,
                seq,
            } => format!("followup/{country}/{disease}/{report_id}/{seq}"),
        }
    }

    /// Parses the string form back; returns None for unknown encodings
    pub fn decode(s: &str) -> Option<Self> {
        let mut parts = s.split('/');
        let kind = parts.next()?;
        let country = parts.next()?.to_string();
        let disease: u32 = parts.next()?.parse().ok()?;
        match kind {
            "listing" => {
                let year: u16 = parts.next()?.parse().ok()?;
                parts.next().is_none().then_some(Self::Listing {
                    country,
                    disease,
                    year,
                })
            }
            "report" => {
                let report_id = parts.next()?.to_string();
                parts.next().is_none().then_some(Self::Report {
                    country,
                    disease,
                    report_id,
                })
            }
            "followup" => {
                let report_id = parts.next()?.to_string();
                let seq: u32 = parts.next()?.parse().ok()?;
                parts.next().is_none().then_some(Self::FollowUp {
                    country,
                    disease,
                    report_id,
                    seq,
                })
            }
            _ => None,
        }
    }
}

// Display matches the stable encoding so log lines and database keys read
// the same.
impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// Recorded outcome of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    Done,
    Failed,
}

impl UnitStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// SQLite-backed checkpoint store
pub struct CheckpointStore {
    conn: Connection,
}

impl CheckpointStore {
    /// Opens or creates the checkpoint database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        Self::initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Creates an in-memory store (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn initialize_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                config_hash TEXT NOT NULL,
                disease_id INTEGER NOT NULL,
                year_min INTEGER NOT NULL,
                year_max INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS units (
                unit_key TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                reason TEXT,
                attempts INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_units_status ON units(status);
        ",
        )?;
        Ok(())
    }

    // ===== Run Management =====

    /// Records the start of a retrieval run
    pub fn create_run(&mut self, config_hash: &str, disease_id: u32, years: YearRange) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, disease_id, year_min, year_max)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![now, config_hash, disease_id, years.min, years.max],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Marks a run as finished
    pub fn complete_run(&mut self, run_id: i64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE runs SET finished_at = ?1 WHERE id = ?2",
            params![now, run_id],
        )?;
        Ok(())
    }

    // ===== Unit Outcomes =====

    /// Returns true if the unit's record has been durably persisted
    ///
    /// Fails safe: any read problem is treated as not-done so the run can
    /// always make progress (re-fetching is harmless, skipping is not).
    pub fn is_done(&self, key: &UnitKey) -> bool {
        let result: rusqlite::Result<Option<String>> = self
            .conn
            .query_row(
                "SELECT status FROM units WHERE unit_key = ?1",
                params![key.encode()],
                |row| row.get(0),
            )
            .optional();

        match result {
            Ok(Some(status)) => UnitStatus::from_db_string(&status) == Some(UnitStatus::Done),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("Checkpoint read failed for {key}, treating as pending: {e}");
                false
            }
        }
    }

    /// Marks a unit done; idempotent
    ///
    /// Must only be called after the unit's record is persisted in the
    /// record store. The write ordering is what makes a crash between the
    /// two safe: the record is overwritten on re-fetch, never duplicated.
    pub fn mark_done(&mut self, key: &UnitKey) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO units (unit_key, status, reason, attempts, updated_at)
             VALUES (?1, 'done', NULL, 1, ?2)
             ON CONFLICT(unit_key) DO UPDATE SET
                 status = 'done', reason = NULL, updated_at = excluded.updated_at",
            params![key.encode(), now],
        )?;
        Ok(())
    }

    /// Records a unit failure with its reason; idempotent, never blocks retry
    ///
    /// A failed unit stays pending from the resume filter's point of view,
    /// so the next run attempts it again.
    pub fn mark_failed(&mut self, key: &UnitKey, reason: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO units (unit_key, status, reason, attempts, updated_at)
             VALUES (?1, 'failed', ?2, 1, ?3)
             ON CONFLICT(unit_key) DO UPDATE SET
                 status = 'failed', reason = excluded.reason,
                 attempts = units.attempts + 1, updated_at = excluded.updated_at",
            params![key.encode(), reason, now],
        )?;
        Ok(())
    }

    /// Loads the set of done unit keys, used to filter the full unit space
    pub fn done_set(&self) -> Result<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT unit_key FROM units WHERE status = 'done'")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(keys)
    }

    /// Filters a slice of the full unit space down to the not-yet-done units
    ///
    /// Bulk view over the done set. The orchestrator itself checks units one
    /// at a time with `is_done` because the unit space unfolds as listings
    /// and chain lengths are discovered, never as a precomputed slice.
    pub fn pending_units(&self, full_space: &[UnitKey]) -> Result<Vec<UnitKey>> {
        let done = self.done_set()?;
        Ok(full_space
            .iter()
            .filter(|key| !done.contains(&key.encode()))
            .cloned()
            .collect())
    }

    // ===== Statistics =====

    /// Counts units marked done
    pub fn count_done(&self) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM units WHERE status = 'done'",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Counts failed units grouped by recorded reason
    pub fn failed_by_reason(&self) -> Result<HashMap<String, u64>> {
        let mut stmt = self.conn.prepare(
            "SELECT COALESCE(reason, 'unknown'), COUNT(*)
             FROM units WHERE status = 'failed' GROUP BY reason",
        )?;
        let mut counts = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (reason, count) = row?;
            counts.insert(reason, count as u64);
        }
        Ok(counts)
    }
}
