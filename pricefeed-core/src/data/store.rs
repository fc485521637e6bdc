//! SQLite-backed price store.
//!
//! Layout: one `prices` table, one row per observation, with the UNIQUE
//! constraint on `timestamp` as the only deduplication mechanism. Timestamps
//! are stored as UTC `YYYY-MM-DD HH:MM:SS` text so that `ORDER BY timestamp`
//! is chronological.
//!
//! Every operation opens its own connection and drops it before returning.
//! Reads open read-only and never create the database file.

use crate::domain::{InsertResult, PriceObservation};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const PRICES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS prices (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    price REAL NOT NULL,
    timestamp DATETIME NOT NULL UNIQUE
);
"#;

/// Errors from the storage layer. Any of these is fatal to a backfill run.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create store directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("price store {path} does not exist")]
    Missing { path: PathBuf },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt timestamp '{value}' in store: {reason}")]
    CorruptTimestamp { value: String, reason: String },
}

/// Durable, deduplicated persistence of price observations.
#[derive(Debug, Clone)]
pub struct PriceStore {
    path: PathBuf,
    busy_timeout: Duration,
}

impl PriceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::from_secs(30),
        }
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }

    fn connect_read_only(&self) -> Result<Connection, StoreError> {
        if !self.path.is_file() {
            return Err(StoreError::Missing {
                path: self.path.clone(),
            });
        }
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }

    /// Create the `prices` table if it does not exist yet.
    ///
    /// Safe to call on every process start.
    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let conn = self.connect()?;
        conn.execute_batch(PRICES_SCHEMA)?;
        info!(path = %self.path.display(), "price store ready");
        Ok(())
    }

    /// Insert an observation unless one already exists at its timestamp.
    ///
    /// A duplicate is rejected by the UNIQUE constraint; the existing price is
    /// read back and reported as [`InsertResult::AlreadyPresent`].
    pub fn insert(&self, obs: &PriceObservation) -> Result<InsertResult, StoreError> {
        let conn = self.connect()?;
        let ts = format_timestamp(&obs.timestamp);

        match conn.execute(
            "INSERT INTO prices (price, timestamp) VALUES (?1, ?2)",
            params![obs.price, ts],
        ) {
            Ok(_) => {
                info!(timestamp = %ts, price = obs.price, "inserted price");
                Ok(InsertResult::Inserted { price: obs.price })
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                let existing_price: f64 = conn.query_row(
                    "SELECT price FROM prices WHERE timestamp = ?1",
                    params![ts],
                    |row| row.get(0),
                )?;
                debug!(timestamp = %ts, existing_price, "price already stored");
                Ok(InsertResult::AlreadyPresent { existing_price })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// All stored observations, ascending by timestamp.
    pub fn read_all_sorted(&self) -> Result<Vec<PriceObservation>, StoreError> {
        let conn = self.connect_read_only()?;
        let mut stmt = conn.prepare("SELECT timestamp, price FROM prices ORDER BY timestamp ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;

        let mut series = Vec::new();
        for row in rows {
            let (ts, price) = row?;
            series.push(PriceObservation {
                timestamp: parse_timestamp(&ts)?,
                price,
            });
        }
        Ok(series)
    }

    /// Number of stored observations.
    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.connect_read_only()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM prices", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// First and last stored timestamps, or `None` for an empty store.
    pub fn span(&self) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>, StoreError> {
        let conn = self.connect_read_only()?;
        // MIN/MAX over an empty table yield a single row of NULLs.
        let (first, last): (Option<String>, Option<String>) = conn.query_row(
            "SELECT MIN(timestamp), MAX(timestamp) FROM prices",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        match (first, last) {
            (Some(first), Some(last)) => {
                Ok(Some((parse_timestamp(&first)?, parse_timestamp(&last)?)))
            }
            _ => Ok(None),
        }
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| StoreError::CorruptTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn obs(hour: u32, price: f64) -> PriceObservation {
        PriceObservation::new(Utc.with_ymd_and_hms(2024, 1, 2, hour, 0, 0).unwrap(), price)
    }

    fn temp_store() -> (tempfile::TempDir, PriceStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PriceStore::new(dir.path().join("prices.db"));
        store.ensure_schema().unwrap();
        (dir, store)
    }

    #[test]
    fn ensure_schema_is_idempotent() {
        let (_dir, store) = temp_store();
        store.ensure_schema().unwrap();
        store.ensure_schema().unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn ensure_schema_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = PriceStore::new(dir.path().join("nested/deeper/prices.db"));
        store.ensure_schema().unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn duplicate_insert_reports_existing_price() {
        let (_dir, store) = temp_store();

        let first = store.insert(&obs(16, 100.0)).unwrap();
        assert_eq!(first, InsertResult::Inserted { price: 100.0 });

        let second = store.insert(&obs(16, 250.0)).unwrap();
        assert_eq!(
            second,
            InsertResult::AlreadyPresent {
                existing_price: 100.0
            }
        );

        let all = store.read_all_sorted().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].price, 100.0);
    }

    #[test]
    fn identical_insert_twice_keeps_one_copy() {
        let (_dir, store) = temp_store();
        let o = obs(11, 42_000.5);

        assert!(store.insert(&o).unwrap().inserted());
        assert!(!store.insert(&o).unwrap().inserted());
        assert_eq!(store.read_all_sorted().unwrap(), vec![o]);
    }

    #[test]
    fn read_is_sorted_regardless_of_insert_order() {
        let (_dir, store) = temp_store();
        for (hour, price) in [(16, 3.0), (4, 1.0), (23, 4.0), (11, 2.0)] {
            store.insert(&obs(hour, price)).unwrap();
        }

        let prices: Vec<f64> = store
            .read_all_sorted()
            .unwrap()
            .iter()
            .map(|o| o.price)
            .collect();
        assert_eq!(prices, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn span_of_empty_and_filled_store() {
        let (_dir, store) = temp_store();
        assert_eq!(store.span().unwrap(), None);

        store.insert(&obs(16, 3.0)).unwrap();
        store.insert(&obs(11, 2.0)).unwrap();
        let (first, last) = store.span().unwrap().unwrap();
        assert_eq!(first, obs(11, 0.0).timestamp);
        assert_eq!(last, obs(16, 0.0).timestamp);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn timestamps_survive_storage_exactly() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 10, 15, 0, 0).unwrap();
        assert_eq!(parse_timestamp(&format_timestamp(&ts)).unwrap(), ts);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn reading_missing_store_fails_without_creating_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("typo.db");
        let store = PriceStore::new(&path);

        assert!(matches!(
            store.read_all_sorted(),
            Err(StoreError::Missing { .. })
        ));
        assert!(matches!(store.count(), Err(StoreError::Missing { .. })));
        assert!(matches!(store.span(), Err(StoreError::Missing { .. })));
        assert!(!path.exists());
    }

    #[test]
    fn unreachable_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, b"x").unwrap();

        let store = PriceStore::new(blocker.join("prices.db"));
        assert!(store.ensure_schema().is_err());
        assert!(store.insert(&obs(11, 1.0)).is_err());
    }
}
