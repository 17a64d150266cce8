//! Canonical store: a disposable per-run SQLite database holding the
//! normalized url and visit rows.

use std::path::Path;

use rusqlite::Connection;
use thiserror::Error;
use tracing::{debug, info};

use crate::extract::{Extraction, RecordStream};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS urls (
    id INTEGER PRIMARY KEY,
    url TEXT,
    title TEXT,
    rev_host TEXT,
    visit_count INTEGER DEFAULT 0,
    typed INTEGER DEFAULT 0,
    last_visit_date INTEGER,
    redirect_urls TEXT
);
CREATE TABLE IF NOT EXISTS visits (
    id INTEGER PRIMARY KEY,
    url_id INTEGER,
    visit_date INTEGER,
    visit_type INTEGER,
    referrer INTEGER
);
";

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Create a fresh store, destroying any leftover from a previous run.
    pub fn create(path: &Path) -> Result<Store, StoreError> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        info!("created canonical store at {}", path.display());
        Ok(Store { conn })
    }

    /// Open the store left behind by an earlier import.
    pub fn open(path: &Path) -> Result<Store, StoreError> {
        let conn = Connection::open(path)?;
        Ok(Store { conn })
    }

    /// In-memory store for tests.
    #[cfg(test)]
    pub fn in_memory() -> Result<Store, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Store { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Load both streams of an extraction. Each table commits on its own;
    /// a failure in the second stream leaves the first one written.
    pub fn load(&mut self, extraction: &Extraction) -> Result<(), StoreError> {
        let urls = self.insert_stream("urls", &extraction.urls)?;
        let visits = self.insert_stream("visits", &extraction.visits)?;
        info!("loaded {urls} url rows, {visits} visit rows");
        Ok(())
    }

    /// Insert one record stream with insert-or-ignore semantics: run-local
    /// ids make repeat loads of the same source idempotent.
    fn insert_stream(&mut self, table: &str, stream: &RecordStream) -> Result<usize, StoreError> {
        if stream.columns.is_empty() {
            return Ok(0);
        }
        let placeholders = (1..=stream.columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT OR IGNORE INTO {table} ({}) VALUES ({placeholders})",
            stream.columns.join(", ")
        );
        debug!("loading {} rows via: {sql}", stream.rows.len());

        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in &stream.rows {
                inserted += stmt.execute(rusqlite::params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Earliest and latest visit timestamps, if any visits were imported.
    pub fn date_range(&self) -> Result<Option<(i64, i64)>, StoreError> {
        let range = self.conn.query_row(
            "SELECT min(visit_date), max(visit_date) FROM visits",
            [],
            |row| {
                let min: Option<i64> = row.get(0)?;
                let max: Option<i64> = row.get(1)?;
                Ok(min.zip(max))
            },
        )?;
        Ok(range)
    }
}
