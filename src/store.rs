//! The record store collaborator.
//!
//! A record store is a set of named tables of string rows, first row a header.
//! It offers no transactions and no row locks: callers that depend on
//! uniqueness must re-read immediately before writing, and deletes are done
//! by re-reading and rewriting the whole table.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use log::warn;

use crate::error::StoreError;

/// One string-typed table row.
pub type Row = Vec<String>;

/// Tabular storage shared by every requester.
pub trait RecordStore: Send + Sync {
    /// Every row of `table`, header first. A table that does not exist reads as empty.
    fn read_all(&self, table: &str) -> Result<Vec<Row>, StoreError>;

    /// Append one row to the end of `table`, creating the table if needed.
    fn append(&self, table: &str, row: Row) -> Result<(), StoreError>;

    /// Replace the full contents of `table`.
    fn clear_and_rewrite(&self, table: &str, rows: Vec<Row>) -> Result<(), StoreError>;
}

impl<S: RecordStore + ?Sized> RecordStore for std::sync::Arc<S> {
    fn read_all(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        (**self).read_all(table)
    }

    fn append(&self, table: &str, row: Row) -> Result<(), StoreError> {
        (**self).append(table, row)
    }

    fn clear_and_rewrite(&self, table: &str, rows: Vec<Row>) -> Result<(), StoreError> {
        (**self).clear_and_rewrite(table, rows)
    }
}

/// Record store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<BTreeMap<String, Vec<Row>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with `tables`.
    pub fn with_tables(tables: BTreeMap<String, Vec<Row>>) -> Self {
        MemoryStore {
            tables: Mutex::new(tables),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<Row>>>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl RecordStore for MemoryStore {
    fn read_all(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        Ok(self.lock()?.get(table).cloned().unwrap_or_default())
    }

    fn append(&self, table: &str, row: Row) -> Result<(), StoreError> {
        self.lock()?.entry(table.to_string()).or_default().push(row);
        Ok(())
    }

    fn clear_and_rewrite(&self, table: &str, rows: Vec<Row>) -> Result<(), StoreError> {
        self.lock()?.insert(table.to_string(), rows);
        Ok(())
    }
}

/// Bounded retry around record store reads.
///
/// Only transient failures ([`StoreError::is_transient`]) are repeated; the
/// last error is returned once the attempts are used up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub attempts: u32,

    /// Fixed pause between attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps, for tests and tools.
    pub fn immediate(attempts: u32) -> Self {
        RetryPolicy {
            attempts,
            backoff: Duration::ZERO,
        }
    }

    /// `store.read_all(table)` with retries.
    pub fn read_all(&self, store: &dyn RecordStore, table: &str) -> Result<Vec<Row>, StoreError> {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match store.read_all(table) {
                Ok(rows) => return Ok(rows),
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(
                        "read of '{}' failed (attempt {}/{}): {}",
                        table, attempt, attempts, e
                    );
                    if !self.backoff.is_zero() {
                        thread::sleep(self.backoff);
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
