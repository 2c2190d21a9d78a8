//! In-process tabular transport
//!
//! Behaves like a spreadsheet: row 1 is whatever was written there, appends go
//! after the last non-blank row and deleting a row shifts everything below it up
//! by one. Each call yields to the scheduler before touching the grid, so
//! concurrent store operations interleave at the same points they would against
//! a remote backend.

use crate::core::TransportError;
use crate::storage::transport::{Transport, TransportResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

#[derive(Debug, Default, Clone)]
struct Table {
    id: i64,
    rows: Vec<Vec<String>>,
}

/// Spreadsheet-like grid held in memory
#[derive(Debug, Default)]
pub struct MemoryTransport {
    tables: RwLock<HashMap<String, Table>>,
    next_id: AtomicI64,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl MemoryTransport {
    /// Create a transport with no tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport with the named empty tables
    pub fn with_collections<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let transport = Self::new();
        for name in names {
            transport.create_table(name.as_ref());
        }
        transport
    }

    /// Replace a table's raw rows, creating the table if needed
    pub fn seed(&self, collection: &str, rows: Vec<Vec<String>>) {
        self.create_table(collection);
        if let Some(table) = self.tables.write().get_mut(collection) {
            table.rows = rows;
        }
    }

    /// Snapshot of a table's raw rows
    pub fn rows(&self, collection: &str) -> Option<Vec<Vec<String>>> {
        self.tables.read().get(collection).map(|t| t.rows.clone())
    }

    /// Make every subsequent call fail with [`TransportError::Unavailable`]
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of transport calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn create_table(&self, name: &str) {
        let mut tables = self.tables.write();
        if !tables.contains_key(name) {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            tables.insert(name.to_string(), Table { id, rows: Vec::new() });
        }
    }

    async fn enter(&self) -> TransportResult<()> {
        tokio::task::yield_now().await;
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("memory transport is offline".into()));
        }
        Ok(())
    }

    fn with_table<T>(
        &self,
        collection: &str,
        f: impl FnOnce(&mut Table) -> TransportResult<T>,
    ) -> TransportResult<T> {
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(collection)
            .ok_or_else(|| TransportError::UnknownCollection(collection.to_string()))?;
        f(table)
    }
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|cell| cell.is_empty())
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn read_all_rows(&self, collection: &str) -> TransportResult<Vec<Vec<String>>> {
        self.enter().await?;
        self.with_table(collection, |t| Ok(t.rows.clone()))
    }

    async fn read_header_row(&self, collection: &str) -> TransportResult<Vec<String>> {
        self.enter().await?;
        self.with_table(collection, |t| Ok(t.rows.first().cloned().unwrap_or_default()))
    }

    async fn write_header_row(&self, collection: &str, headers: &[String]) -> TransportResult<()> {
        self.enter().await?;
        self.with_table(collection, |t| {
            match t.rows.first_mut() {
                Some(first) => *first = headers.to_vec(),
                None => t.rows.push(headers.to_vec()),
            }
            Ok(())
        })
    }

    async fn append_row(&self, collection: &str, row: &[String]) -> TransportResult<()> {
        self.enter().await?;
        self.with_table(collection, |t| {
            while t.rows.last().map_or(false, |r| is_blank(r)) {
                t.rows.pop();
            }
            t.rows.push(row.to_vec());
            Ok(())
        })
    }

    async fn overwrite_row(
        &self,
        collection: &str,
        row_index: usize,
        row: &[String],
    ) -> TransportResult<()> {
        self.enter().await?;
        self.with_table(collection, |t| {
            if row_index == 0 {
                return Err(TransportError::RowOutOfRange { row: 0, rows: t.rows.len() });
            }
            if t.rows.len() < row_index {
                t.rows.resize(row_index, Vec::new());
            }
            t.rows[row_index - 1] = row.to_vec();
            Ok(())
        })
    }

    async fn delete_row(&self, collection: &str, row_index: usize) -> TransportResult<()> {
        self.enter().await?;
        self.with_table(collection, |t| {
            if row_index == 0 || row_index > t.rows.len() {
                return Err(TransportError::RowOutOfRange {
                    row: row_index,
                    rows: t.rows.len(),
                });
            }
            t.rows.remove(row_index - 1);
            Ok(())
        })
    }

    async fn collection_physical_id(&self, collection: &str) -> TransportResult<Option<i64>> {
        self.enter().await?;
        Ok(self.tables.read().get(collection).map(|t| t.id))
    }

    async fn list_collections(&self) -> TransportResult<Vec<String>> {
        self.enter().await?;
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_collection(&self, name: &str) -> TransportResult<()> {
        self.enter().await?;
        self.create_table(name);
        Ok(())
    }
}
