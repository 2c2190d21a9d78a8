//! Schema registry: the per-collection header row
//!
//! Headers are the only schema authority. They are read lazily from row 1 and
//! only ever grow by appending; no header is reordered or removed.
//!
//! Growth runs under a per-collection advisory lock and re-reads the remote row
//! before writing, so two in-process writers racing to create the first header
//! row end up with one merged row instead of the last writer's. Writers in other
//! processes are not covered; the backend offers no compare-and-set.

use crate::core::{Error, Result};
use crate::storage::locks::CollectionLocks;
use crate::storage::transport::Transport;
use std::sync::Arc;
use tracing::{debug, info};

/// Reads and grows collection header rows
pub struct SchemaRegistry {
    transport: Arc<dyn Transport>,
    locks: CollectionLocks,
}

impl SchemaRegistry {
    /// Create a registry over a transport handle
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            locks: CollectionLocks::new(),
        }
    }

    /// Current header row; empty for an empty table
    pub async fn get_headers(&self, collection: &str) -> Result<Vec<String>> {
        let headers = self
            .transport
            .read_header_row(collection)
            .await
            .map_err(|e| Error::transport(collection, e))?;
        debug!(collection, headers = headers.len(), "read header row");
        Ok(headers)
    }

    /// Append any of `new_fields` not already present and persist the row.
    ///
    /// Idempotent: fields already in the header row are skipped, and nothing is
    /// written when there is nothing to add. Returns the resulting header row.
    pub async fn grow_headers(&self, collection: &str, new_fields: &[String]) -> Result<Vec<String>> {
        let _guard = self.locks.lock(collection).await;
        let current = self.get_headers(collection).await?;
        self.append_and_write(collection, current, new_fields).await
    }

    /// Like [`grow_headers`](Self::grow_headers), but first checks that the
    /// remote row still starts with `expected`, the snapshot the caller encoded
    /// against. A row that was reordered or shrunk underneath the caller fails
    /// with [`Error::SchemaGrowthConflict`]; a row that merely grew is accepted.
    pub async fn grow_headers_from(
        &self,
        collection: &str,
        expected: &[String],
        new_fields: &[String],
    ) -> Result<Vec<String>> {
        let _guard = self.locks.lock(collection).await;
        let current = self.get_headers(collection).await?;
        if !current.starts_with(expected) {
            return Err(Error::SchemaGrowthConflict {
                collection: collection.to_string(),
                expected: expected.to_vec(),
                found: current,
            });
        }
        self.append_and_write(collection, current, new_fields).await
    }

    async fn append_and_write(
        &self,
        collection: &str,
        mut headers: Vec<String>,
        new_fields: &[String],
    ) -> Result<Vec<String>> {
        let before = headers.len();
        for field in new_fields {
            if !headers.contains(field) {
                headers.push(field.clone());
            }
        }
        if headers.len() == before {
            return Ok(headers);
        }

        self.transport
            .write_header_row(collection, &headers)
            .await
            .map_err(|e| Error::transport(collection, e))?;
        info!(
            collection,
            added = ?&headers[before..],
            total = headers.len(),
            "grew header row"
        );
        Ok(headers)
    }
}
