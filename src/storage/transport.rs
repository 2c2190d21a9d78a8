//! Transport contract between the store and a remote tabular backend
//!
//! A transport knows about tables, rows and cells. It knows nothing about
//! documents, ids or filters. Row indices are 1-based and the header row is row 1,
//! matching spreadsheet addressing.

use crate::core::TransportError;
use async_trait::async_trait;

/// Result type for transport calls
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Remote tabular API consumed by the store
///
/// Every method is a suspension point. Implementations must not retry on their
/// own behalf unless documented; the store adds no retries either.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Read every row of a table
    ///
    /// # Arguments
    ///
    /// * `collection` - The table name
    ///
    /// # Returns
    ///
    /// * `Ok(rows)` - Row 0 is the header row; an empty table yields no rows.
    ///   Rows may be shorter than the header row when trailing cells are empty.
    /// * `Err(TransportError)` - If the remote call failed
    async fn read_all_rows(&self, collection: &str) -> TransportResult<Vec<Vec<String>>>;

    /// Read only the header row (row 1); empty when the table is empty
    async fn read_header_row(&self, collection: &str) -> TransportResult<Vec<String>>;

    /// Replace the header row (row 1)
    async fn write_header_row(&self, collection: &str, headers: &[String]) -> TransportResult<()>;

    /// Append a row after the last non-empty row
    async fn append_row(&self, collection: &str, row: &[String]) -> TransportResult<()>;

    /// Overwrite the row at a 1-based index
    ///
    /// # Arguments
    ///
    /// * `collection` - The table name
    /// * `row_index` - 1-based row; the header row is 1
    /// * `row` - Cell values in header order
    async fn overwrite_row(
        &self,
        collection: &str,
        row_index: usize,
        row: &[String],
    ) -> TransportResult<()>;

    /// Structurally delete the row at a 1-based index, shifting later rows up by one
    async fn delete_row(&self, collection: &str, row_index: usize) -> TransportResult<()>;

    /// Backend-internal identifier of a table, when the backend has one
    ///
    /// Some backends address structural edits by an internal id rather than by
    /// name. Returns `Ok(None)` if no table has this name.
    async fn collection_physical_id(&self, collection: &str) -> TransportResult<Option<i64>>;

    /// Names of every table on the backend
    async fn list_collections(&self) -> TransportResult<Vec<String>>;

    /// Create an empty table
    async fn create_collection(&self, name: &str) -> TransportResult<()>;
}
