//! Document store over a tabular transport
//!
//! Every operation is a full scan of the collection: the backend has no index,
//! so `find`, `update_one` and friends read every row, decode it and filter in
//! process. That is fine for collections of a few hundred rows and nothing
//! more. Row locators come from that scan and are used for exactly one write;
//! nothing is cached between calls.
//!
//! With [`StoreOptions::serialize_writes`] on, mutating operations on one
//! collection run one at a time, so a delete can never shift rows under an
//! update that has already picked its target row. Reads never take the lock.

use crate::core::config::StoreConfig;
use crate::core::{
    Document, Error, FieldValue, MonotonicClock, Result, CREATED_AT_FIELD, ID_FIELD,
    UPDATED_AT_FIELD,
};
use crate::storage::codec;
use crate::storage::filter::Filter;
use crate::storage::locks::CollectionLocks;
use crate::storage::registry::SchemaRegistry;
use crate::storage::transport::Transport;
use crate::system::metrics::{self, Timer};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

/// Regeneration attempts before giving up on a unique generated `_id`
const MAX_ID_ATTEMPTS: usize = 8;

/// Store behaviour switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Serialize mutating operations per collection
    pub serialize_writes: bool,
    /// Check `_id` uniqueness against the collection on insert
    pub unique_ids: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            serialize_writes: true,
            unique_ids: true,
        }
    }
}

impl From<&StoreConfig> for StoreOptions {
    fn from(config: &StoreConfig) -> Self {
        Self {
            serialize_writes: config.serialize_writes,
            unique_ids: config.unique_ids,
        }
    }
}

/// A decoded document and the 1-based sheet row it was read from
#[derive(Debug, Clone)]
struct Located {
    row: usize,
    document: Document,
}

/// One full read of a collection
#[derive(Debug, Default)]
struct Snapshot {
    headers: Vec<String>,
    documents: Vec<Located>,
}

impl Snapshot {
    fn first_match(&self, filter: &Filter) -> Option<&Located> {
        self.documents.iter().find(|d| filter.matches(&d.document))
    }

    fn matching(self, filter: &Filter) -> Vec<Document> {
        self.documents
            .into_iter()
            .filter(|d| filter.matches(&d.document))
            .map(|d| d.document)
            .collect()
    }

    fn ids(&self) -> HashSet<String> {
        self.documents
            .iter()
            .filter_map(|d| d.document.id().map(str::to_string))
            .collect()
    }
}

/// Document-store emulation over a [`Transport`]
pub struct DocumentStore {
    transport: Arc<dyn Transport>,
    registry: SchemaRegistry,
    clock: MonotonicClock,
    write_locks: CollectionLocks,
    options: StoreOptions,
}

impl DocumentStore {
    /// Create a store with default options
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_options(transport, StoreOptions::default())
    }

    /// Create a store with explicit options
    pub fn with_options(transport: Arc<dyn Transport>, options: StoreOptions) -> Self {
        Self {
            registry: SchemaRegistry::new(transport.clone()),
            transport,
            clock: MonotonicClock::new(),
            write_locks: CollectionLocks::new(),
            options,
        }
    }

    /// Options in effect
    pub fn options(&self) -> StoreOptions {
        self.options
    }

    /// Underlying transport handle
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Current header row of a collection
    pub async fn headers(&self, collection: &str) -> Result<Vec<String>> {
        self.registry.get_headers(collection).await
    }

    /// All documents matching `filter`, in row order
    pub async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>> {
        let timer = Timer::start("find");
        let result = self
            .scan(collection)
            .await
            .map(|snapshot| snapshot.matching(filter));
        if let Ok(documents) = &result {
            debug!(collection, %filter, matched = documents.len(), "find");
        }
        finish(timer, collection, &result);
        result
    }

    /// Every document in the collection
    pub async fn find_all(&self, collection: &str) -> Result<Vec<Document>> {
        self.find(collection, &Filter::all()).await
    }

    /// First document matching `filter` in row order
    pub async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>> {
        let timer = Timer::start("find_one");
        let result = self
            .scan(collection)
            .await
            .map(|snapshot| snapshot.first_match(filter).map(|d| d.document.clone()));
        finish(timer, collection, &result);
        result
    }

    /// Document with the given `_id`
    pub async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.find_one(collection, &Filter::by_id(id)).await
    }

    /// Number of documents matching `filter`
    pub async fn count_documents(&self, collection: &str, filter: &Filter) -> Result<usize> {
        let timer = Timer::start("count_documents");
        let result = self
            .scan(collection)
            .await
            .map(|snapshot| snapshot.matching(filter).len());
        finish(timer, collection, &result);
        result
    }

    /// Insert a document, generating `_id` when absent and stamping
    /// `createdAt`/`updatedAt`. Returns the stored document.
    pub async fn insert_one(&self, collection: &str, document: Document) -> Result<Document> {
        let timer = Timer::start("insert_one");
        let result = self.insert_inner(collection, document).await;
        finish(timer, collection, &result);
        result
    }

    /// Merge `update` into the first document matching `filter` and stamp
    /// `updatedAt`. Returns the merged document, or `None` without writing
    /// when nothing matches.
    pub async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: Document,
    ) -> Result<Option<Document>> {
        let timer = Timer::start("update_one");
        let result = self.update_inner(collection, filter, update).await;
        finish(timer, collection, &result);
        result
    }

    /// Physically delete the row of the first document matching `filter`.
    /// Returns the deleted document.
    pub async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>> {
        let timer = Timer::start("delete_one");
        let result = self.delete_inner(collection, filter).await;
        finish(timer, collection, &result);
        result
    }

    async fn insert_inner(&self, collection: &str, mut document: Document) -> Result<Document> {
        check_field_names(collection, &document)?;
        let _guard = self.write_guard(collection).await;

        let (headers, existing_ids) = if self.options.unique_ids {
            let snapshot = self.scan(collection).await?;
            let ids = snapshot.ids();
            (snapshot.headers, Some(ids))
        } else {
            (self.registry.get_headers(collection).await?, None)
        };

        let id = match document.id() {
            Some(id) => {
                if existing_ids.as_ref().map_or(false, |ids| ids.contains(id)) {
                    return Err(Error::DuplicateId {
                        collection: collection.to_string(),
                        id: id.to_string(),
                    });
                }
                id.to_string()
            }
            None => self.fresh_id(collection, existing_ids.as_ref())?,
        };
        let stamp = self.clock.timestamp();
        document.insert(ID_FIELD, id.as_str());
        document.insert(CREATED_AT_FIELD, stamp.as_str());
        document.insert(UPDATED_AT_FIELD, stamp);

        let headers = self.ensure_headers(collection, headers, &document).await?;
        let row = codec::encode(&headers, &document);
        self.transport
            .append_row(collection, &row)
            .await
            .map_err(|e| Error::transport(collection, e))?;

        info!(collection, id = %id, "inserted document");
        Ok(document)
    }

    async fn update_inner(
        &self,
        collection: &str,
        filter: &Filter,
        mut update: Document,
    ) -> Result<Option<Document>> {
        check_field_names(collection, &update)?;
        let _guard = self.write_guard(collection).await;

        let snapshot = self.scan(collection).await?;
        let Some(target) = snapshot.first_match(filter) else {
            debug!(collection, %filter, "update matched nothing");
            return Ok(None);
        };

        if let Some(new_id) = update.remove(ID_FIELD) {
            let current = target.document.get_str(ID_FIELD).unwrap_or_default();
            if new_id.to_cell() != current {
                return Err(Error::invalid_input(format!(
                    "cannot change {} of '{}' in {}",
                    ID_FIELD, current, collection
                )));
            }
        }

        let row = target.row;
        let mut merged = target.document.clone();
        merged.merge(&update);
        merged.insert(UPDATED_AT_FIELD, self.clock.timestamp());

        let headers = self.ensure_headers(collection, snapshot.headers, &merged).await?;
        self.transport
            .overwrite_row(collection, row, &codec::encode(&headers, &merged))
            .await
            .map_err(|e| Error::transport(collection, e))?;

        info!(collection, row, id = merged.id().unwrap_or_default(), "updated document");
        Ok(Some(merged))
    }

    async fn delete_inner(&self, collection: &str, filter: &Filter) -> Result<Option<Document>> {
        let _guard = self.write_guard(collection).await;

        let snapshot = self.scan(collection).await?;
        let Some(target) = snapshot.first_match(filter) else {
            debug!(collection, %filter, "delete matched nothing");
            return Ok(None);
        };

        self.transport
            .delete_row(collection, target.row)
            .await
            .map_err(|e| Error::transport(collection, e))?;

        info!(
            collection,
            row = target.row,
            id = target.document.id().unwrap_or_default(),
            "deleted document"
        );
        Ok(Some(target.document.clone()))
    }

    async fn scan(&self, collection: &str) -> Result<Snapshot> {
        let rows = self
            .transport
            .read_all_rows(collection)
            .await
            .map_err(|e| Error::transport(collection, e))?;

        let mut rows = rows.into_iter();
        let headers = rows.next().unwrap_or_default();
        if headers.is_empty() {
            return Ok(Snapshot::default());
        }

        let documents = rows
            .enumerate()
            .filter(|(_, cells)| cells.iter().any(|c| !c.is_empty()))
            .map(|(i, cells)| Located {
                // Header is row 1, first data row is row 2
                row: i + 2,
                document: codec::decode(&headers, &cells),
            })
            .collect();

        Ok(Snapshot { headers, documents })
    }

    async fn ensure_headers(
        &self,
        collection: &str,
        headers: Vec<String>,
        document: &Document,
    ) -> Result<Vec<String>> {
        let missing = codec::missing_fields(&headers, document);
        if missing.is_empty() {
            return Ok(headers);
        }
        self.registry
            .grow_headers_from(collection, &headers, &missing)
            .await
    }

    fn fresh_id(&self, collection: &str, existing: Option<&HashSet<String>>) -> Result<String> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = self.clock.generate_id();
            match existing {
                Some(ids) if ids.contains(&id) => {
                    warn!(collection, id = %id, "generated id collided, regenerating")
                }
                _ => return Ok(id),
            }
        }
        Err(Error::invalid_input(format!(
            "could not generate a unique {} for {}",
            ID_FIELD, collection
        )))
    }

    async fn write_guard(&self, collection: &str) -> Option<OwnedMutexGuard<()>> {
        if self.options.serialize_writes {
            Some(self.write_locks.lock(collection).await)
        } else {
            None
        }
    }
}

/// A blank header cell is indistinguishable from a missing one once the
/// backend trims trailing empty cells, so blank field names are refused.
fn check_field_names(collection: &str, document: &Document) -> Result<()> {
    if document.keys().any(|k| k.trim().is_empty()) {
        return Err(Error::invalid_input(format!(
            "blank field name in document for {}",
            collection
        )));
    }
    Ok(())
}

fn finish<T>(timer: Timer, collection: &str, result: &Result<T>) {
    match result {
        Ok(_) => timer.finish(collection, "ok"),
        Err(e) => {
            if let Error::Transport { source, .. } = e {
                metrics::record_transport_error(collection, source.label());
            }
            warn!(collection, kind = e.kind().as_str(), error = %e, "store operation failed");
            timer.finish(collection, e.kind().as_str());
        }
    }
}

/// Convenience for building an update or insert from pairs
pub fn doc<K, V, I>(pairs: I) -> Document
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<FieldValue>,
{
    pairs.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ErrorKind, TransportError};
    use crate::storage::transport::TransportResult;
    use crate::storage::MemoryTransport;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn store_with(options: StoreOptions) -> (Arc<DocumentStore>, Arc<MemoryTransport>) {
        let transport = Arc::new(MemoryTransport::with_collections([
            "Volunteers",
            "Events",
            "Users",
        ]));
        (
            Arc::new(DocumentStore::with_options(transport.clone(), options)),
            transport,
        )
    }

    fn store() -> (Arc<DocumentStore>, Arc<MemoryTransport>) {
        store_with(StoreOptions::default())
    }

    #[tokio::test]
    async fn insert_generates_id_and_grows_headers_in_first_seen_order() {
        let (store, _) = store();
        let created = store
            .insert_one("Volunteers", doc([("name", "David"), ("email", "d@x.com")]))
            .await
            .unwrap();

        assert!(created.id().is_some());
        assert_eq!(created.created_at(), created.updated_at());
        assert_eq!(
            store.headers("Volunteers").await.unwrap(),
            strings(&["name", "email", "_id", "createdAt", "updatedAt"])
        );
    }

    #[tokio::test]
    async fn inserted_document_reads_back_as_strings() {
        let (store, _) = store();
        let created = store
            .insert_one(
                "Events",
                doc([
                    ("title", FieldValue::from("Gala")),
                    ("fee", FieldValue::from(150)),
                    ("open", FieldValue::from(true)),
                ]),
            )
            .await
            .unwrap();

        let found = store
            .find_by_id("Events", created.id().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.get("fee"), Some(&FieldValue::String("150".into())));
        assert_eq!(found.get_i64("fee"), Some(150));
        assert_eq!(found.get_bool("open"), Some(true));
        assert_eq!(found.id(), created.id());
    }

    #[tokio::test]
    async fn update_merges_and_refreshes_updated_at() {
        let (store, _) = store();
        let created = store
            .insert_one("Volunteers", doc([("name", "David"), ("email", "d@x.com")]))
            .await
            .unwrap();
        let id = created.id().unwrap().to_string();

        let merged = store
            .update_one(
                "Volunteers",
                &Filter::by_id(&id),
                doc([("applicationStatus", "Accepted")]),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(merged.get_str("name"), Some("David"));
        assert_eq!(merged.get_str("email"), Some("d@x.com"));
        assert_eq!(merged.get_str("applicationStatus"), Some("Accepted"));
        assert!(merged.updated_at().unwrap() > created.updated_at().unwrap());
        assert_eq!(merged.created_at(), created.created_at());

        let stored = store.find_by_id("Volunteers", &id).await.unwrap().unwrap();
        assert_eq!(stored.get_str("applicationStatus"), Some("Accepted"));
        assert_eq!(
            store.headers("Volunteers").await.unwrap().last().map(String::as_str),
            Some("applicationStatus")
        );
    }

    #[tokio::test]
    async fn update_overwrites_existing_field() {
        let (store, _) = store();
        store
            .insert_one("Users", doc([("a", "1"), ("b", "2")]))
            .await
            .unwrap();

        let merged = store
            .update_one("Users", &Filter::all().eq("a", "1"), doc([("b", 3)]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(merged.get_str("a"), Some("1"));
        assert_eq!(merged.get_i64("b"), Some(3));
        assert_eq!(store.count_documents("Users", &Filter::all().eq("b", "3")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_without_match_writes_nothing() {
        let (store, transport) = store();
        store.insert_one("Users", doc([("name", "a")])).await.unwrap();
        let before = transport.rows("Users");

        let result = store
            .update_one("Users", &Filter::by_id("missing"), doc([("name", "b")]))
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(transport.rows("Users"), before);
    }

    #[tokio::test]
    async fn update_cannot_change_id() {
        let (store, _) = store();
        let created = store.insert_one("Users", doc([("name", "a")])).await.unwrap();
        let id = created.id().unwrap();

        let err = store
            .update_one("Users", &Filter::by_id(id), doc([("_id", "other")]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        // Restating the same id is harmless
        assert!(store
            .update_one("Users", &Filter::by_id(id), doc([("_id", id), ("name", "b")]))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn blank_field_names_are_rejected() {
        let (store, transport) = store();
        let err = store
            .insert_one("Users", doc([("name", "a"), ("", "secret")]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(transport.rows("Users"), Some(Vec::new()));

        let created = store.insert_one("Users", doc([("name", "a")])).await.unwrap();
        let headers = store.headers("Users").await.unwrap();
        let rows = transport.rows("Users");

        for field in ["", "  "] {
            let err = store
                .update_one("Users", &Filter::by_id(created.id().unwrap()), doc([(field, "secret")]))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
        }
        assert_eq!(store.headers("Users").await.unwrap(), headers);
        assert_eq!(transport.rows("Users"), rows);

        // A later field lands in its own column
        store.insert_one("Users", doc([("phone", "555")])).await.unwrap();
        let reread = store.find_by_id("Users", created.id().unwrap()).await.unwrap().unwrap();
        assert_eq!(reread.get_str("phone"), Some(""));
    }

    #[tokio::test]
    async fn delete_removes_exactly_one() {
        let (store, _) = store();
        let mut ids = Vec::new();
        for name in ["a", "b", "c"] {
            let created = store.insert_one("Volunteers", doc([("name", name)])).await.unwrap();
            ids.push(created.id().unwrap().to_string());
        }

        let deleted = store
            .delete_one("Volunteers", &Filter::by_id(&ids[1]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(deleted.get_str("name"), Some("b"));
        assert_eq!(store.count_documents("Volunteers", &Filter::all()).await.unwrap(), 2);
        assert!(store.find_by_id("Volunteers", &ids[1]).await.unwrap().is_none());
        assert!(store.find_by_id("Volunteers", &ids[2]).await.unwrap().is_some());

        assert!(store
            .delete_one("Volunteers", &Filter::by_id(&ids[1]))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn count_by_category() {
        let (store, _) = store();
        for category in ["Dance", "Music", "Dance", "Music", "Dance"] {
            store
                .insert_one("Events", doc([("category", category)]))
                .await
                .unwrap();
        }
        let dance = Filter::from_json(&json!({ "category": "Dance" })).unwrap();
        assert_eq!(store.count_documents("Events", &dance).await.unwrap(), 3);
        assert_eq!(store.find_all("Events").await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn pattern_and_equality_filters() {
        let (store, _) = store();
        for (name, status) in [("Alice", "Pending"), ("ALICIA", "pending"), ("Bob", "Pending")] {
            store
                .insert_one("Users", doc([("name", name), ("status", status)]))
                .await
                .unwrap();
        }

        let pending = store
            .find("Users", &Filter::from_json(&json!({ "status": "Pending" })).unwrap())
            .await
            .unwrap();
        assert_eq!(pending.len(), 2);

        let ali = Filter::from_json(&json!({ "name": { "pattern": "ali", "caseInsensitive": true } }))
            .unwrap();
        let names: Vec<_> = store
            .find("Users", &ali)
            .await
            .unwrap()
            .iter()
            .map(|d| d.get_str("name").unwrap_or_default().to_string())
            .collect();
        assert_eq!(names, vec!["Alice", "ALICIA"]);

        let first = store.find_one("Users", &ali).await.unwrap().unwrap();
        assert_eq!(first.get_str("name"), Some("Alice"));
    }

    #[tokio::test]
    async fn blank_rows_and_empty_tables_yield_nothing() {
        let (store, transport) = store();
        assert!(store.find_all("Users").await.unwrap().is_empty());

        transport.seed(
            "Users",
            vec![
                strings(&["name", "_id"]),
                strings(&["a", "1"]),
                strings(&["", ""]),
                strings(&["b", "2"]),
            ],
        );
        let ids: Vec<_> = store
            .find_all("Users")
            .await
            .unwrap()
            .iter()
            .map(|d| d.id().unwrap_or_default().to_string())
            .collect();
        assert_eq!(ids, vec!["1", "2"]);

        // The blank row still occupies a position
        store.delete_one("Users", &Filter::by_id("2")).await.unwrap();
        assert_eq!(
            transport.rows("Users").unwrap(),
            vec![strings(&["name", "_id"]), strings(&["a", "1"]), strings(&["", ""])]
        );
    }

    #[tokio::test]
    async fn duplicate_supplied_id_is_rejected() {
        let (store, _) = store();
        store
            .insert_one("Users", doc([("_id", "u1"), ("name", "a")]))
            .await
            .unwrap();

        let err = store
            .insert_one("Users", doc([("_id", "u1"), ("name", "b")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateId { ref id, .. } if id == "u1"));
        assert_eq!(err.collection(), Some("Users"));

        let (relaxed, _) = store_with(StoreOptions {
            unique_ids: false,
            ..StoreOptions::default()
        });
        relaxed.insert_one("Users", doc([("_id", "u1")])).await.unwrap();
        relaxed.insert_one("Users", doc([("_id", "u1")])).await.unwrap();
        assert_eq!(
            relaxed.count_documents("Users", &Filter::by_id("u1")).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn transport_errors_propagate_with_collection() {
        let (store, transport) = store();
        transport.set_offline(true);

        for err in [
            store.find_all("Events").await.unwrap_err(),
            store.insert_one("Events", doc([("a", "1")])).await.unwrap_err(),
            store
                .delete_one("Events", &Filter::by_id("x"))
                .await
                .unwrap_err(),
        ] {
            assert!(matches!(
                err,
                Error::Transport { source: TransportError::Unavailable(_), .. }
            ));
            assert_eq!(err.collection(), Some("Events"));
        }

        transport.set_offline(false);
        let err = store.find_all("Nope").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Transport { source: TransportError::UnknownCollection(_), .. }
        ));
    }

    #[tokio::test]
    async fn concurrent_inserts_into_empty_collection_share_one_header_row() {
        for serialize_writes in [true, false] {
            let (store, _) = store_with(StoreOptions {
                serialize_writes,
                unique_ids: true,
            });

            let (a, b) = tokio::join!(
                store.insert_one("Volunteers", doc([("name", "Ann"), ("email", "a@x.com")])),
                store.insert_one("Volunteers", doc([("title", "Lead"), ("name", "Ben")])),
            );
            let (a, b) = (a.unwrap(), b.unwrap());

            let headers = store.headers("Volunteers").await.unwrap();
            let unique: HashSet<_> = headers.iter().collect();
            assert_eq!(unique.len(), headers.len(), "duplicate header in {:?}", headers);
            for field in ["name", "email", "title", "_id", "createdAt", "updatedAt"] {
                assert!(headers.iter().any(|h| h == field), "missing {}", field);
            }

            let ann = store
                .find_by_id("Volunteers", a.id().unwrap())
                .await
                .unwrap()
                .unwrap();
            let ben = store
                .find_by_id("Volunteers", b.id().unwrap())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(ann.get_str("email"), Some("a@x.com"));
            assert_eq!(ben.get_str("title"), Some("Lead"));
            assert_eq!(ben.get_str("name"), Some("Ben"));
        }
    }

    /// Parks `overwrite_row` until released so a delete can run in between
    struct GatedTransport {
        inner: MemoryTransport,
        reached: Notify,
        release: Notify,
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn read_all_rows(&self, c: &str) -> TransportResult<Vec<Vec<String>>> {
            self.inner.read_all_rows(c).await
        }
        async fn read_header_row(&self, c: &str) -> TransportResult<Vec<String>> {
            self.inner.read_header_row(c).await
        }
        async fn write_header_row(&self, c: &str, h: &[String]) -> TransportResult<()> {
            self.inner.write_header_row(c, h).await
        }
        async fn append_row(&self, c: &str, r: &[String]) -> TransportResult<()> {
            self.inner.append_row(c, r).await
        }
        async fn overwrite_row(&self, c: &str, i: usize, r: &[String]) -> TransportResult<()> {
            self.reached.notify_one();
            self.release.notified().await;
            self.inner.overwrite_row(c, i, r).await
        }
        async fn delete_row(&self, c: &str, i: usize) -> TransportResult<()> {
            self.inner.delete_row(c, i).await
        }
        async fn collection_physical_id(&self, c: &str) -> TransportResult<Option<i64>> {
            self.inner.collection_physical_id(c).await
        }
        async fn list_collections(&self) -> TransportResult<Vec<String>> {
            self.inner.list_collections().await
        }
        async fn create_collection(&self, c: &str) -> TransportResult<()> {
            self.inner.create_collection(c).await
        }
    }

    fn gated_store(serialize_writes: bool) -> (Arc<DocumentStore>, Arc<GatedTransport>) {
        let inner = MemoryTransport::new();
        inner.seed(
            "Registrations",
            vec![
                strings(&["_id", "status"]),
                strings(&["a", "new"]),
                strings(&["b", "new"]),
                strings(&["c", "new"]),
            ],
        );
        let transport = Arc::new(GatedTransport {
            inner,
            reached: Notify::new(),
            release: Notify::new(),
        });
        let store = DocumentStore::with_options(
            transport.clone(),
            StoreOptions {
                serialize_writes,
                unique_ids: true,
            },
        );
        (Arc::new(store), transport)
    }

    async fn status_of(store: &DocumentStore, id: &str) -> Option<String> {
        store
            .find_by_id("Registrations", id)
            .await
            .unwrap()
            .map(|d| d.get_str("status").unwrap_or_default().to_string())
    }

    #[tokio::test]
    async fn unserialized_delete_shifts_row_under_pending_update() {
        let (store, transport) = gated_store(false);

        let updater = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .update_one("Registrations", &Filter::by_id("b"), doc([("status", "paid")]))
                    .await
            })
        };
        // Update has resolved row 3 and is about to write it
        transport.reached.notified().await;
        store
            .delete_one("Registrations", &Filter::by_id("a"))
            .await
            .unwrap();
        transport.release.notify_one();
        updater.await.unwrap().unwrap();

        // Row 3 now held "c", which the stale write clobbered with b's data
        assert_eq!(status_of(&store, "b").await.as_deref(), Some("new"));
        assert_eq!(status_of(&store, "c").await, None);
        assert_eq!(
            store.count_documents("Registrations", &Filter::by_id("b")).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn serialized_delete_waits_for_pending_update() {
        let (store, transport) = gated_store(true);

        let updater = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .update_one("Registrations", &Filter::by_id("b"), doc([("status", "paid")]))
                    .await
            })
        };
        transport.reached.notified().await;

        let deleter = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .delete_one("Registrations", &Filter::by_id("a"))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!deleter.is_finished());

        transport.release.notify_one();
        updater.await.unwrap().unwrap();
        deleter.await.unwrap().unwrap();

        assert_eq!(status_of(&store, "a").await, None);
        assert_eq!(status_of(&store, "b").await.as_deref(), Some("paid"));
        assert_eq!(status_of(&store, "c").await.as_deref(), Some("new"));
    }

    fn field_name() -> impl Strategy<Value = String> {
        "[a-z]{1,8}"
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn round_trip_returns_every_field_as_string(
            fields in prop::collection::btree_map(field_name(), "[ -~]{0,12}", 1..6)
        ) {
            let (store, _) = store();
            let found = tokio_test::block_on(async {
                let created = store
                    .insert_one("Users", doc(fields.clone()))
                    .await
                    .unwrap();
                store
                    .find_by_id("Users", created.id().unwrap())
                    .await
                    .unwrap()
            });

            let found = found.unwrap();
            prop_assert_eq!(found.len(), fields.len() + 3);
            for (key, value) in &fields {
                prop_assert_eq!(found.get_str(key), Some(value.as_str()));
            }
            prop_assert!(found.id().is_some());
            prop_assert!(found.created_at().is_some());
        }

        #[test]
        fn headers_only_ever_grow(
            ops in prop::collection::vec(
                (any::<bool>(), prop::collection::btree_map(field_name(), "[a-z]{1,4}", 1..4)),
                1..12,
            )
        ) {
            let (store, _) = store();
            let histories: Vec<Vec<String>> = tokio_test::block_on(async {
                let mut ids = Vec::new();
                let mut history = Vec::new();
                for (is_update, fields) in ops {
                    let fields: BTreeMap<String, String> = fields;
                    let target = if is_update { ids.last().cloned() } else { None };
                    match target {
                        Some(id) => {
                            store
                                .update_one("Events", &Filter::by_id(id), doc(fields))
                                .await
                                .unwrap();
                        }
                        None => {
                            let created = store.insert_one("Events", doc(fields)).await.unwrap();
                            ids.push(created.id().unwrap_or_default().to_string());
                        }
                    }
                    history.push(store.headers("Events").await.unwrap());
                }
                history
            });

            for pair in histories.windows(2) {
                prop_assert!(pair[1].starts_with(&pair[0]), "{:?} -> {:?}", pair[0], pair[1]);
            }
        }
    }
}
