//! Database handle and per-collection facades
//!
//! A [`Database`] starts unconnected and gets its store exactly once through
//! [`Database::connect`]. Facades created before that fail with
//! [`Error::NotInitialized`] instead of panicking, so a handle can be built
//! during startup and shared before the backend is reachable.

use crate::core::{Document, Error, Result};
use crate::storage::filter::Filter;
use crate::storage::store::{DocumentStore, StoreOptions};
use crate::storage::transport::Transport;
use once_cell::sync::OnceCell;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// The application's collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionName {
    /// Registered accounts
    Users,
    /// Published events
    Events,
    /// Volunteer sign-ups
    Volunteers,
    /// Event registrations
    Registrations,
    /// Committee members
    Committee,
    /// Membership applications
    Applications,
}

impl CollectionName {
    /// Every collection, in setup order
    pub const ALL: [CollectionName; 6] = [
        CollectionName::Users,
        CollectionName::Events,
        CollectionName::Volunteers,
        CollectionName::Registrations,
        CollectionName::Committee,
        CollectionName::Applications,
    ];

    /// Sheet name backing the collection
    pub const fn as_str(&self) -> &'static str {
        match self {
            CollectionName::Users => "Users",
            CollectionName::Events => "Events",
            CollectionName::Volunteers => "Volunteers",
            CollectionName::Registrations => "Registrations",
            CollectionName::Committee => "Committee",
            CollectionName::Applications => "Applications",
        }
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::invalid_input(format!("unknown collection '{}'", s)))
    }
}

/// Shared handle to the document store
#[derive(Clone, Default)]
pub struct Database {
    store: Arc<OnceCell<Arc<DocumentStore>>>,
}

impl Database {
    /// Create an unconnected handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a handle that is already connected
    pub fn connected(transport: Arc<dyn Transport>, options: StoreOptions) -> Self {
        let db = Self::new();
        // A fresh cell cannot already be set
        let _ = db.store.set(Arc::new(DocumentStore::with_options(transport, options)));
        db
    }

    /// Install the store. Fails with [`Error::AlreadyInitialized`] on a second call.
    pub fn connect(&self, transport: Arc<dyn Transport>, options: StoreOptions) -> Result<()> {
        self.store
            .set(Arc::new(DocumentStore::with_options(transport, options)))
            .map_err(|_| Error::AlreadyInitialized)?;
        info!(
            serialize_writes = options.serialize_writes,
            unique_ids = options.unique_ids,
            "database connected"
        );
        Ok(())
    }

    /// Whether [`connect`](Self::connect) has run
    pub fn is_connected(&self) -> bool {
        self.store.get().is_some()
    }

    /// The store, or [`Error::NotInitialized`]
    pub fn store(&self) -> Result<&Arc<DocumentStore>> {
        self.store.get().ok_or(Error::NotInitialized)
    }

    /// Facade bound to `name`
    pub fn collection(&self, name: impl Into<String>) -> Collection {
        Collection {
            db: self.clone(),
            name: name.into(),
        }
    }

    /// One facade per application collection
    pub fn models(&self) -> Models {
        Models {
            users: self.collection(CollectionName::Users.as_str()),
            events: self.collection(CollectionName::Events.as_str()),
            volunteers: self.collection(CollectionName::Volunteers.as_str()),
            registrations: self.collection(CollectionName::Registrations.as_str()),
            committee: self.collection(CollectionName::Committee.as_str()),
            applications: self.collection(CollectionName::Applications.as_str()),
        }
    }

    /// Create any of `names` the backend does not have yet. Returns the
    /// names that were created.
    pub async fn ensure_collections<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<String>> {
        let transport = self.store()?.transport();
        let existing = transport
            .list_collections()
            .await
            .map_err(|e| Error::transport("*", e))?;

        let mut created = Vec::new();
        for name in names.iter().map(AsRef::as_ref) {
            if existing.iter().any(|e| e == name) {
                continue;
            }
            transport
                .create_collection(name)
                .await
                .map_err(|e| Error::transport(name, e))?;
            info!(collection = name, "created collection");
            created.push(name.to_string());
        }
        Ok(created)
    }

    /// Round trip to the backend. Returns the collections it holds.
    pub async fn ping(&self) -> Result<Vec<String>> {
        self.store()?
            .transport()
            .list_collections()
            .await
            .map_err(|e| Error::transport("*", e))
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Store operations with the collection name bound
#[derive(Clone, Debug)]
pub struct Collection {
    db: Database,
    name: String,
}

impl Collection {
    /// Collection name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Documents matching `filter`
    pub async fn find(&self, filter: &Filter) -> Result<Vec<Document>> {
        self.db.store()?.find(&self.name, filter).await
    }

    /// Every document
    pub async fn find_all(&self) -> Result<Vec<Document>> {
        self.db.store()?.find_all(&self.name).await
    }

    /// First match in row order
    pub async fn find_one(&self, filter: &Filter) -> Result<Option<Document>> {
        self.db.store()?.find_one(&self.name, filter).await
    }

    /// Document with this `_id`
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Document>> {
        self.db.store()?.find_by_id(&self.name, id).await
    }

    /// Insert a document
    pub async fn create(&self, document: Document) -> Result<Document> {
        self.db.store()?.insert_one(&self.name, document).await
    }

    /// Merge `update` into the document with this `_id`
    pub async fn find_by_id_and_update(&self, id: &str, update: Document) -> Result<Option<Document>> {
        self.db
            .store()?
            .update_one(&self.name, &Filter::by_id(id), update)
            .await
    }

    /// Merge `update` into the first match
    pub async fn find_one_and_update(
        &self,
        filter: &Filter,
        update: Document,
    ) -> Result<Option<Document>> {
        self.db.store()?.update_one(&self.name, filter, update).await
    }

    /// Delete the document with this `_id`
    pub async fn find_by_id_and_delete(&self, id: &str) -> Result<Option<Document>> {
        self.db
            .store()?
            .delete_one(&self.name, &Filter::by_id(id))
            .await
    }

    /// Delete the first match
    pub async fn delete_one(&self, filter: &Filter) -> Result<Option<Document>> {
        self.db.store()?.delete_one(&self.name, filter).await
    }

    /// Number of matches
    pub async fn count_documents(&self, filter: &Filter) -> Result<usize> {
        self.db.store()?.count_documents(&self.name, filter).await
    }

    /// Current header row
    pub async fn headers(&self) -> Result<Vec<String>> {
        self.db.store()?.headers(&self.name).await
    }
}

/// Facades for every application collection
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct Models {
    pub users: Collection,
    pub events: Collection,
    pub volunteers: Collection,
    pub registrations: Collection,
    pub committee: Collection,
    pub applications: Collection,
}
