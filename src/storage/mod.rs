//! Storage layer: transports, the row codec, schema registry and document store
//!
//! Layering, bottom up:
//! - [`Transport`]: remote tabular API ([`MemoryTransport`], [`SheetsTransport`])
//! - [`codec`]: row <-> document by header position
//! - [`SchemaRegistry`]: header row reads and append-only growth
//! - [`DocumentStore`]: find/insert/update/delete over full scans
//! - [`Database`] / [`Collection`]: handle and per-collection facades

pub mod auth;
pub mod codec;
pub mod collection;
pub mod factory;
pub mod filter;
pub mod locks;
pub mod memory;
pub mod registry;
pub mod sheets;
pub mod store;
pub mod transport;

pub use auth::{ServiceAccount, ServiceAccountKey, StaticToken, TokenProvider};
pub use collection::{Collection, CollectionName, Database, Models};
pub use factory::create_transport;
pub use filter::{Condition, Filter};
pub use memory::MemoryTransport;
pub use registry::SchemaRegistry;
pub use sheets::SheetsTransport;
pub use store::{doc, DocumentStore, StoreOptions};
pub use transport::{Transport, TransportResult};
