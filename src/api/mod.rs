//! # API Module
//!
//! Thin HTTP surface over the document store.
//!
//! ## Endpoints Overview
//!
//! ### System
//! - `GET /api/health-check` - Liveness probe
//! - `GET /api/v1/health` - Backend connectivity check
//! - `GET /metrics` - Prometheus metrics
//!
//! ### Documents
//! - `GET /api/v1/collections/{collection}/documents` - List, query params are equality filters
//! - `POST /api/v1/collections/{collection}/documents` - Create document
//! - `POST /api/v1/collections/{collection}/documents/query` - Find with a JSON filter
//! - `GET /api/v1/collections/{collection}/documents/count` - Count matches
//! - `GET /api/v1/collections/{collection}/documents/{id}` - Get document by ID
//! - `PATCH /api/v1/collections/{collection}/documents/{id}` - Merge fields into a document
//! - `DELETE /api/v1/collections/{collection}/documents/{id}` - Delete document

pub mod handlers;
pub mod server;

pub use handlers::AppState;
pub use server::{create_app, start_server};
