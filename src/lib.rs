//! Sheet Store - a document database over a spreadsheet
//!
//! Sheet Store lets ordinary CRUD code treat a remote spreadsheet as a
//! schema-flexible document store: one sheet per collection, row 1 as the
//! header row, one document per row. It invents document identity, header
//! growth, filtered queries, partial updates and row deletion on top of a grid
//! of strings with no index, query engine or transactions underneath.
#![warn(missing_docs)]

// Core foundational modules
pub mod core;

// Main functional modules
pub mod storage;
pub mod api;
pub mod system;

// Re-export commonly used items for convenience
pub use core::{Config, Document, Error, FieldValue, Result};
pub use storage::{Collection, CollectionName, Database, DocumentStore, Filter, StoreOptions};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize tracing and the metrics registry.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init(logging: &core::config::LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&logging.level))
        .map_err(|e| Error::config(format!("Invalid log level '{}': {}", logging.level, e)))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if logging.format == "full" {
        builder.try_init()
    } else {
        builder.compact().try_init()
    };
    installed.map_err(|e| Error::config(format!("Failed to install tracing subscriber: {}", e)))?;

    tracing::info!("Initializing {} v{}", NAME, VERSION);

    system::metrics::init_registry();

    Ok(())
}
