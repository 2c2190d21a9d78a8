//! Core system types and foundations
//!
//! This module contains the fundamental building blocks of the sheet store:
//! field values and documents, error handling, configuration and the clock
//! that stamps documents.

pub mod clock;
pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used items
pub use clock::MonotonicClock;
pub use config::Config;
pub use error::{Error, ErrorKind, Result, TransportError};
pub use types::{Document, FieldValue, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD};
