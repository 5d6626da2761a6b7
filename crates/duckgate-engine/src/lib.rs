#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! Embedded DuckDB core for duckgate.
//!
//! This crate isolates the heavy `duckdb` (bundled C++) dependency into its
//! own compilation unit so the HTTP gateway can be rebuilt without
//! recompiling DuckDB.
//!
//! # Overview
//!
//! The gateway fronts exactly one DuckDB database and one connection. Every
//! client statement flows through the same pipeline:
//!
//! 1. [`filter`] classifies the raw statement and swaps blocked statements
//!    for a harmless replacement that describes the rejection.
//! 2. [`session::EngineSession`] lazily runs the trusted setup sequence
//!    (extensions, caches, credentials, external catalog) exactly once.
//! 3. [`executor::QueryExecutor`] materialises the result as JSON rows, or
//!    [`streaming::StreamingExecutor`] produces Arrow IPC stream frames.
//!
//! # Modules
//!
//! - [`config`] -- Session settings consumed by the setup sequence.
//! - [`error`] -- Domain-specific error types.
//! - [`filter`] -- Deny-list statement filter.
//! - [`session`] -- Shared engine session and its one-time initialization.
//! - [`executor`] -- Materialising executor and value conversion.
//! - [`streaming`] -- Arrow IPC frame streaming with cancellation.

pub mod config;
pub mod error;
pub mod executor;
pub mod filter;
pub mod session;
pub mod streaming;

pub use config::{CatalogConfig, Completeness, ExtensionSpec, SessionConfig, StorageCredentials};
pub use error::{EngineError, Result};
pub use executor::{QueryExecutor, Row, RowSet};
pub use filter::{filter, FilterCategory, FilterVerdict};
pub use session::{setup_plan, EngineSession, SetupStep};
pub use streaming::{FrameStream, StreamProgress, StreamingExecutor, ARROW_STREAM_CONTENT_TYPE};
