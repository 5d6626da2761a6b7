#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # duckgate
//!
//! duckgate is a small HTTP gateway in front of a single embedded DuckDB
//! instance. Clients send SQL over HTTP and receive either a JSON array of
//! row objects or an Arrow IPC stream.
//!
//! ## Features
//!
//! - **Lazy engine setup**: extensions, caches, object-storage credentials and
//!   an optional Iceberg REST catalog are configured on the first query,
//!   exactly once, and retried on failure
//! - **Statement filter**: configuration changes, extension management,
//!   pragmas and secret management are blocked and answered with a
//!   descriptive row
//! - **Arrow streaming**: `/streaming-query` streams record batches with
//!   back-pressure and stops the engine work when the client disconnects
//! - **Optional auth**: HTTP Basic and/or a bearer token on the query routes
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with defaults (listens on 0.0.0.0:3000)
//! $ ./duckgate
//!
//! # Query
//! $ curl -X POST localhost:3000/query -d '{"query": "SELECT 42 AS answer"}'
//! [{"answer":42}]
//!
//! # Stream as Arrow IPC
//! $ curl -X POST localhost:3000/streaming-query \
//!     -d '{"query": "SELECT * FROM range(1000000)"}' -o result.arrows
//! ```
//!
//! ## Library Usage
//!
//! The router can be embedded in another axum application:
//!
//! ```no_run
//! use std::sync::Arc;
//! use duckgate::config::AuthConfig;
//! use duckgate::server::build_router;
//! use duckgate_engine::{EngineSession, SessionConfig};
//!
//! # fn main() -> duckgate::Result<()> {
//! let session = Arc::new(EngineSession::open(SessionConfig::offline("/tmp"))?);
//! let app: axum::Router = build_router(session, AuthConfig::default());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod server;

pub use config::{GatewayArgs, GatewayConfig};
pub use error::{GatewayError, Result};
pub use server::{build_router, run_server};
