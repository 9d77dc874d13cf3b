//! FerroDoc Core Library
//!
//! This crate provides the transport-agnostic core of the FerroDoc driver:
//! - Connection contract (requests, responses, per-item response elements)
//! - Failover connection over a pool of endpoints
//! - Batch codec for singular and batched document payloads
//! - Document operations on collections
//! - Database and collection administration
//! - Per-call request options and caller context

pub mod codec;
pub mod collection;
pub mod config;
pub mod connection;
pub mod context;
pub mod database;
pub mod error;
pub mod failover;
pub mod models;
pub mod options;

// Re-export commonly used types
pub use collection::{validate_key, Collection};
pub use config::ConnectionConfig;
pub use connection::{Connection, Method, Request, Response, ResponseElement};
pub use context::Context;
pub use database::Database;
pub use error::{Error, ErrorKind, Result, ServerError};
pub use failover::FailoverConnection;
pub use models::*;
pub use options::RequestOptions;
