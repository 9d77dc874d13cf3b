//! FerroDoc Client Library
//!
//! HTTP transport and client facade for document database servers:
//! - `HttpEndpoint`: one server over HTTP/JSON
//! - `Client`: failover over several endpoints, database administration

mod client;
mod http;

pub use client::{Client, ClientConfig};
pub use http::HttpEndpoint;

pub use ferrodoc_core::{
    BatchResponse, Collection, CollectionOptions, Connection, ConnectionConfig, Context,
    Database, DocumentMeta, DocumentResponse, Error, ErrorKind, FailoverConnection,
    RequestOptions, Result, ServerError, StoredDocument,
};
