//! Connection contract shared by transports and the failover connection.
//!
//! A [`Connection`] builds [`Request`]s and executes them, returning a
//! [`Response`]. Response bodies are JSON; array responses split into
//! [`ResponseElement`]s that each carry their own status.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::context::Context;
use crate::error::{
    Error, Result, ServerError, ERROR_CONFLICT, ERROR_DOCUMENT_NOT_FOUND,
    ERROR_UNIQUE_CONSTRAINT_VIOLATED,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outgoing request.
///
/// The `written` flag is shared so the caller can still read it after an
/// attempt future has been dropped (e.g. by a per-attempt timeout).
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<Value>,
    written: Arc<AtomicBool>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            written: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set a query argument, replacing an earlier value for the same key
    pub fn set_query(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        match self.query.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.query.push((key, value)),
        }
        self
    }

    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
        {
            Some(entry) => entry.1 = value,
            None => self.headers.push((key, value)),
        }
        self
    }

    pub fn set_body(&mut self, body: Value) -> &mut Self {
        self.body = Some(body);
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Called by transports once any byte of the request may have reached
    /// the server.
    pub fn mark_written(&self) {
        self.written.store(true, Ordering::SeqCst);
    }

    /// Undo [`Request::mark_written`] when the transport knows for certain
    /// that nothing was sent (e.g. the connection was never established).
    pub fn clear_written(&self) {
        self.written.store(false, Ordering::SeqCst);
    }

    pub fn is_written(&self) -> bool {
        self.written.load(Ordering::SeqCst)
    }
}

/// Raw response as returned by a transport
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    body: Bytes,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Ok when the status is one of `accepted`, otherwise the decoded
    /// server error.
    pub fn check_status(&self, accepted: &[u16]) -> Result<()> {
        if accepted.contains(&self.status) {
            return Ok(());
        }
        Err(Error::Server(ServerError::from_body(self.status, &self.body)))
    }

    pub fn parse_body<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Parse a single-object body
    pub fn into_element(self) -> Result<ResponseElement> {
        let value: Value = serde_json::from_slice(&self.body)?;
        Ok(ResponseElement {
            status: self.status,
            value,
        })
    }

    /// Parse an array body into per-item elements, in order
    pub fn into_elements(self) -> Result<Vec<ResponseElement>> {
        let value: Value = serde_json::from_slice(&self.body)?;
        match value {
            Value::Array(items) => Ok(items.into_iter().map(ResponseElement::from_value).collect()),
            other => Err(Error::InvalidResponse(format!(
                "expected an array body, got {}",
                value_kind(&other)
            ))),
        }
    }
}

/// One parsed response object, either the whole body or an array item
#[derive(Debug, Clone)]
pub struct ResponseElement {
    status: u16,
    value: Value,
}

impl ResponseElement {
    /// Wrap an array item. Items flagged `"error": true` take their status
    /// from `code`, then from `errorNum`, then fall back to 400.
    pub fn from_value(value: Value) -> Self {
        let status = element_status(&value);
        Self { status, value }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn check_status(&self, accepted: &[u16]) -> Result<()> {
        if accepted.contains(&self.status) {
            return Ok(());
        }
        Err(Error::Server(ServerError::from_value(self.status, &self.value)))
    }

    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(&self.value)?)
    }

    /// Parse a named sub-field (e.g. `old`, `new`)
    pub fn parse_field<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        match self.value.get(name) {
            Some(field) => Ok(T::deserialize(field)?),
            None => Err(Error::InvalidResponse(format!("missing field '{}'", name))),
        }
    }
}

fn element_status(value: &Value) -> u16 {
    let is_error = value.get("error").and_then(Value::as_bool).unwrap_or(false);
    if !is_error {
        return 200;
    }
    if let Some(code) = value
        .get("code")
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok())
    {
        return code;
    }
    match value.get("errorNum").and_then(Value::as_i64) {
        Some(ERROR_DOCUMENT_NOT_FOUND) => 404,
        Some(ERROR_UNIQUE_CONSTRAINT_VIOLATED) => 409,
        Some(ERROR_CONFLICT) => 412,
        _ => 400,
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A connection to one or more database servers.
#[async_trait::async_trait]
pub trait Connection: Send + Sync {
    /// Create a new request with the given method and path
    fn new_request(&self, method: Method, path: &str) -> Result<Request>;

    /// Execute a request, returning its response
    async fn execute(&self, ctx: &Context, req: &Request) -> Result<Response>;
}

/// Join path segments with single slashes
pub fn join_path(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|s| s.trim_matches('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
