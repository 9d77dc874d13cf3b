use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Boxed cause carried by transport failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, Error>;

/// Error number the server uses for "document not found"
pub const ERROR_DOCUMENT_NOT_FOUND: i64 = 1202;
/// Error number for a unique constraint violation
pub const ERROR_UNIQUE_CONSTRAINT_VIOLATED: i64 = 1210;
/// Error number for a revision conflict
pub const ERROR_CONFLICT: i64 = 1200;

/// Errors surfaced by the driver.
///
/// `Endpoint` and `Response` only add diagnostic context (which endpoint,
/// which attempt). Use [`Error::kind`] to classify an error regardless of
/// how it was wrapped.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("operation canceled")]
    Canceled,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport failure: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("endpoint {endpoint} failed on attempt {attempt}: {source}")]
    Endpoint {
        endpoint: usize,
        attempt: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("response error from endpoint {endpoint} on attempt {attempt}: {source}")]
    Response {
        endpoint: usize,
        attempt: usize,
        #[source]
        source: Box<Error>,
    },
}

/// Classification of an [`Error`], independent of context wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Conflict,
    /// Any other application error returned by the server
    Server,
    Canceled,
    /// Failure before the request reached the server; eligible for failover
    Transport,
    /// Non-application failure after the request was written
    Response,
    Decode,
}

impl Error {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    pub fn transport(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::Transport {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::Server(err) => {
                if err.is_not_found() {
                    ErrorKind::NotFound
                } else if err.is_conflict() {
                    ErrorKind::Conflict
                } else {
                    ErrorKind::Server
                }
            }
            Error::Canceled => ErrorKind::Canceled,
            Error::Timeout(_) | Error::Transport { .. } => ErrorKind::Transport,
            Error::Decode(_) | Error::InvalidResponse(_) => ErrorKind::Decode,
            Error::Endpoint { source, .. } => source.kind(),
            Error::Response { .. } => ErrorKind::Response,
        }
    }

    /// The decoded server error, if this error carries one.
    pub fn server_error(&self) -> Option<&ServerError> {
        match self {
            Error::Server(err) => Some(err),
            Error::Endpoint { source, .. } | Error::Response { source, .. } => {
                source.server_error()
            }
            _ => None,
        }
    }

    pub fn is_invalid_argument(&self) -> bool {
        self.kind() == ErrorKind::InvalidArgument
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    pub fn is_canceled(&self) -> bool {
        self.kind() == ErrorKind::Canceled
    }

    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }
}

/// Application error decoded from a server response body
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerError {
    #[serde(default)]
    pub code: u16,
    #[serde(rename = "errorNum", default)]
    pub error_num: i64,
    #[serde(rename = "errorMessage", default)]
    pub message: String,
}

impl ServerError {
    pub fn new(code: u16, error_num: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            error_num,
            message: message.into(),
        }
    }

    /// Decode an error body, falling back to the bare status code when the
    /// body is not an error object.
    pub fn from_body(status: u16, body: &[u8]) -> Self {
        match serde_json::from_slice::<ServerError>(body) {
            Ok(mut err) => {
                if err.code == 0 {
                    err.code = status;
                }
                if err.message.is_empty() {
                    err.message = default_message(err.code).to_string();
                }
                err
            }
            Err(_) => ServerError::new(status, 0, default_message(status)),
        }
    }

    /// Decode an error from an already parsed array item. The item's status
    /// wins over any `code` field.
    pub(crate) fn from_value(status: u16, value: &serde_json::Value) -> Self {
        let mut err = ServerError::deserialize(value)
            .unwrap_or_else(|_| ServerError::new(status, 0, ""));
        err.code = status;
        if err.message.is_empty() {
            err.message = default_message(status).to_string();
        }
        err
    }

    pub fn is_not_found(&self) -> bool {
        self.code == 404
    }

    /// Unique constraint collision (409) or revision mismatch (412)
    pub fn is_conflict(&self) -> bool {
        self.code == 409 || self.code == 412
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.error_num != 0 {
            write!(f, "server error {} ({}): {}", self.code, self.error_num, self.message)
        } else {
            write!(f, "server error {}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for ServerError {}

fn default_message(status: u16) -> &'static str {
    match status {
        400 => "bad request",
        401 => "unauthorized",
        403 => "forbidden",
        404 => "not found",
        409 => "conflict",
        412 => "precondition failed",
        500 => "internal server error",
        503 => "service unavailable",
        _ => "invalid status",
    }
}
