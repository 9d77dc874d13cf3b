//! Failover connection over a pool of endpoints.
//!
//! Turns one logical request into at most one attempt per endpoint. The
//! overall timeout (caller deadline, or the configured default) is divided by
//! `min(pool size, 3)` to get the per-attempt timeout. Only failures that
//! happened before the request was written move on to the next endpoint;
//! anything after that is returned as-is so mutations are never applied twice.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ConnectionConfig;
use crate::connection::{Connection, Method, Request, Response};
use crate::context::Context;
use crate::error::{Error, Result};

/// Upper bound on how many ways the timeout is split
const MAX_TIMEOUT_DIVIDER: usize = 3;

pub struct FailoverConnection {
    endpoints: Vec<Arc<dyn Connection>>,
    /// Index of the endpoint new requests start at
    current: RwLock<usize>,
    default_timeout: Duration,
}

impl FailoverConnection {
    /// Create a failover connection over existing endpoint connections.
    /// Pool order is failover order.
    pub fn new(config: ConnectionConfig, endpoints: Vec<Arc<dyn Connection>>) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(Error::invalid_argument("must provide at least 1 endpoint"));
        }
        Ok(Self {
            endpoints,
            current: RwLock::new(0),
            default_timeout: config.effective_timeout(),
        })
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Index of the endpoint the next request starts at
    pub fn current_index(&self) -> usize {
        *self.current.read()
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Per-attempt timeout for a call with the given context
    fn attempt_timeout(&self, ctx: &Context) -> Duration {
        let timeout = ctx.remaining().unwrap_or(self.default_timeout);
        let divider = self.endpoints.len().clamp(1, MAX_TIMEOUT_DIVIDER);
        timeout / divider as u32
    }

    fn current_endpoint(&self) -> (usize, Arc<dyn Connection>) {
        let index = *self.current.read();
        (index, self.endpoints[index].clone())
    }

    /// Move past a failed endpoint. The shared cursor only advances if no
    /// other caller moved it meanwhile; either way this call continues with
    /// the endpoint after the one that failed it.
    fn failover_from(&self, failed: usize) -> (usize, Arc<dyn Connection>) {
        let next = (failed + 1) % self.endpoints.len();
        {
            let mut current = self.current.write();
            if *current == failed {
                *current = next;
            }
        }
        (next, self.endpoints[next].clone())
    }
}

#[async_trait::async_trait]
impl Connection for FailoverConnection {
    fn new_request(&self, method: Method, path: &str) -> Result<Request> {
        // All endpoints speak the same protocol.
        self.endpoints[0].new_request(method, path)
    }

    async fn execute(&self, ctx: &Context, req: &Request) -> Result<Response> {
        let attempt_timeout = self.attempt_timeout(ctx);
        let (mut index, mut endpoint) = self.current_endpoint();
        let mut attempt = 1;

        loop {
            debug!(
                endpoint = index,
                attempt,
                timeout_ms = attempt_timeout.as_millis() as u64,
                "{} {}",
                req.method(),
                req.path()
            );

            let attempt_ctx = ctx.child(attempt_timeout);
            let result = tokio::select! {
                biased;
                _ = ctx.canceled() => Err(Error::Canceled),
                res = tokio::time::timeout(attempt_timeout, endpoint.execute(&attempt_ctx, req)) => {
                    match res {
                        Ok(res) => res,
                        Err(_) => Err(Error::Timeout(attempt_timeout)),
                    }
                }
            };

            let err = match result {
                Ok(resp) => return Ok(resp),
                Err(err) => err,
            };

            // The caller's own cancellation is never evidence of a bad endpoint.
            if err.is_canceled() {
                return Err(err);
            }
            if ctx.is_canceled() {
                debug!(endpoint = index, attempt, error = %err, "caller context done");
                return Err(Error::Canceled);
            }

            if req.is_written() {
                if err.server_error().is_some() {
                    return Err(err);
                }
                return Err(Error::Response {
                    endpoint: index,
                    attempt,
                    source: Box::new(err),
                });
            }

            if attempt >= self.endpoints.len() {
                warn!(attempts = attempt, error = %err, "all endpoints failed");
                return Err(Error::Endpoint {
                    endpoint: index,
                    attempt,
                    source: Box::new(err),
                });
            }

            let (next_index, next_endpoint) = self.failover_from(index);
            warn!(
                failed = index,
                next = next_index,
                attempt,
                error = %err,
                "endpoint unavailable, failing over"
            );
            index = next_index;
            endpoint = next_endpoint;
            attempt += 1;
        }
    }
}
