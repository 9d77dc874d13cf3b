use ferrodoc_core::{Connection, Context, Error, Method, Request, Response, Result};
use reqwest::Client as HttpClient;
use std::time::Duration;
use tracing::trace;

/// Connection setup that takes longer fails as "not sent" and may fail over
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A single server reachable over HTTP
pub struct HttpEndpoint {
    base_url: String,
    client: HttpClient,
}

impl HttpEndpoint {
    /// Create an endpoint for the given base URL (`http://host:port`)
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_options(base_url, false)
    }

    /// Create an endpoint, optionally accepting invalid TLS certificates
    pub fn with_options(base_url: impl Into<String>, insecure_skip_verify: bool) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::invalid_argument(format!(
                "unsupported endpoint '{}'",
                base_url
            )));
        }

        let client = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .danger_accept_invalid_certs(insecure_skip_verify)
            .build()
            .map_err(|e| Error::transport("failed to build HTTP client", e))?;

        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, req: &Request, timeout: Option<Duration>) -> Result<Response> {
        let url = format!("{}/{}", self.base_url, req.path().trim_start_matches('/'));
        let mut builder = self.client.request(http_method(req.method()), &url);
        if !req.query().is_empty() {
            builder = builder.query(req.query());
        }
        for (key, value) in req.headers() {
            builder = builder.header(key, value);
        }
        if let Some(body) = req.body() {
            builder = builder.json(body);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        // Until the transport proves otherwise the request may have reached
        // the server, even if this future is dropped mid-flight.
        req.mark_written();
        trace!(method = %req.method(), url = %url, "sending request");
        let response = builder
            .send()
            .await
            .map_err(|e| classify(req, timeout, e))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| classify(req, timeout, e))?;
        trace!(status, bytes = body.len(), "received response");

        Ok(Response::new(status, body))
    }
}

#[async_trait::async_trait]
impl Connection for HttpEndpoint {
    fn new_request(&self, method: Method, path: &str) -> Result<Request> {
        Ok(Request::new(method, path))
    }

    async fn execute(&self, ctx: &Context, req: &Request) -> Result<Response> {
        let send = self.send(req, ctx.remaining());
        match ctx.cancellation() {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(Error::Canceled),
                result = send => result,
            },
            None => send.await,
        }
    }
}

fn http_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Head => reqwest::Method::HEAD,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

/// Map a reqwest failure. Connect and builder errors happen before any byte
/// left the client; everything else leaves the request marked written.
fn classify(req: &Request, timeout: Option<Duration>, err: reqwest::Error) -> Error {
    if err.is_builder() || err.is_connect() {
        req.clear_written();
        return Error::transport(format!("{} {} not sent", req.method(), req.path()), err);
    }
    match timeout {
        Some(timeout) if err.is_timeout() => Error::Timeout(timeout),
        _ => Error::transport(format!("{} {} failed", req.method(), req.path()), err),
    }
}
