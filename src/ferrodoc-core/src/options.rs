//! Per-call request options.
//!
//! A `RequestOptions` value travels next to each document call and shapes
//! the outgoing request (query flags, `If-Match`) and how the response is
//! decoded (old/new documents, silent mode). It also carries the caller's
//! [`Context`] so deadlines and cancellation reach the connection.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::connection::Request;
use crate::context::Context;

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    return_old: bool,
    return_new: bool,
    silent: bool,
    keep_null: Option<bool>,
    wait_for_sync: bool,
    revision: Option<String>,
    revisions: Option<Vec<String>>,
    context: Context,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the server to return the document as it was before the mutation
    pub fn return_old(mut self) -> Self {
        self.return_old = true;
        self
    }

    /// Ask the server to return the document as it is after the mutation
    pub fn return_new(mut self) -> Self {
        self.return_new = true;
        self
    }

    /// Suppress the response body; results come back empty
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// `false` makes null-valued update fields remove rather than null the
    /// stored attribute. Left unset, the server default applies.
    pub fn keep_null(mut self, keep_null: bool) -> Self {
        self.keep_null = Some(keep_null);
        self
    }

    pub fn wait_for_sync(mut self) -> Self {
        self.wait_for_sync = true;
        self
    }

    /// Expected revision for a singular call (sent as `If-Match`)
    pub fn revision(mut self, rev: impl Into<String>) -> Self {
        self.revision = Some(rev.into());
        self
    }

    /// Expected revisions for a batched call, positionally parallel to the keys
    pub fn revisions<I, S>(mut self, revs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.revisions = Some(revs.into_iter().map(Into::into).collect());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.context = self.context.with_timeout(timeout);
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.context = self.context.with_deadline(deadline);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.context = self.context.with_cancellation(token);
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn is_return_old(&self) -> bool {
        self.return_old
    }

    pub fn is_return_new(&self) -> bool {
        self.return_new
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    pub fn keep_null_setting(&self) -> Option<bool> {
        self.keep_null
    }

    pub fn is_wait_for_sync(&self) -> bool {
        self.wait_for_sync
    }

    pub fn expected_revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    pub fn expected_revisions(&self) -> Option<&[String]> {
        self.revisions.as_deref()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Write the options onto an outgoing request
    pub(crate) fn apply(&self, req: &mut Request) {
        if self.return_old {
            req.set_query("returnOld", "true");
        }
        if self.return_new {
            req.set_query("returnNew", "true");
        }
        if self.silent {
            req.set_query("silent", "true");
        }
        if let Some(keep_null) = self.keep_null {
            req.set_query("keepNull", if keep_null { "true" } else { "false" });
        }
        if self.wait_for_sync {
            req.set_query("waitForSync", "true");
        }
        if let Some(rev) = &self.revision {
            req.set_header("If-Match", rev);
        }
        if self.revisions.is_some() {
            req.set_query("ignoreRevs", "false");
        }
    }

    /// Reads only honor the revision checks
    pub(crate) fn apply_read(&self, req: &mut Request) {
        if let Some(rev) = &self.revision {
            req.set_header("If-Match", rev);
        }
        if self.revisions.is_some() {
            req.set_query("ignoreRevs", "false");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Method;

    fn query_value<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
        req.query()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_default_options_leave_request_untouched() {
        let mut req = Request::new(Method::Patch, "_db/test/_api/document/users/1");
        RequestOptions::new().apply(&mut req);
        assert!(req.query().is_empty());
        assert!(req.headers().is_empty());
    }

    #[test]
    fn test_apply_sets_flags() {
        let mut req = Request::new(Method::Patch, "_db/test/_api/document/users/1");
        RequestOptions::new()
            .return_old()
            .return_new()
            .keep_null(false)
            .wait_for_sync()
            .revision("_abc")
            .apply(&mut req);

        assert_eq!(query_value(&req, "returnOld"), Some("true"));
        assert_eq!(query_value(&req, "returnNew"), Some("true"));
        assert_eq!(query_value(&req, "keepNull"), Some("false"));
        assert_eq!(query_value(&req, "waitForSync"), Some("true"));
        assert_eq!(query_value(&req, "silent"), None);
        assert_eq!(
            req.headers().first().map(|(k, v)| (k.as_str(), v.as_str())),
            Some(("If-Match", "_abc"))
        );
    }

    #[test]
    fn test_keep_null_is_tri_state() {
        let mut req = Request::new(Method::Patch, "x");
        RequestOptions::new().keep_null(true).apply(&mut req);
        assert_eq!(query_value(&req, "keepNull"), Some("true"));

        let opts = RequestOptions::new();
        assert_eq!(opts.keep_null_setting(), None);
    }

    #[test]
    fn test_revisions_disable_ignore_revs() {
        let mut req = Request::new(Method::Patch, "x");
        let opts = RequestOptions::new().revisions(["_a", "_b"]);
        opts.apply(&mut req);
        assert_eq!(query_value(&req, "ignoreRevs"), Some("false"));
        assert_eq!(opts.expected_revisions().map(|r| r.len()), Some(2));
    }
}
