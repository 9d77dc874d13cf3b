//! Document operations on a single collection.
//!
//! Every call runs validate → encode → execute (with failover) → decode.
//! Input is validated before any request is built, so malformed keys or
//! payloads never reach the network. Batched calls return one result per
//! input item, in input order.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use crate::codec::{self, Operation};
use crate::connection::{join_path, Connection, Method, Request, Response};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::models::{BatchResponse, DocumentResponse, StoredDocument};
use crate::options::RequestOptions;

/// Longest key the server accepts, in bytes
const MAX_KEY_LENGTH: usize = 254;

/// Validate document key syntax
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::invalid_argument("key is empty"));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(Error::invalid_argument(format!(
            "key is longer than {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    if let Some(c) = key.chars().find(|c| !is_key_char(*c)) {
        return Err(Error::invalid_argument(format!(
            "key '{}' contains invalid character '{}'",
            key, c
        )));
    }
    Ok(())
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '_' | '-' | ':' | '.' | '@' | '(' | ')' | '+' | ',' | '=' | ';' | '$' | '!' | '*'
                | '\'' | '%'
        )
}

fn validate_keys<K: AsRef<str>>(keys: &[K]) -> Result<()> {
    keys.iter().try_for_each(|key| validate_key(key.as_ref()))
}

/// Handle to a collection within a database
#[derive(Clone)]
pub struct Collection {
    name: String,
    db_name: String,
    conn: Arc<dyn Connection>,
}

impl Collection {
    pub(crate) fn new(name: &str, db_name: &str, conn: Arc<dyn Connection>) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::invalid_argument("collection name is empty"));
        }
        Ok(Self {
            name: name.to_string(),
            db_name: db_name.to_string(),
            conn,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database_name(&self) -> &str {
        &self.db_name
    }

    /// `_db/<db>/_api/<api>/<collection>`
    fn rel_path(&self, api: &str) -> String {
        join_path(&["_db", &self.db_name, "_api", api, &self.name])
    }

    fn document_path(&self, key: Option<&str>) -> String {
        match key {
            Some(key) => join_path(&[&self.rel_path("document"), key]),
            None => self.rel_path("document"),
        }
    }

    fn request(&self, method: Method, path: &str) -> Result<Request> {
        self.conn.new_request(method, path)
    }

    async fn send(&self, ctx: &Context, req: &Request) -> Result<Response> {
        self.conn.execute(ctx, req).await
    }

    /// Drop the whole collection. A missing collection yields NotFound.
    #[tracing::instrument(skip(self, ctx), fields(collection = %self.name))]
    pub async fn remove(&self, ctx: &Context) -> Result<()> {
        let req = self.request(Method::Delete, &self.rel_path("collection"))?;
        let resp = self.send(ctx, &req).await?;
        resp.check_status(&[200])
    }

    /// Check whether a document with the given key exists
    #[tracing::instrument(skip(self, ctx), fields(collection = %self.name))]
    pub async fn document_exists(&self, ctx: &Context, key: &str) -> Result<bool> {
        validate_key(key)?;
        let req = self.request(Method::Head, &self.document_path(Some(key)))?;
        let resp = self.send(ctx, &req).await?;
        match resp.check_status(&[200]) {
            Ok(()) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Read one document. A missing key yields NotFound.
    #[tracing::instrument(skip(self, options), fields(collection = %self.name))]
    pub async fn read_document<T: DeserializeOwned>(
        &self,
        key: &str,
        options: &RequestOptions,
    ) -> Result<StoredDocument<T>> {
        validate_key(key)?;
        let mut req = self.request(Method::Get, &self.document_path(Some(key)))?;
        options.apply_read(&mut req);
        let resp = self.send(options.context(), &req).await?;
        codec::decode_read(resp)
    }

    /// Read several documents by key. Missing keys fail only their own
    /// position.
    #[tracing::instrument(skip(self, keys, options), fields(collection = %self.name, count = keys.len()))]
    pub async fn read_documents<T: DeserializeOwned, K: AsRef<str>>(
        &self,
        keys: &[K],
        options: &RequestOptions,
    ) -> Result<BatchResponse<StoredDocument<T>>> {
        validate_keys(keys)?;
        let merge = codec::merge_entries(Some(keys), options.expected_revisions())?
            .unwrap_or_default();
        if keys.is_empty() {
            return Ok(BatchResponse::empty());
        }
        let mut req = self.request(Method::Put, &self.document_path(None))?;
        req.set_query("onlyget", "true");
        options.apply_read(&mut req);
        req.set_body(codec::encode_selectors(&merge));
        let resp = self.send(options.context(), &req).await?;
        codec::decode_read_batch(resp, keys.len())
    }

    /// Create one document. A `_key` in the document is used as its key,
    /// otherwise the server generates one. A duplicate key or any other
    /// unique constraint violation yields Conflict.
    #[tracing::instrument(skip(self, document, options), fields(collection = %self.name))]
    pub async fn create_document<D, T>(
        &self,
        document: &D,
        options: &RequestOptions,
    ) -> Result<DocumentResponse<T>>
    where
        D: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = codec::encode_document(document)?;
        let mut req = self.request(Operation::Create.method(), &self.document_path(None))?;
        options.apply(&mut req);
        req.set_body(body);
        let resp = self.send(options.context(), &req).await?;
        codec::decode_mutation(resp, Operation::Create, options)
    }

    /// Create several documents. Per-item failures (e.g. a duplicate key) are
    /// reported at their position.
    #[tracing::instrument(skip(self, documents, options), fields(collection = %self.name, count = documents.len()))]
    pub async fn create_documents<D, T>(
        &self,
        documents: &[D],
        options: &RequestOptions,
    ) -> Result<BatchResponse<DocumentResponse<T>>>
    where
        D: Serialize,
        T: DeserializeOwned,
    {
        let body = codec::encode_batch(documents, None)?;
        if documents.is_empty() {
            return Ok(BatchResponse::empty());
        }
        let mut req = self.request(Operation::Create.method(), &self.document_path(None))?;
        options.apply(&mut req);
        req.set_body(body);
        let resp = self.send(options.context(), &req).await?;
        codec::decode_mutation_batch(resp, documents.len(), Operation::Create, options)
    }

    /// Partially update one document. A missing key yields NotFound.
    #[tracing::instrument(skip(self, update, options), fields(collection = %self.name))]
    pub async fn update_document<U, T>(
        &self,
        key: &str,
        update: &U,
        options: &RequestOptions,
    ) -> Result<DocumentResponse<T>>
    where
        U: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.modify_document(Operation::Update, key, update, options)
            .await
    }

    /// Partially update several documents, `updates[i]` applying to `keys[i]`
    #[tracing::instrument(skip(self, keys, updates, options), fields(collection = %self.name, count = updates.len()))]
    pub async fn update_documents<K, U, T>(
        &self,
        keys: &[K],
        updates: &[U],
        options: &RequestOptions,
    ) -> Result<BatchResponse<DocumentResponse<T>>>
    where
        K: AsRef<str>,
        U: Serialize,
        T: DeserializeOwned,
    {
        self.modify_documents(Operation::Update, keys, updates, options)
            .await
    }

    /// Replace one document entirely. A missing key yields NotFound.
    #[tracing::instrument(skip(self, document, options), fields(collection = %self.name))]
    pub async fn replace_document<D, T>(
        &self,
        key: &str,
        document: &D,
        options: &RequestOptions,
    ) -> Result<DocumentResponse<T>>
    where
        D: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.modify_document(Operation::Replace, key, document, options)
            .await
    }

    /// Replace several documents, `documents[i]` replacing `keys[i]`
    #[tracing::instrument(skip(self, keys, documents, options), fields(collection = %self.name, count = documents.len()))]
    pub async fn replace_documents<K, D, T>(
        &self,
        keys: &[K],
        documents: &[D],
        options: &RequestOptions,
    ) -> Result<BatchResponse<DocumentResponse<T>>>
    where
        K: AsRef<str>,
        D: Serialize,
        T: DeserializeOwned,
    {
        self.modify_documents(Operation::Replace, keys, documents, options)
            .await
    }

    /// Remove one document. A missing key yields NotFound.
    #[tracing::instrument(skip(self, options), fields(collection = %self.name))]
    pub async fn remove_document<T: DeserializeOwned>(
        &self,
        key: &str,
        options: &RequestOptions,
    ) -> Result<DocumentResponse<T>> {
        validate_key(key)?;
        let mut req = self.request(Operation::Remove.method(), &self.document_path(Some(key)))?;
        options.apply(&mut req);
        let resp = self.send(options.context(), &req).await?;
        codec::decode_mutation(resp, Operation::Remove, options)
    }

    /// Remove several documents by key
    #[tracing::instrument(skip(self, keys, options), fields(collection = %self.name, count = keys.len()))]
    pub async fn remove_documents<K, T>(
        &self,
        keys: &[K],
        options: &RequestOptions,
    ) -> Result<BatchResponse<DocumentResponse<T>>>
    where
        K: AsRef<str>,
        T: DeserializeOwned,
    {
        validate_keys(keys)?;
        let merge = codec::merge_entries(Some(keys), options.expected_revisions())?
            .unwrap_or_default();
        if keys.is_empty() {
            return Ok(BatchResponse::empty());
        }
        let mut req = self.request(Operation::Remove.method(), &self.document_path(None))?;
        options.apply(&mut req);
        req.set_body(codec::encode_selectors(&merge));
        let resp = self.send(options.context(), &req).await?;
        codec::decode_mutation_batch(resp, keys.len(), Operation::Remove, options)
    }

    async fn modify_document<D, T>(
        &self,
        op: Operation,
        key: &str,
        document: &D,
        options: &RequestOptions,
    ) -> Result<DocumentResponse<T>>
    where
        D: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        validate_key(key)?;
        let body = codec::encode_document(document)?;
        let mut req = self.request(op.method(), &self.document_path(Some(key)))?;
        options.apply(&mut req);
        req.set_body(body);
        let resp = self.send(options.context(), &req).await?;
        codec::decode_mutation(resp, op, options)
    }

    async fn modify_documents<K, D, T>(
        &self,
        op: Operation,
        keys: &[K],
        documents: &[D],
        options: &RequestOptions,
    ) -> Result<BatchResponse<DocumentResponse<T>>>
    where
        K: AsRef<str>,
        D: Serialize,
        T: DeserializeOwned,
    {
        if keys.len() != documents.len() {
            return Err(Error::invalid_argument(format!(
                "expected {} keys, got {}",
                documents.len(),
                keys.len()
            )));
        }
        validate_keys(keys)?;
        let merge = codec::merge_entries(Some(keys), options.expected_revisions())?;
        let body = codec::encode_batch(documents, merge.as_deref())?;
        if documents.is_empty() {
            return Ok(BatchResponse::empty());
        }
        let mut req = self.request(op.method(), &self.document_path(None))?;
        options.apply(&mut req);
        req.set_body(body);
        let resp = self.send(options.context(), &req).await?;
        codec::decode_mutation_batch(resp, documents.len(), op, options)
    }
}
