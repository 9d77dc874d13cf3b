use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};

/// DocumentMeta identifies one stored version of a document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    #[serde(rename = "_key", default)]
    pub key: String,
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "_rev", default)]
    pub rev: String,
}

impl DocumentMeta {
    /// True for the zero value returned by silent calls
    pub fn is_empty(&self) -> bool {
        self.key.is_empty() && self.id.is_empty() && self.rev.is_empty()
    }
}

/// Result of a create/update/replace/remove on one document.
/// `old`/`new` are only filled when requested through the options.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentResponse<T> {
    pub meta: DocumentMeta,
    pub old: Option<T>,
    pub new: Option<T>,
}

impl<T> Default for DocumentResponse<T> {
    fn default() -> Self {
        Self {
            meta: DocumentMeta::default(),
            old: None,
            new: None,
        }
    }
}

/// A document read back from a collection
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument<T> {
    pub meta: DocumentMeta,
    pub document: T,
}

/// Access to the metadata of a per-item result
pub trait HasMeta {
    fn meta(&self) -> &DocumentMeta;
}

impl<T> HasMeta for DocumentResponse<T> {
    fn meta(&self) -> &DocumentMeta {
        &self.meta
    }
}

impl<T> HasMeta for StoredDocument<T> {
    fn meta(&self) -> &DocumentMeta {
        &self.meta
    }
}

/// Per-item results of a batched call, in input order.
///
/// A failed item never aborts the others: position `i` holds either the
/// item's result or its error.
#[derive(Debug)]
pub struct BatchResponse<R> {
    results: Vec<Result<R>>,
}

impl<R> BatchResponse<R> {
    pub fn new(results: Vec<Result<R>>) -> Self {
        Self { results }
    }

    /// Empty response, as returned for silent calls
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Result<R>> {
        self.results.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Result<R>> {
        self.results.iter()
    }

    pub fn into_results(self) -> Vec<Result<R>> {
        self.results
    }

    /// One entry per item: `Some(error)` for failed items
    pub fn errors(&self) -> Vec<Option<&Error>> {
        self.results.iter().map(|r| r.as_ref().err()).collect()
    }

    pub fn has_errors(&self) -> bool {
        self.results.iter().any(|r| r.is_err())
    }

    pub fn error_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_err()).count()
    }
}

impl<R: HasMeta> BatchResponse<R> {
    /// One entry per item; failed items get the zero `DocumentMeta`
    pub fn metas(&self) -> Vec<DocumentMeta> {
        self.results
            .iter()
            .map(|r| r.as_ref().map(|item| item.meta().clone()).unwrap_or_default())
            .collect()
    }
}

impl<R> Default for BatchResponse<R> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<R> IntoIterator for BatchResponse<R> {
    type Item = Result<R>;
    type IntoIter = std::vec::IntoIter<Result<R>>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

/// CollectionType distinguishes document and edge collections
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(from = "u8", into = "u8")]
pub enum CollectionType {
    #[default]
    Document,
    Edge,
}

impl From<u8> for CollectionType {
    fn from(value: u8) -> Self {
        match value {
            3 => CollectionType::Edge,
            _ => CollectionType::Document,
        }
    }
}

impl From<CollectionType> for u8 {
    fn from(value: CollectionType) -> Self {
        match value {
            CollectionType::Document => 2,
            CollectionType::Edge => 3,
        }
    }
}

/// CollectionOptions holds the optional settings for creating a collection
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectionOptions {
    #[serde(rename = "waitForSync", skip_serializing_if = "Option::is_none")]
    pub wait_for_sync: Option<bool>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub collection_type: Option<CollectionType>,
    #[serde(rename = "numberOfShards", skip_serializing_if = "Option::is_none")]
    pub number_of_shards: Option<u32>,
    #[serde(rename = "shardKeys", skip_serializing_if = "Option::is_none")]
    pub shard_keys: Option<Vec<String>>,
    #[serde(rename = "isSystem", skip_serializing_if = "Option::is_none")]
    pub is_system: Option<bool>,
}

/// CollectionInfo describes a collection as listed by the server
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(rename = "isSystem", default)]
    pub is_system: bool,
    #[serde(rename = "type", default)]
    pub collection_type: CollectionType,
}

/// DatabaseInfo describes the current database
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub path: String,
    #[serde(rename = "isSystem", default)]
    pub is_system: bool,
}

/// MergeEntry carries `_key` and/or `_rev` merged into a batched item
pub type MergeEntry = HashMap<&'static str, String>;
