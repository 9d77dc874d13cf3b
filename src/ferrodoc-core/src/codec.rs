//! Batch codec for document operations.
//!
//! Encodes singular or batched payloads (optionally merged with `_key`/`_rev`
//! entries) into request bodies and decodes responses into per-item results.
//! Each response body is parsed once; per-item status, metadata and the
//! optional `old`/`new` documents are then read from the parsed value.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::connection::{Method, Response, ResponseElement};
use crate::error::{Error, Result};
use crate::models::{BatchResponse, DocumentMeta, DocumentResponse, MergeEntry, StoredDocument};
use crate::options::RequestOptions;

/// Statuses accepted on each element of an array response
const ELEMENT_STATUSES: &[u16] = &[200, 201, 202];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Replace,
    Remove,
}

impl Operation {
    pub fn method(&self) -> Method {
        match self {
            Operation::Create => Method::Post,
            Operation::Read => Method::Get,
            Operation::Update => Method::Patch,
            Operation::Replace => Method::Put,
            Operation::Remove => Method::Delete,
        }
    }

    /// Top-level statuses that mean the request was accepted
    pub fn accepted_statuses(&self) -> &'static [u16] {
        match self {
            Operation::Create | Operation::Update | Operation::Replace => &[201, 202],
            Operation::Remove => &[200, 202],
            Operation::Read => &[200],
        }
    }

    fn returns_old(&self) -> bool {
        matches!(
            self,
            Operation::Update | Operation::Replace | Operation::Remove
        )
    }

    fn returns_new(&self) -> bool {
        matches!(
            self,
            Operation::Create | Operation::Update | Operation::Replace
        )
    }
}

/// Encode one document payload. The payload must serialize to a JSON object.
pub fn encode_document<T: Serialize + ?Sized>(document: &T) -> Result<Value> {
    let value = serde_json::to_value(document)?;
    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Err(Error::invalid_argument("document is nil")),
        _ => Err(Error::invalid_argument("document must serialize to an object")),
    }
}

/// Encode a sequence of payloads, merging `merge[i]` into item `i` when given
pub fn encode_batch<T: Serialize>(items: &[T], merge: Option<&[MergeEntry]>) -> Result<Value> {
    if let Some(merge) = merge {
        if merge.len() != items.len() {
            return Err(Error::invalid_argument(format!(
                "expected {} merge entries, got {}",
                items.len(),
                merge.len()
            )));
        }
    }

    let mut encoded = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let mut value = encode_document(item)?;
        if let (Some(merge), Value::Object(object)) = (merge, &mut value) {
            for (field, v) in &merge[i] {
                object.insert((*field).to_string(), Value::String(v.clone()));
            }
        }
        encoded.push(value);
    }
    Ok(Value::Array(encoded))
}

/// Encode merge entries alone, as used by batched read and remove
pub fn encode_selectors(merge: &[MergeEntry]) -> Value {
    Value::Array(
        merge
            .iter()
            .map(|entry| {
                let object: Map<String, Value> = entry
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), Value::String(v.clone())))
                    .collect();
                Value::Object(object)
            })
            .collect(),
    )
}

/// Zip keys and expected revisions into per-item merge entries.
/// Returns `None` when neither is given.
pub fn merge_entries<K: AsRef<str>>(
    keys: Option<&[K]>,
    revs: Option<&[String]>,
) -> Result<Option<Vec<MergeEntry>>> {
    match (keys, revs) {
        (None, None) => Ok(None),
        (Some(keys), None) => Ok(Some(
            keys.iter()
                .map(|k| HashMap::from([("_key", k.as_ref().to_string())]))
                .collect(),
        )),
        (None, Some(revs)) => Ok(Some(
            revs.iter()
                .map(|r| HashMap::from([("_rev", r.clone())]))
                .collect(),
        )),
        (Some(keys), Some(revs)) => {
            if keys.len() != revs.len() {
                return Err(Error::invalid_argument(format!(
                    "number of keys must equal number of revisions, got {} keys and {} revisions",
                    keys.len(),
                    revs.len()
                )));
            }
            Ok(Some(
                keys.iter()
                    .zip(revs)
                    .map(|(k, r)| {
                        HashMap::from([("_key", k.as_ref().to_string()), ("_rev", r.clone())])
                    })
                    .collect(),
            ))
        }
    }
}

/// Decode a singular mutation response
pub fn decode_mutation<T: DeserializeOwned>(
    resp: Response,
    op: Operation,
    options: &RequestOptions,
) -> Result<DocumentResponse<T>> {
    resp.check_status(op.accepted_statuses())?;
    if options.is_silent() {
        return Ok(DocumentResponse::default());
    }
    let element = resp.into_element()?;
    decode_mutation_element(&element, op, options)
}

/// Decode a batched mutation response into `count` per-item results
pub fn decode_mutation_batch<T: DeserializeOwned>(
    resp: Response,
    count: usize,
    op: Operation,
    options: &RequestOptions,
) -> Result<BatchResponse<DocumentResponse<T>>> {
    resp.check_status(op.accepted_statuses())?;
    if options.is_silent() {
        return Ok(BatchResponse::empty());
    }
    let elements = resp.into_elements()?;
    Ok(decode_elements(elements, count, |element| {
        element.check_status(ELEMENT_STATUSES)?;
        decode_mutation_element(element, op, options)
    }))
}

/// Decode a singular read response (metadata plus the document itself)
pub fn decode_read<T: DeserializeOwned>(resp: Response) -> Result<StoredDocument<T>> {
    resp.check_status(Operation::Read.accepted_statuses())?;
    let element = resp.into_element()?;
    decode_read_element(&element)
}

/// Decode a batched read response into `count` per-item results
pub fn decode_read_batch<T: DeserializeOwned>(
    resp: Response,
    count: usize,
) -> Result<BatchResponse<StoredDocument<T>>> {
    resp.check_status(Operation::Read.accepted_statuses())?;
    let elements = resp.into_elements()?;
    Ok(decode_elements(elements, count, |element| {
        element.check_status(&[200])?;
        decode_read_element(element)
    }))
}

fn decode_mutation_element<T: DeserializeOwned>(
    element: &ResponseElement,
    op: Operation,
    options: &RequestOptions,
) -> Result<DocumentResponse<T>> {
    let meta: DocumentMeta = element.parse()?;
    let old = if options.is_return_old() && op.returns_old() {
        Some(element.parse_field("old")?)
    } else {
        None
    };
    let new = if options.is_return_new() && op.returns_new() {
        Some(element.parse_field("new")?)
    } else {
        None
    };
    Ok(DocumentResponse { meta, old, new })
}

fn decode_read_element<T: DeserializeOwned>(element: &ResponseElement) -> Result<StoredDocument<T>> {
    let meta: DocumentMeta = element.parse()?;
    let document: T = element.parse()?;
    Ok(StoredDocument { meta, document })
}

/// Apply `decode` to each of the first `count` elements. Positions the
/// server did not answer get an `InvalidResponse` error.
fn decode_elements<R, F>(elements: Vec<ResponseElement>, count: usize, decode: F) -> BatchResponse<R>
where
    F: Fn(&ResponseElement) -> Result<R>,
{
    let mut results = Vec::with_capacity(count);
    let mut elements = elements.into_iter();
    for i in 0..count {
        let result = match elements.next() {
            Some(element) => decode(&element),
            None => Err(Error::InvalidResponse(format!(
                "no response for item {}",
                i
            ))),
        };
        results.push(result);
    }
    if elements.next().is_some() {
        tracing::warn!(expected = count, "response array has more items than the request");
    }
    BatchResponse::new(results)
}
