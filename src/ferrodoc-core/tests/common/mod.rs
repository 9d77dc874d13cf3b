//! In-memory document server used by the integration tests.
//!
//! Implements the document and collection endpoints the driver talks to,
//! including the query flags (returnOld/returnNew/silent/keepNull/
//! waitForSync/ignoreRevs/onlyget) and `If-Match`.

#![allow(dead_code)]

use ferrodoc_core::{
    Collection, Connection, ConnectionConfig, Context, Database, Error, FailoverConnection,
    Method, Request, Response, Result,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ferrodoc_core=debug")),
        )
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDoc {
    pub name: String,
    pub age: u32,
}

pub fn user(name: &str, age: u32) -> UserDoc {
    UserDoc {
        name: name.to_string(),
        age,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub user: Option<UserDoc>,
}

type Documents = BTreeMap<String, Map<String, Value>>;

#[derive(Default)]
struct State {
    databases: HashMap<String, HashMap<String, Documents>>,
    next_rev: u64,
}

#[derive(Clone, Copy)]
struct Failure {
    code: u16,
    num: i64,
    message: &'static str,
}

const NOT_FOUND: Failure = Failure {
    code: 404,
    num: 1202,
    message: "document not found",
};
const UNIQUE_VIOLATED: Failure = Failure {
    code: 409,
    num: 1210,
    message: "unique constraint violated",
};
const REV_CONFLICT: Failure = Failure {
    code: 412,
    num: 1200,
    message: "conflict",
};
const BAD_DOCUMENT: Failure = Failure {
    code: 400,
    num: 1227,
    message: "invalid document type",
};
const COLLECTION_NOT_FOUND: Failure = Failure {
    code: 404,
    num: 1203,
    message: "collection or view not found",
};
const DUPLICATE_NAME: Failure = Failure {
    code: 409,
    num: 1207,
    message: "duplicate name",
};

impl Failure {
    /// Array item form; status comes from errorNum
    fn item(&self) -> Value {
        json!({"error": true, "errorNum": self.num, "errorMessage": self.message})
    }

    fn response(&self) -> Response {
        Response::new(
            self.code,
            json!({
                "error": true,
                "code": self.code,
                "errorNum": self.num,
                "errorMessage": self.message
            })
            .to_string(),
        )
    }
}

struct Flags {
    return_old: bool,
    return_new: bool,
    silent: bool,
    keep_null: bool,
    wait_for_sync: bool,
    ignore_revs: bool,
    only_get: bool,
    if_match: Option<String>,
}

impl Flags {
    fn from_request(req: &Request) -> Self {
        let query = |key: &str| {
            req.query()
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        Self {
            return_old: query("returnOld") == Some("true"),
            return_new: query("returnNew") == Some("true"),
            silent: query("silent") == Some("true"),
            keep_null: query("keepNull") != Some("false"),
            wait_for_sync: query("waitForSync") == Some("true"),
            ignore_revs: query("ignoreRevs") != Some("false"),
            only_get: query("onlyget") == Some("true"),
            if_match: req
                .headers()
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("if-match"))
                .map(|(_, v)| v.clone()),
        }
    }

    fn ok_status(&self) -> u16 {
        if self.wait_for_sync {
            201
        } else {
            202
        }
    }

    fn remove_status(&self) -> u16 {
        if self.wait_for_sync {
            200
        } else {
            202
        }
    }
}

#[derive(Default)]
pub struct MemoryServer {
    state: Mutex<State>,
    requests: AtomicUsize,
}

impl MemoryServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of requests executed so far
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Stored document as raw JSON, bypassing the driver
    pub fn raw_document(&self, db: &str, col: &str, key: &str) -> Option<Value> {
        let state = self.state.lock();
        state
            .databases
            .get(db)
            .and_then(|cols| cols.get(col))
            .and_then(|docs| docs.get(key))
            .map(|doc| Value::Object(doc.clone()))
    }

    fn handle(&self, req: &Request) -> Response {
        let segments: Vec<&str> = req.path().split('/').collect();
        let flags = Flags::from_request(req);
        let mut state = self.state.lock();
        let State {
            databases,
            next_rev,
        } = &mut *state;

        match (req.method(), segments.as_slice()) {
            (Method::Delete, ["_db", "_system", "_api", "database", name]) => {
                match databases.remove(*name) {
                    Some(_) => ok(200, json!({"result": true})),
                    None => NOT_FOUND.response(),
                }
            }
            (Method::Get, ["_db", db, "_api", "database", "current"]) => ok(
                200,
                json!({"result": {"name": db, "id": "1", "path": "", "isSystem": false}}),
            ),
            (Method::Get, ["_db", db, "_api", "collection"]) => {
                let names: Vec<Value> = databases
                    .get(*db)
                    .map(|cols| cols.keys().map(|n| json!({"name": n, "type": 2})).collect())
                    .unwrap_or_default();
                ok(200, json!({"result": names}))
            }
            (Method::Post, ["_db", db, "_api", "collection"]) => {
                let name = req
                    .body()
                    .and_then(|b| b.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let cols = databases.entry(db.to_string()).or_default();
                if cols.contains_key(&name) {
                    return DUPLICATE_NAME.response();
                }
                cols.insert(name.clone(), Documents::new());
                ok(200, json!({"name": name, "type": 2}))
            }
            (Method::Get, ["_db", db, "_api", "collection", name]) => {
                match databases.get(*db).and_then(|cols| cols.get(*name)) {
                    Some(_) => ok(200, json!({"name": name, "type": 2})),
                    None => COLLECTION_NOT_FOUND.response(),
                }
            }
            (Method::Delete, ["_db", db, "_api", "collection", name]) => {
                match databases.get_mut(*db).and_then(|cols| cols.remove(*name)) {
                    Some(_) => ok(200, json!({"id": "1"})),
                    None => COLLECTION_NOT_FOUND.response(),
                }
            }
            (method, ["_db", db, "_api", "document", col, rest @ ..]) => {
                let docs = match databases.get_mut(*db).and_then(|cols| cols.get_mut(*col)) {
                    Some(docs) => docs,
                    None => return COLLECTION_NOT_FOUND.response(),
                };
                let mut ctx = DocContext {
                    col: *col,
                    docs,
                    next_rev,
                    flags: &flags,
                };
                match rest.first() {
                    Some(key) => ctx.single(method, key, req.body()),
                    None => ctx.batch(method, req.body()),
                }
            }
            _ => NOT_FOUND.response(),
        }
    }
}

#[async_trait::async_trait]
impl Connection for MemoryServer {
    fn new_request(&self, method: Method, path: &str) -> Result<Request> {
        Ok(Request::new(method, path))
    }

    async fn execute(&self, _ctx: &Context, req: &Request) -> Result<Response> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        req.mark_written();
        Ok(self.handle(req))
    }
}

/// Endpoint that refuses every connection
pub struct Unreachable {
    pub attempts: AtomicUsize,
}

impl Unreachable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            attempts: AtomicUsize::new(0),
        })
    }
}

#[async_trait::async_trait]
impl Connection for Unreachable {
    fn new_request(&self, method: Method, path: &str) -> Result<Request> {
        Ok(Request::new(method, path))
    }

    async fn execute(&self, _ctx: &Context, _req: &Request) -> Result<Response> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::Transport {
            message: "connection refused".to_string(),
            source: None,
        })
    }
}

fn ok(status: u16, body: Value) -> Response {
    Response::new(status, body.to_string())
}

struct DocContext<'a> {
    col: &'a str,
    docs: &'a mut Documents,
    next_rev: &'a mut u64,
    flags: &'a Flags,
}

impl DocContext<'_> {
    fn single(&mut self, method: Method, key: &str, body: Option<&Value>) -> Response {
        let flags = self.flags;
        let expected_rev = flags.if_match.clone();
        let result = match method {
            Method::Get => {
                return match self.docs.get(key) {
                    Some(doc) => ok(200, Value::Object(doc.clone())),
                    None => NOT_FOUND.response(),
                }
            }
            Method::Head => {
                return match self.docs.get(key) {
                    Some(_) => Response::new(200, ""),
                    None => NOT_FOUND.response(),
                }
            }
            Method::Patch => self.modify(key, body, expected_rev, false),
            Method::Put => self.modify(key, body, expected_rev, true),
            Method::Delete => self.remove(key, expected_rev),
            _ => Err(BAD_DOCUMENT),
        };
        match result {
            Ok(_) if flags.silent => Response::new(self.status_for(method), ""),
            Ok(item) => ok(self.status_for(method), item),
            Err(failure) => failure.response(),
        }
    }

    fn batch(&mut self, method: Method, body: Option<&Value>) -> Response {
        let items = match body {
            Some(Value::Array(items)) => items.clone(),
            _ => return BAD_DOCUMENT.response(),
        };
        let flags = self.flags;
        let mut results = Vec::with_capacity(items.len());
        for item in &items {
            let key = item.get("_key").and_then(Value::as_str).map(str::to_string);
            let rev = if flags.ignore_revs {
                None
            } else {
                item.get("_rev").and_then(Value::as_str).map(str::to_string)
            };
            let result = match (method, key) {
                (Method::Post, _) => self.create(item),
                (Method::Put, Some(key)) if flags.only_get => self.read(&key, rev),
                (Method::Patch, Some(key)) => self.modify(&key, Some(item), rev, false),
                (Method::Put, Some(key)) => self.modify(&key, Some(item), rev, true),
                (Method::Delete, Some(key)) => self.remove(&key, rev),
                _ => Err(BAD_DOCUMENT),
            };
            results.push(result.unwrap_or_else(|failure| failure.item()));
        }
        let status = if flags.only_get {
            200
        } else {
            self.status_for(method)
        };
        if flags.silent {
            return Response::new(status, "");
        }
        ok(status, Value::Array(results))
    }

    fn status_for(&self, method: Method) -> u16 {
        match method {
            Method::Delete => self.flags.remove_status(),
            _ => self.flags.ok_status(),
        }
    }

    fn next_rev(&mut self) -> String {
        *self.next_rev += 1;
        format!("_rev{}", self.next_rev)
    }

    fn meta(&self, doc: &Map<String, Value>) -> Map<String, Value> {
        ["_key", "_id", "_rev"]
            .iter()
            .filter_map(|f| doc.get(*f).map(|v| (f.to_string(), v.clone())))
            .collect()
    }

    fn read(&self, key: &str, rev: Option<String>) -> std::result::Result<Value, Failure> {
        let doc = self.docs.get(key).ok_or(NOT_FOUND)?;
        if let Some(rev) = rev {
            if doc.get("_rev").and_then(Value::as_str) != Some(rev.as_str()) {
                return Err(REV_CONFLICT);
            }
        }
        Ok(Value::Object(doc.clone()))
    }

    fn create(&mut self, body: &Value) -> std::result::Result<Value, Failure> {
        let mut doc = body.as_object().cloned().ok_or(BAD_DOCUMENT)?;
        let key = match doc.get("_key").and_then(Value::as_str) {
            Some(key) => key.to_string(),
            None => uuid::Uuid::new_v4().simple().to_string(),
        };
        if self.docs.contains_key(&key) {
            return Err(UNIQUE_VIOLATED);
        }
        let rev = self.next_rev();
        doc.insert("_key".to_string(), json!(key));
        doc.insert("_id".to_string(), json!(format!("{}/{}", self.col, key)));
        doc.insert("_rev".to_string(), json!(rev));

        let mut item = self.meta(&doc);
        if self.flags.return_new {
            item.insert("new".to_string(), Value::Object(doc.clone()));
        }
        self.docs.insert(key, doc);
        Ok(Value::Object(item))
    }

    fn modify(
        &mut self,
        key: &str,
        body: Option<&Value>,
        expected_rev: Option<String>,
        replace: bool,
    ) -> std::result::Result<Value, Failure> {
        let patch = body.and_then(Value::as_object).ok_or(BAD_DOCUMENT)?;
        let old = self.docs.get(key).cloned().ok_or(NOT_FOUND)?;
        if let Some(rev) = expected_rev {
            if old.get("_rev").and_then(Value::as_str) != Some(rev.as_str()) {
                return Err(REV_CONFLICT);
            }
        }

        let mut doc = if replace { Map::new() } else { old.clone() };
        for (field, value) in patch {
            if field.starts_with('_') {
                continue;
            }
            if value.is_null() && !self.flags.keep_null {
                // keepNull=false: the null instruction is dropped
                continue;
            }
            doc.insert(field.clone(), value.clone());
        }
        let rev = self.next_rev();
        doc.insert("_key".to_string(), json!(key));
        doc.insert("_id".to_string(), json!(format!("{}/{}", self.col, key)));
        doc.insert("_rev".to_string(), json!(rev));

        let mut item = self.meta(&doc);
        item.insert("_oldRev".to_string(), old["_rev"].clone());
        if self.flags.return_old {
            item.insert("old".to_string(), Value::Object(old));
        }
        if self.flags.return_new {
            item.insert("new".to_string(), Value::Object(doc.clone()));
        }
        self.docs.insert(key.to_string(), doc);
        Ok(Value::Object(item))
    }

    fn remove(
        &mut self,
        key: &str,
        expected_rev: Option<String>,
    ) -> std::result::Result<Value, Failure> {
        let old = self.docs.get(key).ok_or(NOT_FOUND)?;
        if let Some(rev) = expected_rev {
            if old.get("_rev").and_then(Value::as_str) != Some(rev.as_str()) {
                return Err(REV_CONFLICT);
            }
        }
        let old = self.docs.remove(key).ok_or(NOT_FOUND)?;
        let mut item = self.meta(&old);
        if self.flags.return_old {
            item.insert("old".to_string(), Value::Object(old));
        }
        Ok(Value::Object(item))
    }
}

pub const DB_NAME: &str = "document_test";

/// A fresh server with database `document_test` and the given collection
pub async fn setup(collection: &str) -> (Arc<MemoryServer>, Collection) {
    init_tracing();
    let server = MemoryServer::new();
    let db = Database::new(DB_NAME, server.clone()).unwrap();
    let col = db
        .create_collection(&Context::new(), collection, None)
        .await
        .unwrap();
    (server, col)
}

/// A failover connection whose first endpoint refuses connections
pub fn failover_to(server: Arc<MemoryServer>) -> (Arc<Unreachable>, Arc<FailoverConnection>) {
    let dead = Unreachable::new();
    let conn = FailoverConnection::new(
        ConnectionConfig::default(),
        vec![dead.clone() as Arc<dyn Connection>, server as Arc<dyn Connection>],
    )
    .unwrap();
    (dead, Arc::new(conn))
}
