use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::collection::Collection;
use crate::connection::{join_path, Connection, Method};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::models::{CollectionInfo, CollectionOptions, DatabaseInfo};

/// Handle to a database reachable through a connection
#[derive(Clone)]
pub struct Database {
    name: String,
    conn: Arc<dyn Connection>,
}

#[derive(Deserialize)]
struct CollectionListResponse {
    #[serde(default)]
    result: Vec<CollectionInfo>,
}

#[derive(Deserialize)]
struct DatabaseInfoResponse {
    result: DatabaseInfo,
}

#[derive(Serialize)]
struct CreateCollectionRequest<'a> {
    name: &'a str,
    #[serde(flatten)]
    options: &'a CollectionOptions,
}

impl Database {
    pub fn new(name: &str, conn: Arc<dyn Connection>) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::invalid_argument("database name is empty"));
        }
        Ok(Self {
            name: name.to_string(),
            conn,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    /// `_db/<name>/<suffix>`
    fn rel_path(&self, suffix: &str) -> String {
        join_path(&["_db", &self.name, suffix])
    }

    /// Information about this database
    pub async fn info(&self, ctx: &Context) -> Result<DatabaseInfo> {
        let req = self
            .conn
            .new_request(Method::Get, &self.rel_path("_api/database/current"))?;
        let resp = self.conn.execute(ctx, &req).await?;
        resp.check_status(&[200])?;
        let data: DatabaseInfoResponse = resp.parse_body()?;
        Ok(data.result)
    }

    /// Open an existing collection. A missing collection yields NotFound.
    pub async fn collection(&self, ctx: &Context, name: &str) -> Result<Collection> {
        let req = self.conn.new_request(
            Method::Get,
            &join_path(&[&self.rel_path("_api/collection"), name]),
        )?;
        let resp = self.conn.execute(ctx, &req).await?;
        resp.check_status(&[200])?;
        Collection::new(name, &self.name, self.conn.clone())
    }

    /// Collection handle without checking that it exists
    pub fn collection_handle(&self, name: &str) -> Result<Collection> {
        Collection::new(name, &self.name, self.conn.clone())
    }

    pub async fn collection_exists(&self, ctx: &Context, name: &str) -> Result<bool> {
        let req = self.conn.new_request(
            Method::Get,
            &join_path(&[&self.rel_path("_api/collection"), name]),
        )?;
        let resp = self.conn.execute(ctx, &req).await?;
        match resp.check_status(&[200]) {
            Ok(()) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// All collections in the database
    pub async fn collections(&self, ctx: &Context) -> Result<Vec<Collection>> {
        let req = self
            .conn
            .new_request(Method::Get, &self.rel_path("_api/collection"))?;
        let resp = self.conn.execute(ctx, &req).await?;
        resp.check_status(&[200])?;
        let data: CollectionListResponse = resp.parse_body()?;
        data.result
            .iter()
            .map(|info| Collection::new(&info.name, &self.name, self.conn.clone()))
            .collect()
    }

    /// Create a collection and open it. An existing name yields Conflict.
    pub async fn create_collection(
        &self,
        ctx: &Context,
        name: &str,
        options: Option<&CollectionOptions>,
    ) -> Result<Collection> {
        if name.is_empty() {
            return Err(Error::invalid_argument("collection name is empty"));
        }
        let defaults = CollectionOptions::default();
        let body = serde_json::to_value(CreateCollectionRequest {
            name,
            options: options.unwrap_or(&defaults),
        })?;
        let mut req = self
            .conn
            .new_request(Method::Post, &self.rel_path("_api/collection"))?;
        req.set_body(body);
        let resp = self.conn.execute(ctx, &req).await?;
        resp.check_status(&[200])?;
        tracing::info!(database = %self.name, collection = %name, "collection created");
        Collection::new(name, &self.name, self.conn.clone())
    }

    /// Drop this database
    pub async fn remove(&self, ctx: &Context) -> Result<()> {
        let req = self.conn.new_request(
            Method::Delete,
            &join_path(&["_db/_system/_api/database", &self.name]),
        )?;
        let resp = self.conn.execute(ctx, &req).await?;
        resp.check_status(&[200])
    }
}
