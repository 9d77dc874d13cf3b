use anyhow::Context as _;
use ferrodoc_core::{
    Connection, ConnectionConfig, Context, Database, Error, FailoverConnection, Method, Result,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::http::HttpEndpoint;

/// Client configuration, usually loaded from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server base URLs, tried in order
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    /// Timeout for calls without a caller deadline
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: f64,

    #[serde(default)]
    pub insecure_skip_verify: bool,
}

fn default_endpoints() -> Vec<String> {
    vec!["http://localhost:8529".to_string()]
}

fn default_timeout_secs() -> f64 {
    60.0
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            default_timeout_secs: default_timeout_secs(),
            insecure_skip_verify: false,
        }
    }
}

impl ClientConfig {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: ClientConfig = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        if config.endpoints.is_empty() {
            anyhow::bail!("config file {} lists no endpoints", path.display());
        }
        Ok(config)
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        let timeout = Duration::try_from_secs_f64(self.default_timeout_secs).unwrap_or_default();
        ConnectionConfig::with_default_timeout(timeout)
    }
}

#[derive(Deserialize)]
struct DatabaseListResponse {
    #[serde(default)]
    result: Vec<String>,
}

/// FerroDoc client: a failover connection over HTTP endpoints
pub struct Client {
    conn: Arc<FailoverConnection>,
}

impl Client {
    /// Create a client for the given endpoint URLs with default settings
    pub fn new<I, S>(endpoints: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let config = ClientConfig {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
            ..ClientConfig::default()
        };
        Self::from_config(&config)
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let endpoints = config
            .endpoints
            .iter()
            .map(|url| {
                HttpEndpoint::with_options(url.as_str(), config.insecure_skip_verify)
                    .map(|endpoint| Arc::new(endpoint) as Arc<dyn Connection>)
            })
            .collect::<Result<Vec<_>>>()?;
        let conn = FailoverConnection::new(config.connection_config(), endpoints)?;
        tracing::info!(
            endpoints = conn.endpoint_count(),
            "client configured for {}",
            config.endpoints.join(", ")
        );
        Ok(Self {
            conn: Arc::new(conn),
        })
    }

    /// The underlying failover connection
    pub fn connection(&self) -> Arc<FailoverConnection> {
        self.conn.clone()
    }

    /// Open an existing database. A missing database yields NotFound.
    pub async fn database(&self, ctx: &Context, name: &str) -> Result<Database> {
        let db = Database::new(name, self.conn.clone())?;
        db.info(ctx).await?;
        Ok(db)
    }

    pub async fn database_exists(&self, ctx: &Context, name: &str) -> Result<bool> {
        match self.database(ctx, name).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Names of all databases
    pub async fn databases(&self, ctx: &Context) -> Result<Vec<String>> {
        let req = self
            .conn
            .new_request(Method::Get, "_db/_system/_api/database")?;
        let resp = self.conn.execute(ctx, &req).await?;
        resp.check_status(&[200])?;
        let data: DatabaseListResponse = resp.parse_body()?;
        Ok(data.result)
    }

    /// Create a database and open it. An existing name yields Conflict.
    pub async fn create_database(&self, ctx: &Context, name: &str) -> Result<Database> {
        if name.is_empty() {
            return Err(Error::invalid_argument("database name is empty"));
        }
        let mut req = self
            .conn
            .new_request(Method::Post, "_db/_system/_api/database")?;
        req.set_body(serde_json::json!({ "name": name }));
        let resp = self.conn.execute(ctx, &req).await?;
        resp.check_status(&[201])?;
        tracing::info!(database = %name, "database created");
        Database::new(name, self.conn.clone())
    }
}
