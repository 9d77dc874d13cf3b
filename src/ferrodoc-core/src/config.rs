use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a failover connection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// Timeout for requests whose context carries no deadline
    #[serde(
        rename = "default_timeout_secs",
        default = "default_timeout",
        with = "duration_secs"
    )]
    pub default_timeout: Duration,
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

impl ConnectionConfig {
    pub fn with_default_timeout(timeout: Duration) -> Self {
        Self {
            default_timeout: timeout,
        }
    }

    /// The configured timeout, or the one minute default when unset (zero)
    pub fn effective_timeout(&self) -> Duration {
        if self.default_timeout.is_zero() {
            default_timeout()
        } else {
            self.default_timeout
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            default_timeout: default_timeout(),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
