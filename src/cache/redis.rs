use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::Deserialize;
use tracing::info;

use crate::cache::{Cache, Error};
use crate::secret::Secret;

#[derive(Clone, Debug, Deserialize)]
pub struct BackendConfig {
    pub url: Secret<String>,
    #[serde(default = "BackendConfig::default_key_prefix")]
    pub key_prefix: String,
}

impl BackendConfig {
    fn default_key_prefix() -> String {
        "reauth:".to_string()
    }
}

#[derive(Debug)]
pub struct Backend {
    client: redis::Client,
    key_prefix: String,
}

impl Backend {
    pub fn new(config: &BackendConfig) -> Result<Self, Error> {
        info!("Using Redis verdict cache");
        let client = redis::Client::open(config.url.expose().as_str())?;
        Ok(Backend {
            client,
            key_prefix: config.key_prefix.clone(),
        })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, Error> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl Cache for Backend {
    async fn store_value(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Error> {
        if ttl.is_zero() {
            return Ok(());
        }

        let mut conn = self.get_connection().await?;
        let key = format!("{}{key}", self.key_prefix);
        Ok(conn.set_ex(key, value, ttl.as_secs().max(1)).await?)
    }

    async fn retrieve_value(&self, key: &str) -> Result<Option<String>, Error> {
        let mut conn = self.get_connection().await?;
        let key = format!("{}{key}", self.key_prefix);
        Ok(conn.get(key).await?)
    }
}
