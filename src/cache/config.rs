use std::sync::Arc;

use serde::Deserialize;

use crate::cache::{memory, redis, Cache, Error};

#[derive(Clone, Debug, Default, Deserialize)]
pub enum Config {
    #[default]
    #[serde(rename = "memory")]
    Memory,
    #[serde(rename = "redis")]
    Redis(redis::BackendConfig),
}

impl Config {
    pub fn to_backend(&self) -> Result<Arc<dyn Cache>, Error> {
        match self {
            Config::Redis(config) => Ok(Arc::new(redis::Backend::new(config)?)),
            Config::Memory => Ok(Arc::new(memory::Backend::new())),
        }
    }
}
