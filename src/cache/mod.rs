use std::any::Any;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

mod config;
mod error;
pub mod memory;
pub mod redis;

pub use config::Config;
pub use error::Error;

/// Shared verdict and token store handed to the backends that remember upstream answers.
#[async_trait]
pub trait Cache: Any + Debug + Send + Sync {
    /// Store `value` under `key` for `ttl`. A zero `ttl` stores nothing.
    async fn store_value(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Error>;

    /// Returns `Ok(None)` when the key is unknown or expired.
    async fn retrieve_value(&self, key: &str) -> Result<Option<String>, Error>;
}
