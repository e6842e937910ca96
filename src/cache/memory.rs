use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::cache::{Cache, Error};

const SWEEP_EVERY: usize = 1000;

#[derive(Debug, Default)]
pub struct Backend {
    entries: RwLock<HashMap<String, (String, Instant)>>,
    operations: AtomicUsize,
}

impl Backend {
    pub fn new() -> Self {
        info!("Using in-memory verdict cache");
        Self::default()
    }

    async fn maybe_sweep(&self) {
        if self.operations.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY != 0 {
            return;
        }

        let mut entries = self.entries.write().await;
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        debug!("Swept {} expired cache entries", before - entries.len());
    }
}

#[async_trait]
impl Cache for Backend {
    async fn store_value(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Error> {
        self.maybe_sweep().await;
        if ttl.is_zero() {
            return Ok(());
        }

        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn retrieve_value(&self, key: &str) -> Result<Option<String>, Error> {
        self.maybe_sweep().await;

        let entries = self.entries.read().await;
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Ok(Some(value.clone())),
            _ => Ok(None),
        }
    }
}
