//! Authentication backends.
//!
//! A backend answers one question about a request: were its credentials
//! positively verified? `Ok(false)` is an ordinary deny and lets the rule try
//! its next backend. `Err` means the backend could not decide (unreachable
//! upstream, unreadable answer) and aborts the evaluation of the whole rule.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use hyper::http::request::Parts;

mod error;
pub mod gitlab_ci;
mod http_client;
pub mod refresh;
mod registry;
pub mod simple;
pub mod upstream;

pub use error::Error;
pub use registry::{Constructor, Registry};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Backend: Send + Sync {
    async fn authenticate(&self, parts: &Parts) -> Result<bool, Error>;
}

/// A constructed backend together with the registry name it was built from.
#[derive(Clone)]
pub struct NamedBackend {
    pub name: String,
    pub backend: Arc<dyn Backend>,
}

impl NamedBackend {
    pub fn new(name: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        Self {
            name: name.into(),
            backend,
        }
    }
}

impl fmt::Debug for NamedBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedBackend")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
