use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::backend::{gitlab_ci, refresh, simple, upstream, Backend, Error};
use crate::cache::Cache;

/// Builds a backend from its raw options string.
pub type Constructor = Arc<dyn Fn(&str) -> Result<Arc<dyn Backend>, Error> + Send + Sync>;

/// Name to constructor mapping consulted while building the rule set.
///
/// Owned by the composition root: populate it once, then share it read-only.
#[derive(Clone, Default)]
pub struct Registry {
    constructors: HashMap<String, Constructor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every backend shipped with this crate.
    pub fn with_builtin(cache: &Arc<dyn Cache>) -> Result<Self, Error> {
        let mut registry = Self::new();
        simple::register(&mut registry)?;
        upstream::register(&mut registry, cache)?;
        gitlab_ci::register(&mut registry)?;
        refresh::register(&mut registry, cache)?;
        Ok(registry)
    }

    pub fn register<F>(&mut self, name: &str, constructor: F) -> Result<(), Error>
    where
        F: Fn(&str) -> Result<Arc<dyn Backend>, Error> + Send + Sync + 'static,
    {
        if self.constructors.contains_key(name) {
            return Err(Error::DuplicateBackend(name.to_string()));
        }

        debug!("Registering backend '{name}'");
        self.constructors
            .insert(name.to_string(), Arc::new(constructor));
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<Constructor, Error> {
        self.constructors
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownBackend(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("backends", &self.names())
            .finish()
    }
}
