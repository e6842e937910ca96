use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use toml::Spanned;
use url::Url;

mod error;

use crate::backend::Registry;
use crate::cache::{self, Cache};
use crate::rules::config::RuleConfig;
use crate::rules::{self, RuleSet};
pub use error::Error;

#[derive(Clone, Debug, Deserialize)]
pub struct Configuration {
    pub server: ServerConfig,
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub cache: cache::Config,
    #[serde(default)]
    pub observability: Option<ObservabilityConfig>,
    #[serde(default)]
    pub rules: Vec<Spanned<RuleConfig>>,
    #[serde(skip)]
    source: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServerConfig {
    pub bind_address: IpAddr,
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
    /// Where allowed and unprotected requests are forwarded.
    pub upstream: Url,
    #[serde(default = "ServerConfig::default_upstream_timeout")]
    pub upstream_timeout: u64,
    #[serde(default = "ServerConfig::default_query_timeout")]
    pub query_timeout: u64,
    #[serde(default = "ServerConfig::default_query_timeout_grace_period")]
    pub query_timeout_grace_period: u64,
    #[serde(default)]
    pub metrics_path: Option<String>,
}

impl ServerConfig {
    fn default_port() -> u16 {
        8000
    }

    fn default_upstream_timeout() -> u64 {
        60
    }

    fn default_query_timeout() -> u64 {
        3600
    }

    fn default_query_timeout_grace_period() -> u64 {
        60
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct GlobalConfig {
    #[serde(default = "GlobalConfig::default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    #[serde(default)]
    pub case_sensitive_paths: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        GlobalConfig {
            max_concurrent_requests: GlobalConfig::default_max_concurrent_requests(),
            case_sensitive_paths: false,
        }
    }
}

impl GlobalConfig {
    fn default_max_concurrent_requests() -> usize {
        4
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub tracing: Option<TracingConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TracingConfig {
    pub endpoint: String,
    pub sampling_rate: f64,
}

impl Configuration {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let config_str = fs::read_to_string(path)?;
        Self::load_from_str(&config_str)
    }

    pub fn load_from_str(slice: &str) -> Result<Self, Error> {
        let mut config: Configuration = toml::from_str(slice)?;

        if !matches!(config.server.upstream.scheme(), "http" | "https") {
            return Err(Error::ConfigurationFileFormat(format!(
                "unsupported upstream scheme: {}",
                config.server.upstream
            )));
        }

        config.source = slice.to_string();
        Ok(config)
    }

    /// Builds the rule set, with backends sharing `cache`.
    pub fn build_rules(&self, cache: &Arc<dyn Cache>) -> Result<RuleSet, Error> {
        let registry = Registry::with_builtin(cache)?;
        let rules = rules::config::build(
            &registry,
            &self.rules,
            &self.source,
            self.global.case_sensitive_paths,
        )?;

        Ok(rules)
    }
}
