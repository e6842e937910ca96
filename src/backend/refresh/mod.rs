//! Validates bearer tokens through an OAuth-style refresh exchange.
//!
//! The client's bearer token is presented to the token endpoint together with
//! a `refresh_token` grant. A JSON object answer without the configured
//! failure key counts as a successful exchange and is cached for `lifetime`,
//! so later requests carrying the same token skip the endpoint entirely.

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hyper::http::request::Parts;
use reqwest::header::COOKIE;
use reqwest::{Client, Response};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, error, instrument, warn};

use crate::backend::http_client::{build_client, parse_url, ClientOptions};
use crate::backend::{Backend, Error, Registry};
use crate::cache::Cache;
use crate::options;
use crate::request_ext::HeaderExt;
use crate::secret::Secret;

pub const NAME: &str = "refresh";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_LIFETIME: Duration = Duration::from_secs(3 * 60 * 60);
const DEFAULT_LIMIT: u64 = 1000;
const DEFAULT_FAILURE_KEY: &str = "error";

#[derive(Debug)]
pub struct Refresh {
    url: url::Url,
    refresh_token: Option<Secret<String>>,
    client: Client,
    pass_cookies: bool,
    limit: usize,
    lifetime: Duration,
    failure_key: String,
    cache: Arc<dyn Cache>,
}

impl Refresh {
    pub fn new(config: &str, cache: Arc<dyn Cache>) -> Result<Self, Error> {
        let options = options::parse(config)?;

        let url = parse_url("url", options.require("url")?)?;
        let client = build_client(ClientOptions {
            timeout: options.duration("timeout", DEFAULT_TIMEOUT)?,
            insecure: options.bool("skipverify", false)?,
            follow_redirects: options.bool("follow", false)?,
        })?;

        let limit = options.int("limit", DEFAULT_LIMIT)?;
        let limit = usize::try_from(limit).map_err(|e| {
            Error::Options(options::Error::InvalidValue {
                key: "limit".to_string(),
                value: limit.to_string(),
                reason: e.to_string(),
            })
        })?;

        Ok(Self {
            url,
            refresh_token: options.get("refresh_token").map(Secret::from),
            client,
            pass_cookies: options.bool("cookies", false)?,
            limit,
            lifetime: options.duration("lifetime", DEFAULT_LIFETIME)?,
            failure_key: options
                .get("failure_key")
                .unwrap_or(DEFAULT_FAILURE_KEY)
                .to_string(),
            cache,
        })
    }

    /// Exchanges are only shared between requests hitting the same endpoint
    /// with the same configuration.
    fn cache_key(&self, token: &str, cookies: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.url.as_str());
        hasher.update([0u8]);
        if let Some(refresh_token) = &self.refresh_token {
            hasher.update(refresh_token.expose());
        }
        hasher.update([0u8]);
        hasher.update(&self.failure_key);
        hasher.update([0u8]);
        hasher.update(token);
        hasher.update([0u8]);
        hasher.update(cookies);
        format!("{NAME}:{}", hex::encode(hasher.finalize()))
    }

    async fn exchange(&self, token: &str, cookies: &str) -> Result<Response, Error> {
        let refresh_token = self
            .refresh_token
            .as_ref()
            .map_or(token, |refresh_token| refresh_token.expose().as_str());

        let mut request = self
            .client
            .post(self.url.clone())
            .bearer_auth(token)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ]);

        if !cookies.is_empty() {
            request = request.header(COOKIE, cookies);
        }

        request.send().await.map_err(|e| {
            error!("Token endpoint request failed: {e}");
            Error::Upstream(e.to_string())
        })
    }

    async fn read_limited(&self, mut response: Response) -> Result<Vec<u8>, Error> {
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > self.limit {
                let msg = format!("token endpoint response exceeds {} bytes", self.limit);
                return Err(Error::InvalidResponse(msg));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait]
impl Backend for Refresh {
    #[instrument(skip_all, fields(url = %self.url))]
    async fn authenticate(&self, parts: &Parts) -> Result<bool, Error> {
        let Some(token) = parts.bearer_token() else {
            debug!("No bearer token provided");
            return Ok(false);
        };

        let cookies = if self.pass_cookies {
            parts.cookies().join("; ")
        } else {
            String::new()
        };

        let key = self.cache_key(&token, &cookies);
        match self.cache.retrieve_value(&key).await {
            Ok(Some(_)) => {
                debug!("Token exchange found in cache");
                return Ok(true);
            }
            Ok(None) => {}
            Err(error) => warn!("Unable to read token cache: {error}"),
        }

        let response = self.exchange(&token, &cookies).await?;
        let status = response.status();
        if status.is_client_error() {
            debug!("Token endpoint rejected the token with {status}");
            return Ok(false);
        }
        if !status.is_success() {
            error!("Token endpoint answered {status}");
            return Err(Error::InvalidResponse(format!("unexpected status {status}")));
        }

        let body = self.read_limited(response).await?;
        let object: Map<String, Value> = serde_json::from_slice(&body).map_err(|e| {
            error!("Token endpoint answered with invalid JSON: {e}");
            Error::InvalidResponse(format!("expected a JSON object: {e}"))
        })?;

        if let Some(reason) = object.get(&self.failure_key) {
            debug!("Token exchange failed: {reason}");
            return Ok(false);
        }

        let exchange = Value::Object(object).to_string();
        if let Err(error) = self.cache.store_value(&key, &exchange, self.lifetime).await {
            warn!("Unable to cache token exchange: {error}");
        }

        Ok(true)
    }
}

pub fn register(registry: &mut Registry, cache: &Arc<dyn Cache>) -> Result<(), Error> {
    let cache = Arc::clone(cache);
    registry.register(NAME, move |config| {
        let backend: Arc<dyn Backend> = Arc::new(Refresh::new(config, Arc::clone(&cache))?);
        Ok(backend)
    })
}
