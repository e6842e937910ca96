//! Delegates the decision to an upstream HTTP endpoint: the client's Basic
//! credentials (and optionally its cookies) are replayed in a `GET`, and an
//! exact `200 OK` means the client is logged in.


use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hyper::http::request::Parts;
use regex::Regex;
use reqwest::header::COOKIE;
use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};
use tracing::{debug, error, instrument, warn};

use crate::backend::http_client::{build_client, parse_url, ClientOptions};
use crate::backend::{Backend, Error, Registry};
use crate::cache::Cache;
use crate::options;
use crate::request_ext::HeaderExt;

pub const NAME: &str = "upstream";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct Upstream {
    url: url::Url,
    client: Client,
    pass_cookies: bool,
    follow_redirects: bool,
    match_url: Option<Regex>,
    cache_ttl: Duration,
    cache: Arc<dyn Cache>,
}

impl Upstream {
    pub fn new(config: &str, cache: Arc<dyn Cache>) -> Result<Self, Error> {
        let options = options::parse(config)?;

        let url = parse_url("url", options.require("url")?)?;
        let follow_redirects = options.bool("follow", false)?;
        let client = build_client(ClientOptions {
            timeout: options.duration("timeout", DEFAULT_TIMEOUT)?,
            insecure: options.bool("insecure", false)?,
            follow_redirects,
        })?;

        let match_url = options
            .get("match")
            .map(|expression| {
                Regex::new(expression).map_err(|e| {
                    Error::Options(options::Error::InvalidValue {
                        key: "match".to_string(),
                        value: expression.to_string(),
                        reason: e.to_string(),
                    })
                })
            })
            .transpose()?;

        Ok(Self {
            url,
            client,
            pass_cookies: options.bool("cookies", false)?,
            follow_redirects,
            match_url,
            cache_ttl: Duration::from_secs(options.int("cache_ttl", 0)?),
            cache,
        })
    }

    fn cache_key(&self, credentials: Option<&(String, String)>, cookies: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.url.as_str());
        hasher.update([0u8, u8::from(self.follow_redirects)]);
        if let Some(re) = &self.match_url {
            hasher.update(re.as_str());
        }
        if let Some((username, password)) = credentials {
            hasher.update([0u8]);
            hasher.update(username);
            hasher.update([0u8]);
            hasher.update(password);
        }
        hasher.update([0u8]);
        hasher.update(cookies);
        format!("{NAME}:{}", hex::encode(hasher.finalize()))
    }

    async fn cached_verdict(&self, key: &str) -> Option<bool> {
        if self.cache_ttl.is_zero() {
            return None;
        }

        match self.cache.retrieve_value(key).await {
            Ok(verdict) => verdict.map(|verdict| verdict == "true"),
            Err(error) => {
                warn!("Unable to read cached verdict: {error}");
                None
            }
        }
    }

    async fn store_verdict(&self, key: &str, allowed: bool) {
        if self.cache_ttl.is_zero() {
            return;
        }

        let verdict = if allowed { "true" } else { "false" };
        if let Err(error) = self.cache.store_value(key, verdict, self.cache_ttl).await {
            warn!("Unable to cache verdict: {error}");
        }
    }
}

#[async_trait]
impl Backend for Upstream {
    #[instrument(skip_all, fields(url = %self.url))]
    async fn authenticate(&self, parts: &Parts) -> Result<bool, Error> {
        let credentials = parts.basic_auth();
        if credentials.is_none() && !self.pass_cookies {
            debug!("No basic credentials provided");
            return Ok(false);
        }

        let cookies = if self.pass_cookies {
            parts.cookies().join("; ")
        } else {
            String::new()
        };

        let cache_key = self.cache_key(credentials.as_ref(), &cookies);
        if let Some(allowed) = self.cached_verdict(&cache_key).await {
            debug!("Using cached verdict: {allowed}");
            return Ok(allowed);
        }

        let mut request = self.client.get(self.url.clone());
        if let Some((username, password)) = &credentials {
            request = request.basic_auth(username, Some(password));
        }
        if !cookies.is_empty() {
            request = request.header(COOKIE, cookies);
        }

        let response = request.send().await.map_err(|e| {
            error!("Upstream request failed: {e}");
            Error::Upstream(e.to_string())
        })?;

        let status = response.status();
        let final_url = response.url().as_str();
        // Without `follow`, a redirect answer is a plain deny, not an error.
        let allowed = if status != StatusCode::OK {
            debug!("Upstream answered {status}");
            false
        } else if let Some(re) = self.match_url.as_ref().filter(|re| re.is_match(final_url)) {
            debug!("Final URL {final_url} matches '{re}'");
            false
        } else {
            true
        };

        self.store_verdict(&cache_key, allowed).await;
        Ok(allowed)
    }
}

pub fn register(registry: &mut Registry, cache: &Arc<dyn Cache>) -> Result<(), Error> {
    let cache = Arc::clone(cache);
    registry.register(NAME, move |config| {
        let backend: Arc<dyn Backend> = Arc::new(Upstream::new(config, Arc::clone(&cache))?);
        Ok(backend)
    })
}
