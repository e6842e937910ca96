//! Lets CI jobs authenticate with their project path as the username and the
//! job token as the password: access is granted when GitLab accepts the token
//! for the project's git endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hyper::http::request::Parts;
use reqwest::{Client, StatusCode};
use tracing::{debug, error, instrument};

use crate::backend::http_client::{build_client, parse_url, ClientOptions};
use crate::backend::{Backend, Error, Registry};
use crate::options;
use crate::request_ext::HeaderExt;

pub const NAME: &str = "gitlabci";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_USERNAME: &str = "gitlab-ci-token";

#[derive(Debug)]
pub struct GitlabCi {
    url: url::Url,
    username: String,
    client: Client,
}

impl GitlabCi {
    pub fn new(config: &str) -> Result<Self, Error> {
        let options = options::parse(config)?;

        let url = parse_url("url", options.require("url")?)?;
        let client = build_client(ClientOptions {
            timeout: options.duration("timeout", DEFAULT_TIMEOUT)?,
            insecure: options.bool("insecure", false)?,
            follow_redirects: false,
        })?;

        Ok(Self {
            url,
            username: options.get("username").unwrap_or(DEFAULT_USERNAME).to_string(),
            client,
        })
    }

    /// Resolves `project` below the configured URL. Anything that would leave
    /// it (absolute or scheme-relative URLs, rooted paths, `..` segments) is refused.
    fn repository_url(&self, project: &str) -> Option<url::Url> {
        if project.starts_with(['/', '\\']) || project.contains("://") {
            return None;
        }

        let project = if project.ends_with(".git") {
            project.to_string()
        } else {
            format!("{project}.git")
        };

        let repository = self.url.join(&project).ok()?;
        let base_path = self
            .url
            .path()
            .rfind('/')
            .map_or("/", |index| &self.url.path()[..=index]);

        let contained = repository.origin() == self.url.origin()
            && repository.path().starts_with(base_path)
            && repository.query().is_none()
            && repository.fragment().is_none();
        contained.then_some(repository)
    }
}

#[async_trait]
impl Backend for GitlabCi {
    #[instrument(skip_all)]
    async fn authenticate(&self, parts: &Parts) -> Result<bool, Error> {
        let Some((project, token)) = parts.basic_auth() else {
            debug!("No basic credentials provided");
            return Ok(false);
        };

        let Some(repository) = self.repository_url(&project) else {
            debug!("Unable to resolve project '{project}'");
            return Ok(false);
        };

        let response = self
            .client
            .get(repository)
            .basic_auth(&self.username, Some(token))
            .send()
            .await
            .map_err(|e| {
                error!("GitLab request failed: {e}");
                Error::Upstream(e.to_string())
            })?;

        let status = response.status();
        debug!("GitLab answered {status} for project '{project}'");
        Ok(status == StatusCode::OK)
    }
}

pub fn register(registry: &mut Registry) -> Result<(), Error> {
    registry.register(NAME, |config| {
        let backend: Arc<dyn Backend> = Arc::new(GitlabCi::new(config)?);
        Ok(backend)
    })
}
