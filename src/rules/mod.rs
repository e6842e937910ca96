//! Ordered rule set deciding, per request, whether it is unprotected, allowed
//! by one of its rule's backends, denied by the rule's failure handler, or
//! failed because a backend could not reach a verdict.
//!
//! Rules are scanned in declaration order and the first rule whose paths match
//! (and whose exceptions do not) is the only one evaluated. Overlapping
//! prefixes therefore need the most specific rule declared first.

use std::time::Instant;

use hyper::http::request::Parts;
use hyper::{HeaderMap, StatusCode};
use tracing::{debug, error, instrument};

use crate::backend::NamedBackend;
use crate::failure::FailureHandler;
use crate::metrics::{BACKEND_DURATION, BACKEND_RESULTS, DECISIONS};
use crate::{backend, failure};

pub mod config;
mod error;
mod path;
#[cfg(test)]
mod tests;

pub use error::Error;
pub use path::CanonicalPath;

#[derive(Debug)]
pub struct Rule {
    paths: Vec<String>,
    exceptions: Vec<String>,
    backends: Vec<NamedBackend>,
    on_failure: FailureHandler,
}

impl Rule {
    pub fn new(
        paths: Vec<String>,
        exceptions: Vec<String>,
        backends: Vec<NamedBackend>,
        on_failure: FailureHandler,
    ) -> Result<Self, Error> {
        if paths.is_empty() {
            return Err(Error::MissingPath);
        }
        if backends.is_empty() {
            return Err(Error::MissingBackend);
        }

        Ok(Self {
            paths,
            exceptions,
            backends,
            on_failure,
        })
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn exceptions(&self) -> &[String] {
        &self.exceptions
    }

    pub fn backends(&self) -> &[NamedBackend] {
        &self.backends
    }

    pub fn on_failure(&self) -> &FailureHandler {
        &self.on_failure
    }

    fn protects(&self, path: &str, case_sensitive: bool) -> bool {
        let matches = |pattern: &String| path_matches(pattern, path, case_sensitive);
        self.paths.iter().any(matches) && !self.exceptions.iter().any(matches)
    }
}

/// Prefix match; an empty pattern or `/` matches every path.
pub fn path_matches(pattern: &str, path: &str, case_sensitive: bool) -> bool {
    if pattern.is_empty() || pattern == "/" {
        return true;
    }

    if case_sensitive {
        path.starts_with(pattern)
    } else {
        path.to_lowercase().starts_with(&pattern.to_lowercase())
    }
}

#[derive(Debug)]
pub struct Denial {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

#[derive(Debug)]
pub enum EvaluationError {
    Backend {
        backend: String,
        error: backend::Error,
    },
    FailureHandler(failure::Error),
}

#[derive(Debug)]
pub enum Decision {
    /// No rule protects the path.
    Unprotected,
    Allowed { backend: String },
    Denied(Denial),
    Failed(EvaluationError),
}

impl Decision {
    fn label(&self) -> &'static str {
        match self {
            Decision::Unprotected => "unprotected",
            Decision::Allowed { .. } => "allowed",
            Decision::Denied(_) => "denied",
            Decision::Failed(_) => "error",
        }
    }
}

#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    case_sensitive: bool,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>, case_sensitive: bool) -> Self {
        Self {
            rules,
            case_sensitive,
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// The first rule protecting `path`, with its position. Rules see the
    /// decoded path with its dot segments resolved.
    pub fn select(&self, path: &str) -> Option<(usize, &Rule)> {
        let path = CanonicalPath::new(path);
        self.rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.protects(&path.decoded, self.case_sensitive))
    }

    #[instrument(skip_all, fields(path = %parts.uri.path()))]
    pub async fn evaluate(&self, parts: &Parts) -> Decision {
        let decision = match self.select(parts.uri.path()) {
            None => Decision::Unprotected,
            Some((index, rule)) => {
                debug!("Request matches rule #{}", index + 1);
                evaluate_rule(rule, parts).await
            }
        };

        DECISIONS.with_label_values(&[decision.label()]).inc();
        decision
    }
}

async fn evaluate_rule(rule: &Rule, parts: &Parts) -> Decision {
    for NamedBackend { name, backend } in &rule.backends {
        let start = Instant::now();
        let result = backend.authenticate(parts).await;
        BACKEND_DURATION
            .with_label_values(&[name.as_str()])
            .observe(start.elapsed().as_secs_f64());

        match result {
            Ok(true) => {
                debug!("Backend '{name}' allowed the request");
                BACKEND_RESULTS.with_label_values(&[name.as_str(), "allow"]).inc();
                return Decision::Allowed {
                    backend: name.clone(),
                };
            }
            Ok(false) => {
                debug!("Backend '{name}' denied the request");
                BACKEND_RESULTS.with_label_values(&[name.as_str(), "deny"]).inc();
            }
            Err(error) => {
                error!("Backend '{name}' failed: {error}");
                BACKEND_RESULTS.with_label_values(&[name.as_str(), "error"]).inc();
                return Decision::Failed(EvaluationError::Backend {
                    backend: name.clone(),
                    error,
                });
            }
        }
    }

    let mut headers = HeaderMap::new();
    match rule.on_failure.handle(parts, &mut headers) {
        Ok(status) => Decision::Denied(Denial { status, headers }),
        Err(error) => {
            error!("Failure handler failed: {error}");
            Decision::Failed(EvaluationError::FailureHandler(error))
        }
    }
}
