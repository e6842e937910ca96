use serde::{Deserialize, Deserializer};
use toml::Spanned;

use crate::backend::{NamedBackend, Registry};
use crate::failure::FailureHandler;
use crate::rules::{Error, Rule, RuleSet};

/// One `[[rules]]` block.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    #[serde(default, alias = "path", deserialize_with = "one_or_many")]
    pub paths: Vec<String>,
    #[serde(default, rename = "except", alias = "exceptions", deserialize_with = "one_or_many")]
    pub exceptions: Vec<String>,
    pub failure: Option<FailureConfig>,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FailureConfig {
    pub handler: String,
    #[serde(default)]
    pub options: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    pub name: String,
    pub options: String,
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(path) => vec![path],
        OneOrMany::Many(paths) => paths,
    })
}

fn line_of(source: &str, offset: usize) -> Option<usize> {
    source
        .get(..offset)
        .map(|before| before.matches('\n').count() + 1)
}

/// Builds the rule set, reporting errors with the rule ordinal and its line in `source`.
pub fn build(
    registry: &Registry,
    rules: &[Spanned<RuleConfig>],
    source: &str,
    case_sensitive: bool,
) -> Result<RuleSet, Error> {
    let rules = rules
        .iter()
        .enumerate()
        .map(|(index, rule)| {
            build_rule(registry, rule.get_ref()).map_err(|error| Error::InRule {
                rule: index + 1,
                line: line_of(source, rule.span().start),
                error: Box::new(error),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RuleSet::new(rules, case_sensitive))
}

pub fn build_rule(registry: &Registry, config: &RuleConfig) -> Result<Rule, Error> {
    if config.paths.is_empty() {
        return Err(Error::MissingPath);
    }

    let backends = config
        .backends
        .iter()
        .map(|backend| {
            let to_error = |error| Error::Backend {
                name: backend.name.clone(),
                error,
            };
            let constructor = registry.lookup(&backend.name).map_err(to_error)?;
            let instance = constructor(&backend.options).map_err(to_error)?;
            Ok(NamedBackend::new(&backend.name, instance))
        })
        .collect::<Result<Vec<_>, Error>>()?;

    let on_failure = match &config.failure {
        None => FailureHandler::default(),
        Some(failure) => FailureHandler::from_config(&failure.handler, &failure.options)
            .map_err(|error| Error::Failure {
                handler: failure.handler.clone(),
                error,
            })?,
    };

    Rule::new(
        config.paths.clone(),
        config.exceptions.clone(),
        backends,
        on_failure,
    )
}
