use std::{fmt, io};

use opentelemetry_otlp::ExporterBuildError;
use tracing::debug;

use crate::{backend, cache, rules};

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    ConfigurationFileFormat(String),
    Cache(cache::Error),
    Backend(backend::Error),
    Rules(rules::Error),
    ExporterInit(ExporterBuildError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "IO error: {err}"),
            Error::ConfigurationFileFormat(error) => {
                write!(f, "Configuration file format error: {error}")
            }
            Error::Cache(err) => write!(f, "Cache error: {err}"),
            Error::Backend(err) => write!(f, "Backend error: {err}"),
            Error::Rules(err) => write!(f, "Rule error: {err}"),
            Error::ExporterInit(error) => {
                write!(f, "Exporter initialization error: {error}")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        debug!("TOML error: {error}");
        Error::ConfigurationFileFormat(error.to_string())
    }
}

impl From<cache::Error> for Error {
    fn from(error: cache::Error) -> Self {
        debug!("Cache error: {error}");
        Error::Cache(error)
    }
}

impl From<backend::Error> for Error {
    fn from(error: backend::Error) -> Self {
        Error::Backend(error)
    }
}

impl From<rules::Error> for Error {
    fn from(error: rules::Error) -> Self {
        Error::Rules(error)
    }
}

impl From<ExporterBuildError> for Error {
    fn from(error: ExporterBuildError) -> Self {
        Error::ExporterInit(error)
    }
}
