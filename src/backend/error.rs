use std::fmt;

use crate::{cache, options};

#[derive(Debug)]
pub enum Error {
    DuplicateBackend(String),
    UnknownBackend(String),
    Options(options::Error),
    Initialization(String),
    Upstream(String),
    InvalidResponse(String),
    Cache(cache::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::DuplicateBackend(name) => write!(f, "backend name already in use: {name}"),
            Error::UnknownBackend(name) => write!(f, "unknown backend: {name}"),
            Error::Options(err) => write!(f, "{err}"),
            Error::Initialization(err) => write!(f, "Initialization error: {err}"),
            Error::Upstream(err) => write!(f, "Upstream error: {err}"),
            Error::InvalidResponse(err) => write!(f, "Invalid upstream response: {err}"),
            Error::Cache(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<options::Error> for Error {
    fn from(error: options::Error) -> Self {
        Error::Options(error)
    }
}

impl From<cache::Error> for Error {
    fn from(error: cache::Error) -> Self {
        Error::Cache(error)
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        if error.is_builder() {
            Error::Initialization(error.to_string())
        } else if error.is_decode() {
            Error::InvalidResponse(error.to_string())
        } else {
            Error::Upstream(error.to_string())
        }
    }
}
