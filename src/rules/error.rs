use std::fmt;

use crate::{backend, failure};

#[derive(Debug)]
pub enum Error {
    MissingPath,
    MissingBackend,
    Backend {
        name: String,
        error: backend::Error,
    },
    Failure {
        handler: String,
        error: failure::Error,
    },
    InRule {
        rule: usize,
        line: Option<usize>,
        error: Box<Error>,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::MissingPath => write!(f, "at least one path is required"),
            Error::MissingBackend => write!(f, "at least one backend is required"),
            Error::Backend { name, error } => write!(f, "backend '{name}': {error}"),
            Error::Failure { handler, error } => write!(f, "failure '{handler}': {error}"),
            Error::InRule {
                rule,
                line: Some(line),
                error,
            } => write!(f, "rule #{rule} (line {line}): {error}"),
            Error::InRule {
                rule,
                line: None,
                error,
            } => write!(f, "rule #{rule}: {error}"),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// The underlying error, past any rule location.
    pub fn kind(&self) -> &Error {
        match self {
            Error::InRule { error, .. } => error.kind(),
            error => error,
        }
    }
}
