use std::{fmt, io};

use reauth::{cache, configuration};

use crate::command::argon;

#[derive(Debug)]
pub enum Error {
    IO(io::Error),
    Watcher(String),
    Configuration(configuration::Error),
    Argon(argon::Error),
    Http(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::IO(err) => write!(f, "IO error: {err}"),
            Error::Watcher(err) => write!(f, "Watcher error: {err}"),
            Error::Configuration(err) => write!(f, "Configuration error: {err}"),
            Error::Argon(err) => write!(f, "Password hashing error: {err}"),
            Error::Http(err) => write!(f, "HTTP client error: {err}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IO(err)
    }
}

impl From<notify::Error> for Error {
    fn from(err: notify::Error) -> Self {
        Error::Watcher(err.to_string())
    }
}

impl From<configuration::Error> for Error {
    fn from(err: configuration::Error) -> Self {
        Error::Configuration(err)
    }
}

impl From<cache::Error> for Error {
    fn from(err: cache::Error) -> Self {
        Error::Configuration(err.into())
    }
}

impl From<argon::Error> for Error {
    fn from(err: argon::Error) -> Self {
        Error::Argon(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(err.to_string())
    }
}
