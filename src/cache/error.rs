use std::fmt;

use redis::RedisError;
use tracing::warn;

#[derive(Debug, PartialEq)]
pub enum Error {
    Backend(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Backend(err) => write!(f, "Cache error: {err}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<RedisError> for Error {
    fn from(error: RedisError) -> Self {
        warn!("Redis cache error: {error}");
        Error::Backend("redis backend unavailable".to_string())
    }
}
