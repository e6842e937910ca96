use std::{fmt, io};

use argon2::password_hash;

#[derive(Debug, PartialEq)]
pub enum Error {
    Input(String),
    Hashing(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Input(err) | Error::Hashing(err) => write!(f, "{err}"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Input(err.to_string())
    }
}

impl From<password_hash::Error> for Error {
    fn from(err: password_hash::Error) -> Self {
        Error::Hashing(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_error() {
        let error: Error = io::Error::other("no terminal").into();
        assert_eq!(error, Error::Input("no terminal".to_string()));
    }

    #[test]
    fn test_from_argon2_error() {
        let error: Error = password_hash::Error::Algorithm.into();
        assert_eq!(error, Error::Hashing("unsupported algorithm".to_string()));
    }
}
