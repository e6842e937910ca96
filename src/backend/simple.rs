//! Static `user=password` map checked against HTTP Basic credentials.
//!
//! Passwords starting with `$argon2` are PHC hashes (see the `argon` command);
//! anything else is a plain password compared through its SHA-256 digest.
//! PHC strings contain commas, so they must be quoted in the options string.

use std::collections::HashMap;
use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use async_trait::async_trait;
use hyper::http::request::Parts;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use crate::backend::{Backend, Error, Registry};
use crate::options;
use crate::request_ext::HeaderExt;
use crate::secret::Secret;

pub const NAME: &str = "simple";

#[derive(Debug)]
enum Credential {
    Argon2(Secret<String>),
    Digest([u8; 32]),
}

fn digest(password: &str) -> [u8; 32] {
    Sha256::digest(password.as_bytes()).into()
}

impl Credential {
    fn parse(username: &str, password: &str) -> Result<Self, Error> {
        if !password.starts_with("$argon2") {
            return Ok(Credential::Digest(digest(password)));
        }

        if let Err(error) = PasswordHash::new(password) {
            let msg = format!("invalid argon2 hash for user '{username}': {error}");
            return Err(Error::Initialization(msg));
        }
        Ok(Credential::Argon2(Secret::from(password)))
    }

    fn verify(&self, password: &str) -> bool {
        match self {
            Credential::Digest(expected) => *expected == digest(password),
            Credential::Argon2(hash) => {
                let Ok(hash) = PasswordHash::new(hash.expose()) else {
                    return false;
                };
                Argon2::default()
                    .verify_password(password.as_bytes(), &hash)
                    .is_ok()
            }
        }
    }
}

#[derive(Debug)]
pub struct Simple {
    credentials: HashMap<String, Credential>,
}

impl Simple {
    pub fn new(config: &str) -> Result<Self, Error> {
        let options = options::parse(config)?;
        if options.is_empty() {
            let msg = "at least one user=password pair is required".to_string();
            return Err(Error::Initialization(msg));
        }

        let credentials = options
            .iter()
            .map(|(username, password)| {
                Ok((username.to_string(), Credential::parse(username, password)?))
            })
            .collect::<Result<_, Error>>()?;

        Ok(Self { credentials })
    }
}

#[async_trait]
impl Backend for Simple {
    #[instrument(skip_all)]
    async fn authenticate(&self, parts: &Parts) -> Result<bool, Error> {
        let Some((username, password)) = parts.basic_auth() else {
            debug!("No basic credentials provided");
            return Ok(false);
        };

        let Some(credential) = self.credentials.get(&username) else {
            debug!("Unknown user '{username}'");
            return Ok(false);
        };

        if credential.verify(&password) {
            Ok(true)
        } else {
            warn!("Invalid password for user '{username}'");
            Ok(false)
        }
    }
}

pub fn register(registry: &mut Registry) -> Result<(), Error> {
    registry.register(NAME, |config| {
        let backend: Arc<dyn Backend> = Arc::new(Simple::new(config)?);
        Ok(backend)
    })
}

#[cfg(test)]
mod tests {
    use argon2::password_hash::rand_core::OsRng;
    use argon2::password_hash::SaltString;
    use argon2::PasswordHasher;
    use base64::prelude::BASE64_STANDARD;
    use base64::Engine;
    use hyper::header::AUTHORIZATION;
    use hyper::Request;

    use super::*;

    fn request(credentials: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/private");
        if let Some(credentials) = credentials {
            let encoded = BASE64_STANDARD.encode(credentials);
            builder = builder.header(AUTHORIZATION, format!("Basic {encoded}"));
        }
        let (parts, ()) = builder.body(()).unwrap().into_parts();
        parts
    }

    #[tokio::test]
    async fn test_plain_password() {
        let backend = Simple::new("bob=secret,alice=wonderland").unwrap();

        assert!(backend.authenticate(&request(Some("bob:secret"))).await.unwrap());
        assert!(backend
            .authenticate(&request(Some("alice:wonderland")))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_wrong_password_is_a_deny() {
        let backend = Simple::new("bob=secret").unwrap();

        assert!(!backend.authenticate(&request(Some("bob:wrong"))).await.unwrap());
        assert!(!backend.authenticate(&request(Some("eve:secret"))).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_credentials_is_a_deny() {
        let backend = Simple::new("bob=secret").unwrap();

        assert!(!backend.authenticate(&request(None)).await.unwrap());
    }

    #[tokio::test]
    async fn test_argon2_password() {
        let salt = SaltString::generate(OsRng);
        let hash = Argon2::default()
            .hash_password(b"secret", &salt)
            .unwrap()
            .to_string();

        let backend = Simple::new(&format!(r#"bob="{hash}""#)).unwrap();

        assert!(backend.authenticate(&request(Some("bob:secret"))).await.unwrap());
        assert!(!backend.authenticate(&request(Some("bob:wrong"))).await.unwrap());
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(matches!(Simple::new(""), Err(Error::Initialization(_))));
        assert!(matches!(Simple::new("bob"), Err(Error::Options(_))));
        assert!(matches!(
            Simple::new(r#"bob="$argon2id$v=19$m=19456,t=2,p=1$!!!$!!!""#),
            Err(Error::Initialization(_))
        ));
    }

    #[test]
    fn test_register() {
        let mut registry = Registry::new();
        register(&mut registry).unwrap();

        let constructor = registry.lookup(NAME).unwrap();
        assert!(constructor("bob=secret").is_ok());
    }
}
