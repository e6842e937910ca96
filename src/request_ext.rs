use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use hyper::header::{AsHeaderName, AUTHORIZATION, COOKIE, HOST};
use hyper::http::request::Parts;

use crate::middleware::SecureConnection;

const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

pub trait HeaderExt {
    fn get_header<K: AsHeaderName>(&self, header: K) -> Option<String>;
    fn basic_auth(&self) -> Option<(String, String)>;
    fn bearer_token(&self) -> Option<String>;
    fn cookies(&self) -> Vec<String>;
    fn host(&self) -> Option<String>;
    fn is_secure(&self) -> bool;
}

impl HeaderExt for Parts {
    fn get_header<K>(&self, header: K) -> Option<String>
    where
        K: AsHeaderName,
    {
        self.headers
            .get(header)
            .and_then(|header| header.to_str().ok())
            .map(ToString::to_string)
    }

    fn basic_auth(&self) -> Option<(String, String)> {
        let authorization = self.get_header(AUTHORIZATION)?;
        let (scheme, encoded) = authorization.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }

        let decoded = BASE64_STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;

        Some((username.to_string(), password.to_string()))
    }

    fn bearer_token(&self) -> Option<String> {
        let authorization = self.get_header(AUTHORIZATION)?;
        let (scheme, token) = authorization.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        Some(token.to_string())
    }

    fn cookies(&self) -> Vec<String> {
        self.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|h| h.to_str().ok())
            .map(ToString::to_string)
            .collect()
    }

    /// `Host` header first, then the authority of an absolute request target.
    fn host(&self) -> Option<String> {
        self.get_header(HOST)
            .or_else(|| self.uri.authority().map(ToString::to_string))
    }

    fn is_secure(&self) -> bool {
        if self.extensions.get::<SecureConnection>().is_some()
            || self.uri.scheme_str() == Some("https")
        {
            return true;
        }

        self.get_header(X_FORWARDED_PROTO)
            .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
    }
}
