//! Responses produced when a protected request is not authenticated by any
//! backend of its rule.

use std::fmt;

use hyper::header::{HeaderValue, LOCATION, WWW_AUTHENTICATE};
use hyper::http::request::Parts;
use hyper::{HeaderMap, StatusCode};
use url::form_urlencoded::byte_serialize;

use crate::options;
use crate::request_ext::HeaderExt;

pub const BASIC_AUTH: &str = "basicauth";
pub const STATUS: &str = "status";
pub const REDIRECT: &str = "redirect";

const URI_PLACEHOLDER: &str = "{uri}";

#[derive(Debug, PartialEq)]
pub enum Error {
    UnknownHandler(String),
    Options(options::Error),
    InvalidTarget { target: String, reason: String },
    InvalidHeader(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnknownHandler(name) => write!(f, "unknown failure handler: {name}"),
            Error::Options(err) => write!(f, "{err}"),
            Error::InvalidTarget { target, reason } => {
                write!(f, "invalid redirect target '{target}': {reason}")
            }
            Error::InvalidHeader(err) => write!(f, "invalid response header: {err}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<options::Error> for Error {
    fn from(error: options::Error) -> Self {
        Error::Options(error)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FailureHandler {
    /// `WWW-Authenticate: Basic` challenge. Without a realm, the request host is used.
    BasicAuth { realm: Option<String> },
    Status { code: StatusCode },
    /// `target` may hold a `{uri}` placeholder replaced by the escaped request URI.
    Redirect {
        target: String,
        target_host: Option<String>,
        code: StatusCode,
    },
}

impl Default for FailureHandler {
    fn default() -> Self {
        FailureHandler::BasicAuth { realm: None }
    }
}

fn target_host(target: &str) -> Result<Option<String>, Error> {
    if target.starts_with('/') {
        return Ok(None);
    }

    let url = url::Url::parse(target).map_err(|e| Error::InvalidTarget {
        target: target.to_string(),
        reason: e.to_string(),
    })?;

    Ok(authority(&url))
}

/// `host:port`, with the scheme's default port filled in when omitted.
fn authority(url: &url::Url) -> Option<String> {
    url.host_str().map(|host| match url.port_or_known_default() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn is_same_host(target_host: &str, scheme: &str, request_host: &str) -> bool {
    url::Url::parse(&format!("{scheme}://{request_host}/"))
        .ok()
        .and_then(|url| authority(&url))
        .is_some_and(|request_host| request_host == target_host)
}

impl FailureHandler {
    pub fn from_config(name: &str, config: &str) -> Result<Self, Error> {
        let options = options::parse(config)?;

        match name {
            BASIC_AUTH => Ok(FailureHandler::BasicAuth {
                realm: options.get("realm").map(ToString::to_string),
            }),
            STATUS => Ok(FailureHandler::Status {
                code: options.status_code("code", StatusCode::UNAUTHORIZED)?,
            }),
            REDIRECT => {
                let target = options.require("target")?.to_string();
                Ok(FailureHandler::Redirect {
                    target_host: target_host(&target)?,
                    code: options.status_code("code", StatusCode::FOUND)?,
                    target,
                })
            }
            _ => Err(Error::UnknownHandler(name.to_string())),
        }
    }

    /// Writes the handler's headers into `headers` and returns the response status.
    pub fn handle(&self, parts: &Parts, headers: &mut HeaderMap) -> Result<StatusCode, Error> {
        match self {
            FailureHandler::BasicAuth { realm } => {
                let realm = realm
                    .clone()
                    .or_else(|| parts.host())
                    .unwrap_or_default()
                    .replace('\\', "\\\\")
                    .replace('"', "\\\"");
                let challenge = format!(r#"Basic realm="{realm}""#);
                headers.insert(WWW_AUTHENTICATE, header_value(&challenge)?);
                Ok(StatusCode::UNAUTHORIZED)
            }
            FailureHandler::Status { code } => Ok(*code),
            FailureHandler::Redirect {
                target,
                target_host,
                code,
            } => {
                let location = redirect_location(parts, target, target_host.as_deref());
                headers.insert(LOCATION, header_value(&location)?);
                Ok(*code)
            }
        }
    }
}

fn header_value(value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value).map_err(|e| Error::InvalidHeader(format!("'{value}': {e}")))
}

fn redirect_location(parts: &Parts, target: &str, target_host: Option<&str>) -> String {
    if !target.contains(URI_PLACEHOLDER) {
        return target.to_string();
    }

    let path = parts
        .uri
        .path_and_query()
        .map_or("/", |path_and_query| path_and_query.as_str());

    // Send the client back to its own host when the login page lives elsewhere.
    let scheme = if parts.is_secure() { "https" } else { "http" };
    let uri = match (target_host, parts.host()) {
        (Some(target_host), Some(request_host))
            if !is_same_host(target_host, scheme, &request_host) =>
        {
            format!("{scheme}://{request_host}{path}")
        }
        _ => path.to_string(),
    };

    let escaped: String = byte_serialize(uri.as_bytes()).collect();
    target.replace(URI_PLACEHOLDER, &escaped)
}
