use std::time::Duration;

use reqwest::redirect::Policy;
use reqwest::Client;

use crate::backend::Error;

/// Outbound client settings shared by the backends that probe an upstream.
#[derive(Clone, Copy, Debug)]
pub struct ClientOptions {
    pub timeout: Duration,
    pub insecure: bool,
    pub follow_redirects: bool,
}

pub fn build_client(options: ClientOptions) -> Result<Client, Error> {
    let redirect_policy = if options.follow_redirects {
        Policy::default()
    } else {
        Policy::none()
    };

    Client::builder()
        .timeout(options.timeout)
        .danger_accept_invalid_certs(options.insecure)
        .redirect(redirect_policy)
        .build()
        .map_err(|e| Error::Initialization(format!("Failed to create HTTP client: {e}")))
}

pub fn parse_url(key: &str, value: &str) -> Result<url::Url, Error> {
    url::Url::parse(value).map_err(|e| {
        Error::Options(crate::options::Error::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
    })
}
