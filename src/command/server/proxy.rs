use std::net::SocketAddr;
use std::time::Duration;
use std::{error, fmt};

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::header::{HeaderName, HeaderValue, CONNECTION, CONTENT_TYPE, HOST};
use hyper::http::request::Parts;
use hyper::{HeaderMap, Request, Response, StatusCode, Uri};
use reqwest::redirect::Policy;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, error, instrument};
use url::Url;

use reauth::request_ext::HeaderExt;
use reauth::{Handler, ResponseBody};

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
const X_FORWARDED_HOST: &str = "x-forwarded-host";

const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Peer address of the connection a request arrived on.
#[derive(Clone, Copy, Debug)]
pub struct RemoteAddress(pub SocketAddr);

#[derive(Debug)]
pub enum Error {
    Upstream(reqwest::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Upstream(err) => write!(f, "upstream request failed: {err}"),
        }
    }
}

impl error::Error for Error {}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Upstream(err)
    }
}

/// Final handler of the chain, forwarding requests to the configured upstream.
#[derive(Debug)]
pub struct Proxy {
    client: Client,
    upstream: Url,
}

impl Proxy {
    pub fn new(upstream: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .build()?;

        Ok(Self { client, upstream })
    }

    fn target(&self, uri: &Uri) -> Url {
        let mut url = self.upstream.clone();
        let base = self.upstream.path().trim_end_matches('/');
        url.set_path(&format!("{base}{}", uri.path()));
        url.set_query(uri.query());
        url
    }

    async fn forward<B>(&self, request: Request<B>) -> Result<Response<ResponseBody>, Error>
    where
        B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<Box<dyn error::Error + Send + Sync>>,
    {
        let (parts, body) = request.into_parts();
        let url = self.target(&parts.uri);
        debug!("Forwarding to {url}");

        let headers = forwarded_headers(&parts);
        let upstream_response = self
            .client
            .request(parts.method, url)
            .headers(headers)
            .body(reqwest::Body::wrap_stream(body.into_data_stream()))
            .send()
            .await?;

        let status = upstream_response.status();
        let mut headers = upstream_response.headers().clone();
        strip_hop_by_hop(&mut headers);

        let mut response = Response::new(ResponseBody::streaming(upstream_response.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

#[async_trait]
impl<B> Handler<B> for Proxy
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn error::Error + Send + Sync>>,
{
    #[instrument(skip_all)]
    async fn call(&self, request: Request<B>) -> Response<ResponseBody> {
        match self.forward(request).await {
            Ok(response) => response,
            Err(err) => {
                error!("{err}");
                let status = match &err {
                    Error::Upstream(err) if err.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
                    Error::Upstream(_) => StatusCode::BAD_GATEWAY,
                };
                gateway_error_response(status)
            }
        }
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

fn forwarded_headers(parts: &Parts) -> HeaderMap {
    let mut headers = parts.headers.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(HOST);

    if let Some(RemoteAddress(address)) = parts.extensions.get::<RemoteAddress>() {
        let forwarded_for = match parts.get_header(X_FORWARDED_FOR) {
            Some(previous) => format!("{previous}, {}", address.ip()),
            None => address.ip().to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    if !headers.contains_key(X_FORWARDED_PROTO) {
        let proto = if parts.is_secure() { "https" } else { "http" };
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static(proto));
    }

    if !headers.contains_key(X_FORWARDED_HOST) {
        if let Some(host) = parts.host().and_then(|host| HeaderValue::from_str(&host).ok()) {
            headers.insert(X_FORWARDED_HOST, host);
        }
    }

    headers
}

fn gateway_error_response(status: StatusCode) -> Response<ResponseBody> {
    let code = if status == StatusCode::GATEWAY_TIMEOUT {
        "GATEWAY_TIMEOUT"
    } else {
        "BAD_GATEWAY"
    };
    let body = json!({
        "errors": [{
            "code": code,
            "message": "the upstream service could not be reached",
        }]
    });

    let mut response = Response::new(ResponseBody::fixed(body.to_string().into_bytes()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
