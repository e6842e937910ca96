//! Entry point placing a [`RuleSet`] in front of the next handler of a chain.
//!
//! Unprotected and allowed requests reach the next handler untouched. Denied
//! requests get the failure handler's status and headers. Requests whose
//! evaluation failed get a generic 500 that never carries backend error text.
//!
//! Dot segments are resolved before evaluation and the next handler receives
//! the resolved path, so the path that was authorized is the one forwarded.

use std::sync::Arc;

use async_trait::async_trait;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::http::uri::PathAndQuery;
use hyper::{HeaderMap, Request, Response, StatusCode, Uri};
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::rules::{CanonicalPath, Decision, Denial, RuleSet};

mod response_body;

pub use response_body::ResponseBody;

/// Request extension marking a connection whose TLS was terminated by this process.
#[derive(Clone, Copy, Debug)]
pub struct SecureConnection;

#[async_trait]
pub trait Handler<B>: Send + Sync {
    async fn call(&self, request: Request<B>) -> Response<ResponseBody>;
}

#[async_trait]
impl<B, T> Handler<B> for Arc<T>
where
    B: Send + 'static,
    T: Handler<B> + ?Sized,
{
    async fn call(&self, request: Request<B>) -> Response<ResponseBody> {
        self.as_ref().call(request).await
    }
}

pub struct Reauth<H> {
    rules: Arc<RuleSet>,
    next: H,
}

impl<H> Reauth<H> {
    pub fn new(rules: Arc<RuleSet>, next: H) -> Self {
        Self { rules, next }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }
}

#[async_trait]
impl<B, H> Handler<B> for Reauth<H>
where
    B: Send + 'static,
    H: Handler<B>,
{
    #[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
    async fn call(&self, request: Request<B>) -> Response<ResponseBody> {
        let (mut parts, body) = request.into_parts();

        let path = CanonicalPath::new(parts.uri.path());
        if path.raw != parts.uri.path() {
            match with_path(&parts.uri, &path.raw) {
                Ok(uri) => {
                    debug!("Resolved request path to {}", path.raw);
                    parts.uri = uri;
                }
                Err(err) => {
                    warn!("Unable to resolve request path: {err}");
                    return denied_response(Denial {
                        status: StatusCode::BAD_REQUEST,
                        headers: HeaderMap::new(),
                    });
                }
            }
        }

        match self.rules.evaluate(&parts).await {
            Decision::Unprotected | Decision::Allowed { .. } => {
                self.next.call(Request::from_parts(parts, body)).await
            }
            Decision::Denied(denial) => denied_response(denial),
            Decision::Failed(_) => internal_error_response(),
        }
    }
}

fn with_path(uri: &Uri, path: &str) -> Result<Uri, hyper::http::Error> {
    let path_and_query = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(path_and_query)?);
    Ok(Uri::from_parts(parts)?)
}

fn denied_response(denial: Denial) -> Response<ResponseBody> {
    let Denial { status, headers } = denial;
    let reason = status.canonical_reason().unwrap_or_default();
    let body = format!("{} {reason}\n", status.as_u16());

    let mut response = Response::new(ResponseBody::fixed(body.into_bytes()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response.headers_mut().extend(headers);
    response
}

pub fn internal_error_response() -> Response<ResponseBody> {
    let body = json!({
        "errors": [{
            "code": "INTERNAL_SERVER_ERROR",
            "message": "the request could not be authorized",
        }]
    });

    let mut response = Response::new(ResponseBody::fixed(body.to_string().into_bytes()));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
