use std::error;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Method, Request, Response};
use tracing::{error, info};

use reauth::configuration::Configuration;
use reauth::metrics::METRICS_PROVIDER;
use reauth::middleware::internal_error_response;
use reauth::{Handler, Reauth, ResponseBody};

use crate::command;
use crate::command::server::proxy::Proxy;

/// Everything a connection needs, rebuilt as a whole on configuration change.
pub struct ServerContext {
    reauth: Reauth<Proxy>,
    metrics_path: Option<String>,
}

impl ServerContext {
    pub fn new(config: &Configuration) -> Result<Self, command::Error> {
        let cache = config.cache.to_backend()?;
        let rules = config.build_rules(&cache)?;
        info!("Loaded {} rule(s)", rules.len());

        let proxy = Proxy::new(
            config.server.upstream.clone(),
            Duration::from_secs(config.server.upstream_timeout),
        )?;

        Ok(Self {
            reauth: Reauth::new(Arc::new(rules), proxy),
            metrics_path: config.server.metrics_path.clone(),
        })
    }

    pub async fn handle<B>(&self, request: Request<B>) -> Response<ResponseBody>
    where
        B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<Box<dyn error::Error + Send + Sync>>,
    {
        let is_metrics = self.metrics_path.as_deref() == Some(request.uri().path())
            && request.method() == Method::GET;

        if is_metrics {
            metrics_response()
        } else {
            self.reauth.call(request).await
        }
    }
}

fn metrics_response() -> Response<ResponseBody> {
    match METRICS_PROVIDER.gather() {
        Ok((content_type, metrics)) => {
            let mut response = Response::new(ResponseBody::fixed(metrics));
            if let Ok(content_type) = HeaderValue::from_str(&content_type) {
                response.headers_mut().insert(CONTENT_TYPE, content_type);
            }
            response
        }
        Err(err) => {
            error!("Failed to gather metrics: {err}");
            internal_error_response()
        }
    }
}
