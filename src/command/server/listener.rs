use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use reauth::configuration::ServerConfig;

use crate::command;
use crate::command::server::http_server::serve_request;
use crate::command::server::ServerContext;

fn timeouts(server_config: &ServerConfig) -> [Duration; 2] {
    [
        Duration::from_secs(server_config.query_timeout),
        Duration::from_secs(server_config.query_timeout_grace_period),
    ]
}

pub struct Listener {
    binding_address: SocketAddr,
    context: ArcSwap<ServerContext>,
    timeouts: ArcSwap<[Duration; 2]>,
}

impl Listener {
    pub fn new(server_config: &ServerConfig, context: ServerContext) -> Self {
        let binding_address = SocketAddr::new(server_config.bind_address, server_config.port);

        Self {
            binding_address,
            context: ArcSwap::from_pointee(context),
            timeouts: ArcSwap::from_pointee(timeouts(server_config)),
        }
    }

    pub fn notify_config_change(&self, server_config: &ServerConfig, context: ServerContext) {
        let binding_address = SocketAddr::new(server_config.bind_address, server_config.port);
        if binding_address != self.binding_address {
            warn!(
                "Binding address changed to {binding_address}, restart to listen on it (still on {})",
                self.binding_address
            );
        }

        self.context.store(Arc::new(context));
        self.timeouts.store(Arc::new(timeouts(server_config)));
    }

    pub async fn serve(&self) -> Result<(), command::Error> {
        info!("Listening on {}", self.binding_address);
        let listener = TcpListener::bind(self.binding_address).await?;

        loop {
            debug!("Waiting for incoming connection");
            let (tcp, remote_address) = listener.accept().await?;

            debug!("Accepted connection from {remote_address}");
            let stream = TokioIo::new(tcp);
            let context = Arc::clone(&self.context.load());
            let timeouts = Arc::clone(&self.timeouts.load());

            tokio::spawn(Box::pin(serve_request(
                stream,
                context,
                timeouts,
                remote_address,
            )));
        }
    }
}
