use argh::FromArgs;
use reauth::configuration::Configuration;

use crate::command;

mod http_server;
mod listener;
mod proxy;
mod server_context;
mod watcher;

use listener::Listener;
pub use server_context::ServerContext;
pub use watcher::ConfigWatcher;

#[derive(FromArgs, PartialEq, Debug)]
#[argh(
    subcommand,
    name = "serve",
    description = "Run the authorization gateway in front of the upstream"
)]
pub struct Options {}

pub struct Command {
    listener: Listener,
}

impl Command {
    pub fn new(config: &Configuration) -> Result<Command, command::Error> {
        let context = ServerContext::new(config)?;
        let listener = Listener::new(&config.server, context);

        Ok(Command { listener })
    }

    /// Swaps in a context built from `config`; a failing build leaves the current one serving.
    pub fn notify_config_change(&self, config: &Configuration) -> Result<(), command::Error> {
        let context = ServerContext::new(config)?;
        self.listener.notify_config_change(&config.server, context);
        Ok(())
    }

    pub async fn run(&self) -> Result<(), command::Error> {
        self.listener.serve().await
    }
}
