#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

pub mod backend;
pub mod cache;
pub mod configuration;
pub mod failure;
pub mod metrics;
pub mod middleware;
pub mod options;
pub mod request_ext;
pub mod rules;
pub mod secret;

pub use backend::{Backend, Registry};
pub use failure::FailureHandler;
pub use middleware::{Handler, Reauth, ResponseBody, SecureConnection};
pub use rules::{Decision, Rule, RuleSet};
