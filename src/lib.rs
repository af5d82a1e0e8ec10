//! Client for the mod hosting REST API.
//!
//! Every request goes through a token-bucket [`Quota`] before it is sent and
//! is classified into a success value or a typed [`Error`]. Rate-limited
//! requests are retried after a cooldown by the [`RetryCoordinator`]; all
//! other failures reach the caller unchanged.

mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod key;
pub mod quota;
pub mod retry;
pub mod types;

pub use client::Client;
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use http::RequestContext;
pub use key::Tier;
pub use quota::Quota;
pub use retry::RetryCoordinator;
