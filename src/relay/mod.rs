//! Relay: on-demand upstream pull and static downstream push
//!
//! The group core never touches a socket; both relay directions are
//! driven through connector callbacks supplied by the embedding server.
//! A pull connector acts as a virtual publisher, a push connector as a
//! virtual subscriber.

pub mod pull;
pub mod push;

pub use pull::{backoff_delay, PullConnector};
pub use push::PushConnector;

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;

/// Boxed connector future
pub type ConnectorFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
