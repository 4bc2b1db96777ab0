//! The fan-out core: groups, the manager, subscriber queues
//!
//! One [`Group`] per logical stream name, owned by the [`ServerManager`].
//! Front-end sessions become the group's single publisher or members of
//! its subscriber set; everything in between (caches, remuxers, HLS,
//! relay state) is group-private and serialized on the group lock.

pub mod config;
#[allow(clippy::module_inception)]
pub mod group;
pub mod manager;
pub mod observer;
pub mod session;
pub mod subscriber;

pub use config::GroupConfig;
pub use group::{Group, GroupStats, PublisherHandle};
pub use manager::ServerManager;
pub use observer::{AllowAll, GroupObserver, PublishInfo, StreamAuth};
pub use session::{SessionId, SessionProtocol};
pub use subscriber::{
    spawn_output_worker, EnqueueOutcome, OutFrame, SubscriberHandle, SubscriberQueue,
    SubscriberSink, TsChunk,
};
