//! livehub: protocol-polyglot live streaming fan-out core
//!
//! A library for building live streaming servers that ingest one stream
//! over RTMP, RTSP/RTP, or programmatic feed, and redistribute it to many
//! subscribers over RTMP, HTTP-FLV, HTTP-TS, RTSP, and HLS, remuxing on
//! demand with sub-second latencies.
//!
//! The center of the crate is the [`group::Group`]: the per-stream
//! fan-out engine owning the single publisher slot, the subscriber set,
//! the sequence-header and GOP caches, the lazily created remuxers, and
//! the HLS pipeline. A [`group::ServerManager`] maps stream names to
//! groups, creates them on first reference, and garbage-collects them
//! once idle.
//!
//! Wire parsing stays outside: protocol front-ends parse their sockets
//! into small message types (`FlvTag`, `RtpPacket`) and hand them to the
//! group through publisher and subscriber handles.
//!
//! # Example
//!
//! ```no_run
//! use livehub::group::{GroupConfig, ServerManager, SessionProtocol};
//! use livehub::media::FlvTag;
//!
//! # async fn example() -> livehub::Result<()> {
//! let manager = ServerManager::new(GroupConfig::default());
//!
//! // A publisher front-end attaches...
//! let id = manager.next_session_id();
//! let publisher = manager
//!     .attach_publisher("live/demo", id, SessionProtocol::Rtmp)
//!     .await?;
//!
//! // ...and a player on another protocol subscribes.
//! let sub_id = manager.next_session_id();
//! let subscriber = manager
//!     .attach_subscriber("live/demo", sub_id, SessionProtocol::HttpFlv)
//!     .await?;
//!
//! # let tag: FlvTag = todo!();
//! publisher.publish_flv_tag(&tag).await?;
//! let _frame = subscriber.recv().await?;
//! # Ok(())
//! # }
//! ```

pub mod customize;
pub mod error;
pub mod group;
pub mod hls;
pub mod media;
pub mod mpegts;
pub mod record;
pub mod relay;
pub mod remux;
pub mod rtp;
pub mod sdp;
pub mod stats;
pub mod url;

pub use customize::CustomizeIngest;
pub use error::{Error, Result};
pub use group::{GroupConfig, ServerManager};
pub use stats::ServerStats;
pub use url::UrlContext;
