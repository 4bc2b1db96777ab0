//! Group observer and authentication seams
//!
//! Callbacks fire under a short-lived section of the group lock and must
//! not reenter the group. Implementations are expected to be fast; the
//! ingest path does not wait on anything slower than a counter bump or a
//! channel send.

use crate::error::Result;
use crate::media::message::MediaMessage;

use super::session::{SessionId, SessionProtocol};

/// Who is publishing where
#[derive(Debug, Clone)]
pub struct PublishInfo {
    pub stream_name: String,
    pub session_id: SessionId,
    pub protocol: SessionProtocol,
}

/// Session-lifecycle observer registered on the manager
pub trait GroupObserver: Send + Sync {
    fn on_publish_start(&self, _info: &PublishInfo) {}

    /// Read-only look at each ingested message
    fn on_message(&self, _info: &PublishInfo, _msg: &MediaMessage) {}

    fn on_publish_stop(&self, _info: &PublishInfo) {}
}

/// Attach-time authentication hooks
pub trait StreamAuth: Send + Sync {
    fn on_publish(&self, _stream_name: &str, _session_id: SessionId) -> Result<()> {
        Ok(())
    }

    fn on_subscribe(&self, _stream_name: &str, _session_id: SessionId) -> Result<()> {
        Ok(())
    }
}

/// The default: everything is allowed
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl StreamAuth for AllowAll {}

impl GroupObserver for AllowAll {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all() {
        let auth = AllowAll;
        assert!(auth.on_publish("live/test", SessionId(1)).is_ok());
        assert!(auth.on_subscribe("live/test", SessionId(2)).is_ok());
    }

    #[test]
    fn test_observer_default_methods() {
        let observer = AllowAll;
        let info = PublishInfo {
            stream_name: "live/test".into(),
            session_id: SessionId(1),
            protocol: SessionProtocol::Rtmp,
        };
        observer.on_publish_start(&info);
        observer.on_publish_stop(&info);
    }
}
