//! Session identity at the group boundary
//!
//! Protocol front-ends own their sockets and parsers; what crosses into
//! the group is only an id and a protocol tag.

use std::fmt;

/// Process-unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Which front-end a session came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionProtocol {
    Rtmp,
    HttpFlv,
    HttpTs,
    Rtsp,
    /// Programmatic ingest
    Customize,
    /// Group-owned upstream pull acting as a virtual publisher
    RelayPull,
    /// Group-owned downstream push acting as a virtual subscriber
    RelayPush,
}

impl SessionProtocol {
    /// Subscribers of these protocols consume FLV-bodied media frames.
    pub fn consumes_media_frames(&self) -> bool {
        matches!(
            self,
            SessionProtocol::Rtmp
                | SessionProtocol::HttpFlv
                | SessionProtocol::Customize
                | SessionProtocol::RelayPush
        )
    }

    /// Subscribers of this protocol consume RTP packets.
    pub fn consumes_rtp(&self) -> bool {
        matches!(self, SessionProtocol::Rtsp)
    }

    /// Subscribers of this protocol consume raw transport-stream chunks.
    pub fn consumes_ts(&self) -> bool {
        matches!(self, SessionProtocol::HttpTs)
    }
}

impl fmt::Display for SessionProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionProtocol::Rtmp => "rtmp",
            SessionProtocol::HttpFlv => "httpflv",
            SessionProtocol::HttpTs => "httpts",
            SessionProtocol::Rtsp => "rtsp",
            SessionProtocol::Customize => "customize",
            SessionProtocol::RelayPull => "pull",
            SessionProtocol::RelayPush => "push",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partitions() {
        assert!(SessionProtocol::Rtmp.consumes_media_frames());
        assert!(SessionProtocol::HttpFlv.consumes_media_frames());
        assert!(SessionProtocol::Rtsp.consumes_rtp());
        assert!(SessionProtocol::HttpTs.consumes_ts());
        assert!(!SessionProtocol::Rtsp.consumes_media_frames());
        assert!(!SessionProtocol::Rtmp.consumes_ts());
    }

    #[test]
    fn test_display() {
        assert_eq!(SessionId(42).to_string(), "s42");
        assert_eq!(SessionProtocol::HttpFlv.to_string(), "httpflv");
    }
}
