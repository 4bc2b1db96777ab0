//! Universal media message
//!
//! The lingua franca inside a group. Every publisher normalizes into this
//! type and every cache, queue, and remuxer operates on it.
//!
//! The payload is the FLV tag body for the message type: audio and video
//! payloads keep their one/two-byte FLV codec prefix (`0x17 0x01 ...`,
//! `0xAF 0x01 ...`), metadata payloads are the raw AMF body. `Bytes`
//! reference counting makes cloning cheap; payloads are never mutated
//! after construction.

use bytes::Bytes;

/// Message type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Audio,
    Video,
    Metadata,
}

/// Codec tag for audio/video messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// AAC audio
    Aac,
    /// H.264 / AVC video
    Avc,
    /// H.265 / HEVC video
    Hevc,
    /// Opus audio (header-less; never carries a sequence header)
    Opus,
}

impl Codec {
    pub fn is_video(&self) -> bool {
        matches!(self, Codec::Avc | Codec::Hevc)
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Codec::Aac | Codec::Opus)
    }
}

/// One normalized media message
///
/// Timestamps are absolute milliseconds after synthesis; `dts` is the
/// decode timestamp and `composition_time` the PTS offset for video
/// (PTS = DTS + composition_time).
#[derive(Debug, Clone)]
pub struct MediaMessage {
    /// Message type
    pub kind: MessageKind,
    /// Codec, absent for metadata
    pub codec: Option<Codec>,
    /// Decode timestamp in absolute milliseconds
    pub dts: u64,
    /// Composition time offset in milliseconds (video only)
    pub composition_time: i32,
    /// Whether this is a codec sequence header
    pub is_seq_header: bool,
    /// Whether this is a key video frame
    pub is_keyframe: bool,
    /// Stream-scoped monotonically increasing sequence number
    pub seq: u64,
    /// FLV-bodied payload, shared by reference
    pub payload: Bytes,
}

impl MediaMessage {
    /// Create an audio message
    pub fn audio(codec: Codec, dts: u64, payload: Bytes) -> Self {
        Self {
            kind: MessageKind::Audio,
            codec: Some(codec),
            dts,
            composition_time: 0,
            is_seq_header: false,
            is_keyframe: false,
            seq: 0,
            payload,
        }
    }

    /// Create a video message
    pub fn video(codec: Codec, dts: u64, composition_time: i32, payload: Bytes) -> Self {
        Self {
            kind: MessageKind::Video,
            codec: Some(codec),
            dts,
            composition_time,
            is_seq_header: false,
            is_keyframe: false,
            seq: 0,
            payload,
        }
    }

    /// Create a metadata message
    pub fn metadata(dts: u64, payload: Bytes) -> Self {
        Self {
            kind: MessageKind::Metadata,
            codec: None,
            dts,
            composition_time: 0,
            is_seq_header: false,
            is_keyframe: false,
            seq: 0,
            payload,
        }
    }

    /// Presentation timestamp in milliseconds
    pub fn pts(&self) -> u64 {
        self.dts.saturating_add_signed(self.composition_time as i64)
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    pub fn is_audio(&self) -> bool {
        self.kind == MessageKind::Audio
    }

    pub fn is_video(&self) -> bool {
        self.kind == MessageKind::Video
    }

    pub fn is_metadata(&self) -> bool {
        self.kind == MessageKind::Metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pts_from_composition_time() {
        let mut msg = MediaMessage::video(Codec::Avc, 1000, 40, Bytes::new());
        assert_eq!(msg.pts(), 1040);

        msg.composition_time = -40;
        assert_eq!(msg.pts(), 960);
    }

    #[test]
    fn test_pts_saturates() {
        let msg = MediaMessage::video(Codec::Avc, 0, -100, Bytes::new());
        assert_eq!(msg.pts(), 0);
    }

    #[test]
    fn test_kind_helpers() {
        assert!(MediaMessage::audio(Codec::Aac, 0, Bytes::new()).is_audio());
        assert!(MediaMessage::video(Codec::Avc, 0, 0, Bytes::new()).is_video());
        assert!(MediaMessage::metadata(0, Bytes::new()).is_metadata());
    }

    #[test]
    fn test_codec_classes() {
        assert!(Codec::Avc.is_video());
        assert!(Codec::Hevc.is_video());
        assert!(Codec::Aac.is_audio());
        assert!(Codec::Opus.is_audio());
        assert!(!Codec::Aac.is_video());
    }

    #[test]
    fn test_payload_shared_by_reference() {
        let payload = Bytes::from_static(&[0x17, 0x01, 0x00]);
        let a = MediaMessage::video(Codec::Avc, 0, 0, payload.clone());
        let b = a.clone();
        // Same backing allocation, not a copy.
        assert_eq!(a.payload.as_ptr(), b.payload.as_ptr());
    }
}
