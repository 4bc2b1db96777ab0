//! RTMP ↔ FLV rewrap
//!
//! The cheapest remux in the crate: RTMP message bodies and FLV tag
//! bodies are the same bytes, so both directions only rewrite the small
//! header and share the payload by reference.
//!
//! Chunk-stream ids are assigned per message type (metadata and audio on
//! 4, video on 6) and the message stream id is always 1.

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::media::flv::{FlvTag, FlvTagType};
use crate::media::message::MediaMessage;

pub const MSG_TYPE_AUDIO: u8 = 8;
pub const MSG_TYPE_VIDEO: u8 = 9;
pub const MSG_TYPE_METADATA: u8 = 18;

pub const CSID_AMF: u8 = 4;
pub const CSID_AUDIO: u8 = 4;
pub const CSID_VIDEO: u8 = 6;

pub const MSID_DEFAULT: u32 = 1;

/// Parsed RTMP message header, as handed over by the chunk-stream layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtmpHeader {
    pub csid: u8,
    pub msg_len: u32,
    pub msg_type_id: u8,
    pub msg_stream_id: u32,
    /// Absolute timestamp in milliseconds
    pub timestamp: u32,
}

/// One parsed RTMP message
#[derive(Debug, Clone)]
pub struct RtmpMessage {
    pub header: RtmpHeader,
    pub payload: Bytes,
}

/// FLV tag header -> RTMP header
pub fn flv_tag_header_to_rtmp(tag_type: FlvTagType, data_size: u32, timestamp: u32) -> RtmpHeader {
    let (msg_type_id, csid) = match tag_type {
        FlvTagType::Script => (MSG_TYPE_METADATA, CSID_AMF),
        FlvTagType::Audio => (MSG_TYPE_AUDIO, CSID_AUDIO),
        FlvTagType::Video => (MSG_TYPE_VIDEO, CSID_VIDEO),
    };
    RtmpHeader {
        csid,
        msg_len: data_size,
        msg_type_id,
        msg_stream_id: MSID_DEFAULT,
        timestamp,
    }
}

/// FLV tag -> RTMP message; the payload is shared, not copied.
pub fn flv_tag_to_rtmp(tag: &FlvTag) -> RtmpMessage {
    RtmpMessage {
        header: flv_tag_header_to_rtmp(tag.tag_type, tag.data.len() as u32, tag.timestamp),
        payload: tag.data.clone(),
    }
}

/// RTMP message -> FLV tag; the payload is shared, not copied.
pub fn rtmp_to_flv_tag(msg: &RtmpMessage) -> Result<FlvTag> {
    let tag_type = match msg.header.msg_type_id {
        MSG_TYPE_AUDIO => FlvTagType::Audio,
        MSG_TYPE_VIDEO => FlvTagType::Video,
        MSG_TYPE_METADATA => FlvTagType::Script,
        other => {
            return Err(Error::ProtocolViolation(format!(
                "rtmp message type {other} is not an flv tag"
            )))
        }
    };
    Ok(FlvTag {
        tag_type,
        timestamp: msg.header.timestamp,
        data: msg.payload.clone(),
    })
}

/// Universal message -> RTMP message
pub fn message_to_rtmp(msg: &MediaMessage) -> RtmpMessage {
    flv_tag_to_rtmp(&FlvTag::from_message(msg))
}

/// RTMP message -> universal message, with codec/flag classification
pub fn rtmp_to_message(msg: &RtmpMessage) -> Result<MediaMessage> {
    Ok(rtmp_to_flv_tag(msg)?.to_message())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_mapping() {
        let header = flv_tag_header_to_rtmp(FlvTagType::Script, 10, 0);
        assert_eq!(header.msg_type_id, MSG_TYPE_METADATA);
        assert_eq!(header.csid, CSID_AMF);
        assert_eq!(header.msg_stream_id, 1);

        let header = flv_tag_header_to_rtmp(FlvTagType::Audio, 10, 0);
        assert_eq!(header.csid, CSID_AUDIO);

        let header = flv_tag_header_to_rtmp(FlvTagType::Video, 10, 0);
        assert_eq!(header.csid, CSID_VIDEO);
    }

    #[test]
    fn test_round_trip_preserves_payload_and_type() {
        let tag = FlvTag::video(1500, Bytes::from_static(&[0x17, 0x01, 0x00, 0x00, 0x00, 0xAA]));
        let rtmp = flv_tag_to_rtmp(&tag);
        assert_eq!(rtmp.header.msg_type_id, MSG_TYPE_VIDEO);
        assert_eq!(rtmp.header.msg_len, 6);
        assert_eq!(rtmp.header.timestamp, 1500);

        let back = rtmp_to_flv_tag(&rtmp).unwrap();
        assert_eq!(back.tag_type, FlvTagType::Video);
        assert_eq!(back.timestamp, 1500);
        assert_eq!(back.data, tag.data);
        // Shared, not copied.
        assert_eq!(back.data.as_ptr(), tag.data.as_ptr());
    }

    #[test]
    fn test_rtmp_to_flv_rejects_control_messages() {
        let msg = RtmpMessage {
            header: RtmpHeader {
                csid: 2,
                msg_len: 0,
                msg_type_id: 20, // AMF0 command
                msg_stream_id: 0,
                timestamp: 0,
            },
            payload: Bytes::new(),
        };
        assert!(rtmp_to_flv_tag(&msg).is_err());
    }

    #[test]
    fn test_message_to_rtmp_round_trip() {
        let tag = FlvTag::audio(777, Bytes::from_static(&[0xAF, 0x01, 0x21]));
        let original = tag.to_message();

        let rtmp = message_to_rtmp(&original);
        assert_eq!(rtmp.header.msg_type_id, MSG_TYPE_AUDIO);

        let back = rtmp_to_message(&rtmp).unwrap();
        assert_eq!(back.dts, original.dts);
        assert_eq!(back.payload, original.payload);
        assert_eq!(back.kind, original.kind);
    }
}
