//! FLV tag model
//!
//! FLV is the framing RTMP uses for audio/video data: each RTMP
//! audio/video message is an FLV tag body without the tag header. The
//! same bodies travel over HTTP-FLV and into `.flv` recordings, with the
//! 11-byte tag header and back-pointers added back on.
//!
//! RTMP Video Data:
//! ```text
//! +----------+----------+
//! | FrameType| CodecID  | CodecData...
//! | (4 bits) | (4 bits) |
//! +----------+----------+
//! ```
//!
//! RTMP Audio Data:
//! ```text
//! +-----------+---------+----------+----------+
//! |SoundFormat|SoundRate|SoundSize |SoundType | AudioData...
//! | (4 bits)  | (2 bits)| (1 bit)  | (1 bit)  |
//! +-----------+---------+----------+----------+
//! ```

use bytes::Bytes;

use super::message::{Codec, MediaMessage, MessageKind};
use super::{h264, hevc};

/// FLV tag type, with the on-file type ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlvTagType {
    Audio = 8,
    Video = 9,
    Script = 18,
}

impl FlvTagType {
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            8 => Some(FlvTagType::Audio),
            9 => Some(FlvTagType::Video),
            18 => Some(FlvTagType::Script),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// Video frame type (upper 4 bits of the first payload byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFrameType {
    Keyframe = 1,
    InterFrame = 2,
    DisposableInterFrame = 3,
    GeneratedKeyframe = 4,
    VideoInfoFrame = 5,
}

impl VideoFrameType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match (b >> 4) & 0x0F {
            1 => Some(VideoFrameType::Keyframe),
            2 => Some(VideoFrameType::InterFrame),
            3 => Some(VideoFrameType::DisposableInterFrame),
            4 => Some(VideoFrameType::GeneratedKeyframe),
            5 => Some(VideoFrameType::VideoInfoFrame),
            _ => None,
        }
    }

    pub fn is_keyframe(&self) -> bool {
        matches!(
            self,
            VideoFrameType::Keyframe | VideoFrameType::GeneratedKeyframe
        )
    }
}

/// Video codec id (lower 4 bits of the first payload byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodecId {
    Avc = 7,
    Hevc = 12,
}

impl VideoCodecId {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x0F {
            7 => Some(VideoCodecId::Avc),
            12 => Some(VideoCodecId::Hevc),
            _ => None,
        }
    }

    pub fn to_codec(self) -> Codec {
        match self {
            VideoCodecId::Avc => Codec::Avc,
            VideoCodecId::Hevc => Codec::Hevc,
        }
    }
}

/// Audio sound format (upper 4 bits of the first payload byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundFormat {
    Aac = 10,
    Opus = 13,
}

impl SoundFormat {
    pub fn from_byte(b: u8) -> Option<Self> {
        match (b >> 4) & 0x0F {
            10 => Some(SoundFormat::Aac),
            13 => Some(SoundFormat::Opus),
            _ => None,
        }
    }

    pub fn to_codec(self) -> Codec {
        match self {
            SoundFormat::Aac => Codec::Aac,
            SoundFormat::Opus => Codec::Opus,
        }
    }
}

/// Parsed FLV tag: type, 32-bit millisecond timestamp, body
#[derive(Debug, Clone)]
pub struct FlvTag {
    pub tag_type: FlvTagType,
    pub timestamp: u32,
    pub data: Bytes,
}

impl FlvTag {
    pub fn video(timestamp: u32, data: Bytes) -> Self {
        Self {
            tag_type: FlvTagType::Video,
            timestamp,
            data,
        }
    }

    pub fn audio(timestamp: u32, data: Bytes) -> Self {
        Self {
            tag_type: FlvTagType::Audio,
            timestamp,
            data,
        }
    }

    pub fn script(timestamp: u32, data: Bytes) -> Self {
        Self {
            tag_type: FlvTagType::Script,
            timestamp,
            data,
        }
    }

    pub fn is_video(&self) -> bool {
        self.tag_type == FlvTagType::Video
    }

    pub fn is_audio(&self) -> bool {
        self.tag_type == FlvTagType::Audio
    }

    /// Video codec from the first payload byte
    pub fn video_codec(&self) -> Option<VideoCodecId> {
        if self.is_video() && !self.data.is_empty() {
            VideoCodecId::from_byte(self.data[0])
        } else {
            None
        }
    }

    /// Audio format from the first payload byte
    pub fn sound_format(&self) -> Option<SoundFormat> {
        if self.is_audio() && !self.data.is_empty() {
            SoundFormat::from_byte(self.data[0])
        } else {
            None
        }
    }

    /// Video sequence header: frame-type nibble 1, AVC/HEVC packet type 0
    pub fn is_video_seq_header(&self) -> bool {
        self.is_video()
            && self.data.len() >= 2
            && (self.data[0] >> 4) & 0x0F == 1
            && self.data[1] == 0
            && self.video_codec().is_some()
    }

    /// Audio sequence header: `0xAF 0x00` (AAC AudioSpecificConfig)
    pub fn is_audio_seq_header(&self) -> bool {
        self.is_audio()
            && self.data.len() >= 2
            && self.sound_format() == Some(SoundFormat::Aac)
            && self.data[1] == 0
    }

    /// Key-frame test by NALU scan: AVC is a key frame iff any NALU is
    /// IDR, HEVC iff any NALU is BLA/IDR/CRA. Sequence headers are not
    /// key frames.
    pub fn is_keyframe(&self) -> bool {
        if !self.is_video() || self.data.len() < 5 || self.is_video_seq_header() {
            return false;
        }
        let nalus = &self.data[5..];
        match self.video_codec() {
            Some(VideoCodecId::Avc) => h264::avcc_contains_idr(nalus, 4),
            Some(VideoCodecId::Hevc) => hevc::avcc_contains_keyframe(nalus, 4),
            None => false,
        }
    }

    /// Composition time offset from bytes 2..5 of a video body, signed 24-bit
    pub fn composition_time(&self) -> i32 {
        if !self.is_video() || self.data.len() < 5 {
            return 0;
        }
        let ct =
            ((self.data[2] as i32) << 16) | ((self.data[3] as i32) << 8) | (self.data[4] as i32);
        if ct & 0x80_0000 != 0 {
            ct | !0xFF_FFFF
        } else {
            ct
        }
    }

    /// Normalize into a universal message, classifying codec, sequence
    /// header, key frame, and composition time from the payload bytes.
    pub fn to_message(&self) -> MediaMessage {
        match self.tag_type {
            FlvTagType::Audio => {
                let mut msg = MediaMessage::audio(
                    self.sound_format()
                        .map(SoundFormat::to_codec)
                        .unwrap_or(Codec::Aac),
                    self.timestamp as u64,
                    self.data.clone(),
                );
                msg.is_seq_header = self.is_audio_seq_header();
                msg
            }
            FlvTagType::Video => {
                let mut msg = MediaMessage::video(
                    self.video_codec()
                        .map(VideoCodecId::to_codec)
                        .unwrap_or(Codec::Avc),
                    self.timestamp as u64,
                    self.composition_time(),
                    self.data.clone(),
                );
                msg.is_seq_header = self.is_video_seq_header();
                msg.is_keyframe = self.is_keyframe();
                msg
            }
            FlvTagType::Script => MediaMessage::metadata(self.timestamp as u64, self.data.clone()),
        }
    }

    /// Rebuild an FLV tag from a universal message
    pub fn from_message(msg: &MediaMessage) -> Self {
        let tag_type = match msg.kind {
            MessageKind::Audio => FlvTagType::Audio,
            MessageKind::Video => FlvTagType::Video,
            MessageKind::Metadata => FlvTagType::Script,
        };
        Self {
            tag_type,
            timestamp: msg.dts as u32,
            data: msg.payload.clone(),
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 0x17 0x01, cts 0, one IDR NALU
    const AVC_KEYFRAME: &[u8] = &[
        0x17, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0x65, 0x88, 0x84, 0x00, 0x00,
    ];
    // 0x27 0x01, cts 0, one non-IDR slice
    const AVC_INTER: &[u8] = &[
        0x27, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0x41, 0x9A, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn test_video_seq_header_detection() {
        let header = FlvTag::video(0, Bytes::from_static(&[0x17, 0x00, 0x00, 0x00, 0x00]));
        assert!(header.is_video_seq_header());
        assert!(!header.is_keyframe());

        let frame = FlvTag::video(0, Bytes::from_static(AVC_KEYFRAME));
        assert!(!frame.is_video_seq_header());
    }

    #[test]
    fn test_hevc_seq_header_detection() {
        // High nibble 1, codec id 12, packet type 0.
        let header = FlvTag::video(0, Bytes::from_static(&[0x1C, 0x00, 0x00, 0x00, 0x00]));
        assert!(header.is_video_seq_header());
        assert_eq!(header.video_codec(), Some(VideoCodecId::Hevc));
    }

    #[test]
    fn test_audio_seq_header_detection() {
        let header = FlvTag::audio(0, Bytes::from_static(&[0xAF, 0x00, 0x12, 0x10]));
        assert!(header.is_audio_seq_header());

        let frame = FlvTag::audio(0, Bytes::from_static(&[0xAF, 0x01, 0x21, 0x00]));
        assert!(!frame.is_audio_seq_header());
    }

    #[test]
    fn test_keyframe_by_nalu_scan() {
        assert!(FlvTag::video(0, Bytes::from_static(AVC_KEYFRAME)).is_keyframe());
        assert!(!FlvTag::video(0, Bytes::from_static(AVC_INTER)).is_keyframe());
    }

    #[test]
    fn test_keyframe_nibble_alone_is_not_enough() {
        // Frame-type nibble says key frame but the NALUs hold no IDR.
        let data = Bytes::from_static(&[
            0x17, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0x41, 0x9A, 0x00, 0x00, 0x00,
        ]);
        assert!(!FlvTag::video(0, data).is_keyframe());
    }

    #[test]
    fn test_composition_time() {
        let data = Bytes::from_static(&[0x27, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x01, 0x41]);
        assert_eq!(FlvTag::video(0, data).composition_time(), 256);

        let data = Bytes::from_static(&[0x27, 0x01, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x01, 0x41]);
        assert_eq!(FlvTag::video(0, data).composition_time(), -256);
    }

    #[test]
    fn test_to_message_video() {
        let msg = FlvTag::video(1234, Bytes::from_static(AVC_KEYFRAME)).to_message();
        assert!(msg.is_video());
        assert_eq!(msg.codec, Some(Codec::Avc));
        assert_eq!(msg.dts, 1234);
        assert!(msg.is_keyframe);
        assert!(!msg.is_seq_header);
    }

    #[test]
    fn test_to_message_audio_header() {
        let msg = FlvTag::audio(0, Bytes::from_static(&[0xAF, 0x00, 0x12, 0x10])).to_message();
        assert!(msg.is_audio());
        assert_eq!(msg.codec, Some(Codec::Aac));
        assert!(msg.is_seq_header);
    }

    #[test]
    fn test_message_round_trip() {
        let tag = FlvTag::video(5000, Bytes::from_static(AVC_INTER));
        let back = FlvTag::from_message(&tag.to_message());
        assert_eq!(back.tag_type, FlvTagType::Video);
        assert_eq!(back.timestamp, 5000);
        assert_eq!(back.data, tag.data);
    }

    #[test]
    fn test_tag_type_ids() {
        assert_eq!(FlvTagType::Audio.as_u8(), 8);
        assert_eq!(FlvTagType::Video.as_u8(), 9);
        assert_eq!(FlvTagType::Script.as_u8(), 18);
        assert_eq!(FlvTagType::from_u8(9), Some(FlvTagType::Video));
        assert_eq!(FlvTagType::from_u8(7), None);
    }

    #[test]
    fn test_empty_payloads() {
        let tag = FlvTag::video(0, Bytes::new());
        assert!(tag.video_codec().is_none());
        assert!(!tag.is_keyframe());
        assert!(!tag.is_video_seq_header());
        assert_eq!(tag.composition_time(), 0);
    }
}
