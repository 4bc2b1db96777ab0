//! SDP generation
//!
//! Builds the session description an RTSP subscriber needs, derived from
//! the cached sequence headers: sprop parameter sets for AVC/HEVC, the
//! AudioSpecificConfig for AAC.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::media::aac::AudioSpecificConfig;
use crate::media::h264::AvcConfig;
use crate::media::hevc::HevcConfig;

pub const VIDEO_PAYLOAD_TYPE: u8 = 96;
pub const AUDIO_PAYLOAD_TYPE: u8 = 97;
pub const VIDEO_CLOCK_HZ: u32 = 90_000;

pub const VIDEO_CONTROL: &str = "streamid=0";
pub const AUDIO_CONTROL: &str = "streamid=1";

/// Video half of a session description
#[derive(Debug, Clone)]
pub enum VideoDescription {
    Avc(AvcConfig),
    Hevc(HevcConfig),
}

/// Everything needed to render an SDP document
#[derive(Debug, Clone)]
pub struct SessionDescription {
    pub stream_name: String,
    pub video: Option<VideoDescription>,
    pub audio: Option<AudioSpecificConfig>,
}

impl SessionDescription {
    pub fn new(stream_name: &str) -> Self {
        Self {
            stream_name: stream_name.to_string(),
            video: None,
            audio: None,
        }
    }

    pub fn with_avc(mut self, config: AvcConfig) -> Self {
        self.video = Some(VideoDescription::Avc(config));
        self
    }

    pub fn with_hevc(mut self, config: HevcConfig) -> Self {
        self.video = Some(VideoDescription::Hevc(config));
        self
    }

    pub fn with_aac(mut self, config: AudioSpecificConfig) -> Self {
        self.audio = Some(config);
        self
    }

    /// Render the SDP document with CRLF line endings.
    pub fn render(&self) -> String {
        let mut lines: Vec<String> = vec![
            "v=0".into(),
            "o=- 0 0 IN IP4 127.0.0.1".into(),
            format!("s={}", self.stream_name),
            "c=IN IP4 0.0.0.0".into(),
            "t=0 0".into(),
        ];

        if let Some(video) = &self.video {
            lines.push(format!("m=video 0 RTP/AVP {VIDEO_PAYLOAD_TYPE}"));
            match video {
                VideoDescription::Avc(config) => {
                    lines.push(format!("a=rtpmap:{VIDEO_PAYLOAD_TYPE} H264/{VIDEO_CLOCK_HZ}"));
                    let sprop = sprop_join(&config.sps, &config.pps);
                    lines.push(format!(
                        "a=fmtp:{VIDEO_PAYLOAD_TYPE} packetization-mode=1; \
                         sprop-parameter-sets={sprop}; profile-level-id={}",
                        config.profile_level_id()
                    ));
                }
                VideoDescription::Hevc(config) => {
                    lines.push(format!("a=rtpmap:{VIDEO_PAYLOAD_TYPE} H265/{VIDEO_CLOCK_HZ}"));
                    lines.push(format!(
                        "a=fmtp:{VIDEO_PAYLOAD_TYPE} sprop-vps={}; sprop-sps={}; sprop-pps={}",
                        b64_join(&config.vps),
                        b64_join(&config.sps),
                        b64_join(&config.pps)
                    ));
                }
            }
            lines.push(format!("a=control:{VIDEO_CONTROL}"));
        }

        if let Some(audio) = &self.audio {
            lines.push(format!("m=audio 0 RTP/AVP {AUDIO_PAYLOAD_TYPE}"));
            lines.push(format!(
                "a=rtpmap:{AUDIO_PAYLOAD_TYPE} mpeg4-generic/{}/{}",
                audio.sampling_frequency, audio.channel_configuration
            ));
            lines.push(format!(
                "a=fmtp:{AUDIO_PAYLOAD_TYPE} profile-level-id=1;mode=AAC-hbr;\
                 sizelength=13;indexlength=3;indexdeltalength=3;config={}",
                audio.to_hex()
            ));
            lines.push(format!("a=control:{AUDIO_CONTROL}"));
        }

        let mut out = lines.join("\r\n");
        out.push_str("\r\n");
        out
    }
}

fn b64_join(sets: &[bytes::Bytes]) -> String {
    sets.iter()
        .map(|s| BASE64.encode(s))
        .collect::<Vec<_>>()
        .join(",")
}

fn sprop_join(sps: &[bytes::Bytes], pps: &[bytes::Bytes]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(sps.len() + pps.len());
    parts.extend(sps.iter().map(|s| BASE64.encode(s)));
    parts.extend(pps.iter().map(|s| BASE64.encode(s)));
    parts.join(",")
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn avc_config() -> AvcConfig {
        AvcConfig::parse(Bytes::from_static(&[
            0x01, 0x64, 0x00, 0x1F, 0xFF, 0xE1, 0x00, 0x04, 0x67, 0x64, 0x00, 0x1F, 0x01, 0x00,
            0x03, 0x68, 0xEF, 0x38,
        ]))
        .unwrap()
    }

    fn aac_config() -> AudioSpecificConfig {
        AudioSpecificConfig::parse(Bytes::from_static(&[0x12, 0x10])).unwrap()
    }

    #[test]
    fn test_render_video_and_audio() {
        let sdp = SessionDescription::new("live/test")
            .with_avc(avc_config())
            .with_aac(aac_config())
            .render();

        assert!(sdp.starts_with("v=0\r\n"));
        assert!(sdp.contains("s=live/test\r\n"));
        assert!(sdp.contains("m=video 0 RTP/AVP 96"));
        assert!(sdp.contains("a=rtpmap:96 H264/90000"));
        assert!(sdp.contains("profile-level-id=64001F"));
        assert!(sdp.contains(&format!(
            "sprop-parameter-sets={},{}",
            BASE64.encode([0x67, 0x64, 0x00, 0x1F]),
            BASE64.encode([0x68, 0xEF, 0x38])
        )));
        assert!(sdp.contains("m=audio 0 RTP/AVP 97"));
        assert!(sdp.contains("a=rtpmap:97 mpeg4-generic/44100/2"));
        assert!(sdp.contains("config=1210"));
        assert!(sdp.contains("a=control:streamid=0"));
        assert!(sdp.contains("a=control:streamid=1"));
        assert!(sdp.ends_with("\r\n"));
    }

    #[test]
    fn test_render_audio_only() {
        let sdp = SessionDescription::new("live/radio")
            .with_aac(aac_config())
            .render();

        assert!(!sdp.contains("m=video"));
        assert!(sdp.contains("m=audio"));
    }

    #[test]
    fn test_render_hevc() {
        let config = HevcConfig {
            nalu_length_size: 4,
            vps: vec![Bytes::from_static(&[0x40, 0x01])],
            sps: vec![Bytes::from_static(&[0x42, 0x01])],
            pps: vec![Bytes::from_static(&[0x44, 0x01])],
            raw: Bytes::new(),
        };
        let sdp = SessionDescription::new("live/uhd").with_hevc(config).render();

        assert!(sdp.contains("a=rtpmap:96 H265/90000"));
        assert!(sdp.contains("sprop-vps="));
        assert!(sdp.contains("sprop-sps="));
        assert!(sdp.contains("sprop-pps="));
    }
}
