//! RTMP ↔ RTSP/RTP remuxers
//!
//! Both directions live on the group and survive subscriber churn.
//!
//! Outbound ([`Rtmp2RtspRemuxer`]): consumes normalized messages, splits
//! the 4-byte length-prefixed NALUs out of the FLV body, and packetizes
//! per RFC 6184/7798/3640. Sequence headers are consumed to build the
//! SDP. Timestamps map to the codec clock (90 kHz video, sample-rate
//! audio).
//!
//! Inbound ([`Rtsp2RtmpRemuxer`]): reassembles access units from RTP
//! tracks, rebuilds FLV-bodied messages, synthesizes the AVC/HEVC
//! sequence header from in-band parameter sets, and anchors the wrapping
//! RTP timestamps to absolute milliseconds. Composition time is taken as
//! zero when the transport gives no PTS/DTS split.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::media::aac::AudioSpecificConfig;
use crate::media::h264::{self, AvcConfig, NaluType};
use crate::media::hevc::{self, HevcConfig};
use crate::media::message::{Codec, MediaMessage, MessageKind};
use crate::media::timestamp::RtpClock;
use crate::rtp::depacketizer::{AacDepacketizer, AvcDepacketizer, HevcDepacketizer};
use crate::rtp::packet::RtpPacket;
use crate::rtp::packetizer::{AacPacketizer, AvcPacketizer, HevcPacketizer};
use crate::sdp::{self, SessionDescription};

/// One outbound RTP packet plus the flags the subscriber queue policy
/// needs
#[derive(Debug, Clone)]
pub struct RtpOut {
    pub packet: RtpPacket,
    /// Part of a key video access unit
    pub keyframe: bool,
}

enum VideoPacketizer {
    Avc(AvcPacketizer),
    Hevc(HevcPacketizer),
}

/// RTMP → RTSP/RTP
pub struct Rtmp2RtspRemuxer {
    stream_name: String,
    avc_config: Option<AvcConfig>,
    hevc_config: Option<HevcConfig>,
    audio_config: Option<AudioSpecificConfig>,
    video: Option<VideoPacketizer>,
    audio: Option<AacPacketizer>,
}

impl Rtmp2RtspRemuxer {
    pub fn new(stream_name: &str) -> Self {
        Self {
            stream_name: stream_name.to_string(),
            avc_config: None,
            hevc_config: None,
            audio_config: None,
            video: None,
            audio: None,
        }
    }

    /// SDP for the current sequence headers, `None` until at least one
    /// track is configured.
    pub fn sdp(&self) -> Option<String> {
        if self.avc_config.is_none() && self.hevc_config.is_none() && self.audio_config.is_none() {
            return None;
        }
        let mut desc = SessionDescription::new(&self.stream_name);
        if let Some(config) = &self.avc_config {
            desc = desc.with_avc(config.clone());
        } else if let Some(config) = &self.hevc_config {
            desc = desc.with_hevc(config.clone());
        }
        if let Some(config) = &self.audio_config {
            desc = desc.with_aac(config.clone());
        }
        Some(desc.render())
    }

    /// Feed one normalized message; returns the RTP packets to fan out.
    pub fn on_message(&mut self, msg: &MediaMessage) -> Vec<RtpOut> {
        match msg.kind {
            MessageKind::Video if msg.is_seq_header => {
                self.on_video_seq_header(msg);
                Vec::new()
            }
            MessageKind::Video => self.on_video(msg),
            MessageKind::Audio if msg.is_seq_header => {
                self.on_audio_seq_header(msg);
                Vec::new()
            }
            MessageKind::Audio => self.on_audio(msg),
            MessageKind::Metadata => Vec::new(),
        }
    }

    fn on_video_seq_header(&mut self, msg: &MediaMessage) {
        if msg.payload.len() < 5 {
            return;
        }
        let record = msg.payload.slice(5..);
        match msg.codec {
            Some(Codec::Avc) => match AvcConfig::parse(record) {
                Ok(config) => {
                    self.avc_config = Some(config);
                    self.video
                        .get_or_insert_with(|| {
                            VideoPacketizer::Avc(AvcPacketizer::new(sdp::VIDEO_PAYLOAD_TYPE))
                        });
                }
                Err(e) => warn!(error = %e, "dropping bad avc sequence header"),
            },
            Some(Codec::Hevc) => match HevcConfig::parse(record) {
                Ok(config) => {
                    self.hevc_config = Some(config);
                    self.video
                        .get_or_insert_with(|| {
                            VideoPacketizer::Hevc(HevcPacketizer::new(sdp::VIDEO_PAYLOAD_TYPE))
                        });
                }
                Err(e) => warn!(error = %e, "dropping bad hevc sequence header"),
            },
            _ => {}
        }
    }

    fn on_audio_seq_header(&mut self, msg: &MediaMessage) {
        if msg.payload.len() < 2 {
            return;
        }
        match AudioSpecificConfig::parse(msg.payload.slice(2..)) {
            Ok(config) => {
                self.audio_config = Some(config);
                self.audio
                    .get_or_insert_with(|| AacPacketizer::new(sdp::AUDIO_PAYLOAD_TYPE));
            }
            Err(e) => warn!(error = %e, "dropping bad audio specific config"),
        }
    }

    fn on_video(&mut self, msg: &MediaMessage) -> Vec<RtpOut> {
        let Some(packetizer) = self.video.as_mut() else {
            debug!("video before sequence header, skipping rtp fan-out");
            return Vec::new();
        };
        if msg.payload.len() < 5 {
            return Vec::new();
        }

        let nalu_length_size = match packetizer {
            VideoPacketizer::Avc(_) => self
                .avc_config
                .as_ref()
                .map(|c| c.nalu_length_size)
                .unwrap_or(4),
            VideoPacketizer::Hevc(_) => self
                .hevc_config
                .as_ref()
                .map(|c| c.nalu_length_size)
                .unwrap_or(4),
        };

        let body = &msg.payload[5..];
        let nalus: Vec<&[u8]> = h264::NaluIterator::new(body, nalu_length_size).collect();
        if nalus.is_empty() {
            return Vec::new();
        }

        // RTP video timestamps carry presentation time.
        let rtp_ts = (msg.pts() * sdp::VIDEO_CLOCK_HZ as u64 / 1000) as u32;
        let packets = match packetizer {
            VideoPacketizer::Avc(p) => p.packetize(&nalus, rtp_ts),
            VideoPacketizer::Hevc(p) => p.packetize(&nalus, rtp_ts),
        };
        packets
            .into_iter()
            .map(|packet| RtpOut {
                packet,
                keyframe: msg.is_keyframe,
            })
            .collect()
    }

    fn on_audio(&mut self, msg: &MediaMessage) -> Vec<RtpOut> {
        let (Some(packetizer), Some(config)) = (self.audio.as_mut(), self.audio_config.as_ref())
        else {
            debug!("audio before sequence header, skipping rtp fan-out");
            return Vec::new();
        };
        if msg.payload.len() < 2 {
            return Vec::new();
        }

        let au = &msg.payload[2..];
        let rtp_ts = (msg.dts * config.sampling_frequency as u64 / 1000) as u32;
        vec![RtpOut {
            packet: packetizer.packetize(au, rtp_ts),
            keyframe: false,
        }]
    }
}

enum VideoDepacketizer {
    Avc(AvcDepacketizer),
    Hevc(HevcDepacketizer),
}

/// RTSP/RTP → RTMP
pub struct Rtsp2RtmpRemuxer {
    video_codec: Codec,
    video: VideoDepacketizer,
    audio: AacDepacketizer,
    video_clock: RtpClock,
    audio_clock: RtpClock,
    audio_config: Option<AudioSpecificConfig>,
    audio_header_sent: bool,
    /// Parameter sets last used to synthesize the video sequence header
    last_sps: Option<Bytes>,
    last_pps: Option<Bytes>,
}

impl Rtsp2RtmpRemuxer {
    pub fn new(video_codec: Codec, audio_clock_hz: u32) -> Self {
        let video = match video_codec {
            Codec::Hevc => VideoDepacketizer::Hevc(HevcDepacketizer::new()),
            _ => VideoDepacketizer::Avc(AvcDepacketizer::new()),
        };
        Self {
            video_codec,
            video,
            audio: AacDepacketizer::new(),
            video_clock: RtpClock::new(sdp::VIDEO_CLOCK_HZ),
            audio_clock: RtpClock::new(audio_clock_hz),
            audio_config: None,
            audio_header_sent: false,
            last_sps: None,
            last_pps: None,
        }
    }

    /// Provide the AudioSpecificConfig from the SDP so the AAC sequence
    /// header can be synthesized ahead of the first frame.
    pub fn set_audio_config(&mut self, config: AudioSpecificConfig) {
        self.audio_clock = RtpClock::new(config.sampling_frequency);
        self.audio_config = Some(config);
    }

    /// Feed one video-track packet.
    pub fn on_video_packet(&mut self, packet: &RtpPacket) -> Result<Vec<MediaMessage>> {
        let au = match &mut self.video {
            VideoDepacketizer::Avc(d) => d.push(packet)?,
            VideoDepacketizer::Hevc(d) => d.push(packet)?,
        };
        let Some(au) = au else {
            return Ok(Vec::new());
        };

        let dts = self.video_clock.to_ms(au.timestamp);
        let mut out = Vec::new();

        if self.video_codec == Codec::Avc {
            if let Some(header) = self.maybe_avc_seq_header(&au.nalus, dts) {
                out.push(header);
            }
        }

        let nalus: Vec<&[u8]> = au
            .nalus
            .iter()
            .map(|n| n.as_ref())
            .filter(|n: &&[u8]| !n.is_empty())
            .collect();
        if nalus.is_empty() {
            return Ok(out);
        }

        let keyframe = match self.video_codec {
            Codec::Hevc => nalus.iter().any(|n| {
                hevc::HevcNaluType::is_keyframe_type(hevc::HevcNaluType::from_header_byte(n[0]))
            }),
            _ => nalus
                .iter()
                .any(|n| NaluType::from_byte(n[0]) == Some(NaluType::Idr)),
        };

        let mut body = BytesMut::with_capacity(5 + nalus.iter().map(|n| n.len() + 4).sum::<usize>());
        let codec_id: u8 = if self.video_codec == Codec::Hevc { 12 } else { 7 };
        let frame_type: u8 = if keyframe { 0x10 } else { 0x20 };
        body.put_u8(frame_type | codec_id);
        body.put_u8(0x01); // coded frames
        body.put_slice(&[0x00, 0x00, 0x00]); // composition time: PTS-DTS unknown
        body.put_slice(&h264::nalus_to_avcc(&nalus));

        let mut msg = MediaMessage::video(self.video_codec, dts, 0, body.freeze());
        msg.is_keyframe = keyframe;
        out.push(msg);
        Ok(out)
    }

    /// Feed one audio-track packet.
    pub fn on_audio_packet(&mut self, packet: &RtpPacket) -> Result<Vec<MediaMessage>> {
        let aus = self.audio.push(packet)?;
        if aus.is_empty() {
            return Ok(Vec::new());
        }

        let config = self
            .audio_config
            .as_ref()
            .ok_or_else(|| Error::ProtocolViolation("audio packet before sdp config".into()))?;

        let dts = self.audio_clock.to_ms(packet.header.timestamp);
        let samples_per_frame = 1024u64;
        let frame_ms = samples_per_frame * 1000 / config.sampling_frequency as u64;

        let mut out = Vec::new();
        if !self.audio_header_sent {
            let mut body = BytesMut::with_capacity(2 + config.raw.len());
            body.put_slice(&[0xAF, 0x00]);
            body.put_slice(&config.raw);
            let mut header = MediaMessage::audio(Codec::Aac, dts, body.freeze());
            header.is_seq_header = true;
            out.push(header);
            self.audio_header_sent = true;
        }

        for (i, au) in aus.iter().enumerate() {
            let mut body = BytesMut::with_capacity(2 + au.len());
            body.put_slice(&[0xAF, 0x01]);
            body.put_slice(au);
            out.push(MediaMessage::audio(
                Codec::Aac,
                dts + i as u64 * frame_ms,
                body.freeze(),
            ));
        }
        Ok(out)
    }

    /// Synthesize the AVC sequence header when in-band SPS/PPS change.
    fn maybe_avc_seq_header(&mut self, nalus: &[Bytes], dts: u64) -> Option<MediaMessage> {
        let sps = nalus
            .iter()
            .find(|n| !n.is_empty() && NaluType::from_byte(n[0]) == Some(NaluType::Sps))?;
        let pps = nalus
            .iter()
            .find(|n| !n.is_empty() && NaluType::from_byte(n[0]) == Some(NaluType::Pps))?;

        if self.last_sps.as_ref() == Some(sps) && self.last_pps.as_ref() == Some(pps) {
            return None;
        }
        self.last_sps = Some(sps.clone());
        self.last_pps = Some(pps.clone());

        let record = h264::build_avc_decoder_config(sps, pps)?;

        let mut body = BytesMut::with_capacity(5 + record.len());
        body.put_u8(0x17);
        body.put_u8(0x00); // sequence header
        body.put_slice(&[0x00, 0x00, 0x00]);
        body.put_slice(&record);

        let mut msg = MediaMessage::video(Codec::Avc, dts, 0, body.freeze());
        msg.is_seq_header = true;
        Some(msg)
    }
}
