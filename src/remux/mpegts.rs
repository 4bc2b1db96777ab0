//! RTMP → MPEG-TS filter
//!
//! Gates the normalized message stream into transport-stream fragments
//! that each begin with a video key frame. Messages accumulate until the
//! next key frame closes the fragment, or until an audio-only stream
//! spans `max_fragment_duration`. Every closed fragment carries its own
//! PAT+PMT followed by the PES packets; the very first key frame also
//! surfaces the PAT+PMT pair on its own for consumers that need it ahead
//! of any payload.
//!
//! Video is rewritten from AVCC to Annex-B with an access-unit delimiter,
//! and parameter sets are repeated ahead of every key frame. Audio gets
//! its ADTS framing back. Output depends only on the input stream, so
//! identical input yields identical transport packets.

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use crate::media::aac::{self, AudioSpecificConfig};
use crate::media::h264::{AvcConfig, NaluIterator};
use crate::media::hevc::HevcConfig;
use crate::media::message::{Codec, MediaMessage, MessageKind};
use crate::mpegts::{
    build_pat_pmt, write_pes, ContinuityCounters, ProgramLayout, PID_AUDIO, PID_VIDEO,
    STREAM_ID_AUDIO, STREAM_ID_VIDEO, STREAM_TYPE_AVC, STREAM_TYPE_HEVC, TICKS_PER_MS,
};

pub const DEFAULT_MAX_FRAGMENT_MS: u64 = 6000;

const ANNEXB_START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];
const AVC_AUD: [u8; 2] = [0x09, 0xF0];

/// One closed transport-stream fragment
#[derive(Debug, Clone)]
pub struct TsFragment {
    /// DTS of the first packet, milliseconds
    pub first_dts: u64,
    /// DTS of the last packet, milliseconds
    pub last_dts: u64,
    /// Whether the fragment opens with a video key frame
    pub key: bool,
    /// PAT+PMT followed by the PES transport packets
    pub data: Bytes,
}

/// Events produced while pushing messages through the filter
#[derive(Debug, Clone)]
pub enum FilterEvent {
    /// First key frame seen: the PAT+PMT pair for this program layout
    PatPmt(Bytes),
    /// A fragment closed
    Fragment(TsFragment),
}

/// The key-frame-gated RTMP → MPEG-TS filter
pub struct Rtmp2MpegtsFilter {
    max_fragment_ms: u64,
    queue: Vec<MediaMessage>,
    avc_config: Option<AvcConfig>,
    hevc_config: Option<HevcConfig>,
    audio_config: Option<AudioSpecificConfig>,
    video_stream_type: Option<u8>,
    started: bool,
    announced: bool,
    cc: ContinuityCounters,
    dropped_pre_key: u64,
}

impl Rtmp2MpegtsFilter {
    pub fn new(max_fragment_ms: u64) -> Self {
        Self {
            max_fragment_ms,
            queue: Vec::new(),
            avc_config: None,
            hevc_config: None,
            audio_config: None,
            video_stream_type: None,
            started: false,
            announced: false,
            cc: ContinuityCounters::new(),
            dropped_pre_key: 0,
        }
    }

    /// Messages dropped while waiting for the first key frame
    pub fn dropped_pre_key(&self) -> u64 {
        self.dropped_pre_key
    }

    /// Push one normalized message; returns any events it produced.
    pub fn push(&mut self, msg: &MediaMessage) -> Vec<FilterEvent> {
        match msg.kind {
            MessageKind::Metadata => Vec::new(),
            MessageKind::Video if msg.is_seq_header => {
                self.on_video_seq_header(msg);
                Vec::new()
            }
            MessageKind::Audio if msg.is_seq_header => {
                self.on_audio_seq_header(msg);
                Vec::new()
            }
            MessageKind::Video => self.on_video(msg),
            MessageKind::Audio => self.on_audio(msg),
        }
    }

    /// Close the open fragment, synthesizing the terminating boundary.
    pub fn flush(&mut self) -> Option<TsFragment> {
        let key = self.started;
        self.encode_fragment(key)
    }

    fn on_video_seq_header(&mut self, msg: &MediaMessage) {
        if msg.payload.len() < 5 {
            return;
        }
        let record = msg.payload.slice(5..);
        match msg.codec {
            Some(Codec::Hevc) => match HevcConfig::parse(record) {
                Ok(config) => {
                    self.hevc_config = Some(config);
                    self.video_stream_type = Some(STREAM_TYPE_HEVC);
                }
                Err(e) => warn!(error = %e, "mpegts filter: bad hevc sequence header"),
            },
            _ => match AvcConfig::parse(record) {
                Ok(config) => {
                    self.avc_config = Some(config);
                    self.video_stream_type = Some(STREAM_TYPE_AVC);
                }
                Err(e) => warn!(error = %e, "mpegts filter: bad avc sequence header"),
            },
        }
    }

    fn on_audio_seq_header(&mut self, msg: &MediaMessage) {
        if msg.payload.len() < 2 {
            return;
        }
        match AudioSpecificConfig::parse(msg.payload.slice(2..)) {
            Ok(config) => self.audio_config = Some(config),
            Err(e) => warn!(error = %e, "mpegts filter: bad audio specific config"),
        }
    }

    fn on_video(&mut self, msg: &MediaMessage) -> Vec<FilterEvent> {
        if msg.codec == Some(Codec::Opus) {
            return Vec::new();
        }
        let mut events = Vec::new();

        if msg.is_keyframe {
            if self.started {
                if let Some(fragment) = self.encode_fragment(true) {
                    events.push(FilterEvent::Fragment(fragment));
                }
            } else {
                // First key frame: announce the program and drop anything
                // queued from before it.
                self.started = true;
                self.dropped_pre_key += self.queue.len() as u64;
                self.queue.clear();
            }
            if !self.announced {
                self.announced = true;
                let mut cc = ContinuityCounters::new();
                events.push(FilterEvent::PatPmt(build_pat_pmt(self.layout(), &mut cc)));
            }
            self.queue.push(msg.clone());
        } else if self.started {
            self.queue.push(msg.clone());
        } else {
            self.dropped_pre_key += 1;
        }

        events
    }

    fn on_audio(&mut self, msg: &MediaMessage) -> Vec<FilterEvent> {
        if msg.codec == Some(Codec::Opus) {
            debug!("mpegts filter: opus audio is not carried in ts output");
            return Vec::new();
        }

        let mut events = Vec::new();
        let audio_only = self.video_stream_type.is_none();

        if !self.started && !audio_only {
            self.dropped_pre_key += 1;
            return events;
        }

        self.queue.push(msg.clone());

        // Audio-only streams cut on duration instead of key frames.
        if audio_only {
            let first = self.queue.first().map(|m| m.dts).unwrap_or(msg.dts);
            if msg.dts.saturating_sub(first) >= self.max_fragment_ms {
                if !self.announced {
                    self.announced = true;
                    let mut cc = ContinuityCounters::new();
                    events.push(FilterEvent::PatPmt(build_pat_pmt(self.layout(), &mut cc)));
                }
                if let Some(fragment) = self.encode_fragment(false) {
                    events.push(FilterEvent::Fragment(fragment));
                }
            }
        }

        events
    }

    fn layout(&self) -> ProgramLayout {
        ProgramLayout {
            video_stream_type: self.video_stream_type,
            has_audio: self.audio_config.is_some(),
        }
    }

    fn encode_fragment(&mut self, key: bool) -> Option<TsFragment> {
        if self.queue.is_empty() {
            return None;
        }

        let first_dts = self.queue.first().map(|m| m.dts).unwrap_or(0);
        let last_dts = self.queue.last().map(|m| m.dts).unwrap_or(first_dts);

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&build_pat_pmt(self.layout(), &mut self.cc));

        let queue = std::mem::take(&mut self.queue);
        for msg in &queue {
            match msg.kind {
                MessageKind::Video => {
                    if let Some(es) = self.video_to_annexb(msg) {
                        let dts90 = msg.dts * TICKS_PER_MS;
                        let pts90 = msg.pts() * TICKS_PER_MS;
                        let pcr = if msg.is_keyframe { Some(dts90) } else { None };
                        write_pes(
                            &mut buf,
                            &mut self.cc,
                            PID_VIDEO,
                            STREAM_ID_VIDEO,
                            pts90,
                            dts90,
                            &es,
                            pcr,
                        );
                    }
                }
                MessageKind::Audio => {
                    if let Some(es) = self.audio_to_adts(msg) {
                        let ts90 = msg.dts * TICKS_PER_MS;
                        write_pes(
                            &mut buf,
                            &mut self.cc,
                            PID_AUDIO,
                            STREAM_ID_AUDIO,
                            ts90,
                            ts90,
                            &es,
                            None,
                        );
                    }
                }
                MessageKind::Metadata => {}
            }
        }

        Some(TsFragment {
            first_dts,
            last_dts,
            key,
            data: buf.freeze(),
        })
    }

    /// AVCC FLV body -> Annex-B ES with AUD and repeated parameter sets.
    fn video_to_annexb(&self, msg: &MediaMessage) -> Option<Bytes> {
        if msg.payload.len() < 5 {
            return None;
        }
        let body = &msg.payload[5..];
        let is_hevc = msg.codec == Some(Codec::Hevc);
        let nalu_length_size = if is_hevc {
            self.hevc_config.as_ref().map(|c| c.nalu_length_size)?
        } else {
            self.avc_config.as_ref().map(|c| c.nalu_length_size)?
        };

        let mut es = BytesMut::with_capacity(body.len() + 64);
        if !is_hevc {
            es.extend_from_slice(&ANNEXB_START_CODE);
            es.extend_from_slice(&AVC_AUD);
        }

        if msg.is_keyframe {
            if is_hevc {
                if let Some(config) = &self.hevc_config {
                    for set in config.vps.iter().chain(&config.sps).chain(&config.pps) {
                        es.extend_from_slice(&ANNEXB_START_CODE);
                        es.extend_from_slice(set);
                    }
                }
            } else if let Some(config) = &self.avc_config {
                for set in config.sps.iter().chain(&config.pps) {
                    es.extend_from_slice(&ANNEXB_START_CODE);
                    es.extend_from_slice(set);
                }
            }
        }

        for nalu in NaluIterator::new(body, nalu_length_size) {
            es.extend_from_slice(&ANNEXB_START_CODE);
            es.extend_from_slice(nalu);
        }
        Some(es.freeze())
    }

    /// Raw FLV AAC body -> one ADTS frame.
    fn audio_to_adts(&self, msg: &MediaMessage) -> Option<Bytes> {
        if msg.payload.len() < 2 {
            return None;
        }
        let config = self.audio_config.as_ref()?;
        let raw = &msg.payload[2..];

        let mut es = BytesMut::with_capacity(7 + raw.len());
        es.extend_from_slice(&aac::generate_adts_header(config, raw.len()));
        es.extend_from_slice(raw);
        Some(es.freeze())
    }
}
