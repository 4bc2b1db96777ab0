//! Remux pipelines
//!
//! Translation between container/transport formats without touching the
//! coded samples: RTMP↔FLV header rewrap, RTMP↔RTSP/RTP, and the
//! key-frame-gated RTMP→MPEG-TS filter feeding HLS.

pub mod flv;
pub mod mpegts;
pub mod rtsp;

pub use flv::{RtmpHeader, RtmpMessage};
pub use mpegts::{FilterEvent, Rtmp2MpegtsFilter, TsFragment};
pub use rtsp::{Rtmp2RtspRemuxer, RtpOut, Rtsp2RtmpRemuxer};
