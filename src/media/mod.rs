//! Media model shared by every pipeline
//!
//! This module provides:
//! - the universal message type all caches and remuxers operate on
//! - FLV tag bodies and their codec/flag classification
//! - H.264/H.265 NALU and configuration-record parsing
//! - AAC AudioSpecificConfig and ADTS handling
//! - the GOP cache for late-joiner support
//! - timestamp synthesis (RTP unwrap, monotonic clamp, reorder window)

pub mod aac;
pub mod flv;
pub mod gop;
pub mod h264;
pub mod hevc;
pub mod message;
pub mod timestamp;

pub use aac::AudioSpecificConfig;
pub use flv::{FlvTag, FlvTagType};
pub use gop::GopCache;
pub use h264::{AvcConfig, NaluType};
pub use hevc::HevcConfig;
pub use message::{Codec, MediaMessage, MessageKind};
pub use timestamp::{MonotonicClamp, ReorderWindow, RtpClock};
