//! H.265/HEVC parsing
//!
//! HEVC rides in RTMP the same way AVC does (enhanced-RTMP codec id 12,
//! AVCC-style length-prefixed NALUs) but with a two-byte NALU header and
//! the HEVCDecoderConfigurationRecord as the sequence header.
//!
//! The NALU type lives in bits 1..7 of the first header byte. Key frames
//! are the IRAP types: BLA (16..18), IDR (19..20), CRA (21).

use bytes::{Buf, Bytes};

use crate::error::{Error, Result};

use super::h264::NaluIterator;

/// HEVC NALU type (bits 1..7 of the first NALU byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HevcNaluType {
    TrailN = 0,
    TrailR = 1,
    BlaWLp = 16,
    BlaWRadl = 17,
    BlaNLp = 18,
    IdrWRadl = 19,
    IdrNLp = 20,
    Cra = 21,
    Vps = 32,
    Sps = 33,
    Pps = 34,
    Aud = 35,
    PrefixSei = 39,
    SuffixSei = 40,
}

impl HevcNaluType {
    pub fn from_header_byte(b: u8) -> u8 {
        (b >> 1) & 0x3F
    }

    /// IRAP test directly on the raw type value
    pub fn is_keyframe_type(ty: u8) -> bool {
        (16..=21).contains(&ty)
    }

    pub fn is_parameter_set_type(ty: u8) -> bool {
        (32..=34).contains(&ty)
    }
}

/// Whether any NALU in a length-prefixed buffer is an IRAP picture
pub fn avcc_contains_keyframe(data: &[u8], nalu_length_size: u8) -> bool {
    NaluIterator::new(data, nalu_length_size).any(|nalu| {
        HevcNaluType::is_keyframe_type(HevcNaluType::from_header_byte(nalu[0]))
    })
}

/// HEVC decoder configuration (from the sequence header)
///
/// Only the parts the remuxers need are retained: the parameter-set NALUs
/// grouped by type and the NALU length prefix size.
#[derive(Debug, Clone)]
pub struct HevcConfig {
    /// NALU length prefix size, usually 4
    pub nalu_length_size: u8,
    /// Video Parameter Sets
    pub vps: Vec<Bytes>,
    /// Sequence Parameter Sets
    pub sps: Vec<Bytes>,
    /// Picture Parameter Sets
    pub pps: Vec<Bytes>,
    /// Raw HEVCDecoderConfigurationRecord bytes
    pub raw: Bytes,
}

impl HevcConfig {
    /// Parse from an HEVCDecoderConfigurationRecord.
    ///
    /// The fixed 22-byte prelude is skipped except for
    /// `lengthSizeMinusOne`; then each array of NALUs is walked.
    pub fn parse(data: Bytes) -> Result<Self> {
        if data.len() < 23 {
            return Err(Error::ProtocolViolation("short hevc config".into()));
        }

        let raw = data.clone();
        let mut data = data;

        // configurationVersion .. lengthSizeMinusOne occupy bytes 0..22.
        let head = data.copy_to_bytes(22);
        if head[0] != 1 {
            return Err(Error::ProtocolViolation(format!(
                "hevc config version {}",
                head[0]
            )));
        }
        let nalu_length_size = (head[21] & 0x03) + 1;

        let num_arrays = data.get_u8() as usize;
        let mut vps = Vec::new();
        let mut sps = Vec::new();
        let mut pps = Vec::new();

        for _ in 0..num_arrays {
            if data.len() < 3 {
                return Err(Error::ProtocolViolation("truncated hevc array".into()));
            }
            let nalu_type = data.get_u8() & 0x3F;
            let count = data.get_u16() as usize;
            for _ in 0..count {
                if data.len() < 2 {
                    return Err(Error::ProtocolViolation("truncated hevc nalu".into()));
                }
                let len = data.get_u16() as usize;
                if data.len() < len {
                    return Err(Error::ProtocolViolation("truncated hevc nalu".into()));
                }
                let nalu = data.copy_to_bytes(len);
                match nalu_type {
                    32 => vps.push(nalu),
                    33 => sps.push(nalu),
                    34 => pps.push(nalu),
                    _ => {}
                }
            }
        }

        Ok(HevcConfig {
            nalu_length_size,
            vps,
            sps,
            pps,
            raw,
        })
    }
}
