//! H.264/AVC parsing
//!
//! RTMP transports H.264 in AVCC format (length-prefixed NAL units); raw
//! elementary streams arrive in Annex-B (start-code delimited). Both are
//! handled here, along with the AVCDecoderConfigurationRecord carried in
//! the sequence header.
//!
//! AVCDecoderConfigurationRecord:
//! ```text
//! configurationVersion (1) | AVCProfileIndication (1) | profile_compatibility (1)
//! | AVCLevelIndication (1) | lengthSizeMinusOne (1, lower 2 bits)
//! | numOfSPS (1, lower 5 bits) | { spsLength (2) | spsNALUnit }*
//! | numOfPPS (1) | { ppsLength (2) | ppsNALUnit }*
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// NAL unit type (lower 5 bits of the first NALU byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluType {
    Slice = 1,
    SlicePartA = 2,
    SlicePartB = 3,
    SlicePartC = 4,
    Idr = 5,
    Sei = 6,
    Sps = 7,
    Pps = 8,
    Aud = 9,
    EndSeq = 10,
    EndStream = 11,
    Filler = 12,
}

impl NaluType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x1F {
            1 => Some(NaluType::Slice),
            2 => Some(NaluType::SlicePartA),
            3 => Some(NaluType::SlicePartB),
            4 => Some(NaluType::SlicePartC),
            5 => Some(NaluType::Idr),
            6 => Some(NaluType::Sei),
            7 => Some(NaluType::Sps),
            8 => Some(NaluType::Pps),
            9 => Some(NaluType::Aud),
            10 => Some(NaluType::EndSeq),
            11 => Some(NaluType::EndStream),
            12 => Some(NaluType::Filler),
            _ => None,
        }
    }

    pub fn is_keyframe(&self) -> bool {
        matches!(self, NaluType::Idr)
    }

    pub fn is_parameter_set(&self) -> bool {
        matches!(self, NaluType::Sps | NaluType::Pps)
    }
}

/// AVC decoder configuration (from the sequence header)
#[derive(Debug, Clone)]
pub struct AvcConfig {
    /// AVC profile (66=Baseline, 77=Main, 100=High)
    pub profile: u8,
    /// Profile compatibility flags
    pub compatibility: u8,
    /// AVC level (31 = 3.1)
    pub level: u8,
    /// NALU length prefix size, usually 4
    pub nalu_length_size: u8,
    /// Sequence Parameter Sets
    pub sps: Vec<Bytes>,
    /// Picture Parameter Sets
    pub pps: Vec<Bytes>,
    /// Raw AVCDecoderConfigurationRecord bytes
    pub raw: Bytes,
}

impl AvcConfig {
    /// Parse from an AVCDecoderConfigurationRecord
    pub fn parse(data: Bytes) -> Result<Self> {
        if data.len() < 7 {
            return Err(Error::ProtocolViolation("short avc config".into()));
        }

        let raw = data.clone();
        let mut data = data;

        let version = data.get_u8();
        if version != 1 {
            return Err(Error::ProtocolViolation(format!(
                "avc config version {version}"
            )));
        }

        let profile = data.get_u8();
        let compatibility = data.get_u8();
        let level = data.get_u8();
        let nalu_length_size = (data.get_u8() & 0x03) + 1;

        let num_sps = (data.get_u8() & 0x1F) as usize;
        let mut sps = Vec::with_capacity(num_sps);
        for _ in 0..num_sps {
            if data.len() < 2 {
                return Err(Error::ProtocolViolation("truncated sps".into()));
            }
            let len = data.get_u16() as usize;
            if data.len() < len {
                return Err(Error::ProtocolViolation("truncated sps".into()));
            }
            sps.push(data.copy_to_bytes(len));
        }

        if data.is_empty() {
            return Err(Error::ProtocolViolation("missing pps count".into()));
        }
        let num_pps = data.get_u8() as usize;
        let mut pps = Vec::with_capacity(num_pps);
        for _ in 0..num_pps {
            if data.len() < 2 {
                return Err(Error::ProtocolViolation("truncated pps".into()));
            }
            let len = data.get_u16() as usize;
            if data.len() < len {
                return Err(Error::ProtocolViolation("truncated pps".into()));
            }
            pps.push(data.copy_to_bytes(len));
        }

        Ok(AvcConfig {
            profile,
            compatibility,
            level,
            nalu_length_size,
            sps,
            pps,
            raw,
        })
    }

    /// `profile-level-id` hex triplet used in SDP fmtp lines
    pub fn profile_level_id(&self) -> String {
        format!(
            "{:02X}{:02X}{:02X}",
            self.profile, self.compatibility, self.level
        )
    }
}

/// Iterator over length-prefixed NAL units
pub struct NaluIterator<'a> {
    data: &'a [u8],
    offset: usize,
    nalu_length_size: usize,
}

impl<'a> NaluIterator<'a> {
    pub fn new(data: &'a [u8], nalu_length_size: u8) -> Self {
        Self {
            data,
            offset: 0,
            nalu_length_size: nalu_length_size as usize,
        }
    }
}

impl<'a> Iterator for NaluIterator<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset + self.nalu_length_size > self.data.len() {
            return None;
        }

        let mut len: usize = 0;
        for i in 0..self.nalu_length_size {
            len = (len << 8) | (self.data[self.offset + i] as usize);
        }
        self.offset += self.nalu_length_size;

        if len == 0 || self.offset + len > self.data.len() {
            return None;
        }

        let nalu = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Some(nalu)
    }
}

/// Whether any NALU in a length-prefixed buffer is an IDR slice
pub fn avcc_contains_idr(data: &[u8], nalu_length_size: u8) -> bool {
    NaluIterator::new(data, nalu_length_size)
        .any(|nalu| NaluType::from_byte(nalu[0]) == Some(NaluType::Idr))
}

/// Split an Annex-B elementary stream into NAL units.
///
/// Accepts both 3-byte and 4-byte start codes; leading bytes before the
/// first start code are discarded.
pub fn annexb_split(data: &[u8]) -> Vec<&[u8]> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    let mut i = 0;

    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && (data[i + 2] == 1 || (i + 4 <= data.len() && data[i + 2] == 0 && data[i + 3] == 1)) {
            let code_len = if data[i + 2] == 1 { 3 } else { 4 };
            if let Some(s) = start {
                out.push(&data[s..i]);
            }
            i += code_len;
            start = Some(i);
        } else {
            i += 1;
        }
    }
    if let Some(s) = start {
        if s < data.len() {
            out.push(&data[s..]);
        }
    }
    out
}

/// Build an AVCDecoderConfigurationRecord from one SPS and one PPS.
///
/// Profile, compatibility, and level come from the SPS; the record uses
/// 4-byte NALU length prefixes. Returns `None` for an SPS too short to
/// carry the profile triplet.
pub fn build_avc_decoder_config(sps: &[u8], pps: &[u8]) -> Option<Bytes> {
    if sps.len() < 4 {
        return None;
    }
    let mut record = BytesMut::with_capacity(11 + sps.len() + pps.len());
    record.put_u8(0x01);
    record.put_u8(sps[1]);
    record.put_u8(sps[2]);
    record.put_u8(sps[3]);
    record.put_u8(0xFF); // lengthSizeMinusOne = 3
    record.put_u8(0xE1); // one sps
    record.put_u16(sps.len() as u16);
    record.put_slice(sps);
    record.put_u8(0x01); // one pps
    record.put_u16(pps.len() as u16);
    record.put_slice(pps);
    Some(record.freeze())
}

/// Repack NAL units into an AVCC buffer with 4-byte length prefixes
pub fn nalus_to_avcc(nalus: &[&[u8]]) -> Bytes {
    let total: usize = nalus.iter().map(|n| n.len() + 4).sum();
    let mut buf = BytesMut::with_capacity(total);
    for nalu in nalus {
        buf.put_u32(nalu.len() as u32);
        buf.put_slice(nalu);
    }
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &[u8] = &[
        0x01, // version
        0x64, // profile (High)
        0x00, // compatibility
        0x1F, // level 3.1
        0xFF, // nalu length size = 4
        0xE1, // 1 SPS
        0x00, 0x04, 0x67, 0x64, 0x00, 0x1F, // SPS
        0x01, // 1 PPS
        0x00, 0x03, 0x68, 0xEF, 0x38, // PPS
    ];

    #[test]
    fn test_nalu_type() {
        assert_eq!(NaluType::from_byte(0x65), Some(NaluType::Idr));
        assert_eq!(NaluType::from_byte(0x67), Some(NaluType::Sps));
        assert_eq!(NaluType::from_byte(0x68), Some(NaluType::Pps));
        assert_eq!(NaluType::from_byte(0x41), Some(NaluType::Slice));
        assert!(NaluType::Sps.is_parameter_set());
        assert!(NaluType::Idr.is_keyframe());
    }

    #[test]
    fn test_avc_config_parse() {
        let config = AvcConfig::parse(Bytes::from_static(CONFIG)).unwrap();
        assert_eq!(config.profile, 100);
        assert_eq!(config.level, 31);
        assert_eq!(config.nalu_length_size, 4);
        assert_eq!(config.sps.len(), 1);
        assert_eq!(config.pps.len(), 1);
        assert_eq!(config.raw, Bytes::from_static(CONFIG));
        assert_eq!(config.profile_level_id(), "64001F");
    }

    #[test]
    fn test_avc_config_rejects_bad_version() {
        let mut bad = CONFIG.to_vec();
        bad[0] = 2;
        assert!(AvcConfig::parse(Bytes::from(bad)).is_err());
    }

    #[test]
    fn test_avc_config_rejects_short() {
        assert!(AvcConfig::parse(Bytes::from_static(&[0x01, 0x64, 0x00])).is_err());
    }

    #[test]
    fn test_nalu_iterator() {
        let data: &[u8] = &[
            0x00, 0x00, 0x00, 0x03, 0x67, 0x64, 0x00, // SPS
            0x00, 0x00, 0x00, 0x02, 0x68, 0xEF, // PPS
        ];

        let mut iter = NaluIterator::new(data, 4);
        assert_eq!(NaluType::from_byte(iter.next().unwrap()[0]), Some(NaluType::Sps));
        assert_eq!(NaluType::from_byte(iter.next().unwrap()[0]), Some(NaluType::Pps));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_nalu_iterator_truncated() {
        let data: &[u8] = &[0x00, 0x00, 0x00, 0x0A, 0x67, 0x64, 0x00];
        assert!(NaluIterator::new(data, 4).next().is_none());
    }

    #[test]
    fn test_avcc_contains_idr() {
        let idr: &[u8] = &[0x00, 0x00, 0x00, 0x02, 0x65, 0x88];
        let slice: &[u8] = &[0x00, 0x00, 0x00, 0x02, 0x41, 0x9A];
        assert!(avcc_contains_idr(idr, 4));
        assert!(!avcc_contains_idr(slice, 4));
    }

    #[test]
    fn test_annexb_split() {
        let data: &[u8] = &[
            0x00, 0x00, 0x00, 0x01, 0x67, 0x64, // SPS, 4-byte start code
            0x00, 0x00, 0x01, 0x68, 0xEF, // PPS, 3-byte start code
            0x00, 0x00, 0x01, 0x65, 0x88, 0x80, // IDR
        ];
        let nalus = annexb_split(data);
        assert_eq!(nalus.len(), 3);
        assert_eq!(NaluType::from_byte(nalus[0][0]), Some(NaluType::Sps));
        assert_eq!(NaluType::from_byte(nalus[1][0]), Some(NaluType::Pps));
        assert_eq!(NaluType::from_byte(nalus[2][0]), Some(NaluType::Idr));
    }

    #[test]
    fn test_annexb_split_leading_garbage() {
        let data: &[u8] = &[0xAB, 0x00, 0x00, 0x01, 0x41, 0x9A];
        let nalus = annexb_split(data);
        assert_eq!(nalus.len(), 1);
        assert_eq!(nalus[0], &[0x41, 0x9A]);
    }

    #[test]
    fn test_build_avc_decoder_config_parses_back() {
        let sps: &[u8] = &[0x67, 0x64, 0x00, 0x1F];
        let pps: &[u8] = &[0x68, 0xEF, 0x38];
        let record = build_avc_decoder_config(sps, pps).unwrap();

        let config = AvcConfig::parse(record).unwrap();
        assert_eq!(config.profile, 100);
        assert_eq!(config.level, 31);
        assert_eq!(config.nalu_length_size, 4);
        assert_eq!(&config.sps[0][..], sps);
        assert_eq!(&config.pps[0][..], pps);
    }

    #[test]
    fn test_build_avc_decoder_config_short_sps() {
        assert!(build_avc_decoder_config(&[0x67, 0x64], &[0x68]).is_none());
    }

    #[test]
    fn test_nalus_to_avcc_round_trip() {
        let sps: &[u8] = &[0x67, 0x64, 0x00];
        let idr: &[u8] = &[0x65, 0x88];
        let avcc = nalus_to_avcc(&[sps, idr]);

        let collected: Vec<&[u8]> = NaluIterator::new(&avcc, 4).collect();
        assert_eq!(collected, vec![sps, idr]);
    }
}
