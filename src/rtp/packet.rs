//! RTP packet model
//!
//! Only the fixed 12-byte header plus payload is modeled; CSRC lists,
//! header extensions, and padding are tolerated on parse and never
//! produced.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

pub const RTP_VERSION: u8 = 2;
pub const RTP_FIXED_HEADER_LEN: usize = 12;

/// Fixed RTP header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub payload_type: u8,
    pub marker: bool,
    pub seq: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

/// One RTP packet; the payload shares the source buffer
#[derive(Debug, Clone)]
pub struct RtpPacket {
    pub header: RtpHeader,
    pub payload: Bytes,
}

impl RtpPacket {
    pub fn new(header: RtpHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Serialize header + payload into one wire buffer
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(RTP_FIXED_HEADER_LEN + self.payload.len());
        let h = &self.header;
        buf.put_u8(RTP_VERSION << 6);
        buf.put_u8((h.payload_type & 0x7F) | if h.marker { 0x80 } else { 0 });
        buf.put_u16(h.seq);
        buf.put_u32(h.timestamp);
        buf.put_u32(h.ssrc);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Parse one wire packet
    pub fn parse(data: Bytes) -> Result<Self> {
        if data.len() < RTP_FIXED_HEADER_LEN {
            return Err(Error::ProtocolViolation("short rtp packet".into()));
        }

        let version = data[0] >> 6;
        if version != RTP_VERSION {
            return Err(Error::ProtocolViolation(format!("rtp version {version}")));
        }

        let has_padding = data[0] & 0x20 != 0;
        let has_extension = data[0] & 0x10 != 0;
        let csrc_count = (data[0] & 0x0F) as usize;

        let header = RtpHeader {
            payload_type: data[1] & 0x7F,
            marker: data[1] & 0x80 != 0,
            seq: u16::from_be_bytes([data[2], data[3]]),
            timestamp: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            ssrc: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
        };

        let mut offset = RTP_FIXED_HEADER_LEN + csrc_count * 4;
        if has_extension {
            if data.len() < offset + 4 {
                return Err(Error::ProtocolViolation("truncated rtp extension".into()));
            }
            let ext_words =
                u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
            offset += 4 + ext_words * 4;
        }

        let mut end = data.len();
        if has_padding {
            if end == 0 {
                return Err(Error::ProtocolViolation("empty padded rtp packet".into()));
            }
            let pad = data[end - 1] as usize;
            if pad == 0 || offset + pad > end {
                return Err(Error::ProtocolViolation("bad rtp padding".into()));
            }
            end -= pad;
        }

        if offset > end {
            return Err(Error::ProtocolViolation("truncated rtp packet".into()));
        }

        Ok(Self {
            header,
            payload: data.slice(offset..end),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_parse_round_trip() {
        let packet = RtpPacket::new(
            RtpHeader {
                payload_type: 96,
                marker: true,
                seq: 0xABCD,
                timestamp: 0x01020304,
                ssrc: 0xDEADBEEF,
            },
            Bytes::from_static(&[1, 2, 3, 4]),
        );

        let wire = packet.serialize();
        assert_eq!(wire.len(), 16);
        assert_eq!(wire[0], 0x80);
        assert_eq!(wire[1], 0x80 | 96);

        let parsed = RtpPacket::parse(wire).unwrap();
        assert_eq!(parsed.header, packet.header);
        assert_eq!(parsed.payload, packet.payload);
    }

    #[test]
    fn test_parse_rejects_short() {
        assert!(RtpPacket::parse(Bytes::from_static(&[0x80, 0x60])).is_err());
    }

    #[test]
    fn test_parse_rejects_wrong_version() {
        let mut data = vec![0u8; 12];
        data[0] = 0x40; // version 1
        assert!(RtpPacket::parse(Bytes::from(data)).is_err());
    }

    #[test]
    fn test_parse_skips_csrc_and_padding() {
        // Version 2, padding, one CSRC.
        let mut data = vec![0u8; 0];
        data.push(0x80 | 0x20 | 0x01);
        data.push(96);
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&1000u32.to_be_bytes());
        data.extend_from_slice(&7u32.to_be_bytes());
        data.extend_from_slice(&99u32.to_be_bytes()); // CSRC
        data.extend_from_slice(&[0xAA, 0xBB]); // payload
        data.extend_from_slice(&[0x00, 0x02]); // two padding bytes

        let parsed = RtpPacket::parse(Bytes::from(data)).unwrap();
        assert_eq!(&parsed.payload[..], &[0xAA, 0xBB]);
    }
}
