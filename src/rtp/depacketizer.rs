//! RTP payload depacketization
//!
//! Rebuilds access units from H.264/H.265 RTP streams (single NAL,
//! STAP-A/AP, FU-A/FU) and AAC AUs from RFC 3640 packets. Fragment
//! reassembly is bounded: an access unit whose fragments exceed the
//! buffer cap is dropped whole.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

use super::packet::RtpPacket;

/// Reassembly buffer cap per track
pub const MAX_REASSEMBLY_BYTES: usize = 2 * 1024 * 1024;

/// One rebuilt video access unit
#[derive(Debug, Clone)]
pub struct AccessUnit {
    /// NAL units in decode order
    pub nalus: Vec<Bytes>,
    /// RTP timestamp of the access unit
    pub timestamp: u32,
}

/// H.264 depacketizer (RFC 6184)
#[derive(Debug, Default)]
pub struct AvcDepacketizer {
    nalus: Vec<Bytes>,
    fu_buffer: BytesMut,
    fu_active: bool,
    /// Set when the current access unit must be discarded
    poisoned: bool,
    dropped_aus: u64,
}

impl AvcDepacketizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dropped_access_units(&self) -> u64 {
        self.dropped_aus
    }

    /// Feed one packet; a completed access unit is returned on the
    /// marker packet.
    pub fn push(&mut self, packet: &RtpPacket) -> Result<Option<AccessUnit>> {
        let payload = &packet.payload;
        if payload.is_empty() {
            return Err(Error::ProtocolViolation("empty rtp payload".into()));
        }

        let nalu_type = payload[0] & 0x1F;
        match nalu_type {
            1..=23 => {
                self.accept(payload.clone())?;
            }
            24 => {
                // STAP-A: 2-byte size prefixed NALUs after the header byte.
                let mut offset = 1;
                while offset + 2 <= payload.len() {
                    let len =
                        u16::from_be_bytes([payload[offset], payload[offset + 1]]) as usize;
                    offset += 2;
                    if len == 0 || offset + len > payload.len() {
                        return Err(Error::ProtocolViolation("bad stap-a size".into()));
                    }
                    self.accept(payload.slice(offset..offset + len))?;
                    offset += len;
                }
            }
            28 => {
                if payload.len() < 2 {
                    return Err(Error::ProtocolViolation("short fu-a".into()));
                }
                let start = payload[1] & 0x80 != 0;
                let end = payload[1] & 0x40 != 0;

                if start {
                    self.fu_buffer.clear();
                    // Rebuild the NALU header from indicator F/NRI + FU type.
                    self.fu_buffer.put_u8((payload[0] & 0xE0) | (payload[1] & 0x1F));
                    self.fu_active = true;
                }
                if self.fu_active {
                    if self.fu_buffer.len() + payload.len() - 2 > MAX_REASSEMBLY_BYTES {
                        self.poison();
                    } else {
                        self.fu_buffer.extend_from_slice(&payload[2..]);
                        if end {
                            let nalu = self.fu_buffer.split().freeze();
                            self.fu_active = false;
                            self.accept(nalu)?;
                        }
                    }
                }
            }
            other => {
                return Err(Error::ProtocolViolation(format!(
                    "unsupported h264 payload type {other}"
                )));
            }
        }

        Ok(self.finish_on_marker(packet))
    }

    fn accept(&mut self, nalu: Bytes) -> Result<()> {
        if self.poisoned {
            return Ok(());
        }
        let total: usize = self.nalus.iter().map(|n| n.len()).sum();
        if total + nalu.len() > MAX_REASSEMBLY_BYTES {
            self.poison();
            return Ok(());
        }
        self.nalus.push(nalu);
        Ok(())
    }

    fn poison(&mut self) {
        self.poisoned = true;
        self.nalus.clear();
        self.fu_buffer.clear();
        self.fu_active = false;
    }

    fn finish_on_marker(&mut self, packet: &RtpPacket) -> Option<AccessUnit> {
        if !packet.header.marker {
            return None;
        }
        let was_poisoned = std::mem::take(&mut self.poisoned);
        self.fu_active = false;
        self.fu_buffer.clear();
        let nalus = std::mem::take(&mut self.nalus);
        if was_poisoned {
            self.dropped_aus += 1;
            return None;
        }
        if nalus.is_empty() {
            return None;
        }
        Some(AccessUnit {
            nalus,
            timestamp: packet.header.timestamp,
        })
    }
}

/// H.265 depacketizer (RFC 7798)
#[derive(Debug, Default)]
pub struct HevcDepacketizer {
    nalus: Vec<Bytes>,
    fu_buffer: BytesMut,
    fu_active: bool,
    poisoned: bool,
    dropped_aus: u64,
}

impl HevcDepacketizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dropped_access_units(&self) -> u64 {
        self.dropped_aus
    }

    pub fn push(&mut self, packet: &RtpPacket) -> Result<Option<AccessUnit>> {
        let payload = &packet.payload;
        if payload.len() < 2 {
            return Err(Error::ProtocolViolation("short hevc payload".into()));
        }

        let nalu_type = (payload[0] >> 1) & 0x3F;
        match nalu_type {
            48 => {
                // Aggregation packet: size-prefixed NALUs after the 2-byte header.
                let mut offset = 2;
                while offset + 2 <= payload.len() {
                    let len =
                        u16::from_be_bytes([payload[offset], payload[offset + 1]]) as usize;
                    offset += 2;
                    if len == 0 || offset + len > payload.len() {
                        return Err(Error::ProtocolViolation("bad hevc ap size".into()));
                    }
                    self.accept(payload.slice(offset..offset + len));
                    offset += len;
                }
            }
            49 => {
                if payload.len() < 3 {
                    return Err(Error::ProtocolViolation("short hevc fu".into()));
                }
                let start = payload[2] & 0x80 != 0;
                let end = payload[2] & 0x40 != 0;
                let orig_type = payload[2] & 0x3F;

                if start {
                    self.fu_buffer.clear();
                    // Rebuild the 2-byte NALU header with the original type.
                    self.fu_buffer.put_u8((payload[0] & 0x81) | (orig_type << 1));
                    self.fu_buffer.put_u8(payload[1]);
                    self.fu_active = true;
                }
                if self.fu_active {
                    if self.fu_buffer.len() + payload.len() - 3 > MAX_REASSEMBLY_BYTES {
                        self.poison();
                    } else {
                        self.fu_buffer.extend_from_slice(&payload[3..]);
                        if end {
                            let nalu = self.fu_buffer.split().freeze();
                            self.fu_active = false;
                            self.accept(nalu);
                        }
                    }
                }
            }
            _ => {
                self.accept(payload.clone());
            }
        }

        Ok(self.finish_on_marker(packet))
    }

    fn accept(&mut self, nalu: Bytes) {
        if self.poisoned {
            return;
        }
        let total: usize = self.nalus.iter().map(|n| n.len()).sum();
        if total + nalu.len() > MAX_REASSEMBLY_BYTES {
            self.poison();
            return;
        }
        self.nalus.push(nalu);
    }

    fn poison(&mut self) {
        self.poisoned = true;
        self.nalus.clear();
        self.fu_buffer.clear();
        self.fu_active = false;
    }

    fn finish_on_marker(&mut self, packet: &RtpPacket) -> Option<AccessUnit> {
        if !packet.header.marker {
            return None;
        }
        let was_poisoned = std::mem::take(&mut self.poisoned);
        self.fu_active = false;
        self.fu_buffer.clear();
        let nalus = std::mem::take(&mut self.nalus);
        if was_poisoned {
            self.dropped_aus += 1;
            return None;
        }
        if nalus.is_empty() {
            return None;
        }
        Some(AccessUnit {
            nalus,
            timestamp: packet.header.timestamp,
        })
    }
}

/// AAC depacketizer (RFC 3640)
#[derive(Debug, Default)]
pub struct AacDepacketizer;

impl AacDepacketizer {
    pub fn new() -> Self {
        Self
    }

    /// Extract the AUs from one packet.
    pub fn push(&mut self, packet: &RtpPacket) -> Result<Vec<Bytes>> {
        let payload = &packet.payload;
        if payload.len() < 4 {
            return Err(Error::ProtocolViolation("short aac payload".into()));
        }

        let headers_bits = u16::from_be_bytes([payload[0], payload[1]]) as usize;
        let header_count = headers_bits / 16;
        let headers_bytes = headers_bits.div_ceil(8);
        if payload.len() < 2 + headers_bytes {
            return Err(Error::ProtocolViolation("truncated aac au headers".into()));
        }

        let mut sizes = Vec::with_capacity(header_count);
        for i in 0..header_count {
            let off = 2 + i * 2;
            let header = u16::from_be_bytes([payload[off], payload[off + 1]]);
            sizes.push((header >> 3) as usize);
        }

        let mut aus = Vec::with_capacity(sizes.len());
        let mut offset = 2 + headers_bytes;
        for size in sizes {
            if offset + size > payload.len() {
                return Err(Error::ProtocolViolation("truncated aac au".into()));
            }
            aus.push(payload.slice(offset..offset + size));
            offset += size;
        }
        Ok(aus)
    }
}

#[cfg(test)]
mod tests {
    use crate::rtp::packetizer::{AacPacketizer, AvcPacketizer, HevcPacketizer};

    use super::*;

    #[test]
    fn test_avc_round_trip_single_and_fu() {
        let mut packetizer = AvcPacketizer::with_identity(96, 16, 1, 0);
        let mut depacketizer = AvcDepacketizer::new();

        let sps = vec![0x67u8, 0x64, 0x00, 0x1F];
        let pps = vec![0x68u8, 0xEF, 0x38];
        let mut idr = vec![0x65u8];
        idr.extend(std::iter::repeat(0x11).take(100));

        let packets = packetizer.packetize(&[&sps, &pps, &idr], 3000);

        let mut out = None;
        for packet in &packets {
            if let Some(au) = depacketizer.push(packet).unwrap() {
                out = Some(au);
            }
        }

        let au = out.expect("access unit on marker");
        assert_eq!(au.timestamp, 3000);
        assert_eq!(au.nalus.len(), 3);
        assert_eq!(&au.nalus[0][..], &sps[..]);
        assert_eq!(&au.nalus[1][..], &pps[..]);
        assert_eq!(&au.nalus[2][..], &idr[..]);
    }

    #[test]
    fn test_hevc_round_trip() {
        let mut packetizer = HevcPacketizer::with_identity(98, 16, 1, 0);
        let mut depacketizer = HevcDepacketizer::new();

        let mut idr = vec![0x26u8, 0x01];
        idr.extend(std::iter::repeat(0x22).take(80));

        let packets = packetizer.packetize(&[&idr], 6000);
        let mut out = None;
        for packet in &packets {
            if let Some(au) = depacketizer.push(packet).unwrap() {
                out = Some(au);
            }
        }

        let au = out.expect("access unit on marker");
        assert_eq!(au.nalus.len(), 1);
        assert_eq!(&au.nalus[0][..], &idr[..]);
    }

    #[test]
    fn test_aac_round_trip() {
        let mut packetizer = AacPacketizer::with_identity(97, 1400, 1, 0);
        let mut depacketizer = AacDepacketizer::new();

        let frame = vec![0x21u8, 0x10, 0x04, 0x60, 0x8C];
        let packet = packetizer.packetize(&frame, 1024);

        let aus = depacketizer.push(&packet).unwrap();
        assert_eq!(aus.len(), 1);
        assert_eq!(&aus[0][..], &frame[..]);
    }

    #[test]
    fn test_avc_rejects_unknown_type() {
        let packet = RtpPacket::new(
            crate::rtp::packet::RtpHeader {
                payload_type: 96,
                marker: true,
                seq: 0,
                timestamp: 0,
                ssrc: 0,
            },
            Bytes::from_static(&[0x1D, 0x00]), // type 29 (FU-B, unsupported)
        );
        assert!(AvcDepacketizer::new().push(&packet).is_err());
    }

    #[test]
    fn test_fu_without_start_is_ignored() {
        let mut depacketizer = AvcDepacketizer::new();
        // Middle fragment with marker: no start seen, no AU produced.
        let packet = RtpPacket::new(
            crate::rtp::packet::RtpHeader {
                payload_type: 96,
                marker: true,
                seq: 0,
                timestamp: 0,
                ssrc: 0,
            },
            Bytes::from_static(&[0x7C, 0x05, 0xAA]),
        );
        assert!(depacketizer.push(&packet).unwrap().is_none());
    }
}
