//! RTP payload packetization
//!
//! H.264 per RFC 6184 (single NAL, STAP-A, FU-A), H.265 per RFC 7798
//! (single NAL, FU), AAC per RFC 3640 (AU-headers-length + AU size).
//!
//! Sequence numbers and SSRCs are per-track and randomized at group
//! start. The marker bit is set on the final packet of a video access
//! unit and on every audio packet.

use bytes::{BufMut, Bytes, BytesMut};
use rand::Rng;

use crate::media::h264::NaluType;

use super::packet::{RtpHeader, RtpPacket};

/// Conservative MTU-derived payload ceiling
pub const DEFAULT_MAX_PAYLOAD: usize = 1400;

const FU_A: u8 = 28;
const STAP_A: u8 = 24;
const HEVC_FU: u8 = 49;

/// Common per-track state: payload type, randomized SSRC and sequence
#[derive(Debug)]
pub struct TrackState {
    payload_type: u8,
    ssrc: u32,
    seq: u16,
    max_payload: usize,
}

impl TrackState {
    pub fn new(payload_type: u8, max_payload: usize) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            payload_type,
            ssrc: rng.gen(),
            seq: rng.gen(),
            max_payload,
        }
    }

    /// Fixed SSRC/sequence for deterministic tests
    #[cfg(test)]
    pub fn with_identity(payload_type: u8, max_payload: usize, ssrc: u32, seq: u16) -> Self {
        Self {
            payload_type,
            ssrc,
            seq,
            max_payload,
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    fn next_packet(&mut self, timestamp: u32, marker: bool, payload: Bytes) -> RtpPacket {
        let header = RtpHeader {
            payload_type: self.payload_type,
            marker,
            seq: self.seq,
            timestamp,
            ssrc: self.ssrc,
        };
        self.seq = self.seq.wrapping_add(1);
        RtpPacket::new(header, payload)
    }
}

/// H.264 packetizer (RFC 6184)
#[derive(Debug)]
pub struct AvcPacketizer {
    track: TrackState,
}

impl AvcPacketizer {
    pub fn new(payload_type: u8) -> Self {
        Self {
            track: TrackState::new(payload_type, DEFAULT_MAX_PAYLOAD),
        }
    }

    #[cfg(test)]
    pub fn with_identity(payload_type: u8, max_payload: usize, ssrc: u32, seq: u16) -> Self {
        Self {
            track: TrackState::with_identity(payload_type, max_payload, ssrc, seq),
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.track.ssrc()
    }

    /// Packetize one access unit. Consecutive parameter-set NALUs that
    /// fit are aggregated into a STAP-A; anything over the payload
    /// ceiling is fragmented as FU-A. The marker goes on the last packet.
    pub fn packetize(&mut self, nalus: &[&[u8]], timestamp: u32) -> Vec<RtpPacket> {
        let mut packets = Vec::new();
        let max = self.track.max_payload;

        let mut i = 0;
        while i < nalus.len() {
            let nalu = nalus[i];
            if nalu.is_empty() {
                i += 1;
                continue;
            }

            // Aggregate a run of parameter sets into one STAP-A.
            let is_param = |n: &[u8]| {
                NaluType::from_byte(n[0]).map(|t| t.is_parameter_set()).unwrap_or(false)
            };
            if is_param(nalu) {
                let mut j = i;
                let mut stap_len = 1usize;
                while j < nalus.len()
                    && !nalus[j].is_empty()
                    && is_param(nalus[j])
                    && stap_len + 2 + nalus[j].len() <= max
                {
                    stap_len += 2 + nalus[j].len();
                    j += 1;
                }
                if j - i >= 2 {
                    let mut buf = BytesMut::with_capacity(stap_len);
                    let nri = nalus[i..j].iter().map(|n| n[0] & 0x60).max().unwrap_or(0);
                    buf.put_u8(nri | STAP_A);
                    for n in &nalus[i..j] {
                        buf.put_u16(n.len() as u16);
                        buf.put_slice(n);
                    }
                    let marker = j == nalus.len();
                    packets.push(self.track.next_packet(timestamp, marker, buf.freeze()));
                    i = j;
                    continue;
                }
            }

            let last_nalu = i + 1 == nalus.len();
            if nalu.len() <= max {
                packets.push(self.track.next_packet(
                    timestamp,
                    last_nalu,
                    Bytes::copy_from_slice(nalu),
                ));
            } else {
                // FU-A: indicator carries F/NRI, the header carries the type.
                let indicator = (nalu[0] & 0xE0) | FU_A;
                let nalu_type = nalu[0] & 0x1F;
                let body = &nalu[1..];
                let chunk = max - 2;
                let count = body.len().div_ceil(chunk);
                for (k, part) in body.chunks(chunk).enumerate() {
                    let start = k == 0;
                    let end = k + 1 == count;
                    let mut buf = BytesMut::with_capacity(2 + part.len());
                    buf.put_u8(indicator);
                    buf.put_u8(nalu_type | if start { 0x80 } else { 0 } | if end { 0x40 } else { 0 });
                    buf.put_slice(part);
                    let marker = last_nalu && end;
                    packets.push(self.track.next_packet(timestamp, marker, buf.freeze()));
                }
            }
            i += 1;
        }

        packets
    }
}

/// H.265 packetizer (RFC 7798)
#[derive(Debug)]
pub struct HevcPacketizer {
    track: TrackState,
}

impl HevcPacketizer {
    pub fn new(payload_type: u8) -> Self {
        Self {
            track: TrackState::new(payload_type, DEFAULT_MAX_PAYLOAD),
        }
    }

    #[cfg(test)]
    pub fn with_identity(payload_type: u8, max_payload: usize, ssrc: u32, seq: u16) -> Self {
        Self {
            track: TrackState::with_identity(payload_type, max_payload, ssrc, seq),
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.track.ssrc()
    }

    pub fn packetize(&mut self, nalus: &[&[u8]], timestamp: u32) -> Vec<RtpPacket> {
        let mut packets = Vec::new();
        let max = self.track.max_payload;

        for (i, nalu) in nalus.iter().enumerate() {
            if nalu.len() < 2 {
                continue;
            }
            let last_nalu = i + 1 == nalus.len();

            if nalu.len() <= max {
                packets.push(self.track.next_packet(
                    timestamp,
                    last_nalu,
                    Bytes::copy_from_slice(nalu),
                ));
            } else {
                // FU: PayloadHdr keeps layer/tid bits, type becomes 49.
                let hdr0 = (nalu[0] & 0x81) | (HEVC_FU << 1);
                let hdr1 = nalu[1];
                let fu_type = (nalu[0] >> 1) & 0x3F;
                let body = &nalu[2..];
                let chunk = max - 3;
                let count = body.len().div_ceil(chunk);
                for (k, part) in body.chunks(chunk).enumerate() {
                    let start = k == 0;
                    let end = k + 1 == count;
                    let mut buf = BytesMut::with_capacity(3 + part.len());
                    buf.put_u8(hdr0);
                    buf.put_u8(hdr1);
                    buf.put_u8(fu_type | if start { 0x80 } else { 0 } | if end { 0x40 } else { 0 });
                    buf.put_slice(part);
                    let marker = last_nalu && end;
                    packets.push(self.track.next_packet(timestamp, marker, buf.freeze()));
                }
            }
        }

        packets
    }
}

/// AAC packetizer (RFC 3640, one AU per packet)
#[derive(Debug)]
pub struct AacPacketizer {
    track: TrackState,
}

impl AacPacketizer {
    pub fn new(payload_type: u8) -> Self {
        Self {
            track: TrackState::new(payload_type, DEFAULT_MAX_PAYLOAD),
        }
    }

    #[cfg(test)]
    pub fn with_identity(payload_type: u8, max_payload: usize, ssrc: u32, seq: u16) -> Self {
        Self {
            track: TrackState::with_identity(payload_type, max_payload, ssrc, seq),
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.track.ssrc()
    }

    /// One AU per packet: 16-bit AU-headers-length (always 16), then a
    /// 13-bit size + 3-bit index header. Marker set on every packet.
    pub fn packetize(&mut self, au: &[u8], timestamp: u32) -> RtpPacket {
        let mut buf = BytesMut::with_capacity(4 + au.len());
        buf.put_u16(16); // AU-headers-length in bits
        buf.put_u16(((au.len() as u16) << 3) & 0xFFF8);
        buf.put_slice(au);
        self.track.next_packet(timestamp, true, buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_nal() {
        let mut p = AvcPacketizer::with_identity(96, 1400, 7, 100);
        let idr = [0x65u8, 1, 2, 3];
        let packets = p.packetize(&[&idr], 90_000);

        assert_eq!(packets.len(), 1);
        assert_eq!(&packets[0].payload[..], &idr);
        assert!(packets[0].header.marker);
        assert_eq!(packets[0].header.seq, 100);
        assert_eq!(packets[0].header.timestamp, 90_000);
    }

    #[test]
    fn test_fu_a_fragmentation() {
        let mut p = AvcPacketizer::with_identity(96, 10, 7, 0);
        let mut idr = vec![0x65u8];
        idr.extend(std::iter::repeat(0xAB).take(20));

        let packets = p.packetize(&[&idr], 0);
        // 20 body bytes, 8 per fragment -> 3 fragments.
        assert_eq!(packets.len(), 3);

        // Indicator: NRI of 0x65 (0x60) | 28.
        assert_eq!(packets[0].payload[0], 0x60 | 28);
        // Start bit then neither then end bit, all with type 5.
        assert_eq!(packets[0].payload[1], 0x80 | 5);
        assert_eq!(packets[1].payload[1], 5);
        assert_eq!(packets[2].payload[1], 0x40 | 5);

        // Marker only on the final fragment of the access unit.
        assert!(!packets[0].header.marker);
        assert!(!packets[1].header.marker);
        assert!(packets[2].header.marker);

        // Sequence numbers advance per packet.
        assert_eq!(packets[0].header.seq, 0);
        assert_eq!(packets[2].header.seq, 2);

        // Fragments reassemble to the original body.
        let body: Vec<u8> = packets
            .iter()
            .flat_map(|pkt| pkt.payload[2..].to_vec())
            .collect();
        assert_eq!(&body, &idr[1..]);
    }

    #[test]
    fn test_stap_a_aggregates_parameter_sets() {
        let mut p = AvcPacketizer::with_identity(96, 1400, 7, 0);
        let sps = [0x67u8, 0x64, 0x00, 0x1F];
        let pps = [0x68u8, 0xEF, 0x38];
        let idr = [0x65u8, 0x88, 0x84];

        let packets = p.packetize(&[&sps, &pps, &idr], 0);
        assert_eq!(packets.len(), 2);

        // First packet is the STAP-A with both parameter sets.
        let stap = &packets[0].payload;
        assert_eq!(stap[0] & 0x1F, 24);
        assert_eq!(u16::from_be_bytes([stap[1], stap[2]]) as usize, sps.len());
        assert!(!packets[0].header.marker);

        // Second is the IDR with the marker.
        assert_eq!(packets[1].payload[0], 0x65);
        assert!(packets[1].header.marker);
    }

    #[test]
    fn test_hevc_fu() {
        let mut p = HevcPacketizer::with_identity(98, 10, 9, 0);
        // IDR_W_RADL: type 19, header 0x26 0x01.
        let mut nalu = vec![0x26u8, 0x01];
        nalu.extend(std::iter::repeat(0xCD).take(20));

        let packets = p.packetize(&[&nalu], 0);
        assert!(packets.len() > 1);

        // PayloadHdr type is 49.
        assert_eq!((packets[0].payload[0] >> 1) & 0x3F, 49);
        // FU header start bit + original type.
        assert_eq!(packets[0].payload[2], 0x80 | 19);
        assert_eq!(packets.last().unwrap().payload[2], 0x40 | 19);
        assert!(packets.last().unwrap().header.marker);
    }

    #[test]
    fn test_aac_au_framing() {
        let mut p = AacPacketizer::with_identity(97, 1400, 11, 0);
        let au = [0x21u8, 0x00, 0x49, 0x90];

        let packet = p.packetize(&au, 1024);
        assert!(packet.header.marker);
        // AU-headers-length = 16 bits.
        assert_eq!(u16::from_be_bytes([packet.payload[0], packet.payload[1]]), 16);
        // 13-bit AU size in the top bits.
        let au_header = u16::from_be_bytes([packet.payload[2], packet.payload[3]]);
        assert_eq!((au_header >> 3) as usize, au.len());
        assert_eq!(&packet.payload[4..], &au);
    }

    #[test]
    fn test_randomized_identity() {
        let a = AvcPacketizer::new(96);
        let b = AvcPacketizer::new(96);
        // Overwhelmingly likely to differ; SSRCs must not be constant.
        assert!(a.ssrc() != b.ssrc() || a.track.seq != b.track.seq);
    }
}
