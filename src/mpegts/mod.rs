//! MPEG-TS packet and table generation
//!
//! Fixed program layout: PAT on PID 0, one program whose PMT lives on
//! 0x100, video ES on 0x101, audio ES on 0x102. Continuity counters run
//! per PID mod 16. Everything here is deterministic so that identical
//! input produces identical transport packets.

use std::collections::HashMap;

use bytes::{BufMut, Bytes, BytesMut};

pub const TS_PACKET_LEN: usize = 188;

pub const PID_PAT: u16 = 0x0000;
pub const PID_PMT: u16 = 0x0100;
pub const PID_VIDEO: u16 = 0x0101;
pub const PID_AUDIO: u16 = 0x0102;

pub const PROGRAM_NUMBER: u16 = 1;

pub const STREAM_TYPE_AAC: u8 = 0x0F;
pub const STREAM_TYPE_AVC: u8 = 0x1B;
pub const STREAM_TYPE_HEVC: u8 = 0x24;

pub const STREAM_ID_VIDEO: u8 = 0xE0;
pub const STREAM_ID_AUDIO: u8 = 0xC0;

/// 90 kHz ticks per millisecond
pub const TICKS_PER_MS: u64 = 90;

/// CRC-32/MPEG-2 over a PSI section
pub fn crc32_mpeg(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &b in data {
        crc ^= (b as u32) << 24;
        for _ in 0..8 {
            if crc & 0x8000_0000 != 0 {
                crc = (crc << 1) ^ 0x04C1_1DB7;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Per-PID continuity counters, mod 16
#[derive(Debug, Default)]
pub struct ContinuityCounters {
    counters: HashMap<u16, u8>,
}

impl ContinuityCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counter value for a PID, then advance it.
    pub fn next(&mut self, pid: u16) -> u8 {
        let counter = self.counters.entry(pid).or_insert(0);
        let value = *counter;
        *counter = (*counter + 1) & 0x0F;
        value
    }
}

/// Elementary streams present in the program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramLayout {
    /// Video stream type, `None` for audio-only programs
    pub video_stream_type: Option<u8>,
    /// Whether an AAC audio ES is present
    pub has_audio: bool,
}

/// Build the PAT + PMT pair that opens every fragment.
pub fn build_pat_pmt(layout: ProgramLayout, cc: &mut ContinuityCounters) -> Bytes {
    let mut out = BytesMut::with_capacity(TS_PACKET_LEN * 2);
    out.extend_from_slice(&psi_packet(PID_PAT, cc.next(PID_PAT), &pat_section()));
    out.extend_from_slice(&psi_packet(PID_PMT, cc.next(PID_PMT), &pmt_section(layout)));
    out.freeze()
}

fn pat_section() -> Vec<u8> {
    let mut section = vec![
        0x00, // table_id
        0xB0,
        0x0D, // section_syntax_indicator, section_length = 13
        0x00,
        0x01, // transport_stream_id
        0xC1, // version 0, current_next 1
        0x00, // section_number
        0x00, // last_section_number
    ];
    section.extend_from_slice(&PROGRAM_NUMBER.to_be_bytes());
    section.push(0xE0 | ((PID_PMT >> 8) as u8 & 0x1F));
    section.push(PID_PMT as u8);
    let crc = crc32_mpeg(&section);
    section.extend_from_slice(&crc.to_be_bytes());
    section
}

fn pmt_section(layout: ProgramLayout) -> Vec<u8> {
    let mut streams: Vec<(u8, u16)> = Vec::with_capacity(2);
    if let Some(stream_type) = layout.video_stream_type {
        streams.push((stream_type, PID_VIDEO));
    }
    if layout.has_audio {
        streams.push((STREAM_TYPE_AAC, PID_AUDIO));
    }

    let pcr_pid = if layout.video_stream_type.is_some() {
        PID_VIDEO
    } else {
        PID_AUDIO
    };

    let section_length = 9 + streams.len() * 5 + 4;
    let mut section = vec![
        0x02, // table_id
        0xB0 | ((section_length >> 8) as u8 & 0x0F),
        section_length as u8,
    ];
    section.extend_from_slice(&PROGRAM_NUMBER.to_be_bytes());
    section.push(0xC1); // version 0, current_next 1
    section.push(0x00); // section_number
    section.push(0x00); // last_section_number
    section.push(0xE0 | ((pcr_pid >> 8) as u8 & 0x1F));
    section.push(pcr_pid as u8);
    section.push(0xF0); // program_info_length = 0
    section.push(0x00);
    for (stream_type, pid) in streams {
        section.push(stream_type);
        section.push(0xE0 | ((pid >> 8) as u8 & 0x1F));
        section.push(pid as u8);
        section.push(0xF0); // ES_info_length = 0
        section.push(0x00);
    }
    let crc = crc32_mpeg(&section);
    section.extend_from_slice(&crc.to_be_bytes());
    section
}

/// One PSI section in one TS packet, 0xFF-stuffed to 188 bytes
fn psi_packet(pid: u16, cc_value: u8, section: &[u8]) -> [u8; TS_PACKET_LEN] {
    let mut packet = [0xFFu8; TS_PACKET_LEN];
    packet[0] = 0x47;
    packet[1] = 0x40 | ((pid >> 8) as u8 & 0x1F); // payload_unit_start
    packet[2] = pid as u8;
    packet[3] = 0x10 | (cc_value & 0x0F); // payload only
    packet[4] = 0x00; // pointer_field
    packet[5..5 + section.len()].copy_from_slice(section);
    packet
}

/// Write one PES packet as a run of TS packets.
///
/// `pts90`/`dts90` are 90 kHz ticks; `pcr90` rides in the adaptation
/// field of the first packet when given. The DTS field is written only
/// when it differs from the PTS.
pub fn write_pes(
    out: &mut BytesMut,
    cc: &mut ContinuityCounters,
    pid: u16,
    stream_id: u8,
    pts90: u64,
    dts90: u64,
    payload: &[u8],
    pcr90: Option<u64>,
) {
    let pes = pes_header(stream_id, pts90, dts90, payload.len());

    let mut data = BytesMut::with_capacity(pes.len() + payload.len());
    data.extend_from_slice(&pes);
    data.extend_from_slice(payload);
    let mut remaining = &data[..];

    let mut first = true;
    while !remaining.is_empty() {
        let consumed = push_ts_packet(
            out,
            pid,
            first,
            cc.next(pid),
            if first { pcr90 } else { None },
            remaining,
        );
        remaining = &remaining[consumed..];
        first = false;
    }
}

/// Write one 188-byte packet, consuming as much payload as fits.
fn push_ts_packet(
    out: &mut BytesMut,
    pid: u16,
    payload_unit_start: bool,
    cc_value: u8,
    pcr90: Option<u64>,
    data: &[u8],
) -> usize {
    let start = out.len();
    out.put_u8(0x47);
    out.put_u8(((pid >> 8) as u8 & 0x1F) | if payload_unit_start { 0x40 } else { 0 });
    out.put_u8(pid as u8);

    let has_af = pcr90.is_some() || data.len() < TS_PACKET_LEN - 4;
    out.put_u8(if has_af { 0x30 } else { 0x10 } | (cc_value & 0x0F));

    let consumed = if has_af {
        // flags + optional PCR, grown with stuffing until the payload
        // fills the packet exactly
        let mut af_len: usize = if pcr90.is_some() { 7 } else { 1 };
        let mut available = TS_PACKET_LEN - 4 - 1 - af_len;
        if data.len() < available {
            af_len += available - data.len();
            available = data.len();
        }
        out.put_u8(af_len as u8);

        let mut flags = 0u8;
        if pcr90.is_some() {
            flags |= 0x10;
        }
        out.put_u8(flags);
        let mut written = 1;

        if let Some(pcr) = pcr90 {
            let base = pcr & 0x1_FFFF_FFFF;
            out.put_u8((base >> 25) as u8);
            out.put_u8((base >> 17) as u8);
            out.put_u8((base >> 9) as u8);
            out.put_u8((base >> 1) as u8);
            out.put_u8((((base & 1) as u8) << 7) | 0x7E);
            out.put_u8(0x00);
            written += 6;
        }
        for _ in written..af_len {
            out.put_u8(0xFF);
        }
        available
    } else {
        TS_PACKET_LEN - 4
    };

    out.extend_from_slice(&data[..consumed]);
    debug_assert_eq!(out.len() - start, TS_PACKET_LEN);
    consumed
}

fn pes_header(stream_id: u8, pts90: u64, dts90: u64, payload_len: usize) -> Vec<u8> {
    let write_dts = dts90 != pts90;
    let header_data_len: usize = if write_dts { 10 } else { 5 };

    let mut header = Vec::with_capacity(9 + header_data_len);
    header.extend_from_slice(&[0x00, 0x00, 0x01, stream_id]);

    // Bytes after the length field: flags (2) + header_data_len (1) +
    // header data + payload. Oversized video PES uses the unbounded form.
    let pes_len = 3 + header_data_len + payload_len;
    if pes_len <= 0xFFFF {
        header.extend_from_slice(&(pes_len as u16).to_be_bytes());
    } else {
        header.extend_from_slice(&[0x00, 0x00]);
    }

    header.push(0x80); // marker bits
    header.push(if write_dts { 0xC0 } else { 0x80 });
    header.push(header_data_len as u8);

    push_timestamp(&mut header, if write_dts { 0x3 } else { 0x2 }, pts90);
    if write_dts {
        push_timestamp(&mut header, 0x1, dts90);
    }
    header
}

fn push_timestamp(out: &mut Vec<u8>, prefix: u8, ts90: u64) {
    let ts = ts90 & 0x1_FFFF_FFFF;
    out.push((prefix << 4) | (((ts >> 30) as u8 & 0x07) << 1) | 0x01);
    out.push((ts >> 22) as u8);
    out.push((((ts >> 15) as u8 & 0x7F) << 1) | 0x01);
    out.push((ts >> 7) as u8);
    out.push((((ts as u8) & 0x7F) << 1) | 0x01);
}

#[cfg(test)]
mod tests {
    use super::*;

    const AV_LAYOUT: ProgramLayout = ProgramLayout {
        video_stream_type: Some(STREAM_TYPE_AVC),
        has_audio: true,
    };

    #[test]
    fn test_crc32_mpeg_check_value() {
        // CRC-32/MPEG-2 check value for "123456789".
        assert_eq!(crc32_mpeg(b"123456789"), 0x0376_E6E7);
        assert_eq!(crc32_mpeg(b""), 0xFFFF_FFFF);
    }

    #[test]
    fn test_continuity_counters_wrap() {
        let mut cc = ContinuityCounters::new();
        for expected in 0..16 {
            assert_eq!(cc.next(PID_VIDEO), expected);
        }
        assert_eq!(cc.next(PID_VIDEO), 0);
        // Independent per PID.
        assert_eq!(cc.next(PID_AUDIO), 0);
    }

    #[test]
    fn test_pat_pmt_shape() {
        let mut cc = ContinuityCounters::new();
        let header = build_pat_pmt(AV_LAYOUT, &mut cc);
        assert_eq!(header.len(), TS_PACKET_LEN * 2);

        // PAT packet.
        assert_eq!(header[0], 0x47);
        assert_eq!(header[1], 0x40); // pusi, PID 0
        assert_eq!(header[2], 0x00);
        assert_eq!(header[5], 0x00); // table_id after pointer

        // PMT packet.
        let pmt = &header[TS_PACKET_LEN..];
        assert_eq!(pmt[0], 0x47);
        assert_eq!(
            u16::from_be_bytes([pmt[1] & 0x1F, pmt[2]]),
            PID_PMT
        );
        assert_eq!(pmt[5], 0x02); // PMT table_id

        // The PMT lists both elementary streams.
        let section = &pmt[5..];
        let section_len = (((section[1] & 0x0F) as usize) << 8) | section[2] as usize;
        let streams = &section[12..3 + section_len - 4];
        assert_eq!(streams.len(), 10);
        assert_eq!(streams[0], STREAM_TYPE_AVC);
        assert_eq!(u16::from_be_bytes([streams[1] & 0x1F, streams[2]]), PID_VIDEO);
        assert_eq!(streams[5], STREAM_TYPE_AAC);
        assert_eq!(u16::from_be_bytes([streams[6] & 0x1F, streams[7]]), PID_AUDIO);
    }

    #[test]
    fn test_pat_pmt_deterministic() {
        let mut cc1 = ContinuityCounters::new();
        let mut cc2 = ContinuityCounters::new();
        assert_eq!(build_pat_pmt(AV_LAYOUT, &mut cc1), build_pat_pmt(AV_LAYOUT, &mut cc2));
    }

    #[test]
    fn test_pat_pmt_sections_crc_to_zero() {
        // Running the MPEG CRC over section+CRC yields 0 for a valid section.
        let section = pat_section();
        assert_eq!(crc32_mpeg(&section), 0);
        let section = pmt_section(AV_LAYOUT);
        assert_eq!(crc32_mpeg(&section), 0);
    }

    #[test]
    fn test_audio_only_pmt_uses_audio_pcr() {
        let section = pmt_section(ProgramLayout {
            video_stream_type: None,
            has_audio: true,
        });
        let pcr_pid = u16::from_be_bytes([section[8] & 0x1F, section[9]]);
        assert_eq!(pcr_pid, PID_AUDIO);
    }

    #[test]
    fn test_write_pes_packet_sizing() {
        let mut cc = ContinuityCounters::new();
        let mut out = BytesMut::new();
        let payload = vec![0xABu8; 400];

        write_pes(
            &mut out,
            &mut cc,
            PID_VIDEO,
            STREAM_ID_VIDEO,
            1800,
            900,
            &payload,
            Some(900),
        );

        assert_eq!(out.len() % TS_PACKET_LEN, 0);
        // First packet: pusi set, adaptation field with PCR flag.
        assert_eq!(out[0], 0x47);
        assert_eq!(out[1], 0x40 | 0x01);
        assert_eq!(out[3] & 0x30, 0x30);
        assert_eq!(out[5] & 0x10, 0x10); // PCR flag

        // Continuation packets do not set pusi.
        assert_eq!(out[TS_PACKET_LEN + 1] & 0x40, 0);
    }

    #[test]
    fn test_write_pes_carries_pts_dts() {
        let mut cc = ContinuityCounters::new();
        let mut out = BytesMut::new();
        write_pes(
            &mut out,
            &mut cc,
            PID_VIDEO,
            STREAM_ID_VIDEO,
            2700,
            900,
            &[0x00, 0x01],
            None,
        );

        // Adaptation field present (small payload); find the PES start.
        let af_len = out[4] as usize;
        let pes = &out[5 + af_len..];
        assert_eq!(&pes[..4], &[0x00, 0x00, 0x01, STREAM_ID_VIDEO]);
        // PTS_DTS_flags = 11.
        assert_eq!(pes[7] & 0xC0, 0xC0);
        assert_eq!(pes[8], 10); // header_data_length

        // Decode PTS back.
        let p = &pes[9..14];
        let pts = (((p[0] as u64 >> 1) & 0x07) << 30)
            | ((p[1] as u64) << 22)
            | (((p[2] as u64 >> 1) & 0x7F) << 15)
            | ((p[3] as u64) << 7)
            | ((p[4] as u64 >> 1) & 0x7F);
        assert_eq!(pts, 2700);
    }

    #[test]
    fn test_write_pes_audio_pts_only() {
        let mut cc = ContinuityCounters::new();
        let mut out = BytesMut::new();
        write_pes(
            &mut out,
            &mut cc,
            PID_AUDIO,
            STREAM_ID_AUDIO,
            900,
            900,
            &[0xFF, 0xF1],
            None,
        );

        let af_len = out[4] as usize;
        let pes = &out[5 + af_len..];
        assert_eq!(pes[7] & 0xC0, 0x80);
        assert_eq!(pes[8], 5);
    }

    #[test]
    fn test_write_pes_exact_boundary() {
        // Payload that exactly fills packets after the PES header.
        let mut cc = ContinuityCounters::new();
        let mut out = BytesMut::new();
        // PES header is 19 bytes with DTS; 184*2 - 19 fills two packets.
        let payload = vec![0x55u8; 184 * 2 - 19];
        write_pes(
            &mut out,
            &mut cc,
            PID_VIDEO,
            STREAM_ID_VIDEO,
            900,
            450,
            &payload,
            None,
        );
        assert_eq!(out.len(), TS_PACKET_LEN * 2);
        // Second packet has no adaptation field.
        assert_eq!(out[TS_PACKET_LEN + 3] & 0x30, 0x10);
    }
}
