//! AAC audio parsing
//!
//! RTMP transports AAC raw (no ADTS); raw elementary streams arrive as
//! ADTS frames. Both directions are handled here: AudioSpecificConfig for
//! the sequence header, ADTS header synthesis for consumers that need
//! framed audio, and ADTS stripping for the programmatic ingest path.

use bytes::Bytes;

use crate::error::{Error, Result};

/// AudioSpecificConfig (from the sequence header)
#[derive(Debug, Clone)]
pub struct AudioSpecificConfig {
    /// Audio object type (2 = AAC LC)
    pub audio_object_type: u8,
    /// Sampling frequency index
    pub sampling_frequency_index: u8,
    /// Sampling frequency in Hz
    pub sampling_frequency: u32,
    /// Channel configuration (1=mono, 2=stereo, ...)
    pub channel_configuration: u8,
    /// Raw config bytes
    pub raw: Bytes,
}

impl AudioSpecificConfig {
    /// Standard sampling frequencies by index
    const SAMPLING_FREQUENCIES: [u32; 16] = [
        96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
        0, 0, 0,
    ];

    /// Parse from the bytes following `0xAF 0x00` in an AAC sequence header
    pub fn parse(data: Bytes) -> Result<Self> {
        if data.len() < 2 {
            return Err(Error::ProtocolViolation("short audio specific config".into()));
        }

        let b0 = data[0];
        let b1 = data[1];

        let audio_object_type = (b0 >> 3) & 0x1F;
        let sampling_frequency_index = ((b0 & 0x07) << 1) | ((b1 >> 7) & 0x01);

        let sampling_frequency = if sampling_frequency_index == 0x0F {
            // Explicit 24-bit frequency follows.
            if data.len() < 5 {
                return Err(Error::ProtocolViolation("short audio specific config".into()));
            }
            let f0 = (data[1] & 0x7F) as u32;
            let f1 = data[2] as u32;
            let f2 = data[3] as u32;
            let f3 = (data[4] >> 1) as u32;
            (f0 << 17) | (f1 << 9) | (f2 << 1) | f3
        } else {
            let freq = Self::SAMPLING_FREQUENCIES[sampling_frequency_index as usize];
            if freq == 0 {
                return Err(Error::ProtocolViolation(format!(
                    "reserved sampling frequency index {sampling_frequency_index}"
                )));
            }
            freq
        };

        let channel_configuration = (b1 >> 3) & 0x0F;

        Ok(AudioSpecificConfig {
            audio_object_type,
            sampling_frequency_index,
            sampling_frequency,
            channel_configuration,
            raw: data,
        })
    }

    /// Build a two-byte config from object type, frequency index, channels
    pub fn from_parts(audio_object_type: u8, sampling_frequency_index: u8, channels: u8) -> Self {
        let b0 = (audio_object_type << 3) | (sampling_frequency_index >> 1);
        let b1 = ((sampling_frequency_index & 0x01) << 7) | (channels << 3);
        let raw = Bytes::from(vec![b0, b1]);
        Self {
            audio_object_type,
            sampling_frequency_index,
            sampling_frequency: Self::SAMPLING_FREQUENCIES[sampling_frequency_index as usize],
            channel_configuration: channels,
            raw,
        }
    }

    /// Lowercase hex of the raw config, as SDP `config=` wants it
    pub fn to_hex(&self) -> String {
        self.raw.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Generate a 7-byte ADTS header (no CRC) for one raw AAC frame
pub fn generate_adts_header(config: &AudioSpecificConfig, frame_length: usize) -> [u8; 7] {
    let profile = config.audio_object_type.saturating_sub(1);
    let freq_idx = config.sampling_frequency_index;
    let channels = config.channel_configuration;
    let frame_len = frame_length + 7;

    let mut header = [0u8; 7];
    header[0] = 0xFF;
    header[1] = 0xF1; // MPEG-4, layer 0, no CRC
    header[2] = ((profile & 0x03) << 6) | ((freq_idx & 0x0F) << 2) | ((channels >> 2) & 0x01);
    header[3] = ((channels & 0x03) << 6) | ((frame_len >> 11) & 0x03) as u8;
    header[4] = ((frame_len >> 3) & 0xFF) as u8;
    header[5] = (((frame_len & 0x07) << 5) | 0x1F) as u8;
    header[6] = 0xFC;
    header
}

/// One frame split out of an ADTS stream
#[derive(Debug, Clone)]
pub struct AdtsFrame {
    /// Config derived from the ADTS header fields
    pub config: AudioSpecificConfig,
    /// Raw AAC payload without the ADTS header
    pub payload: Bytes,
}

/// Split an ADTS elementary stream into raw AAC frames.
///
/// Truncated trailing data is dropped.
pub fn split_adts(data: &Bytes) -> Result<Vec<AdtsFrame>> {
    let mut frames = Vec::new();
    let mut offset = 0;

    while offset + 7 <= data.len() {
        if data[offset] != 0xFF || (data[offset + 1] & 0xF0) != 0xF0 {
            return Err(Error::ProtocolViolation("bad adts syncword".into()));
        }
        let protection_absent = data[offset + 1] & 0x01 != 0;
        let profile = ((data[offset + 2] >> 6) & 0x03) + 1;
        let freq_idx = (data[offset + 2] >> 2) & 0x0F;
        let channels = ((data[offset + 2] & 0x01) << 2) | ((data[offset + 3] >> 6) & 0x03);
        let frame_len = (((data[offset + 3] & 0x03) as usize) << 11)
            | ((data[offset + 4] as usize) << 3)
            | ((data[offset + 5] >> 5) as usize);

        if frame_len < 7 || offset + frame_len > data.len() {
            break;
        }

        let header_len = if protection_absent { 7 } else { 9 };
        if frame_len < header_len {
            break;
        }

        frames.push(AdtsFrame {
            config: AudioSpecificConfig::from_parts(profile, freq_idx, channels),
            payload: data.slice(offset + header_len..offset + frame_len),
        });
        offset += frame_len;
    }

    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    // AAC LC, 44100 Hz, stereo
    const ASC: &[u8] = &[0x12, 0x10];

    #[test]
    fn test_parse_config() {
        let config = AudioSpecificConfig::parse(Bytes::from_static(ASC)).unwrap();
        assert_eq!(config.audio_object_type, 2);
        assert_eq!(config.sampling_frequency_index, 4);
        assert_eq!(config.sampling_frequency, 44100);
        assert_eq!(config.channel_configuration, 2);
    }

    #[test]
    fn test_parse_config_48k_mono() {
        // Object type 2, freq index 3 (48000), 1 channel.
        let config =
            AudioSpecificConfig::parse(Bytes::from_static(&[0x11, 0x88])).unwrap();
        assert_eq!(config.sampling_frequency, 48000);
        assert_eq!(config.channel_configuration, 1);
    }

    #[test]
    fn test_parse_config_too_short() {
        assert!(AudioSpecificConfig::parse(Bytes::from_static(&[0x12])).is_err());
    }

    #[test]
    fn test_from_parts_round_trip() {
        let config = AudioSpecificConfig::from_parts(2, 4, 2);
        assert_eq!(&config.raw[..], ASC);

        let reparsed = AudioSpecificConfig::parse(config.raw.clone()).unwrap();
        assert_eq!(reparsed.sampling_frequency, 44100);
        assert_eq!(reparsed.channel_configuration, 2);
    }

    #[test]
    fn test_config_hex() {
        let config = AudioSpecificConfig::parse(Bytes::from_static(ASC)).unwrap();
        assert_eq!(config.to_hex(), "1210");
    }

    #[test]
    fn test_adts_header_round_trip() {
        let config = AudioSpecificConfig::parse(Bytes::from_static(ASC)).unwrap();
        let payload = vec![0x21u8; 100];

        let header = generate_adts_header(&config, payload.len());
        let mut stream = header.to_vec();
        stream.extend_from_slice(&payload);

        let frames = split_adts(&Bytes::from(stream)).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload.len(), 100);
        assert_eq!(frames[0].config.sampling_frequency, 44100);
        assert_eq!(frames[0].config.channel_configuration, 2);
    }

    #[test]
    fn test_split_adts_multiple_frames() {
        let config = AudioSpecificConfig::from_parts(2, 4, 2);
        let mut stream = Vec::new();
        for len in [32usize, 64, 48] {
            stream.extend_from_slice(&generate_adts_header(&config, len));
            stream.extend_from_slice(&vec![0xAAu8; len]);
        }

        let frames = split_adts(&Bytes::from(stream)).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[1].payload.len(), 64);
    }

    #[test]
    fn test_split_adts_rejects_garbage() {
        assert!(split_adts(&Bytes::from_static(&[0x00; 16])).is_err());
    }

    #[test]
    fn test_split_adts_drops_truncated_tail() {
        let config = AudioSpecificConfig::from_parts(2, 4, 2);
        let mut stream = Vec::new();
        stream.extend_from_slice(&generate_adts_header(&config, 32));
        stream.extend_from_slice(&[0xAAu8; 16]); // only half the frame

        let frames = split_adts(&Bytes::from(stream)).unwrap();
        assert!(frames.is_empty());
    }
}
