//! FLV recording
//!
//! Opt-in `<stream_name>.flv` written alongside the HLS output: standard
//! FLV file header, then each message as a tag with its 11-byte header
//! and the trailing back-pointer.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::Result;
use crate::media::flv::FlvTagType;
use crate::media::message::{MediaMessage, MessageKind};

/// `FLV` signature, version 1, audio+video present, header length 9,
/// followed by PreviousTagSize0.
const FLV_FILE_HEADER: [u8; 13] = [
    0x46, 0x4C, 0x56, 0x01, 0x05, 0x00, 0x00, 0x00, 0x09, 0x00, 0x00, 0x00, 0x00,
];

const TAG_HEADER_LEN: u32 = 11;

/// Writes one stream to an FLV file
pub struct FlvFileWriter {
    path: PathBuf,
    file: Option<File>,
    tags_written: u64,
}

impl FlvFileWriter {
    /// Create the file and write the FLV header.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::create(&path)?;
        file.write_all(&FLV_FILE_HEADER)?;
        info!(path = %path.display(), "flv recording started");
        Ok(Self {
            path,
            file: Some(file),
            tags_written: 0,
        })
    }

    /// Append one message as an FLV tag.
    pub fn write_message(&mut self, msg: &MediaMessage) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };

        let tag_type = match msg.kind {
            MessageKind::Audio => FlvTagType::Audio,
            MessageKind::Video => FlvTagType::Video,
            MessageKind::Metadata => FlvTagType::Script,
        };
        let data_size = msg.payload.len() as u32;
        let timestamp = msg.dts as u32;

        let mut header = [0u8; 11];
        header[0] = tag_type.as_u8();
        header[1..4].copy_from_slice(&data_size.to_be_bytes()[1..]);
        header[4..7].copy_from_slice(&timestamp.to_be_bytes()[1..]);
        header[7] = (timestamp >> 24) as u8; // extended timestamp byte
        // stream id stays zero

        file.write_all(&header)?;
        file.write_all(&msg.payload)?;
        file.write_all(&(TAG_HEADER_LEN + data_size).to_be_bytes())?;
        self.tags_written += 1;
        Ok(())
    }

    /// Flush and close the file.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            debug!(path = %self.path.display(), tags = self.tags_written, "flv recording closed");
        }
        Ok(())
    }

    pub fn tags_written(&self) -> u64 {
        self.tags_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FlvFileWriter {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use crate::media::message::Codec;

    use super::*;

    #[test]
    fn test_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.flv");

        let mut writer = FlvFileWriter::create(&path).unwrap();
        let msg = MediaMessage::video(
            Codec::Avc,
            1000,
            0,
            Bytes::from_static(&[0x17, 0x01, 0x00, 0x00, 0x00]),
        );
        writer.write_message(&msg).unwrap();
        writer.close().unwrap();

        let data = std::fs::read(&path).unwrap();
        // File header.
        assert_eq!(&data[..3], b"FLV");
        assert_eq!(data[3], 1);
        assert_eq!(data[4], 0x05);
        // First tag header.
        let tag = &data[13..];
        assert_eq!(tag[0], 9); // video
        assert_eq!(&tag[1..4], &[0x00, 0x00, 0x05]); // data size
        assert_eq!(&tag[4..7], &[0x00, 0x03, 0xE8]); // timestamp 1000
        assert_eq!(tag[7], 0); // extended timestamp
        // Payload then back-pointer (11 + 5 = 16).
        assert_eq!(&tag[11..16], &[0x17, 0x01, 0x00, 0x00, 0x00]);
        assert_eq!(&tag[16..20], &16u32.to_be_bytes());
    }

    #[test]
    fn test_write_after_close_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FlvFileWriter::create(dir.path().join("a.flv")).unwrap();
        writer.close().unwrap();

        let msg = MediaMessage::audio(Codec::Aac, 0, Bytes::from_static(&[0xAF, 0x01]));
        writer.write_message(&msg).unwrap();
        assert_eq!(writer.tags_written(), 0);
    }
}
