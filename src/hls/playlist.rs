//! Live HLS playlist
//!
//! A sliding window of segments rendered as an m3u8 document. Visibility
//! is atomic: the document is written to `playlist.m3u8.tmp` and renamed
//! over the live name, so readers see either the old complete playlist or
//! the new complete playlist.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub const PLAYLIST_FILENAME: &str = "playlist.m3u8";
pub const DEFAULT_PLAYLIST_LENGTH: usize = 6;

/// One finished segment in the window
#[derive(Debug, Clone)]
pub struct SegmentInfo {
    /// File name relative to the playlist (`segment_7.ts`)
    pub uri: String,
    /// Duration in seconds
    pub duration: f64,
    /// Monotonic segment sequence number
    pub sequence: u64,
}

/// Sliding-window live playlist
#[derive(Debug)]
pub struct LivePlaylist {
    window: usize,
    media_sequence: u64,
    segments: Vec<SegmentInfo>,
    ended: bool,
}

impl LivePlaylist {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            media_sequence: 0,
            segments: Vec::new(),
            ended: false,
        }
    }

    /// Append a finished segment; returns the segment that slid out of
    /// the window, if any, so its file can be deleted.
    pub fn push(&mut self, segment: SegmentInfo) -> Option<SegmentInfo> {
        self.segments.push(segment);
        if self.segments.len() > self.window {
            let evicted = self.segments.remove(0);
            self.media_sequence += 1;
            Some(evicted)
        } else {
            None
        }
    }

    /// Mark the playlist complete (`#EXT-X-ENDLIST`).
    pub fn end(&mut self) {
        self.ended = true;
    }

    pub fn media_sequence(&self) -> u64 {
        self.media_sequence
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Largest segment duration rounded up, as TARGETDURATION wants it
    fn target_duration(&self) -> u64 {
        self.segments
            .iter()
            .map(|s| s.duration.ceil() as u64)
            .max()
            .unwrap_or(1)
    }

    /// Render the m3u8 document.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(256);
        out.push_str("#EXTM3U\n");
        out.push_str("#EXT-X-VERSION:3\n");
        out.push_str(&format!("#EXT-X-TARGETDURATION:{}\n", self.target_duration()));
        out.push_str(&format!("#EXT-X-MEDIA-SEQUENCE:{}\n", self.media_sequence));
        for segment in &self.segments {
            out.push_str(&format!("#EXTINF:{:.3},\n{}\n", segment.duration, segment.uri));
        }
        if self.ended {
            out.push_str("#EXT-X-ENDLIST\n");
        }
        out
    }

    /// Write atomically into `dir`: temp file first, then rename.
    pub fn write_atomic(&self, dir: &Path) -> Result<PathBuf> {
        let final_path = dir.join(PLAYLIST_FILENAME);
        let tmp_path = dir.join(format!("{PLAYLIST_FILENAME}.tmp"));
        fs::write(&tmp_path, self.render())?;
        fs::rename(&tmp_path, &final_path)?;
        Ok(final_path)
    }
}
