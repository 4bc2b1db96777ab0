//! HLS segmenter
//!
//! Consumes closed transport-stream fragments and maintains the on-disk
//! layout `<root>/<stream_name>/{playlist.m3u8, segment_<seq>.ts}`.
//!
//! A fragment's playlist entry needs the duration to the *next* fragment,
//! so one fragment is always held pending: when the next arrives, the
//! pending one is finalized with `next.first_dts - pending.first_dts`;
//! at close the terminating duration is synthesized from the pending
//! fragment's own last DTS.

use std::fs;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::remux::mpegts::TsFragment;

use super::playlist::{LivePlaylist, SegmentInfo};

/// HLS output settings
#[derive(Debug, Clone)]
pub struct HlsConfig {
    /// Root directory; segments land in `<root>/<stream_name>/`
    pub root: PathBuf,
    /// Playlist window length in segments
    pub playlist_length: usize,
    /// Delete evicted segment files
    pub delete_evicted: bool,
}

impl Default for HlsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("hls"),
            playlist_length: super::playlist::DEFAULT_PLAYLIST_LENGTH,
            delete_evicted: true,
        }
    }
}

struct PendingSegment {
    sequence: u64,
    first_dts: u64,
    last_dts: u64,
    uri: String,
}

/// Segment writer and playlist maintainer for one stream
pub struct HlsSegmenter {
    dir: PathBuf,
    delete_evicted: bool,
    playlist: LivePlaylist,
    next_sequence: u64,
    pending: Option<PendingSegment>,
    closed: bool,
}

impl HlsSegmenter {
    /// Create the segmenter and its output directory.
    pub fn new(config: &HlsConfig, stream_name: &str) -> Result<Self> {
        let dir = config.root.join(stream_name);
        fs::create_dir_all(&dir)?;
        info!(stream = %stream_name, dir = %dir.display(), "hls segmenter opened");
        Ok(Self {
            dir,
            delete_evicted: config.delete_evicted,
            playlist: LivePlaylist::new(config.playlist_length),
            next_sequence: 0,
            pending: None,
            closed: false,
        })
    }

    /// Write one closed fragment as a segment file and update the
    /// playlist for the previously pending segment.
    pub fn on_fragment(&mut self, fragment: &TsFragment) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let uri = format!("segment_{sequence}.ts");
        fs::write(self.dir.join(&uri), &fragment.data)?;
        debug!(uri = %uri, bytes = fragment.data.len(), "hls segment written");

        if let Some(pending) = self.pending.take() {
            let duration_ms = fragment.first_dts.saturating_sub(pending.first_dts);
            self.finalize(pending, duration_ms)?;
        }

        self.pending = Some(PendingSegment {
            sequence,
            first_dts: fragment.first_dts,
            last_dts: fragment.last_dts,
            uri,
        });
        Ok(())
    }

    /// Finalize the pending segment and end the playlist. Failures are
    /// logged by the caller; resources are released regardless.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Some(pending) = self.pending.take() {
            // No following fragment: synthesize from the last packet.
            let duration_ms = pending.last_dts.saturating_sub(pending.first_dts);
            self.finalize(pending, duration_ms)?;
        }
        self.playlist.end();
        self.playlist.write_atomic(&self.dir)?;
        info!(dir = %self.dir.display(), "hls segmenter closed");
        Ok(())
    }

    pub fn segment_count(&self) -> usize {
        self.playlist.segment_count()
    }

    pub fn media_sequence(&self) -> u64 {
        self.playlist.media_sequence()
    }

    fn finalize(&mut self, pending: PendingSegment, duration_ms: u64) -> Result<()> {
        let evicted = self.playlist.push(SegmentInfo {
            uri: pending.uri,
            duration: duration_ms as f64 / 1000.0,
            sequence: pending.sequence,
        });
        if let Some(old) = evicted {
            if self.delete_evicted {
                if let Err(e) = fs::remove_file(self.dir.join(&old.uri)) {
                    warn!(uri = %old.uri, error = %e, "failed to delete evicted segment");
                }
            }
        }
        self.playlist.write_atomic(&self.dir)?;
        Ok(())
    }
}
