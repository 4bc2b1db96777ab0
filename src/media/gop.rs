//! GOP cache for late-joiner support
//!
//! A new subscriber needs the most recent key frame and everything after
//! it to start decoding immediately. The cache keeps a bounded ring of
//! complete GOPs: each GOP opens with a key video frame and accumulates
//! the audio, video, and metadata that follow until the next key frame.
//!
//! Sequence headers never enter the cache; they are cached separately and
//! replayed ahead of it.

use std::collections::VecDeque;

use super::message::{MediaMessage, MessageKind};

/// Upper bound on the configurable ring depth
pub const MAX_GOP_CACHE_DEPTH: usize = 8;

#[derive(Debug, Default)]
struct Gop {
    msgs: Vec<MediaMessage>,
}

/// Bounded ring of GOPs
#[derive(Debug)]
pub struct GopCache {
    capacity: usize,
    gops: VecDeque<Gop>,
    /// Video dropped because no key frame has opened a GOP yet
    orphan_dropped: u64,
}

impl GopCache {
    /// Create a cache holding up to `capacity` GOPs; values above
    /// [`MAX_GOP_CACHE_DEPTH`] are clamped, 0 disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.min(MAX_GOP_CACHE_DEPTH),
            gops: VecDeque::new(),
            orphan_dropped: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    /// Offer one normalized message.
    ///
    /// Key video frames rotate the ring; non-key video before the first
    /// key frame is dropped; audio and metadata ride in the current GOP.
    pub fn push(&mut self, msg: &MediaMessage) {
        if self.capacity == 0 {
            return;
        }
        debug_assert!(!msg.is_seq_header);

        match msg.kind {
            MessageKind::Video if msg.is_keyframe => {
                if self.gops.len() == self.capacity {
                    self.gops.pop_front();
                }
                self.gops.push_back(Gop {
                    msgs: vec![msg.clone()],
                });
            }
            MessageKind::Video => match self.gops.back_mut() {
                Some(gop) => gop.msgs.push(msg.clone()),
                None => self.orphan_dropped += 1,
            },
            MessageKind::Audio | MessageKind::Metadata => {
                if let Some(gop) = self.gops.back_mut() {
                    gop.msgs.push(msg.clone());
                }
            }
        }
    }

    /// All cached messages in insertion order, oldest GOP first
    pub fn snapshot(&self) -> Vec<MediaMessage> {
        self.gops.iter().flat_map(|g| g.msgs.iter().cloned()).collect()
    }

    /// Number of complete or in-progress GOPs held
    pub fn gop_count(&self) -> usize {
        self.gops.len()
    }

    /// Total cached messages across all GOPs
    pub fn message_count(&self) -> usize {
        self.gops.iter().map(|g| g.msgs.len()).sum()
    }

    /// Total cached payload bytes
    pub fn byte_size(&self) -> usize {
        self.gops
            .iter()
            .flat_map(|g| g.msgs.iter())
            .map(MediaMessage::size)
            .sum()
    }

    /// DTS of the first cached key frame, if any
    pub fn first_dts(&self) -> Option<u64> {
        self.gops.front().and_then(|g| g.msgs.first()).map(|m| m.dts)
    }

    pub fn orphan_dropped(&self) -> u64 {
        self.orphan_dropped
    }

    /// Drop everything, e.g. when a new publisher takes over
    pub fn clear(&mut self) {
        self.gops.clear();
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use crate::media::message::Codec;

    use super::*;

    fn keyframe(dts: u64) -> MediaMessage {
        let mut msg = MediaMessage::video(Codec::Avc, dts, 0, Bytes::from_static(&[0x17, 0x01]));
        msg.is_keyframe = true;
        msg
    }

    fn inter(dts: u64) -> MediaMessage {
        MediaMessage::video(Codec::Avc, dts, 0, Bytes::from_static(&[0x27, 0x01]))
    }

    fn audio(dts: u64) -> MediaMessage {
        MediaMessage::audio(Codec::Aac, dts, Bytes::from_static(&[0xAF, 0x01]))
    }

    #[test]
    fn test_gop_starts_with_keyframe() {
        let mut cache = GopCache::new(2);

        // Inter frames before any key frame are dropped.
        cache.push(&inter(0));
        cache.push(&inter(33));
        assert_eq!(cache.gop_count(), 0);
        assert_eq!(cache.orphan_dropped(), 2);

        cache.push(&keyframe(66));
        cache.push(&inter(100));
        assert_eq!(cache.gop_count(), 1);
        assert_eq!(cache.message_count(), 2);
        assert_eq!(cache.first_dts(), Some(66));
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let mut cache = GopCache::new(2);

        cache.push(&keyframe(0));
        cache.push(&inter(33));
        cache.push(&keyframe(1000));
        cache.push(&inter(1033));
        assert_eq!(cache.gop_count(), 2);

        // Third GOP evicts the first.
        cache.push(&keyframe(2000));
        assert_eq!(cache.gop_count(), 2);
        assert_eq!(cache.first_dts(), Some(1000));
    }

    #[test]
    fn test_audio_rides_in_current_gop() {
        let mut cache = GopCache::new(2);

        cache.push(&keyframe(0));
        cache.push(&audio(10));
        cache.push(&inter(33));
        cache.push(&audio(43));

        let snapshot = cache.snapshot();
        let dts: Vec<u64> = snapshot.iter().map(|m| m.dts).collect();
        assert_eq!(dts, vec![0, 10, 33, 43]);
    }

    #[test]
    fn test_snapshot_spans_gops_in_order() {
        let mut cache = GopCache::new(3);

        cache.push(&keyframe(0));
        cache.push(&inter(33));
        cache.push(&keyframe(1000));
        cache.push(&inter(1033));

        let dts: Vec<u64> = cache.snapshot().iter().map(|m| m.dts).collect();
        assert_eq!(dts, vec![0, 33, 1000, 1033]);
    }

    #[test]
    fn test_capacity_zero_disables() {
        let mut cache = GopCache::new(0);
        assert!(!cache.is_enabled());

        cache.push(&keyframe(0));
        cache.push(&inter(33));
        assert_eq!(cache.gop_count(), 0);
        assert!(cache.snapshot().is_empty());
    }

    #[test]
    fn test_capacity_clamped() {
        let cache = GopCache::new(100);
        assert_eq!(cache.capacity(), MAX_GOP_CACHE_DEPTH);
    }

    #[test]
    fn test_clear() {
        let mut cache = GopCache::new(2);
        cache.push(&keyframe(0));
        cache.push(&inter(33));

        cache.clear();
        assert_eq!(cache.gop_count(), 0);
        assert_eq!(cache.byte_size(), 0);
    }

    #[test]
    fn test_byte_size() {
        let mut cache = GopCache::new(2);
        cache.push(&keyframe(0)); // 2 bytes
        cache.push(&audio(10)); // 2 bytes
        assert_eq!(cache.byte_size(), 4);
    }
}
