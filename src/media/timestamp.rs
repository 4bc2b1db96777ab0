//! Timestamp synthesis
//!
//! Three timestamp regimes feed a group and all of them come out as
//! absolute milliseconds:
//!
//! - RTP sources carry 32-bit wrapping timestamps in codec clock units.
//!   The first observed timestamp anchors to 0 ms and wraps are unwrapped
//!   on 32-bit boundaries.
//! - RTMP sources carry millisecond timestamps that are trusted but
//!   clamped: a regression forwards `previous + 1`.
//! - Raw elementary streams carry no timestamps at all; the caller
//!   supplies synthesized DTS values.
//!
//! Everything here is pure state-machine code, independent of any session.

use std::collections::BTreeMap;

use super::message::MediaMessage;

/// 32-bit rollover tracking for one RTP track
#[derive(Debug, Default)]
struct RolloverState {
    previous: Option<u32>,
    count: u64,
}

impl RolloverState {
    /// Extend a wrapping 32-bit timestamp to 64 bits.
    fn extend(&mut self, current: u32) -> u64 {
        let Some(previous) = self.previous else {
            self.previous = Some(current);
            return current as u64;
        };

        let diff = u32::abs_diff(previous, current);
        if diff >= u32::MAX / 2 {
            if previous > current {
                self.count += 1;
            } else {
                // A packet from before the rollover.
                self.count = self.count.saturating_sub(1);
            }
        }

        self.previous = Some(current);
        self.count * (u32::MAX as u64 + 1) + current as u64
    }
}

/// Per-track RTP clock: unwraps and anchors to absolute milliseconds
#[derive(Debug)]
pub struct RtpClock {
    clock_hz: u32,
    rollover: RolloverState,
    base: Option<u64>,
}

impl RtpClock {
    pub fn new(clock_hz: u32) -> Self {
        Self {
            clock_hz,
            rollover: RolloverState::default(),
            base: None,
        }
    }

    /// Convert a raw RTP timestamp to absolute milliseconds.
    ///
    /// The first timestamp observed maps to 0; packets from before the
    /// anchor saturate to 0.
    pub fn to_ms(&mut self, rtp_timestamp: u32) -> u64 {
        let extended = self.rollover.extend(rtp_timestamp);
        let base = *self.base.get_or_insert(extended);
        let relative = extended.saturating_sub(base);
        relative * 1000 / self.clock_hz as u64
    }

    pub fn clock_hz(&self) -> u32 {
        self.clock_hz
    }
}

/// Monotonicity enforcement for trusted-timestamp sources
#[derive(Debug, Default)]
pub struct MonotonicClamp {
    previous: Option<u64>,
    regressions: u64,
}

impl MonotonicClamp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clamp a timestamp: regressions forward `previous + 1`.
    pub fn normalize(&mut self, ts: u64) -> u64 {
        match self.previous {
            Some(prev) if ts < prev => {
                self.regressions += 1;
                let clamped = prev + 1;
                self.previous = Some(clamped);
                clamped
            }
            _ => {
                self.previous = Some(ts);
                ts
            }
        }
    }

    /// How many regressions were clamped
    pub fn regressions(&self) -> u64 {
        self.regressions
    }
}

/// Jitter-smoothing reorder window for multi-track publishers
///
/// RTSP publishers deliver audio and video on independent tracks; messages
/// are held for up to `window_ms` and released in DTS order. Anything
/// arriving older than the window's lower bound is dropped and counted.
#[derive(Debug)]
pub struct ReorderWindow {
    window_ms: u64,
    pending: BTreeMap<(u64, u64), MediaMessage>,
    arrival: u64,
    max_seen: u64,
    late_dropped: u64,
}

impl ReorderWindow {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            pending: BTreeMap::new(),
            arrival: 0,
            max_seen: 0,
            late_dropped: 0,
        }
    }

    /// Lower bound of the window; messages older than this are late.
    fn horizon(&self) -> Option<u64> {
        if self.max_seen >= self.window_ms {
            Some(self.max_seen - self.window_ms)
        } else {
            None
        }
    }

    /// Offer one message; returns the messages that are now releasable,
    /// in DTS order.
    pub fn push(&mut self, msg: MediaMessage) -> Vec<MediaMessage> {
        if let Some(horizon) = self.horizon() {
            if msg.dts < horizon {
                self.late_dropped += 1;
                return Vec::new();
            }
        }

        self.max_seen = self.max_seen.max(msg.dts);
        self.arrival += 1;
        self.pending.insert((msg.dts, self.arrival), msg);
        self.drain_releasable()
    }

    /// Release everything still pending, in DTS order.
    pub fn flush(&mut self) -> Vec<MediaMessage> {
        let mut out: Vec<MediaMessage> = Vec::with_capacity(self.pending.len());
        while let Some((&key, _)) = self.pending.iter().next() {
            out.push(self.pending.remove(&key).expect("pending key"));
        }
        out
    }

    /// How many packets arrived too late and were dropped
    pub fn late_dropped(&self) -> u64 {
        self.late_dropped
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn drain_releasable(&mut self) -> Vec<MediaMessage> {
        let Some(horizon) = self.horizon() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        while let Some((&key, _)) = self.pending.iter().next() {
            let (dts, _) = key;
            if dts > horizon {
                break;
            }
            out.push(self.pending.remove(&key).expect("pending key"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use crate::media::message::Codec;

    use super::*;

    #[test]
    fn test_rtp_clock_anchors_to_zero() {
        let mut clock = RtpClock::new(90_000);
        assert_eq!(clock.to_ms(1_000_000), 0);
        assert_eq!(clock.to_ms(1_090_000), 1000);
        assert_eq!(clock.to_ms(1_180_000), 2000);
    }

    #[test]
    fn test_rtp_clock_audio_rate() {
        let mut clock = RtpClock::new(48_000);
        assert_eq!(clock.to_ms(0), 0);
        assert_eq!(clock.to_ms(48_000), 1000);
        assert_eq!(clock.to_ms(49_024), 1021);
    }

    #[test]
    fn test_rtp_clock_unwraps_rollover() {
        let mut clock = RtpClock::new(90_000);
        let start = u32::MAX - 45_000 + 1;
        assert_eq!(clock.to_ms(start), 0);
        // 45000 ticks later the 32-bit counter has wrapped to 0.
        assert_eq!(clock.to_ms(0), 500);
        assert_eq!(clock.to_ms(45_000), 1000);
    }

    #[test]
    fn test_rtp_clock_before_anchor_saturates() {
        let mut clock = RtpClock::new(90_000);
        assert_eq!(clock.to_ms(90_000), 0);
        assert_eq!(clock.to_ms(45_000), 0);
    }

    #[test]
    fn test_monotonic_clamp_passes_increasing() {
        let mut clamp = MonotonicClamp::new();
        assert_eq!(clamp.normalize(0), 0);
        assert_eq!(clamp.normalize(33), 33);
        assert_eq!(clamp.normalize(33), 33); // equal is allowed
        assert_eq!(clamp.regressions(), 0);
    }

    #[test]
    fn test_monotonic_clamp_regression() {
        let mut clamp = MonotonicClamp::new();
        clamp.normalize(1000);
        assert_eq!(clamp.normalize(500), 1001);
        assert_eq!(clamp.regressions(), 1);
        // A later in-order timestamp resumes normally.
        assert_eq!(clamp.normalize(1100), 1100);
    }

    fn audio_at(dts: u64) -> MediaMessage {
        MediaMessage::audio(Codec::Aac, dts, Bytes::new())
    }

    #[test]
    fn test_reorder_window_orders_by_dts() {
        let mut window = ReorderWindow::new(100);

        assert!(window.push(audio_at(0)).is_empty());
        assert!(window.push(audio_at(40)).is_empty());
        // 150 pushes the horizon to 50, releasing 0 and 40.
        let out = window.push(audio_at(150));
        let dts: Vec<u64> = out.iter().map(|m| m.dts).collect();
        assert_eq!(dts, vec![0, 40]);

        let rest = window.flush();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].dts, 150);
    }

    #[test]
    fn test_reorder_window_interleaves_tracks() {
        let mut window = ReorderWindow::new(100);
        let mut emitted = Vec::new();

        // Two tracks arriving out of order but within the window.
        for msg in [
            audio_at(120),
            audio_at(40),
            audio_at(60),
            audio_at(100),
            audio_at(240),
        ] {
            emitted.extend(window.push(msg));
        }
        emitted.extend(window.flush());

        let dts: Vec<u64> = emitted.iter().map(|m| m.dts).collect();
        assert_eq!(dts, vec![40, 60, 100, 120, 240]);
    }

    #[test]
    fn test_reorder_window_drops_late() {
        let mut window = ReorderWindow::new(100);
        window.push(audio_at(0));
        window.push(audio_at(500)); // releases 0, lower bound moves up

        // 10 is older than the last released timestamp: dropped.
        assert!(window.push(audio_at(10)).is_empty());
        assert_eq!(window.late_dropped(), 1);
        assert_eq!(window.pending_len(), 1);
    }
}
