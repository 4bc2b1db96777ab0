//! The group: one logical stream, one publisher, many subscribers
//!
//! A group owns the per-stream state: the single publisher slot, the
//! subscriber set partitioned by output protocol, the sequence-header and
//! GOP caches, the lazily created remuxers, the HLS pipeline, relay-pull
//! state, and counters. All mutations serialize on the group lock; fan-out
//! clones `Bytes` handles into subscriber queues while holding it briefly,
//! and output workers drain without it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::hls::HlsSegmenter;
use crate::media::aac::AudioSpecificConfig;
use crate::media::flv::FlvTag;
use crate::media::gop::GopCache;
use crate::media::message::{Codec, MediaMessage, MessageKind};
use crate::media::timestamp::{MonotonicClamp, ReorderWindow};
use crate::record::FlvFileWriter;
use crate::remux::mpegts::{FilterEvent, Rtmp2MpegtsFilter};
use crate::remux::rtsp::{Rtmp2RtspRemuxer, Rtsp2RtmpRemuxer};
use crate::rtp::packet::RtpPacket;

use super::config::GroupConfig;
use super::observer::{GroupObserver, PublishInfo};
use super::session::{SessionId, SessionProtocol};
use super::subscriber::{
    EnqueueOutcome, OutFrame, SubscriberHandle, SubscriberQueue, TsChunk,
};

/// Point-in-time group counters
#[derive(Debug, Clone, Default)]
pub struct GroupStats {
    pub msgs_in: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub current_subscribers: usize,
    pub peak_subscribers: usize,
    /// Frames dropped across all subscriber queues under soft pressure
    pub dropped_frames: u64,
    /// Subscribers evicted as slow consumers
    pub evicted_subscribers: u64,
    /// Messages dropped by the reorder window as too late
    pub late_dropped: u64,
}

struct PublisherSlot {
    id: SessionId,
    protocol: SessionProtocol,
}

struct SubscriberEntry {
    protocol: SessionProtocol,
    queue: Arc<SubscriberQueue>,
}

struct GroupInner {
    publisher: Option<PublisherSlot>,
    subscribers: HashMap<SessionId, SubscriberEntry>,

    metadata: Option<MediaMessage>,
    audio_seq_header: Option<MediaMessage>,
    video_seq_header: Option<MediaMessage>,
    gop: GopCache,

    next_seq: u64,
    video_clamp: MonotonicClamp,
    audio_clamp: MonotonicClamp,

    /// Multi-track (RTP) ingest state, created on demand
    rtp_in: Option<Rtsp2RtmpRemuxer>,
    reorder: Option<ReorderWindow>,

    /// Outbound remuxers, created on first heterogeneous subscriber and
    /// kept across subscriber churn
    rtsp_out: Option<Rtmp2RtspRemuxer>,
    ts_filter: Option<Rtmp2MpegtsFilter>,
    /// Cached PAT+PMT chunk for late HTTP-TS joiners
    ts_program_header: Option<TsChunk>,

    hls: Option<HlsSegmenter>,
    recorder: Option<FlvFileWriter>,

    pull_task: Option<JoinHandle<()>>,

    stats: GroupStats,
    last_activity: Instant,
    violations: Vec<Instant>,
}

/// One logical stream
pub struct Group {
    name: String,
    config: GroupConfig,
    observer: Option<Arc<dyn GroupObserver>>,
    inner: Mutex<GroupInner>,
}

impl Group {
    pub(crate) fn new(
        name: &str,
        config: GroupConfig,
        observer: Option<Arc<dyn GroupObserver>>,
    ) -> Arc<Self> {
        let gop_depth = config.gop_cache_depth;
        Arc::new(Self {
            name: name.to_string(),
            config,
            observer,
            inner: Mutex::new(GroupInner {
                publisher: None,
                subscribers: HashMap::new(),
                metadata: None,
                audio_seq_header: None,
                video_seq_header: None,
                gop: GopCache::new(gop_depth),
                next_seq: 0,
                video_clamp: MonotonicClamp::new(),
                audio_clamp: MonotonicClamp::new(),
                rtp_in: None,
                reorder: None,
                rtsp_out: None,
                ts_filter: None,
                ts_program_header: None,
                hls: None,
                recorder: None,
                pull_task: None,
                stats: GroupStats::default(),
                last_activity: Instant::now(),
                violations: Vec::new(),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Claim the publisher slot.
    ///
    /// A second publisher is rejected with [`Error::Conflict`], except
    /// that a local publisher preempts an active relay pull. A new
    /// publisher flushes the caches so subscribers reinitialize from its
    /// sequence headers.
    pub async fn attach_publisher(
        &self,
        id: SessionId,
        protocol: SessionProtocol,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;

        if let Some(existing) = &inner.publisher {
            let preempting =
                existing.protocol == SessionProtocol::RelayPull && protocol != SessionProtocol::RelayPull;
            if !preempting {
                return Err(Error::Conflict(self.name.clone()));
            }
            info!(stream = %self.name, "local publisher preempts relay pull");
            if let Some(task) = inner.pull_task.take() {
                task.abort();
            }
            self.finish_publisher(&mut inner);
        }

        // Codec may differ from the previous publisher: flush everything
        // derived from the old stream.
        inner.metadata = None;
        inner.audio_seq_header = None;
        inner.video_seq_header = None;
        inner.gop.clear();
        inner.next_seq = 0;
        inner.video_clamp = MonotonicClamp::new();
        inner.audio_clamp = MonotonicClamp::new();
        inner.rtp_in = None;
        inner.reorder = None;
        inner.ts_program_header = None;

        if self.config.hls.is_some() || inner.ts_filter.is_some() {
            inner.ts_filter = Some(Rtmp2MpegtsFilter::new(self.config.max_fragment_ms));
        }
        if let Some(hls_config) = &self.config.hls {
            match HlsSegmenter::new(hls_config, &self.name) {
                Ok(segmenter) => inner.hls = Some(segmenter),
                Err(e) => warn!(stream = %self.name, error = %e, "hls disabled for this stream"),
            }
        }
        if let Some(dir) = &self.config.record_flv_dir {
            let path = dir.join(format!("{}.flv", self.name.replace('/', "_")));
            match FlvFileWriter::create(&path) {
                Ok(writer) => inner.recorder = Some(writer),
                Err(e) => warn!(stream = %self.name, error = %e, "flv recording disabled"),
            }
        }

        inner.publisher = Some(PublisherSlot { id, protocol });
        inner.last_activity = Instant::now();
        info!(stream = %self.name, session = %id, protocol = %protocol, "publisher attached");

        if let Some(observer) = &self.observer {
            observer.on_publish_start(&PublishInfo {
                stream_name: self.name.clone(),
                session_id: id,
                protocol,
            });
        }
        Ok(())
    }

    /// Release the publisher slot; ignored if `id` is not the publisher.
    pub async fn detach_publisher(&self, id: SessionId) {
        let mut inner = self.inner.lock().await;
        match &inner.publisher {
            Some(slot) if slot.id == id => {}
            _ => return,
        }
        self.finish_publisher(&mut inner);
        info!(stream = %self.name, session = %id, "publisher detached");
    }

    /// Add a subscriber and replay the initial burst: metadata, audio and
    /// video sequence headers, then the GOP cache in insertion order.
    pub async fn attach_subscriber(
        &self,
        id: SessionId,
        protocol: SessionProtocol,
    ) -> SubscriberHandle {
        let mut inner = self.inner.lock().await;
        let queue = SubscriberQueue::new(self.config.subscriber_queue_capacity);

        if protocol.consumes_media_frames() {
            let burst: Vec<MediaMessage> = inner
                .metadata
                .iter()
                .chain(inner.audio_seq_header.iter())
                .chain(inner.video_seq_header.iter())
                .cloned()
                .chain(inner.gop.snapshot())
                .collect();
            for msg in burst {
                inner.stats.bytes_out += msg.size() as u64;
                queue.enqueue(OutFrame::Media(msg));
            }
        } else if protocol.consumes_rtp() {
            self.ensure_rtsp_out(&mut inner);
        } else if protocol.consumes_ts() {
            if inner.ts_filter.is_none() {
                inner.ts_filter = Some(Rtmp2MpegtsFilter::new(self.config.max_fragment_ms));
            }
            if let Some(header) = inner.ts_program_header.clone() {
                queue.enqueue(OutFrame::Ts(header));
            }
        }

        inner.subscribers.insert(
            id,
            SubscriberEntry {
                protocol,
                queue: queue.clone(),
            },
        );
        inner.stats.current_subscribers = inner.subscribers.len();
        inner.stats.peak_subscribers =
            inner.stats.peak_subscribers.max(inner.subscribers.len());
        inner.last_activity = Instant::now();
        info!(
            stream = %self.name,
            session = %id,
            protocol = %protocol,
            subscribers = inner.subscribers.len(),
            "subscriber attached"
        );

        SubscriberHandle::new(id, protocol, self.name.clone(), queue)
    }

    /// Remove a subscriber; its queue closes and the worker drains out.
    pub async fn detach_subscriber(&self, id: SessionId) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.subscribers.remove(&id) {
            entry.queue.close();
            inner.stats.dropped_frames += entry.queue.dropped();
            inner.stats.current_subscribers = inner.subscribers.len();
            inner.last_activity = Instant::now();
            info!(
                stream = %self.name,
                session = %id,
                subscribers = inner.subscribers.len(),
                "subscriber detached"
            );
        }
    }

    /// Ingest one message from the publisher and fan it out exactly once.
    pub async fn publish(&self, id: SessionId, msg: MediaMessage) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match &inner.publisher {
            Some(slot) if slot.id == id => {}
            _ => {
                return Err(Error::ProtocolViolation(
                    "publish from a session that is not the publisher".into(),
                ))
            }
        }
        self.ingest(&mut inner, msg)
    }

    /// Configure RTP ingest for a multi-track publisher: the video codec
    /// and the AudioSpecificConfig learned from its SDP.
    pub async fn configure_rtp_publisher(
        &self,
        id: SessionId,
        video_codec: Codec,
        audio_config: Option<AudioSpecificConfig>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match &inner.publisher {
            Some(slot) if slot.id == id => {}
            _ => return Err(Error::ProtocolViolation("not the publisher".into())),
        }
        let audio_clock = audio_config
            .as_ref()
            .map(|c| c.sampling_frequency)
            .unwrap_or(48_000);
        let mut remuxer = Rtsp2RtmpRemuxer::new(video_codec, audio_clock);
        if let Some(config) = audio_config {
            remuxer.set_audio_config(config);
        }
        inner.rtp_in = Some(remuxer);
        inner.reorder = Some(ReorderWindow::new(self.config.reorder_window_ms));
        Ok(())
    }

    /// Ingest one video-track RTP packet from the publisher.
    pub async fn publish_rtp_video(&self, id: SessionId, packet: &RtpPacket) -> Result<()> {
        self.publish_rtp(id, packet, true).await
    }

    /// Ingest one audio-track RTP packet from the publisher.
    pub async fn publish_rtp_audio(&self, id: SessionId, packet: &RtpPacket) -> Result<()> {
        self.publish_rtp(id, packet, false).await
    }

    async fn publish_rtp(&self, id: SessionId, packet: &RtpPacket, video: bool) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        match &inner.publisher {
            Some(slot) if slot.id == id => {}
            _ => return Err(Error::ProtocolViolation("not the publisher".into())),
        }
        let Some(remuxer) = inner.rtp_in.as_mut() else {
            return Err(Error::ProtocolViolation("rtp ingest not configured".into()));
        };

        let messages = if video {
            remuxer.on_video_packet(packet)?
        } else {
            remuxer.on_audio_packet(packet)?
        };

        // Tracks arrive independently: interleave by timestamp through
        // the reorder window before the ordinary ingest pipeline.
        let mut ready = Vec::new();
        if let Some(reorder) = inner.reorder.as_mut() {
            for msg in messages {
                // Sequence headers bypass the window so they can never be
                // dropped as late.
                if msg.is_seq_header {
                    ready.push(msg);
                } else {
                    ready.extend(reorder.push(msg));
                }
            }
            inner.stats.late_dropped = reorder.late_dropped();
        } else {
            ready = messages;
        }

        for msg in ready {
            self.ingest(inner, msg)?;
        }
        Ok(())
    }

    /// SDP for RTSP subscribers, once sequence headers are known.
    pub async fn sdp(&self) -> Option<String> {
        let mut inner = self.inner.lock().await;
        self.ensure_rtsp_out(&mut inner);
        inner.rtsp_out.as_ref().and_then(|r| r.sdp())
    }

    pub async fn has_publisher(&self) -> bool {
        self.inner.lock().await.publisher.is_some()
    }

    pub async fn publisher_protocol(&self) -> Option<SessionProtocol> {
        self.inner.lock().await.publisher.as_ref().map(|p| p.protocol)
    }

    pub async fn subscriber_count(&self) -> usize {
        self.inner.lock().await.subscribers.len()
    }

    pub async fn stats(&self) -> GroupStats {
        let inner = self.inner.lock().await;
        let mut stats = inner.stats.clone();
        stats.dropped_frames += inner
            .subscribers
            .values()
            .map(|e| e.queue.dropped())
            .sum::<u64>();
        stats
    }

    pub(crate) async fn set_pull_task(&self, task: JoinHandle<()>) {
        let mut inner = self.inner.lock().await;
        if let Some(old) = inner.pull_task.replace(task) {
            old.abort();
        }
    }

    pub(crate) async fn clear_pull_task(&self) {
        self.inner.lock().await.pull_task = None;
    }

    pub async fn pull_active(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.pull_task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Whether the GC tick may destroy this group. Non-blocking: a held
    /// lock means the group is busy and is skipped this round.
    pub(crate) fn try_expendable(&self, idle_timeout: std::time::Duration) -> bool {
        match self.inner.try_lock() {
            Ok(inner) => {
                inner.publisher.is_none()
                    && inner.subscribers.is_empty()
                    && inner.pull_task.as_ref().map(|t| t.is_finished()).unwrap_or(true)
                    && inner.last_activity.elapsed() >= idle_timeout
            }
            Err(_) => false,
        }
    }

    /// Tear everything down: close queues, finish HLS/recording, stop
    /// the pull task.
    pub(crate) async fn destroy(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(task) = inner.pull_task.take() {
            task.abort();
        }
        for (_, entry) in inner.subscribers.drain() {
            entry.queue.close();
        }
        self.finish_publisher(&mut inner);
        inner.metadata = None;
        inner.audio_seq_header = None;
        inner.video_seq_header = None;
        inner.gop.clear();
        info!(stream = %self.name, "group destroyed");
    }

    /// Publisher teardown shared by detach, preemption, and destroy:
    /// flush the open TS fragment, close HLS and the recorder, notify.
    fn finish_publisher(&self, inner: &mut GroupInner) {
        let Some(slot) = inner.publisher.take() else {
            return;
        };

        let tail = match inner.reorder.as_mut() {
            Some(reorder) => reorder.flush(),
            None => Vec::new(),
        };
        for msg in tail {
            if let Err(e) = self.ingest(inner, msg) {
                debug!(stream = %self.name, error = %e, "tail ingest after publisher stop");
            }
        }

        let tail_fragment = inner.ts_filter.as_mut().and_then(|f| f.flush());
        if let Some(fragment) = tail_fragment {
            Self::deliver_fragment(&self.name, inner, fragment);
        }
        if let Some(mut hls) = inner.hls.take() {
            // Failures are logged; resources are released regardless.
            if let Err(e) = hls.close() {
                warn!(stream = %self.name, error = %e, "hls finalization failed");
            }
        }
        if let Some(mut recorder) = inner.recorder.take() {
            if let Err(e) = recorder.close() {
                warn!(stream = %self.name, error = %e, "flv recording close failed");
            }
        }
        inner.last_activity = Instant::now();

        if let Some(observer) = &self.observer {
            observer.on_publish_stop(&PublishInfo {
                stream_name: self.name.clone(),
                session_id: slot.id,
                protocol: slot.protocol,
            });
        }
    }

    /// The ingest pipeline: classify, clamp, cache, fan out.
    fn ingest(&self, inner: &mut GroupInner, mut msg: MediaMessage) -> Result<()> {
        if !self.validate(inner, &msg)? {
            return Ok(());
        }

        // Timestamp synthesis: monotonicity per media type for trusted
        // sources; regressions forward previous + 1.
        msg.dts = match msg.kind {
            MessageKind::Video => inner.video_clamp.normalize(msg.dts),
            MessageKind::Audio => inner.audio_clamp.normalize(msg.dts),
            MessageKind::Metadata => msg.dts,
        };
        msg.seq = inner.next_seq;
        inner.next_seq += 1;

        inner.stats.msgs_in += 1;
        inner.stats.bytes_in += msg.size() as u64;
        inner.last_activity = Instant::now();

        // Classify: sequence headers and metadata replace their caches.
        if msg.is_seq_header {
            match msg.kind {
                MessageKind::Audio => inner.audio_seq_header = Some(msg.clone()),
                MessageKind::Video => inner.video_seq_header = Some(msg.clone()),
                MessageKind::Metadata => {}
            }
        } else if msg.kind == MessageKind::Metadata {
            inner.metadata = Some(msg.clone());
        } else {
            inner.gop.push(&msg);
        }

        if let (Some(observer), Some(slot)) = (&self.observer, &inner.publisher) {
            observer.on_message(
                &PublishInfo {
                    stream_name: self.name.clone(),
                    session_id: slot.id,
                    protocol: slot.protocol,
                },
                &msg,
            );
        }

        if let Some(recorder) = inner.recorder.as_mut() {
            if let Err(e) = recorder.write_message(&msg) {
                warn!(stream = %self.name, error = %e, "flv recording failed, stopping");
                inner.recorder = None;
            }
        }

        self.fan_out(inner, &msg);
        Ok(())
    }

    /// Fan out one normalized message to every subscriber partition.
    fn fan_out(&self, inner: &mut GroupInner, msg: &MediaMessage) {
        // MPEG-TS pipeline first: it may close a fragment that both HLS
        // and HTTP-TS subscribers consume.
        let ts_events = match inner.ts_filter.as_mut() {
            Some(filter) => filter.push(msg),
            None => Vec::new(),
        };
        for event in ts_events {
            match event {
                FilterEvent::PatPmt(data) => {
                    let chunk = TsChunk {
                        data,
                        is_program_header: true,
                        key: false,
                    };
                    inner.ts_program_header = Some(chunk.clone());
                    Self::broadcast_ts(&self.name, inner, chunk);
                }
                FilterEvent::Fragment(fragment) => {
                    Self::deliver_fragment(&self.name, inner, fragment);
                }
            }
        }

        // Per-format artifacts are computed once per message, not per
        // subscriber. The RTSP remuxer keeps consuming sequence headers
        // even with no subscribers so its SDP stays current.
        let rtp_frames = match inner.rtsp_out.as_mut() {
            Some(remuxer) => remuxer.on_message(msg),
            None => Vec::new(),
        };

        let mut evicted: Vec<SessionId> = Vec::new();
        let mut bytes_out = 0u64;
        for (id, entry) in &inner.subscribers {
            let outcome = if entry.protocol.consumes_media_frames() {
                bytes_out += msg.size() as u64;
                entry.queue.enqueue(OutFrame::Media(msg.clone()))
            } else if entry.protocol.consumes_rtp() {
                let mut outcome = EnqueueOutcome::Queued;
                for frame in &rtp_frames {
                    bytes_out += frame.packet.payload.len() as u64;
                    outcome = entry.queue.enqueue(OutFrame::Rtp(frame.clone()));
                    if outcome == EnqueueOutcome::Evict {
                        break;
                    }
                }
                outcome
            } else {
                // HTTP-TS subscribers receive fragment chunks, handled above.
                EnqueueOutcome::Queued
            };
            if outcome == EnqueueOutcome::Evict {
                evicted.push(*id);
            }
        }
        inner.stats.bytes_out += bytes_out;
        Self::remove_evicted(&self.name, inner, evicted);
    }

    fn deliver_fragment(
        name: &str,
        inner: &mut GroupInner,
        fragment: crate::remux::mpegts::TsFragment,
    ) {
        if let Some(hls) = inner.hls.as_mut() {
            if let Err(e) = hls.on_fragment(&fragment) {
                warn!(stream = %name, error = %e, "hls segment write failed");
            }
        }
        let chunk = TsChunk {
            data: fragment.data,
            is_program_header: false,
            key: fragment.key,
        };
        Self::broadcast_ts(name, inner, chunk);
    }

    fn broadcast_ts(name: &str, inner: &mut GroupInner, chunk: TsChunk) {
        let mut evicted: Vec<SessionId> = Vec::new();
        let mut bytes_out = 0u64;
        for (id, entry) in &inner.subscribers {
            if !entry.protocol.consumes_ts() {
                continue;
            }
            bytes_out += chunk.data.len() as u64;
            if entry.queue.enqueue(OutFrame::Ts(chunk.clone())) == EnqueueOutcome::Evict {
                evicted.push(*id);
            }
        }
        inner.stats.bytes_out += bytes_out;
        Self::remove_evicted(name, inner, evicted);
    }

    fn remove_evicted(name: &str, inner: &mut GroupInner, evicted: Vec<SessionId>) {
        for id in evicted {
            if let Some(entry) = inner.subscribers.remove(&id) {
                entry.queue.close();
                inner.stats.dropped_frames += entry.queue.dropped();
                inner.stats.evicted_subscribers += 1;
                warn!(stream = %name, session = %id, "subscriber evicted: slow consumer");
            }
        }
        inner.stats.current_subscribers = inner.subscribers.len();
    }

    /// Sanity-check one message. Returns `Ok(false)` to drop it quietly;
    /// repeated violations inside the window evict the publisher.
    fn validate(&self, inner: &mut GroupInner, msg: &MediaMessage) -> Result<bool> {
        let malformed = match msg.kind {
            MessageKind::Video => msg.payload.len() < 2,
            MessageKind::Audio => msg.payload.is_empty(),
            MessageKind::Metadata => false,
        };
        if !malformed {
            return Ok(true);
        }

        let now = Instant::now();
        inner.violations.push(now);
        inner
            .violations
            .retain(|t| now.duration_since(*t) <= self.config.violation_window);
        warn!(
            stream = %self.name,
            violations = inner.violations.len(),
            "dropping malformed message"
        );

        if inner.violations.len() >= self.config.violation_threshold {
            warn!(stream = %self.name, "violation threshold exceeded, evicting publisher");
            self.finish_publisher(inner);
            inner.violations.clear();
            return Err(Error::ProtocolViolation(
                "publisher evicted after repeated violations".into(),
            ));
        }
        Ok(false)
    }

    /// Create the outbound RTSP remuxer if needed and prime it with the
    /// cached sequence headers.
    fn ensure_rtsp_out(&self, inner: &mut GroupInner) {
        if inner.rtsp_out.is_some() {
            return;
        }
        let mut remuxer = Rtmp2RtspRemuxer::new(&self.name);
        if let Some(header) = &inner.audio_seq_header {
            remuxer.on_message(header);
        }
        if let Some(header) = &inner.video_seq_header {
            remuxer.on_message(header);
        }
        inner.rtsp_out = Some(remuxer);
    }
}

/// The publisher's capability on a group
#[derive(Clone)]
pub struct PublisherHandle {
    group: Arc<Group>,
    pub id: SessionId,
    pub protocol: SessionProtocol,
}

impl std::fmt::Debug for PublisherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublisherHandle")
            .field("stream_name", &self.group.name())
            .field("id", &self.id)
            .field("protocol", &self.protocol)
            .finish()
    }
}

impl PublisherHandle {
    pub(crate) fn new(group: Arc<Group>, id: SessionId, protocol: SessionProtocol) -> Self {
        Self { group, id, protocol }
    }

    pub fn stream_name(&self) -> &str {
        self.group.name()
    }

    /// Publish one normalized message.
    pub async fn publish(&self, msg: MediaMessage) -> Result<()> {
        self.group.publish(self.id, msg).await
    }

    /// Publish one FLV tag body (RTMP/HTTP-FLV ingest path).
    pub async fn publish_flv_tag(&self, tag: &FlvTag) -> Result<()> {
        self.group.publish(self.id, tag.to_message()).await
    }

    /// Configure multi-track RTP ingest from the publisher's SDP.
    pub async fn configure_rtp(
        &self,
        video_codec: Codec,
        audio_config: Option<AudioSpecificConfig>,
    ) -> Result<()> {
        self.group
            .configure_rtp_publisher(self.id, video_codec, audio_config)
            .await
    }

    /// Publish one video-track RTP packet.
    pub async fn publish_rtp_video(&self, packet: &RtpPacket) -> Result<()> {
        self.group.publish_rtp_video(self.id, packet).await
    }

    /// Publish one audio-track RTP packet.
    pub async fn publish_rtp_audio(&self, packet: &RtpPacket) -> Result<()> {
        self.group.publish_rtp_audio(self.id, packet).await
    }

    /// Stop publishing and release the slot.
    pub async fn finish(&self) {
        self.group.detach_publisher(self.id).await;
    }
}
