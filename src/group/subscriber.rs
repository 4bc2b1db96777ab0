//! Subscriber output queues
//!
//! Each subscriber owns a bounded FIFO with a soft capacity Q and a hard
//! capacity 2Q:
//!
//! - depth < Q: everything is queued;
//! - depth in [Q, 2Q): only sequence headers, key video frames, and
//!   metadata get through, the rest is dropped and counted;
//! - depth at 2Q: the subscriber is evicted with a slow-consumer error.
//!
//! The group enqueues while briefly holding its lock; the output worker
//! drains without it and writes to the session, evicting on writes that
//! block past the configured deadline.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::media::message::MediaMessage;
use crate::remux::rtsp::RtpOut;

use super::session::{SessionId, SessionProtocol};

/// One transport-stream chunk for HTTP-TS subscribers
#[derive(Debug, Clone)]
pub struct TsChunk {
    pub data: Bytes,
    /// PAT+PMT announcement, replayed first to new subscribers
    pub is_program_header: bool,
    /// Fragment beginning with a key frame
    pub key: bool,
}

/// What travels through a subscriber queue, per output protocol
#[derive(Debug, Clone)]
pub enum OutFrame {
    /// FLV-bodied universal message (RTMP, HTTP-FLV)
    Media(MediaMessage),
    /// RTP packet (RTSP)
    Rtp(RtpOut),
    /// Transport-stream bytes (HTTP-TS)
    Ts(TsChunk),
}

impl OutFrame {
    /// Frames that still get through between the soft and hard caps.
    fn survives_soft_pressure(&self) -> bool {
        match self {
            OutFrame::Media(msg) => msg.is_seq_header || msg.is_keyframe || msg.is_metadata(),
            OutFrame::Rtp(out) => out.keyframe,
            OutFrame::Ts(chunk) => chunk.is_program_header || chunk.key,
        }
    }

    /// Approximate wire size, for byte counters
    pub fn size(&self) -> usize {
        match self {
            OutFrame::Media(msg) => msg.size(),
            OutFrame::Rtp(out) => out.packet.payload.len() + 12,
            OutFrame::Ts(chunk) => chunk.data.len(),
        }
    }
}

/// Result of offering a frame to a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// Dropped under soft pressure
    Dropped,
    /// The queue hit its hard cap or is defunct; remove the subscriber
    Evict,
}

#[derive(Debug, Default)]
struct QueueState {
    frames: VecDeque<OutFrame>,
    closed: bool,
    evicted: bool,
}

/// The bounded FIFO between the group and one output worker
#[derive(Debug)]
pub struct SubscriberQueue {
    soft_capacity: usize,
    state: Mutex<QueueState>,
    notify: Notify,
    dropped: AtomicU64,
}

impl SubscriberQueue {
    pub fn new(soft_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            soft_capacity: soft_capacity.max(1),
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        })
    }

    /// Offer one frame, applying the soft/hard policy.
    pub fn enqueue(&self, frame: OutFrame) -> EnqueueOutcome {
        let mut state = self.state.lock().expect("queue poisoned");
        if state.closed || state.evicted {
            // The session is gone; the enqueue becomes a no-op and the
            // caller forgets the subscriber.
            return EnqueueOutcome::Evict;
        }

        let depth = state.frames.len();
        if depth >= self.soft_capacity * 2 {
            state.evicted = true;
            drop(state);
            self.notify.notify_one();
            return EnqueueOutcome::Evict;
        }
        if depth >= self.soft_capacity && !frame.survives_soft_pressure() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return EnqueueOutcome::Dropped;
        }

        state.frames.push_back(frame);
        drop(state);
        self.notify.notify_one();
        EnqueueOutcome::Queued
    }

    /// Close normally; the worker drains what is queued and then ends.
    pub fn close(&self) {
        let mut state = self.state.lock().expect("queue poisoned");
        state.closed = true;
        drop(state);
        self.notify.notify_one();
    }

    /// Receive the next frame.
    ///
    /// `Ok(None)` on normal close, `Err(SlowConsumer)` after eviction.
    pub async fn recv(&self) -> Result<Option<OutFrame>> {
        loop {
            {
                let mut state = self.state.lock().expect("queue poisoned");
                if state.evicted {
                    return Err(Error::SlowConsumer);
                }
                if let Some(frame) = state.frames.pop_front() {
                    return Ok(Some(frame));
                }
                if state.closed {
                    return Ok(None);
                }
            }
            self.notify.notified().await;
        }
    }

    pub fn depth(&self) -> usize {
        self.state.lock().expect("queue poisoned").frames.len()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        let state = self.state.lock().expect("queue poisoned");
        state.closed || state.evicted
    }
}

/// The subscriber's end of its queue
#[derive(Debug, Clone)]
pub struct SubscriberHandle {
    pub id: SessionId,
    pub protocol: SessionProtocol,
    pub stream_name: String,
    queue: Arc<SubscriberQueue>,
}

impl SubscriberHandle {
    pub(super) fn new(
        id: SessionId,
        protocol: SessionProtocol,
        stream_name: String,
        queue: Arc<SubscriberQueue>,
    ) -> Self {
        Self {
            id,
            protocol,
            stream_name,
            queue,
        }
    }

    /// Next frame; `Ok(None)` when the group closed the session.
    pub async fn recv(&self) -> Result<Option<OutFrame>> {
        self.queue.recv().await
    }

    /// Frames dropped under soft pressure
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }
}

/// Where an output worker writes frames
///
/// Implemented by the protocol front-ends over their sockets.
pub trait SubscriberSink: Send {
    fn write(&mut self, frame: OutFrame) -> impl Future<Output = Result<()>> + Send;
}

/// Drive one subscriber: drain the queue into the sink until the session
/// ends, an error occurs, or a write blocks past `write_timeout`.
pub fn spawn_output_worker<S>(
    handle: SubscriberHandle,
    mut sink: S,
    write_timeout: Duration,
) -> JoinHandle<Result<()>>
where
    S: SubscriberSink + 'static,
{
    tokio::spawn(async move {
        loop {
            match handle.recv().await {
                Ok(Some(frame)) => {
                    match tokio::time::timeout(write_timeout, sink.write(frame)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            warn!(session = %handle.id, error = %e, "subscriber write failed");
                            handle.queue.close();
                            return Err(e);
                        }
                        Err(_) => {
                            warn!(session = %handle.id, "subscriber write timed out, evicting");
                            handle.queue.close();
                            return Err(Error::Timeout);
                        }
                    }
                }
                Ok(None) => {
                    debug!(session = %handle.id, "subscriber queue closed");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    })
}
