use super::channel::{BroadcastSink, ChannelReceiver};
use super::messages::{BroadcastMessage, Envelope, StreamStatus};
use super::stats::BroadcastStats;
use crate::capture::MediaHandle;
use crate::config::BroadcastConfig;
use crate::error::BroadcastError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Outcome of one sampling tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    Published,
    /// Not broadcasting, or paused
    Idle,
    /// Source had no frame ready
    NoFrame,
    EncodeFailed,
    PublishFailed,
}

struct BroadcasterState {
    active: bool,
    paused: bool,
    source: Option<Arc<dyn MediaHandle>>,
    /// Incremented on every start so a stale sampler can tell it was replaced
    generation: u64,
    sequence: u64,
    sampler: Option<CancellationToken>,
    stats: BroadcastStats,
}

/// Samples frames from the capture handle and publishes frame and status
/// messages on a broadcast sink.
///
/// Every publication happens while the state lock is held, so the
/// sequence numbers a subscriber sees match publication order. Frames are
/// encoded outside the lock and re-checked against the broadcast
/// generation before publishing, so no frame can follow the
/// `stream-stopped` announcement.
pub struct FrameBroadcaster {
    producer: Uuid,
    sink: Arc<dyn BroadcastSink>,
    sample_interval: Duration,
    jpeg_quality: u8,
    state: Mutex<BroadcasterState>,
}

impl FrameBroadcaster {
    pub fn new(config: &BroadcastConfig, sink: Arc<dyn BroadcastSink>) -> Self {
        Self {
            producer: Uuid::new_v4(),
            sink,
            sample_interval: config.sample_interval(),
            jpeg_quality: config.jpeg_quality,
            state: Mutex::new(BroadcasterState {
                active: false,
                paused: false,
                source: None,
                generation: 0,
                sequence: 0,
                sampler: None,
                stats: BroadcastStats::default(),
            }),
        }
    }

    /// Producer id stamped on every envelope
    pub fn producer_id(&self) -> Uuid {
        self.producer
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// Status reported to subscribers asking for it
    pub fn current_status(&self) -> StreamStatus {
        if self.state.lock().active {
            StreamStatus::Started
        } else {
            StreamStatus::Stopped
        }
    }

    pub fn stats(&self) -> BroadcastStats {
        self.state.lock().stats.clone()
    }

    /// Announce the stream and begin sampling `source`
    pub fn start(self: &Arc<Self>, source: Arc<dyn MediaHandle>) {
        let mut state = self.state.lock();
        if let Some(token) = state.sampler.take() {
            token.cancel();
        }

        state.active = true;
        state.paused = false;
        state.source = Some(source);
        state.generation += 1;
        state.stats.mark_started();

        let token = CancellationToken::new();
        state.sampler = Some(token.clone());
        let generation = state.generation;

        for message in BroadcastMessage::transition(StreamStatus::Started) {
            self.publish_locked(&mut state, message);
        }
        drop(state);

        info!(
            "Broadcasting frames every {:?} as producer {}",
            self.sample_interval, self.producer
        );

        let broadcaster = Arc::clone(self);
        tokio::spawn(async move {
            broadcaster.run_sampler(generation, token).await;
        });
    }

    pub fn pause(&self) {
        let mut state = self.state.lock();
        if !state.active || state.paused {
            return;
        }
        state.paused = true;
        for message in BroadcastMessage::transition(StreamStatus::Paused) {
            self.publish_locked(&mut state, message);
        }
    }

    pub fn resume(&self) {
        let mut state = self.state.lock();
        if !state.active || !state.paused {
            return;
        }
        state.paused = false;
        for message in BroadcastMessage::transition(StreamStatus::Resumed) {
            self.publish_locked(&mut state, message);
        }
    }

    /// Halt sampling. `stopped` is announced only when a stream was live.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        let was_active = state.active;

        state.active = false;
        state.paused = false;
        state.source = None;
        if let Some(token) = state.sampler.take() {
            token.cancel();
        }

        if was_active {
            for message in BroadcastMessage::transition(StreamStatus::Stopped) {
                self.publish_locked(&mut state, message);
            }
            let stats = &state.stats;
            info!(
                "Broadcast stopped: {} frames published, {} skipped, {} bytes",
                stats.frames_published, stats.frames_skipped, stats.bytes_published
            );
        }
    }

    /// Answer a `request-stream` with the current status and its companion
    /// message, so a late subscriber also learns the stream id
    pub fn handle_request(&self, envelope: &Envelope) {
        if envelope.producer == self.producer
            || !matches!(envelope.message, BroadcastMessage::RequestStream)
        {
            return;
        }

        let mut state = self.state.lock();
        let status = if state.active {
            StreamStatus::Started
        } else {
            StreamStatus::Stopped
        };
        debug!("Answering stream request from {} with {}", envelope.producer, status);
        for message in BroadcastMessage::transition(status) {
            self.publish_locked(&mut state, message);
        }
    }

    /// Serve `request-stream` messages until `shutdown` fires or the channel closes
    pub fn spawn_request_responder(
        self: &Arc<Self>,
        mut receiver: ChannelReceiver,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let broadcaster = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    result = receiver.recv() => match result {
                        Ok(envelope) => broadcaster.handle_request(&envelope),
                        Err(BroadcastError::Lagged { .. }) => continue,
                        Err(_) => break,
                    }
                }
            }
            debug!("Stream request responder exiting");
        })
    }

    /// Take one sample and publish it if a frame is ready
    pub async fn sample_once(&self) -> SampleOutcome {
        let generation = self.state.lock().generation;
        self.sample(generation).await
    }

    async fn run_sampler(self: Arc<Self>, generation: u64, token: CancellationToken) {
        let start = tokio::time::Instant::now() + self.sample_interval;
        let mut ticker = tokio::time::interval_at(start, self.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    self.sample(generation).await;
                }
            }
        }
        debug!("Frame sampler {} exiting", generation);
    }

    async fn sample(&self, generation: u64) -> SampleOutcome {
        let frame = {
            let mut state = self.state.lock();
            if !state.active || state.paused || state.generation != generation {
                return SampleOutcome::Idle;
            }
            match state.source.as_ref().and_then(|source| source.latest_frame()) {
                Some(frame) => frame,
                None => {
                    state.stats.record_skipped_frame();
                    return SampleOutcome::NoFrame;
                }
            }
        };

        // Full-resolution encodes are CPU bound; keep them off the event loop
        let frame_id = frame.id;
        let quality = self.jpeg_quality;
        let encoded = match tokio::task::spawn_blocking(move || frame.encode_jpeg(quality)).await {
            Ok(result) => result,
            Err(e) => Err(BroadcastError::Encode {
                details: format!("encoder task failed: {}", e),
            }),
        };

        match encoded {
            Ok(jpeg) => self.publish_encoded(generation, jpeg),
            Err(e) => {
                self.state.lock().stats.record_encode_error();
                warn!("Skipping frame {}: {}", frame_id, e);
                SampleOutcome::EncodeFailed
            }
        }
    }

    /// Publish an encoded frame unless the broadcast was paused, stopped or
    /// restarted while it was being encoded
    pub(super) fn publish_encoded(&self, generation: u64, jpeg: Vec<u8>) -> SampleOutcome {
        let mut state = self.state.lock();
        if !state.active || state.paused || state.generation != generation {
            debug!("Dropping frame encoded for broadcast {}", generation);
            return SampleOutcome::Idle;
        }

        let size = jpeg.len();
        if !self.publish_locked(&mut state, BroadcastMessage::frame(jpeg)) {
            state.stats.record_publish_error();
            return SampleOutcome::PublishFailed;
        }

        state.stats.update_frame_stats(size);
        if state.stats.should_log() {
            let stats = &state.stats;
            info!(
                "Broadcast: {} frames, {:.1} fps, avg {} bytes, {} skipped, {} encode errors",
                stats.frames_published,
                stats.average_fps(),
                stats.average_frame_size(),
                stats.frames_skipped,
                stats.encode_errors
            );
        }
        SampleOutcome::Published
    }

    pub(super) fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    fn publish_locked(&self, state: &mut BroadcasterState, message: BroadcastMessage) -> bool {
        state.sequence += 1;
        let kind = message.message_type();
        let envelope = Envelope::new(self.producer, state.sequence, message);

        match self.sink.post(envelope) {
            Ok(delivered) => {
                if kind != "frame" {
                    debug!("Published {} to {} subscribers", kind, delivered);
                }
                true
            }
            Err(e) => {
                error!("Failed to publish {}: {}", kind, e);
                false
            }
        }
    }
}
