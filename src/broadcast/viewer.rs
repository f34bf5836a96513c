use super::channel::{BroadcastChannel, BroadcastSink, ChannelReceiver, MessageFilter};
use super::messages::{BroadcastMessage, Envelope, StreamStatus};
use crate::error::{BroadcastError, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// What a viewer knows about one producer
#[derive(Debug, Clone, Default)]
pub struct ProducerView {
    pub status: Option<StreamStatus>,
    pub stream_id: Option<String>,
    pub last_frame: Option<Arc<Vec<u8>>>,
    pub last_frame_at: Option<i64>,
    pub frames_received: u64,
    pub last_sequence: u64,
}

impl ProducerView {
    pub fn is_live(&self) -> bool {
        self.status.map(|s| s.is_live()).unwrap_or(false)
    }
}

/// Subscriber that follows every producer on a channel
pub struct StreamViewer {
    id: Uuid,
    channel: BroadcastChannel,
    receiver: ChannelReceiver,
    sequence: u64,
    producers: HashMap<Uuid, ProducerView>,
}

impl StreamViewer {
    /// Subscribe to `channel` without announcing
    pub fn new(channel: &BroadcastChannel) -> Self {
        let id = Uuid::new_v4();
        let receiver = channel.receiver(MessageFilter::ExcludeProducer(id), format!("viewer-{}", id));
        Self {
            id,
            channel: channel.clone(),
            receiver,
            sequence: 0,
            producers: HashMap::new(),
        }
    }

    /// Subscribe and ask producers for their current status
    pub fn join(channel: &BroadcastChannel) -> std::result::Result<Self, BroadcastError> {
        let mut viewer = Self::new(channel);
        viewer.request_stream()?;
        Ok(viewer)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn request_stream(&mut self) -> std::result::Result<usize, BroadcastError> {
        self.sequence += 1;
        debug!("Viewer {} requesting stream status on '{}'", self.id, self.channel.name());
        self.channel.post(Envelope::new(
            self.id,
            self.sequence,
            BroadcastMessage::RequestStream,
        ))
    }

    /// Wait for the next envelope and fold it into the producer table
    pub async fn next(&mut self) -> std::result::Result<Envelope, BroadcastError> {
        let envelope = self.receiver.recv().await?;
        self.apply(&envelope);
        Ok(envelope)
    }

    /// Fold everything already queued, returning how many envelopes were applied
    pub fn drain(&mut self) -> std::result::Result<usize, BroadcastError> {
        let mut applied = 0;
        while let Some(envelope) = self.receiver.try_recv()? {
            if self.apply(&envelope) {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Apply one envelope. Envelopes older than what was already seen from
    /// the same producer are ignored. Returns whether it was applied.
    pub fn apply(&mut self, envelope: &Envelope) -> bool {
        if matches!(envelope.message, BroadcastMessage::RequestStream) {
            return false;
        }

        let producer = self.producers.entry(envelope.producer).or_default();
        if envelope.sequence <= producer.last_sequence {
            debug!(
                "Ignoring stale {} #{} from {}",
                envelope.message.message_type(),
                envelope.sequence,
                envelope.producer
            );
            return false;
        }
        producer.last_sequence = envelope.sequence;

        match &envelope.message {
            BroadcastMessage::StreamStatus { status, .. } => {
                producer.status = Some(*status);
                if *status == StreamStatus::Stopped {
                    producer.last_frame = None;
                }
            }
            BroadcastMessage::StreamUpdate { stream_id, .. } => {
                producer.stream_id = Some(stream_id.clone());
            }
            BroadcastMessage::StreamStopped { .. } => {
                producer.status = Some(StreamStatus::Stopped);
                producer.stream_id = None;
                producer.last_frame = None;
                info!("Producer {} stopped sharing", envelope.producer);
            }
            BroadcastMessage::StreamPaused { .. } => {
                producer.status = Some(StreamStatus::Paused);
            }
            BroadcastMessage::StreamResumed { .. } => {
                producer.status = Some(StreamStatus::Resumed);
            }
            BroadcastMessage::Frame { data, timestamp } => {
                producer.last_frame = Some(Arc::clone(data));
                producer.last_frame_at = Some(*timestamp);
                producer.frames_received += 1;
            }
            BroadcastMessage::RequestStream => {}
        }
        true
    }

    pub fn producer(&self, id: &Uuid) -> Option<&ProducerView> {
        self.producers.get(id)
    }

    pub fn producers(&self) -> impl Iterator<Item = (&Uuid, &ProducerView)> {
        self.producers.iter()
    }

    /// Producers whose last status is not `stopped`
    pub fn live_producers(&self) -> usize {
        self.producers.values().filter(|p| p.is_live()).count()
    }

    /// Most recent frame across all producers
    pub fn latest_frame(&self) -> Option<(Uuid, Arc<Vec<u8>>)> {
        self.producers
            .iter()
            .filter_map(|(id, p)| Some((*id, p.last_frame.clone()?, p.last_frame_at?)))
            .max_by_key(|(_, _, at)| *at)
            .map(|(id, frame, _)| (id, frame))
    }

    /// Write the most recent frame as a JPEG file. Returns false when no
    /// frame has been received yet.
    pub async fn write_snapshot(&self, path: impl AsRef<Path>) -> Result<bool> {
        let Some((producer, frame)) = self.latest_frame() else {
            return Ok(false);
        };

        let path = path.as_ref();
        tokio::fs::write(path, frame.as_slice()).await?;
        info!(
            "Wrote {} byte snapshot from {} to {}",
            frame.len(),
            producer,
            path.display()
        );
        Ok(true)
    }
}
