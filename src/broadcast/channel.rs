use super::messages::Envelope;
use crate::error::BroadcastError;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Producer side of a broadcast channel
pub trait BroadcastSink: Send + Sync {
    /// Post an envelope to every current subscriber, returning how many
    /// received it. Posting with no subscribers is not an error.
    fn post(&self, envelope: Envelope) -> Result<usize, BroadcastError>;
}

/// Named in-process pub/sub channel carrying [`Envelope`]s
#[derive(Clone)]
pub struct BroadcastChannel {
    name: String,
    sender: broadcast::Sender<Envelope>,
}

impl BroadcastChannel {
    /// Create a new channel with the specified capacity
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            name: name.into(),
            sender,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Subscribe to raw envelopes
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter
    pub fn receiver(&self, filter: MessageFilter, name: impl Into<String>) -> ChannelReceiver {
        ChannelReceiver::new(self.sender.subscribe(), filter, name.into())
    }

    /// Publish an envelope to all subscribers
    pub fn publish(&self, envelope: Envelope) -> usize {
        trace!(
            "Publishing on '{}': {} #{} from {}",
            self.name,
            envelope.message.message_type(),
            envelope.sequence,
            envelope.producer
        );

        match self.sender.send(envelope) {
            Ok(count) => count,
            Err(_) => {
                trace!("No subscribers on '{}'", self.name);
                0
            }
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl BroadcastSink for BroadcastChannel {
    fn post(&self, envelope: Envelope) -> Result<usize, BroadcastError> {
        Ok(self.publish(envelope))
    }
}

/// Envelope filter for selective receiving
#[derive(Debug, Clone)]
pub enum MessageFilter {
    /// Accept all envelopes
    All,
    /// Accept only specific message types (wire names)
    MessageTypes(Vec<&'static str>),
    /// Accept everything except what the given producer posted
    ExcludeProducer(Uuid),
    /// Custom filter function
    Custom(fn(&Envelope) -> bool),
}

impl MessageFilter {
    /// Check if an envelope passes this filter
    pub fn matches(&self, envelope: &Envelope) -> bool {
        match self {
            MessageFilter::All => true,
            MessageFilter::MessageTypes(types) => types.contains(&envelope.message.message_type()),
            MessageFilter::ExcludeProducer(producer) => envelope.producer != *producer,
            MessageFilter::Custom(filter_fn) => filter_fn(envelope),
        }
    }
}

/// Channel receiver with filtering
pub struct ChannelReceiver {
    receiver: broadcast::Receiver<Envelope>,
    filter: MessageFilter,
    name: String,
}

impl ChannelReceiver {
    pub fn new(receiver: broadcast::Receiver<Envelope>, filter: MessageFilter, name: String) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receive the next envelope that passes the filter
    pub async fn recv(&mut self) -> Result<Envelope, BroadcastError> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) => {
                    if self.filter.matches(&envelope) {
                        trace!(
                            "Receiver '{}' received: {}",
                            self.name,
                            envelope.message.description()
                        );
                        return Ok(envelope);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Receiver '{}' lagged behind by {} messages", self.name, skipped);
                    return Err(BroadcastError::Lagged { skipped });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Channel closed for receiver '{}'", self.name);
                    return Err(BroadcastError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an envelope without waiting
    pub fn try_recv(&mut self) -> Result<Option<Envelope>, BroadcastError> {
        loop {
            match self.receiver.try_recv() {
                Ok(envelope) => {
                    if self.filter.matches(&envelope) {
                        return Ok(Some(envelope));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("Receiver '{}' lagged behind by {} messages", self.name, skipped);
                    return Err(BroadcastError::Lagged { skipped });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    debug!("Channel closed for receiver '{}'", self.name);
                    return Err(BroadcastError::ChannelClosed);
                }
            }
        }
    }
}
