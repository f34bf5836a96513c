//! Frame and status broadcasting over a named in-process channel

mod broadcaster;
mod channel;
mod messages;
mod stats;
mod viewer;

#[cfg(test)]
mod tests;

pub use broadcaster::{FrameBroadcaster, SampleOutcome};
pub use channel::{BroadcastChannel, BroadcastSink, ChannelReceiver, MessageFilter};
pub use messages::{
    decode_data_url, now_millis, BroadcastMessage, Envelope, StreamStatus, ACTIVE_STREAM_ID,
    JPEG_DATA_URL_PREFIX,
};
pub use stats::{BroadcastStats, STATS_LOG_INTERVAL};
pub use viewer::{ProducerView, StreamViewer};
