use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Stream id announced with `stream-update` when a share starts
pub const ACTIVE_STREAM_ID: &str = "active";

/// Prefix of the `data` field carried by `frame` messages on the wire
pub const JPEG_DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// Current wall-clock time in Unix milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Lifecycle status carried by `stream-status` messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Started,
    Stopped,
    Paused,
    Resumed,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamStatus::Started => "started",
            StreamStatus::Stopped => "stopped",
            StreamStatus::Paused => "paused",
            StreamStatus::Resumed => "resumed",
        }
    }

    /// Whether a producer in this status is still sharing
    pub fn is_live(&self) -> bool {
        !matches!(self, StreamStatus::Stopped)
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Messages exchanged over the broadcast channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BroadcastMessage {
    StreamStatus {
        status: StreamStatus,
        timestamp: i64,
    },
    StreamUpdate {
        #[serde(rename = "streamId")]
        stream_id: String,
        timestamp: i64,
    },
    StreamStopped {
        timestamp: i64,
    },
    StreamPaused {
        timestamp: i64,
    },
    StreamResumed {
        timestamp: i64,
    },
    /// One sampled JPEG frame; raw bytes in memory, a data URL on the wire
    Frame {
        #[serde(with = "jpeg_data_url")]
        data: Arc<Vec<u8>>,
        timestamp: i64,
    },
    /// Sent by subscribers to ask producers for their current status
    RequestStream,
}

impl BroadcastMessage {
    pub fn status(status: StreamStatus) -> Self {
        BroadcastMessage::StreamStatus {
            status,
            timestamp: now_millis(),
        }
    }

    pub fn frame(jpeg: Vec<u8>) -> Self {
        BroadcastMessage::Frame {
            data: Arc::new(jpeg),
            timestamp: now_millis(),
        }
    }

    /// Messages announcing a lifecycle transition, in publication order
    pub fn transition(status: StreamStatus) -> Vec<Self> {
        let timestamp = now_millis();
        let follow_up = match status {
            StreamStatus::Started => BroadcastMessage::StreamUpdate {
                stream_id: ACTIVE_STREAM_ID.to_string(),
                timestamp,
            },
            StreamStatus::Stopped => BroadcastMessage::StreamStopped { timestamp },
            StreamStatus::Paused => BroadcastMessage::StreamPaused { timestamp },
            StreamStatus::Resumed => BroadcastMessage::StreamResumed { timestamp },
        };

        vec![
            BroadcastMessage::StreamStatus { status, timestamp },
            follow_up,
        ]
    }

    /// Wire name of the message, as found in its `type` tag
    pub fn message_type(&self) -> &'static str {
        match self {
            BroadcastMessage::StreamStatus { .. } => "stream-status",
            BroadcastMessage::StreamUpdate { .. } => "stream-update",
            BroadcastMessage::StreamStopped { .. } => "stream-stopped",
            BroadcastMessage::StreamPaused { .. } => "stream-paused",
            BroadcastMessage::StreamResumed { .. } => "stream-resumed",
            BroadcastMessage::Frame { .. } => "frame",
            BroadcastMessage::RequestStream => "request-stream",
        }
    }

    pub fn timestamp(&self) -> Option<i64> {
        match self {
            BroadcastMessage::StreamStatus { timestamp, .. }
            | BroadcastMessage::StreamUpdate { timestamp, .. }
            | BroadcastMessage::StreamStopped { timestamp }
            | BroadcastMessage::StreamPaused { timestamp }
            | BroadcastMessage::StreamResumed { timestamp }
            | BroadcastMessage::Frame { timestamp, .. } => Some(*timestamp),
            BroadcastMessage::RequestStream => None,
        }
    }

    /// Get a human-readable description of the message
    pub fn description(&self) -> String {
        match self {
            BroadcastMessage::StreamStatus { status, .. } => format!("Stream status: {}", status),
            BroadcastMessage::StreamUpdate { stream_id, .. } => {
                format!("Stream update: {}", stream_id)
            }
            BroadcastMessage::StreamStopped { .. } => "Stream stopped".to_string(),
            BroadcastMessage::StreamPaused { .. } => "Stream paused".to_string(),
            BroadcastMessage::StreamResumed { .. } => "Stream resumed".to_string(),
            BroadcastMessage::Frame { data, .. } => format!("Frame ({} bytes)", data.len()),
            BroadcastMessage::RequestStream => "Stream status requested".to_string(),
        }
    }
}

/// A message stamped with its producer and per-producer sequence number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub producer: Uuid,
    pub sequence: u64,
    pub message: BroadcastMessage,
}

impl Envelope {
    pub fn new(producer: Uuid, sequence: u64, message: BroadcastMessage) -> Self {
        Self {
            producer,
            sequence,
            message,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

mod jpeg_data_url {
    use super::{JPEG_DATA_URL_PREFIX, STANDARD};
    use base64::Engine;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S: Serializer>(data: &Arc<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        let mut url = String::with_capacity(JPEG_DATA_URL_PREFIX.len() + data.len() * 4 / 3 + 4);
        url.push_str(JPEG_DATA_URL_PREFIX);
        STANDARD.encode_string(data.as_slice(), &mut url);
        serializer.serialize_str(&url)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Arc<Vec<u8>>, D::Error> {
        let url = String::deserialize(deserializer)?;
        let encoded = url
            .strip_prefix(JPEG_DATA_URL_PREFIX)
            .ok_or_else(|| D::Error::custom("frame data is not a JPEG data URL"))?;
        STANDARD
            .decode(encoded)
            .map(Arc::new)
            .map_err(D::Error::custom)
    }
}

/// Decode the payload of a `data:image/jpeg;base64,` URL
pub fn decode_data_url(url: &str) -> Option<Vec<u8>> {
    url.strip_prefix(JPEG_DATA_URL_PREFIX)
        .and_then(|encoded| STANDARD.decode(encoded).ok())
}
