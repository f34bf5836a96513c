use super::*;
use crate::capture::{MediaHandle, MockMediaHandle};
use crate::config::ShareConfig;
use crate::error::BroadcastError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Sink that records envelopes and can be told to fail
#[derive(Default)]
struct RecordingSink {
    envelopes: Mutex<Vec<Envelope>>,
    failing: Mutex<bool>,
}

impl RecordingSink {
    fn types(&self) -> Vec<&'static str> {
        self.envelopes
            .lock()
            .iter()
            .map(|e| e.message.message_type())
            .collect()
    }

    fn clear(&self) {
        self.envelopes.lock().clear();
    }
}

impl BroadcastSink for RecordingSink {
    fn post(&self, envelope: Envelope) -> Result<usize, BroadcastError> {
        if *self.failing.lock() {
            return Err(BroadcastError::PublishFailed {
                details: "sink offline".to_string(),
            });
        }
        self.envelopes.lock().push(envelope);
        Ok(1)
    }
}

/// Broadcaster whose sampler never ticks on its own during a test
fn create_broadcaster(sink: Arc<dyn BroadcastSink>) -> Arc<FrameBroadcaster> {
    let mut config = ShareConfig::default();
    config.broadcast.sample_interval_ms = 60_000;
    Arc::new(FrameBroadcaster::new(&config.broadcast, sink))
}

fn mock_handle() -> Arc<MockMediaHandle> {
    Arc::new(MockMediaHandle::new(64, 36, true))
}

#[tokio::test]
async fn test_start_publishes_status_then_update() {
    let sink = Arc::new(RecordingSink::default());
    let broadcaster = create_broadcaster(sink.clone());

    broadcaster.start(mock_handle());

    assert_eq!(sink.types(), vec!["stream-status", "stream-update"]);
    assert_eq!(broadcaster.current_status(), StreamStatus::Started);
    broadcaster.stop();
}

#[tokio::test]
async fn test_sample_publishes_jpeg_frame() {
    let sink = Arc::new(RecordingSink::default());
    let broadcaster = create_broadcaster(sink.clone());
    broadcaster.start(mock_handle());
    sink.clear();

    assert_eq!(broadcaster.sample_once().await, SampleOutcome::Published);

    let envelopes = sink.envelopes.lock().clone();
    assert_eq!(envelopes.len(), 1);
    match &envelopes[0].message {
        BroadcastMessage::Frame { data, .. } => assert_eq!(&data[..2], &[0xFF, 0xD8]),
        other => panic!("Unexpected message: {:?}", other),
    }

    let stats = broadcaster.stats();
    assert_eq!(stats.frames_published, 1);
    assert_eq!(stats.bytes_published, match &envelopes[0].message {
        BroadcastMessage::Frame { data, .. } => data.len() as u64,
        _ => 0,
    });
    broadcaster.stop();
}

#[tokio::test]
async fn test_sample_skips_when_no_frame_ready() {
    let sink = Arc::new(RecordingSink::default());
    let broadcaster = create_broadcaster(sink.clone());
    let handle = mock_handle();
    handle.set_frames_ready(false);
    broadcaster.start(handle.clone());
    sink.clear();

    assert_eq!(broadcaster.sample_once().await, SampleOutcome::NoFrame);
    assert!(sink.types().is_empty());
    assert_eq!(broadcaster.stats().frames_skipped, 1);

    handle.set_frames_ready(true);
    assert_eq!(broadcaster.sample_once().await, SampleOutcome::Published);
    broadcaster.stop();
}

#[tokio::test]
async fn test_pause_and_resume_emit_only_status() {
    let sink = Arc::new(RecordingSink::default());
    let broadcaster = create_broadcaster(sink.clone());
    broadcaster.start(mock_handle());
    sink.clear();

    broadcaster.pause();
    assert_eq!(broadcaster.sample_once().await, SampleOutcome::Idle);
    broadcaster.pause();
    broadcaster.resume();
    broadcaster.resume();

    assert_eq!(
        sink.types(),
        vec!["stream-status", "stream-paused", "stream-status", "stream-resumed"]
    );
    let envelopes = sink.envelopes.lock().clone();
    assert!(matches!(
        envelopes[0].message,
        BroadcastMessage::StreamStatus {
            status: StreamStatus::Paused,
            ..
        }
    ));
    assert!(matches!(
        envelopes[2].message,
        BroadcastMessage::StreamStatus {
            status: StreamStatus::Resumed,
            ..
        }
    ));
    broadcaster.stop();
}

#[tokio::test]
async fn test_stop_announces_once_and_blocks_frames() {
    let sink = Arc::new(RecordingSink::default());
    let broadcaster = create_broadcaster(sink.clone());

    broadcaster.stop();
    assert!(sink.types().is_empty());

    broadcaster.start(mock_handle());
    sink.clear();
    broadcaster.stop();
    broadcaster.stop();

    assert_eq!(sink.types(), vec!["stream-status", "stream-stopped"]);
    assert_eq!(broadcaster.sample_once().await, SampleOutcome::Idle);
    assert_eq!(broadcaster.current_status(), StreamStatus::Stopped);
}

#[tokio::test]
async fn test_frame_encoded_across_stop_is_dropped() {
    let sink = Arc::new(RecordingSink::default());
    let broadcaster = create_broadcaster(sink.clone());
    broadcaster.start(mock_handle());
    let generation = broadcaster.generation();

    broadcaster.pause();
    assert_eq!(
        broadcaster.publish_encoded(generation, vec![0xFF, 0xD8, 0xFF, 0xD9]),
        SampleOutcome::Idle
    );
    broadcaster.resume();

    broadcaster.stop();
    broadcaster.start(mock_handle());
    sink.clear();
    assert_eq!(
        broadcaster.publish_encoded(generation, vec![0xFF, 0xD8, 0xFF, 0xD9]),
        SampleOutcome::Idle
    );
    assert!(sink.types().is_empty());
    assert_eq!(broadcaster.stats().frames_published, 0);

    assert_eq!(
        broadcaster.publish_encoded(broadcaster.generation(), vec![0xFF, 0xD8, 0xFF, 0xD9]),
        SampleOutcome::Published
    );
    assert_eq!(sink.types(), vec!["frame"]);
    broadcaster.stop();
}

#[tokio::test]
async fn test_publish_failures_are_counted() {
    let sink = Arc::new(RecordingSink::default());
    let broadcaster = create_broadcaster(sink.clone());
    broadcaster.start(mock_handle());

    *sink.failing.lock() = true;
    assert_eq!(broadcaster.sample_once().await, SampleOutcome::PublishFailed);
    assert_eq!(broadcaster.stats().publish_errors, 1);
    assert_eq!(broadcaster.stats().frames_published, 0);

    *sink.failing.lock() = false;
    broadcaster.stop();
}

#[tokio::test]
async fn test_request_stream_is_answered() {
    let channel = BroadcastChannel::new("screen-share-channel", 32);
    let broadcaster = create_broadcaster(Arc::new(channel.clone()));
    let shutdown = CancellationToken::new();
    let responder = broadcaster.spawn_request_responder(
        channel.receiver(MessageFilter::MessageTypes(vec!["request-stream"]), "responder"),
        shutdown.clone(),
    );

    let mut viewer = StreamViewer::join(&channel).unwrap();
    let reply = timeout(Duration::from_millis(500), viewer.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.producer, broadcaster.producer_id());
    assert!(matches!(
        reply.message,
        BroadcastMessage::StreamStatus {
            status: StreamStatus::Stopped,
            ..
        }
    ));
    let companion = timeout(Duration::from_millis(500), viewer.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(companion.message.message_type(), "stream-stopped");

    broadcaster.start(mock_handle());
    viewer.request_stream().unwrap();

    let status = timeout(Duration::from_millis(500), async {
        loop {
            let envelope = viewer.next().await.unwrap();
            if let Some(status) = viewer
                .producer(&envelope.producer)
                .and_then(|p| p.status)
            {
                if status == StreamStatus::Started {
                    return status;
                }
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(status, StreamStatus::Started);

    broadcaster.stop();
    shutdown.cancel();
    responder.await.unwrap();
}

#[tokio::test]
async fn test_late_viewer_learns_stream_id() {
    let channel = BroadcastChannel::new("screen-share-channel", 32);
    let broadcaster = create_broadcaster(Arc::new(channel.clone()));
    let shutdown = CancellationToken::new();
    let responder = broadcaster.spawn_request_responder(
        channel.receiver(MessageFilter::MessageTypes(vec!["request-stream"]), "responder"),
        shutdown.clone(),
    );

    broadcaster.start(mock_handle());
    let producer = broadcaster.producer_id();

    let mut viewer = StreamViewer::join(&channel).unwrap();
    timeout(Duration::from_millis(500), async {
        while viewer
            .producer(&producer)
            .and_then(|p| p.stream_id.clone())
            .is_none()
        {
            viewer.next().await.unwrap();
        }
    })
    .await
    .unwrap();

    let view = viewer.producer(&producer).unwrap();
    assert_eq!(view.stream_id.as_deref(), Some("active"));
    assert_eq!(view.status, Some(StreamStatus::Started));

    broadcaster.stop();
    shutdown.cancel();
    responder.await.unwrap();
}

#[tokio::test]
async fn test_viewer_tracks_status_per_producer() {
    let channel = BroadcastChannel::new("screen-share-channel", 32);
    let mut viewer = StreamViewer::new(&channel);
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    for envelope in [
        Envelope::new(first, 1, BroadcastMessage::status(StreamStatus::Started)),
        Envelope::new(second, 1, BroadcastMessage::status(StreamStatus::Started)),
        Envelope::new(first, 2, BroadcastMessage::frame(vec![0xFF, 0xD8, 0xFF, 0xD9])),
        Envelope::new(second, 2, BroadcastMessage::StreamPaused { timestamp: now_millis() }),
    ] {
        channel.publish(envelope);
    }
    assert_eq!(viewer.drain().unwrap(), 4);

    assert_eq!(viewer.producer(&first).unwrap().status, Some(StreamStatus::Started));
    assert_eq!(viewer.producer(&second).unwrap().status, Some(StreamStatus::Paused));
    assert_eq!(viewer.live_producers(), 2);
    assert_eq!(viewer.latest_frame().map(|(id, _)| id), Some(first));

    // Replayed or reordered envelopes from the same producer do not win
    assert!(!viewer.apply(&Envelope::new(
        second,
        1,
        BroadcastMessage::status(StreamStatus::Started)
    )));
    assert_eq!(viewer.producer(&second).unwrap().status, Some(StreamStatus::Paused));

    assert!(viewer.apply(&Envelope::new(
        first,
        3,
        BroadcastMessage::StreamStopped { timestamp: now_millis() }
    )));
    let first_view = viewer.producer(&first).unwrap();
    assert_eq!(first_view.status, Some(StreamStatus::Stopped));
    assert!(first_view.last_frame.is_none());
    assert_eq!(viewer.live_producers(), 1);
}

#[tokio::test]
async fn test_viewer_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("latest.jpg");
    let channel = BroadcastChannel::new("screen-share-channel", 32);
    let mut viewer = StreamViewer::new(&channel);

    assert!(!viewer.write_snapshot(&path).await.unwrap());

    let jpeg = mock_handle().latest_frame().unwrap().encode_jpeg(80).unwrap();
    viewer.apply(&Envelope::new(
        Uuid::new_v4(),
        1,
        BroadcastMessage::frame(jpeg.clone()),
    ));

    assert!(viewer.write_snapshot(&path).await.unwrap());
    assert_eq!(std::fs::read(&path).unwrap(), jpeg);
}
