use super::*;
use crate::broadcast::{BroadcastChannel, BroadcastMessage, Envelope, FrameBroadcaster, StreamStatus};
use crate::config::ShareConfig;
use crate::error::CaptureError;
use crate::geometry::{Rectangle, Size};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;

struct Harness {
    session: CaptureSession,
    source: Arc<MockCaptureSource>,
    rx: broadcast::Receiver<Envelope>,
}

fn create_harness(source: MockCaptureSource) -> Harness {
    let mut config = ShareConfig::default();
    config.broadcast.sample_interval_ms = 10;

    let channel = BroadcastChannel::new("test-channel", 256);
    let rx = channel.subscribe();
    let broadcaster = Arc::new(FrameBroadcaster::new(&config.broadcast, Arc::new(channel)));
    let source = Arc::new(source);
    let session = CaptureSession::new(
        &config.capture,
        Size::new(960.0, 540.0),
        source.clone(),
        broadcaster,
    );

    Harness {
        session,
        source,
        rx,
    }
}

fn drain(rx: &mut broadcast::Receiver<Envelope>) -> Vec<Envelope> {
    let mut envelopes = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        envelopes.push(envelope);
    }
    envelopes
}

fn control_types(envelopes: &[Envelope]) -> Vec<&'static str> {
    envelopes
        .iter()
        .map(|e| e.message.message_type())
        .filter(|t| *t != "frame")
        .collect()
}

#[tokio::test]
async fn test_start_announces_stream_and_scales_mask() {
    let mut h = create_harness(MockCaptureSource::new());

    h.session
        .start(Some(Rectangle::new(100.0, 50.0, 200.0, 100.0)))
        .await
        .unwrap();

    assert_eq!(h.session.state(), SessionState::Sharing);
    assert!(h.session.is_active());

    let mask = h.session.mask().unwrap();
    assert_eq!(mask.screen_rect, Rectangle::new(200.0, 100.0, 400.0, 200.0));

    let envelopes = drain(&mut h.rx);
    assert!(matches!(
        envelopes[0].message,
        BroadcastMessage::StreamStatus {
            status: StreamStatus::Started,
            ..
        }
    ));
    assert!(matches!(
        &envelopes[1].message,
        BroadcastMessage::StreamUpdate { stream_id, .. } if stream_id == "active"
    ));

    h.session.stop();
}

#[tokio::test]
async fn test_platform_errors_are_mapped() {
    let cases = [
        (PlatformError::NOT_ALLOWED, CaptureError::PermissionDenied),
        (PlatformError::NOT_FOUND, CaptureError::SourceNotFound),
        (PlatformError::SECURITY, CaptureError::SecurityRestricted),
    ];

    for (name, expected) in cases {
        let mut h = create_harness(MockCaptureSource::new());
        h.source.fail_next(PlatformError::new(name, "scripted"));

        assert_eq!(h.session.start(None).await, Err(expected));
        assert_eq!(h.session.state(), SessionState::Stopped);
        assert!(!h.session.is_active());
        assert!(drain(&mut h.rx).is_empty());
    }

    let mut h = create_harness(MockCaptureSource::new());
    h.source
        .fail_next(PlatformError::new(PlatformError::OVERCONSTRAINED, "too big"));
    assert_eq!(
        h.session.start(None).await,
        Err(CaptureError::ConstraintsUnsatisfiable {
            details: "too big".to_string()
        })
    );

    h.source.fail_next(PlatformError::new("AbortError", "gone"));
    assert!(matches!(
        h.session.start(None).await,
        Err(CaptureError::Unknown { .. })
    ));

    // A failed attempt does not block the next one
    h.session.start(None).await.unwrap();
    assert_eq!(h.session.state(), SessionState::Sharing);
    h.session.stop();
}

#[tokio::test]
async fn test_unsupported_source() {
    let h = create_harness(MockCaptureSource::unsupported());

    assert!(!h.session.is_supported());
    assert!(matches!(
        h.session.start(None).await,
        Err(CaptureError::Unsupported { .. })
    ));
}

#[tokio::test]
async fn test_start_while_sharing_is_rejected() {
    let h = create_harness(MockCaptureSource::new());
    h.session.start(None).await.unwrap();

    assert_eq!(
        h.session.start(None).await,
        Err(CaptureError::InvalidTransition {
            operation: "start sharing",
            state: "sharing",
        })
    );
    assert_eq!(h.source.request_count(), 1);
    h.session.stop();
}

#[tokio::test]
async fn test_start_while_connecting_is_rejected() {
    let h = create_harness(MockCaptureSource::new().with_delay(Duration::from_millis(100)));

    let session = h.session.clone();
    let pending = tokio::spawn(async move { session.start(None).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(h.session.state(), SessionState::Connecting);
    assert!(matches!(
        h.session.start(None).await,
        Err(CaptureError::InvalidTransition {
            state: "connecting",
            ..
        })
    ));

    pending.await.unwrap().unwrap();
    assert_eq!(h.session.state(), SessionState::Sharing);
    h.session.stop();
}

#[tokio::test]
async fn test_stop_during_connect_releases_late_handle() {
    let h = create_harness(MockCaptureSource::new().with_delay(Duration::from_millis(50)));

    let session = h.session.clone();
    let pending = tokio::spawn(async move { session.start(None).await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    h.session.stop();

    assert!(matches!(
        pending.await.unwrap(),
        Err(CaptureError::InvalidTransition {
            state: "stopped",
            ..
        })
    ));
    assert_eq!(h.session.state(), SessionState::Stopped);

    let handle = h.source.last_handle().unwrap();
    assert!(handle.tracks().iter().all(|t| !t.is_live()));
}

#[tokio::test]
async fn test_pause_and_resume_toggle_tracks() {
    let mut h = create_harness(MockCaptureSource::new());

    assert!(matches!(
        h.session.pause(),
        Err(CaptureError::InvalidTransition { state: "stopped", .. })
    ));

    h.session.start(None).await.unwrap();
    let handle = h.source.last_handle().unwrap();
    drain(&mut h.rx);

    h.session.pause().unwrap();
    assert!(h.session.is_paused());
    assert_eq!(h.session.state(), SessionState::Paused);
    assert!(handle.tracks().iter().all(|t| !t.is_enabled()));
    assert!(matches!(
        h.session.pause(),
        Err(CaptureError::InvalidTransition { state: "paused", .. })
    ));

    h.session.resume().unwrap();
    assert_eq!(h.session.state(), SessionState::Sharing);
    assert!(handle.tracks().iter().all(|t| t.is_enabled()));
    assert!(matches!(
        h.session.resume(),
        Err(CaptureError::InvalidTransition { state: "sharing", .. })
    ));

    let types = control_types(&drain(&mut h.rx));
    assert_eq!(
        types,
        vec!["stream-status", "stream-paused", "stream-status", "stream-resumed"]
    );
    h.session.stop();
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let mut h = create_harness(MockCaptureSource::new());

    h.session.stop();
    assert!(drain(&mut h.rx).is_empty());

    h.session
        .start(Some(Rectangle::new(0.0, 0.0, 100.0, 100.0)))
        .await
        .unwrap();
    h.session.pause().unwrap();
    let handle = h.source.last_handle().unwrap();
    drain(&mut h.rx);

    h.session.stop();
    assert_eq!(h.session.state(), SessionState::Stopped);
    assert!(!h.session.is_paused());
    assert!(h.session.mask().is_none());
    assert!(handle.tracks().iter().all(|t| !t.is_live()));
    assert_eq!(
        control_types(&drain(&mut h.rx)),
        vec!["stream-status", "stream-stopped"]
    );

    h.session.stop();
    assert!(drain(&mut h.rx).is_empty());
}

#[tokio::test]
async fn test_external_end_stops_session() {
    let mut h = create_harness(MockCaptureSource::new());
    let mut state_rx = h.session.subscribe_state();

    h.session.start(None).await.unwrap();
    let handle = h.source.last_handle().unwrap();
    assert_eq!(handle.listener_count(), 1);
    drain(&mut h.rx);

    handle.end();

    timeout(
        Duration::from_millis(200),
        state_rx.wait_for(|s| *s == SessionState::Stopped),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(!h.session.is_active());
    assert!(control_types(&drain(&mut h.rx)).contains(&"stream-stopped"));
}

#[tokio::test]
async fn test_end_before_listener_registration_stops_session() {
    let mut h = create_harness(MockCaptureSource::new());
    h.source.end_next_on_grant();

    h.session.start(None).await.unwrap();

    let handle = h.source.last_handle().unwrap();
    assert_eq!(handle.listener_count(), 0);
    assert_eq!(h.session.state(), SessionState::Stopped);
    assert!(!h.session.is_active());
    assert!(!h.session.broadcaster().is_active());
    assert!(handle.tracks().iter().all(|t| !t.is_live()));
    assert!(control_types(&drain(&mut h.rx)).ends_with(&["stream-status", "stream-stopped"]));

    h.session.start(None).await.unwrap();
    assert_eq!(h.session.state(), SessionState::Sharing);
    h.session.stop();
}

#[tokio::test]
async fn test_stale_end_does_not_stop_new_capture() {
    let h = create_harness(MockCaptureSource::new());

    h.session.start(None).await.unwrap();
    let first = h.source.last_handle().unwrap();
    h.session.stop();

    h.session.start(None).await.unwrap();
    first.end();

    assert_eq!(h.session.state(), SessionState::Sharing);
    h.session.stop();
}

#[tokio::test]
async fn test_no_frame_after_stopped() {
    let mut h = create_harness(MockCaptureSource::new());
    h.session.start(None).await.unwrap();

    let saw_frame = timeout(Duration::from_secs(2), async {
        loop {
            if let Ok(envelope) = h.rx.recv().await {
                if matches!(envelope.message, BroadcastMessage::Frame { .. }) {
                    break;
                }
            }
        }
    })
    .await;
    assert!(saw_frame.is_ok());

    h.session.stop();
    let envelopes = drain(&mut h.rx);
    let stopped_at = envelopes
        .iter()
        .position(|e| matches!(e.message, BroadcastMessage::StreamStopped { .. }))
        .unwrap();
    assert!(envelopes[stopped_at..]
        .iter()
        .all(|e| !matches!(e.message, BroadcastMessage::Frame { .. })));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(drain(&mut h.rx).is_empty());
}

#[tokio::test]
async fn test_sequence_numbers_increase() {
    let mut h = create_harness(MockCaptureSource::new());
    h.session.start(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.session.pause().unwrap();
    h.session.stop();

    let envelopes = drain(&mut h.rx);
    assert!(envelopes
        .windows(2)
        .all(|pair| pair[1].sequence == pair[0].sequence + 1));
}
