use super::constraints::CaptureConstraints;
use super::source::{
    CaptureSource, EndedListener, EndedSignal, MediaHandle, MediaTrack, PlatformError, TrackKind,
};
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info};
use uuid::Uuid;

const DEFAULT_MOCK_WIDTH: u32 = 320;
const DEFAULT_MOCK_HEIGHT: u32 = 180;

/// Capture source producing synthetic frames, for tests and `--source mock`
pub struct MockCaptureSource {
    supported: bool,
    width: u32,
    height: u32,
    delay: Option<Duration>,
    failures: Mutex<VecDeque<PlatformError>>,
    requests: AtomicUsize,
    end_on_grant: AtomicBool,
    last_handle: Mutex<Option<Arc<MockMediaHandle>>>,
}

impl MockCaptureSource {
    pub fn new() -> Self {
        Self::with_resolution(DEFAULT_MOCK_WIDTH, DEFAULT_MOCK_HEIGHT)
    }

    pub fn with_resolution(width: u32, height: u32) -> Self {
        Self {
            supported: true,
            width,
            height,
            delay: None,
            failures: Mutex::new(VecDeque::new()),
            requests: AtomicUsize::new(0),
            end_on_grant: AtomicBool::new(false),
            last_handle: Mutex::new(None),
        }
    }

    /// A platform without screen capture support
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    /// Wait this long before answering each request
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the next request with `error`. Failures queue up in order.
    pub fn fail_next(&self, error: PlatformError) {
        self.failures.lock().push_back(error);
    }

    /// End the next granted capture before it is handed out, as when the
    /// stream dies between the grant and the session taking hold of it
    pub fn end_next_on_grant(&self) {
        self.end_on_grant.store(true, Ordering::SeqCst);
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Handle returned by the most recent successful request
    pub fn last_handle(&self) -> Option<Arc<MockMediaHandle>> {
        self.last_handle.lock().clone()
    }
}

impl Default for MockCaptureSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureSource for MockCaptureSource {
    fn name(&self) -> &str {
        "mock"
    }

    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn request_capture(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Arc<dyn MediaHandle>, PlatformError> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if !self.supported {
            return Err(PlatformError::new(
                PlatformError::NOT_SUPPORTED,
                "mock source configured as unsupported",
            ));
        }

        if let Some(error) = self.failures.lock().pop_front() {
            debug!("Mock capture failing with {}", error);
            return Err(error);
        }

        let handle = Arc::new(MockMediaHandle::new(
            self.width,
            self.height,
            constraints.audio,
        ));
        info!(
            "Mock capture {} granted at {}x{} (audio: {})",
            handle.id(),
            self.width,
            self.height,
            constraints.audio
        );
        if self.end_on_grant.swap(false, Ordering::SeqCst) {
            handle.end();
        }
        *self.last_handle.lock() = Some(Arc::clone(&handle));
        Ok(handle)
    }
}

/// Track of a [`MockMediaHandle`]
pub struct MockTrack {
    kind: TrackKind,
    enabled: AtomicBool,
    live: AtomicBool,
}

impl MockTrack {
    fn new(kind: TrackKind) -> Self {
        Self {
            kind,
            enabled: AtomicBool::new(true),
            live: AtomicBool::new(true),
        }
    }
}

impl MediaTrack for MockTrack {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn label(&self) -> String {
        format!("mock {}", self.kind)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

/// Synthetic capture handle drawing a moving gradient
pub struct MockMediaHandle {
    id: String,
    width: u32,
    height: u32,
    video: Arc<MockTrack>,
    audio: Option<Arc<MockTrack>>,
    ended: EndedSignal,
    frame_counter: AtomicU64,
    frames_ready: AtomicBool,
}

impl MockMediaHandle {
    pub fn new(width: u32, height: u32, audio: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            width,
            height,
            video: Arc::new(MockTrack::new(TrackKind::Video)),
            audio: audio.then(|| Arc::new(MockTrack::new(TrackKind::Audio))),
            ended: EndedSignal::new(),
            frame_counter: AtomicU64::new(0),
            frames_ready: AtomicBool::new(true),
        }
    }

    /// Simulate the video element not having enough data yet
    pub fn set_frames_ready(&self, ready: bool) {
        self.frames_ready.store(ready, Ordering::SeqCst);
    }

    /// Simulate the user ending the capture outside the application
    pub fn end(&self) {
        info!("Mock capture {} ended externally", self.id);
        self.video.stop();
        if let Some(audio) = &self.audio {
            audio.stop();
        }

        self.ended.fire();
    }

    pub fn listener_count(&self) -> usize {
        self.ended.pending()
    }

    pub fn frames_generated(&self) -> u64 {
        self.frame_counter.load(Ordering::SeqCst)
    }

    fn render(&self, id: u64) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let shift = (id * 4) as usize;
        let mut data = Vec::with_capacity(w * h * 3);
        for y in 0..h {
            for x in 0..w {
                data.push(((x + shift) * 255 / w.max(1)) as u8);
                data.push((y * 255 / h.max(1)) as u8);
                data.push((shift % 256) as u8);
            }
        }
        data
    }
}

impl MediaHandle for MockMediaHandle {
    fn id(&self) -> &str {
        &self.id
    }

    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        let mut tracks: Vec<Arc<dyn MediaTrack>> = vec![self.video.clone() as Arc<dyn MediaTrack>];
        if let Some(audio) = &self.audio {
            tracks.push(audio.clone());
        }
        tracks
    }

    fn add_ended_listener(&self, listener: EndedListener) {
        self.ended.add(listener);
    }

    fn latest_frame(&self) -> Option<FrameData> {
        if !self.frames_ready.load(Ordering::SeqCst) || !self.video.is_live() {
            return None;
        }

        let id = self.frame_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Some(FrameData::new(
            id,
            SystemTime::now(),
            self.render(id),
            self.width,
            self.height,
            FrameFormat::Rgb24,
        ))
    }
}
