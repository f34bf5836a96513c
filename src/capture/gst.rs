use super::constraints::CaptureConstraints;
use super::source::{
    CaptureSource, EndedListener, EndedSignal, MediaHandle, MediaTrack, PlatformError, TrackKind,
};
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::{ClockTime, MessageType, MessageView, Pipeline};
use gstreamer_app::{AppSink, AppSinkCallbacks};
use gstreamer_video::VideoInfo;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// X11 screen capture through GStreamer (`ximagesrc`, plus `pulsesrc` for audio)
pub struct GstScreenSource {
    initialized: bool,
}

impl GstScreenSource {
    pub fn new() -> Self {
        let initialized = match gstreamer::init() {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to initialize GStreamer: {}", e);
                false
            }
        };
        Self { initialized }
    }

    /// Build the capture pipeline. Each track ends in a valve so pausing
    /// can drop media without tearing the pipeline down.
    fn build_pipeline_string(constraints: &CaptureConstraints) -> String {
        let display = constraints
            .video
            .display_name
            .as_deref()
            .map(|name| format!(" display-name=\"{}\"", name))
            .unwrap_or_default();
        let fps = constraints.video.ideal_frame_rate.max(1);

        let mut pipeline = format!(
            "ximagesrc name=screen{} use-damage=false show-pointer=true ! \
             videoconvert ! videorate ! \
             video/x-raw,format=RGB,framerate={}/1 ! \
             valve name=video_valve drop=false ! \
             appsink name=sink sync=false max-buffers=1 drop=true enable-last-sample=false",
            display, fps
        );

        if constraints.audio {
            pipeline.push_str(
                " pulsesrc name=audio ! \
                 valve name=audio_valve drop=false ! \
                 fakesink sync=false",
            );
        }

        pipeline
    }

    fn launch(constraints: &CaptureConstraints) -> Result<Arc<GstMediaHandle>, PlatformError> {
        let pipeline_desc = Self::build_pipeline_string(constraints);
        info!("Creating GStreamer pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| {
                let name = if e.matches(gstreamer::ParseError::NoSuchElement) {
                    PlatformError::NOT_FOUND
                } else {
                    PlatformError::NOT_READABLE
                };
                PlatformError::new(name, format!("Failed to create pipeline: {}", e))
            })?
            .downcast::<Pipeline>()
            .map_err(|_| {
                PlatformError::new(PlatformError::NOT_READABLE, "Failed to downcast to Pipeline")
            })?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| PlatformError::new(PlatformError::NOT_READABLE, "Failed to get appsink element"))?
            .downcast::<AppSink>()
            .map_err(|_| PlatformError::new(PlatformError::NOT_READABLE, "Failed to downcast to AppSink"))?;

        let video_valve = pipeline
            .by_name("video_valve")
            .ok_or_else(|| PlatformError::new(PlatformError::NOT_READABLE, "Failed to get video valve"))?;
        let audio_valve = pipeline.by_name("audio_valve");

        let handle = Arc::new(GstMediaHandle::new(pipeline.clone(), video_valve, audio_valve));

        let latest = Arc::clone(&handle.latest);
        let frame_counter = Arc::new(AtomicU64::new(0));
        appsink.set_callbacks(
            AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink
                        .pull_sample()
                        .map_err(|_| gstreamer::FlowError::Eos)?;
                    let id = frame_counter.fetch_add(1, Ordering::Relaxed) + 1;
                    match sample_to_frame(&sample, id) {
                        Some(frame) => *latest.lock() = Some(frame),
                        None => debug!("Dropping unreadable capture sample {}", id),
                    }
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        pipeline.set_state(gstreamer::State::Playing).map_err(|e| {
            PlatformError::new(
                PlatformError::NOT_READABLE,
                format!("Failed to start capture pipeline: {}", e),
            )
        })?;

        // Surface errors such as an unreachable X display before reporting success
        let (result, _, _) = pipeline.state(ClockTime::from_seconds(5));
        if let Err(e) = result {
            handle.shared.release();
            return Err(PlatformError::new(
                PlatformError::NOT_READABLE,
                format!("Capture pipeline did not start: {}", e),
            ));
        }

        handle.spawn_bus_watch();
        info!("GStreamer screen capture {} started", handle.id);
        Ok(handle)
    }
}

impl Default for GstScreenSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureSource for GstScreenSource {
    fn name(&self) -> &str {
        "gstreamer"
    }

    fn is_supported(&self) -> bool {
        self.initialized && gstreamer::ElementFactory::find("ximagesrc").is_some()
    }

    async fn request_capture(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Arc<dyn MediaHandle>, PlatformError> {
        if !self.initialized {
            return Err(PlatformError::new(
                PlatformError::NOT_SUPPORTED,
                "GStreamer is not available",
            ));
        }

        let constraints = constraints.clone();
        let handle = tokio::task::spawn_blocking(move || Self::launch(&constraints))
            .await
            .map_err(|e| PlatformError::new("AbortError", e.to_string()))??;
        Ok(handle)
    }
}

fn sample_to_frame(sample: &gstreamer::Sample, id: u64) -> Option<FrameData> {
    let info = VideoInfo::from_caps(sample.caps()?).ok()?;
    let buffer = sample.buffer()?;
    let map = buffer.map_readable().ok()?;

    let width = info.width() as usize;
    let height = info.height() as usize;
    let row = width * 3;
    let stride = info.stride()[0] as usize;

    let data = if stride == row {
        map.as_slice().get(..row * height)?.to_vec()
    } else {
        let mut packed = Vec::with_capacity(row * height);
        for line in map.as_slice().chunks(stride).take(height) {
            packed.extend_from_slice(line.get(..row)?);
        }
        packed
    };

    Some(FrameData::new(
        id,
        SystemTime::now(),
        data,
        info.width(),
        info.height(),
        FrameFormat::Rgb24,
    ))
}

struct PipelineShared {
    pipeline: Pipeline,
    live_tracks: AtomicUsize,
    released: AtomicBool,
}

impl PipelineShared {
    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
                warn!("Failed to stop capture pipeline: {}", e);
            }
        }
    }
}

/// Track whose enable switch is a `valve` element
pub struct GstTrack {
    kind: TrackKind,
    valve: gstreamer::Element,
    enabled: AtomicBool,
    live: AtomicBool,
    shared: Arc<PipelineShared>,
}

impl MediaTrack for GstTrack {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn label(&self) -> String {
        match self.kind {
            TrackKind::Video => "ximagesrc".to_string(),
            TrackKind::Audio => "pulsesrc".to_string(),
        }
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        self.valve.set_property("drop", !enabled);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            self.valve.set_property("drop", true);
            if self.shared.live_tracks.fetch_sub(1, Ordering::SeqCst) == 1 {
                self.shared.release();
            }
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

/// A running capture pipeline
pub struct GstMediaHandle {
    id: String,
    shared: Arc<PipelineShared>,
    tracks: Vec<Arc<GstTrack>>,
    latest: Arc<Mutex<Option<FrameData>>>,
    ended: Arc<EndedSignal>,
}

impl GstMediaHandle {
    fn new(
        pipeline: Pipeline,
        video_valve: gstreamer::Element,
        audio_valve: Option<gstreamer::Element>,
    ) -> Self {
        let valves: Vec<(TrackKind, gstreamer::Element)> = std::iter::once((TrackKind::Video, video_valve))
            .chain(audio_valve.map(|valve| (TrackKind::Audio, valve)))
            .collect();

        let shared = Arc::new(PipelineShared {
            pipeline,
            live_tracks: AtomicUsize::new(valves.len()),
            released: AtomicBool::new(false),
        });

        let tracks = valves
            .into_iter()
            .map(|(kind, valve)| {
                Arc::new(GstTrack {
                    kind,
                    valve,
                    enabled: AtomicBool::new(true),
                    live: AtomicBool::new(true),
                    shared: Arc::clone(&shared),
                })
            })
            .collect();

        Self {
            id: Uuid::new_v4().to_string(),
            shared,
            tracks,
            latest: Arc::new(Mutex::new(None)),
            ended: Arc::new(EndedSignal::new()),
        }
    }

    /// Watch the pipeline bus on a dedicated thread and fire the ended
    /// listeners on EOS or error
    fn spawn_bus_watch(&self) {
        let Some(bus) = self.shared.pipeline.bus() else {
            warn!("Capture pipeline has no bus; external end will go unnoticed");
            return;
        };
        let shared = Arc::clone(&self.shared);
        let ended = Arc::clone(&self.ended);
        let id = self.id.clone();

        let spawned = std::thread::Builder::new()
            .name("sharecast-gst-bus".to_string())
            .spawn(move || {
                while !shared.released.load(Ordering::SeqCst) {
                    let Some(message) = bus.timed_pop_filtered(
                        ClockTime::from_mseconds(200),
                        &[MessageType::Eos, MessageType::Error],
                    ) else {
                        continue;
                    };

                    match message.view() {
                        MessageView::Eos(..) => info!("Screen capture {} reached end of stream", id),
                        MessageView::Error(err) => error!(
                            "Screen capture {} failed in {:?}: {}",
                            id,
                            err.src().map(|s| s.path_string()),
                            err.error()
                        ),
                        _ => continue,
                    }

                    shared.release();
                    ended.fire();
                    break;
                }
                debug!("Bus watch for capture {} exiting", id);
            });

        if let Err(e) = spawned {
            warn!("Failed to spawn capture bus watch: {}", e);
        }
    }
}

impl MediaHandle for GstMediaHandle {
    fn id(&self) -> &str {
        &self.id
    }

    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks
            .iter()
            .map(|track| Arc::clone(track) as Arc<dyn MediaTrack>)
            .collect()
    }

    fn add_ended_listener(&self, listener: EndedListener) {
        self.ended.add(listener);
    }

    fn latest_frame(&self) -> Option<FrameData> {
        if self.shared.released.load(Ordering::SeqCst) {
            return None;
        }
        self.latest.lock().clone()
    }
}

impl Drop for GstMediaHandle {
    fn drop(&mut self) {
        self.shared.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_string_has_valves() {
        let mut constraints = CaptureConstraints::default();
        constraints.video.display_name = Some(":1".to_string());

        let desc = GstScreenSource::build_pipeline_string(&constraints);
        assert!(desc.contains("display-name=\":1\""));
        assert!(desc.contains("framerate=30/1"));
        assert!(desc.contains("valve name=video_valve"));
        assert!(desc.contains("valve name=audio_valve"));

        constraints.audio = false;
        let desc = GstScreenSource::build_pipeline_string(&constraints);
        assert!(!desc.contains("pulsesrc"));
    }
}
