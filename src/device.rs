//! V4L2 backend implementing the capture capability traits over the
//! v4l crate.
//!
//! V4L2 exposes no facing concept, so [`V4l2Config`] carries an
//! explicit node-to-facing map supplied by the host application.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream as V4lCaptureStream;
use v4l::video::Capture;
use v4l::Device;

use crate::queue::SerialQueue;
use crate::traits::{
    AuthorizationStatus, CameraDevice, CameraSystem, CaptureError, CapturedPhoto, CaptureSession,
    Connection, DeviceInput, DeviceKind, DiscoverySpec, Facing, Format, FourCC, Frame,
    FrameMetadata, FrameSink, PhotoCompletion, PhotoOutput, PhotoSettings, Result, SessionPreset,
    VideoOutput,
};

/// Stream format used when the session runs: 640x480 YUYV.
const STREAM_FORMAT: Format = Format::new(640, 480, FourCC::YUYV);

/// Number of mmap buffers for the capture stream.
const STREAM_BUFFER_COUNT: u32 = 4;

/// How long a still capture waits for the live stream to produce a
/// frame before giving up (50 polls of 20ms).
const PHOTO_POLL_ATTEMPTS: u32 = 50;
const PHOTO_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// One configured camera node.
#[derive(Debug, Clone)]
pub struct V4l2Candidate {
    /// V4L2 device index (`/dev/video{index}`).
    pub index: u32,
    /// Which side of the device the node sits on.
    pub facing: Facing,
    /// Module class advertised to discovery.
    pub kind: DeviceKind,
}

/// Facing map for a V4L2 camera backend.
#[derive(Debug, Clone, Default)]
pub struct V4l2Config {
    /// Candidate nodes, in preference order.
    pub candidates: Vec<V4l2Candidate>,
}

impl V4l2Config {
    /// Add a candidate node.
    #[must_use]
    pub fn with_candidate(mut self, index: u32, facing: Facing, kind: DeviceKind) -> Self {
        self.candidates.push(V4l2Candidate {
            index,
            facing,
            kind,
        });
        self
    }
}

#[derive(Default)]
struct CameraConfigState {
    locked: bool,
    monitoring: bool,
}

/// A V4L2 camera selected by discovery.
#[derive(Clone)]
pub struct V4l2Camera {
    index: u32,
    facing: Facing,
    kind: DeviceKind,
    card: String,
    config: Arc<Mutex<CameraConfigState>>,
}

impl V4l2Camera {
    /// V4L2 device index.
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Card name reported by the driver.
    #[must_use]
    pub fn card(&self) -> &str {
        &self.card
    }

    /// Whether subject-area monitoring was requested for this camera.
    #[must_use]
    pub fn subject_area_monitoring(&self) -> bool {
        self.config.lock().monitoring
    }
}

impl CameraDevice for V4l2Camera {
    fn facing(&self) -> Facing {
        self.facing
    }

    fn kind(&self) -> DeviceKind {
        self.kind
    }

    fn lock_for_configuration(&self) -> Result<()> {
        let mut state = self.config.lock();
        if state.locked {
            return Err(CaptureError::InvalidDevice);
        }
        state.locked = true;
        Ok(())
    }

    fn set_subject_area_monitoring(&self, enabled: bool) {
        // V4L2 has no subject-area events; the setting is recorded
        // only.
        self.config.lock().monitoring = enabled;
        trace!(index = self.index, enabled, "subject-area monitoring");
    }

    fn unlock_for_configuration(&self) {
        self.config.lock().locked = false;
    }
}

/// Input node wrapping one camera.
#[derive(Clone)]
pub struct V4l2Input {
    camera: V4l2Camera,
}

impl DeviceInput for V4l2Input {
    fn facing(&self) -> Facing {
        self.camera.facing
    }
}

/// A completed still capture.
pub struct V4l2Photo {
    data: Option<Vec<u8>>,
}

impl CapturedPhoto for V4l2Photo {
    fn image_data(&self) -> Option<Vec<u8>> {
        self.data.clone()
    }
}

type LiveTap = Arc<Mutex<Option<Frame>>>;

#[derive(Clone)]
struct PhotoSource {
    index: u32,
    live: Option<LiveTap>,
}

#[derive(Default)]
struct PhotoShared {
    attached: AtomicBool,
    source: Mutex<Option<PhotoSource>>,
}

/// Still-photo output node.
#[derive(Clone, Default)]
pub struct V4l2PhotoOutput {
    shared: Arc<PhotoShared>,
}

impl V4l2PhotoOutput {
    fn set_attached(&self) {
        self.shared.attached.store(true, Ordering::Release);
    }

    fn set_source(&self, index: Option<u32>) {
        let mut source = self.shared.source.lock();
        let live = source.as_ref().and_then(|source| source.live.clone());
        *source = index.map(|index| PhotoSource { index, live });
    }

    fn set_live(&self, live: Option<LiveTap>) {
        if let Some(source) = self.shared.source.lock().as_mut() {
            source.live = live;
        }
    }
}

impl PhotoOutput for V4l2PhotoOutput {
    type Photo = V4l2Photo;

    fn connection(&self) -> Option<Connection> {
        if !self.shared.attached.load(Ordering::Acquire) {
            return None;
        }
        Some(Connection {
            enabled: true,
            active: self.shared.source.lock().is_some(),
        })
    }

    fn available_preview_pixel_formats(&self) -> Vec<FourCC> {
        vec![FourCC::YUYV]
    }

    fn capture(&self, settings: PhotoSettings, completion: PhotoCompletion<V4l2Photo>) {
        let source = self.shared.source.lock().clone();
        let Some(source) = source else {
            completion(Err(CaptureError::InvalidDevice));
            return;
        };

        thread::Builder::new()
            .name("capture-session.photo".to_owned())
            .spawn(move || completion(take_photo(&source, &settings)))
            .expect("failed to spawn photo capture thread");
    }
}

fn take_photo(source: &PhotoSource, settings: &PhotoSettings) -> Result<V4l2Photo> {
    // A running stream owns the device; stills come from the same
    // pipeline instead of opening the node twice.
    if let Some(live) = &source.live {
        for _ in 0..PHOTO_POLL_ATTEMPTS {
            let frame = live.lock().clone();
            if let Some(frame) = frame {
                return Ok(V4l2Photo {
                    data: Some(frame.data),
                });
            }
            thread::sleep(PHOTO_POLL_INTERVAL);
        }
        return Ok(V4l2Photo { data: None });
    }
    one_shot_grab(source.index, settings)
}

fn one_shot_grab(index: u32, settings: &PhotoSettings) -> Result<V4l2Photo> {
    let device = open_device(index)?;

    if let Some(preview) = &settings.preview {
        let mut fmt = device.format().map_err(|error| {
            warn!(index, %error, "could not query format for still capture");
            CaptureError::InvalidDevice
        })?;
        fmt.width = preview.width;
        fmt.height = preview.height;
        fmt.fourcc = preview.fourcc.into();
        device.set_format(&fmt).map_err(|error| {
            warn!(index, %error, "could not set still capture format");
            CaptureError::InvalidDevice
        })?;
    }

    let mut stream = Stream::with_buffers(&device, Type::VideoCapture, 1).map_err(|error| {
        warn!(index, %error, "could not start still capture stream");
        CaptureError::InvalidDevice
    })?;
    let (buf, _meta) = stream.next().map_err(|error| {
        warn!(index, %error, "still capture read failed");
        CaptureError::InvalidDevice
    })?;

    let data = buf.to_vec();
    Ok(V4l2Photo {
        data: (!data.is_empty()).then_some(data),
    })
}

struct VideoRoute {
    queue: SerialQueue,
    sink: Arc<Mutex<FrameSink>>,
}

#[derive(Default)]
struct VideoShared {
    discards_late: AtomicBool,
    dropped: AtomicU64,
    in_flight: Arc<AtomicBool>,
    route: Mutex<Option<VideoRoute>>,
}

/// Live-video output node.
#[derive(Clone, Default)]
pub struct V4l2VideoOutput {
    shared: Arc<VideoShared>,
}

impl V4l2VideoOutput {
    /// Frames dropped by the late-frame policy so far.
    #[must_use]
    pub fn dropped_frames(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    fn deliver(&self, frame: Frame) {
        let route = {
            let route = self.shared.route.lock();
            route
                .as_ref()
                .map(|route| (route.queue.clone(), Arc::clone(&route.sink)))
        };
        let Some((queue, sink)) = route else {
            return;
        };

        // At most one frame logically in flight; late arrivals are
        // dropped, never queued.
        if self.shared.discards_late.load(Ordering::Relaxed)
            && self.shared.in_flight.swap(true, Ordering::AcqRel)
        {
            let dropped = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            trace!(dropped, "late frame dropped");
            return;
        }

        let in_flight = Arc::clone(&self.shared.in_flight);
        queue.dispatch(move || {
            {
                let mut sink = sink.lock();
                (*sink)(frame);
            }
            in_flight.store(false, Ordering::Release);
        });
    }
}

impl VideoOutput for V4l2VideoOutput {
    fn set_discards_late_frames(&self, discard: bool) {
        self.shared.discards_late.store(discard, Ordering::Relaxed);
    }

    fn set_frame_sink(&self, queue: SerialQueue, sink: FrameSink) {
        *self.shared.route.lock() = Some(VideoRoute {
            queue,
            sink: Arc::new(Mutex::new(sink)),
        });
    }
}

struct StreamWorker {
    stop: Arc<AtomicBool>,
}

#[derive(Default)]
struct V4l2SessionState {
    preset: Option<SessionPreset>,
    depth: u32,
    input: Option<V4l2Input>,
    photo_output: Option<V4l2PhotoOutput>,
    video_output: Option<V4l2VideoOutput>,
    worker: Option<StreamWorker>,
    intended_running: bool,
}

#[derive(Default)]
struct V4l2SessionShared {
    state: Mutex<V4l2SessionState>,
}

impl Drop for V4l2SessionShared {
    fn drop(&mut self) {
        halt_worker(&mut self.state.lock());
    }
}

fn halt_worker(state: &mut V4l2SessionState) {
    if let Some(worker) = state.worker.take() {
        worker.stop.store(true, Ordering::Release);
    }
    if let Some(photo) = &state.photo_output {
        photo.set_live(None);
    }
}

fn spawn_worker(state: &mut V4l2SessionState) {
    let Some(input) = state.input.clone() else {
        warn!("session started without an input");
        return;
    };
    let Some(output) = state.video_output.clone() else {
        warn!("session started without a video output");
        return;
    };

    let stop = Arc::new(AtomicBool::new(false));
    let latest: LiveTap = Arc::new(Mutex::new(None));
    if let Some(photo) = &state.photo_output {
        photo.set_live(Some(Arc::clone(&latest)));
    }

    let index = input.camera.index;
    let worker_stop = Arc::clone(&stop);
    thread::Builder::new()
        .name("capture-session.stream".to_owned())
        .spawn(move || {
            if let Err(error) = stream_loop(index, &output, &latest, &worker_stop) {
                warn!(index, %error, "video stream terminated");
            }
        })
        .expect("failed to spawn stream worker");

    state.worker = Some(StreamWorker { stop });
    debug!(index, "capture stream running");
}

fn stream_loop(
    index: u32,
    output: &V4l2VideoOutput,
    latest: &LiveTap,
    stop: &AtomicBool,
) -> Result<()> {
    let device = open_device(index)?;

    let mut fmt = device.format().map_err(|error| {
        warn!(index, %error, "could not query stream format");
        CaptureError::InvalidDevice
    })?;
    fmt.width = STREAM_FORMAT.width;
    fmt.height = STREAM_FORMAT.height;
    fmt.fourcc = STREAM_FORMAT.fourcc.into();
    device.set_format(&fmt).map_err(|error| {
        warn!(index, %error, "could not set stream format");
        CaptureError::InvalidDevice
    })?;

    let mut stream =
        Stream::with_buffers(&device, Type::VideoCapture, STREAM_BUFFER_COUNT).map_err(
            |error| {
                warn!(index, %error, "could not start capture stream");
                CaptureError::InvalidDevice
            },
        )?;

    while !stop.load(Ordering::Acquire) {
        let (buf, meta) = stream.next().map_err(|error| {
            warn!(index, %error, "stream read failed");
            CaptureError::InvalidDevice
        })?;

        // V4L2 timestamps are non-negative in practice.
        #[allow(clippy::cast_sign_loss)]
        let secs = meta.timestamp.sec.max(0) as u64;
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let nanos = (meta.timestamp.usec.max(0) as u32).saturating_mul(1000);

        let frame = Frame {
            data: buf.to_vec(),
            metadata: FrameMetadata {
                sequence: meta.sequence,
                timestamp: Duration::new(secs, nanos),
                bytes_used: meta.bytesused,
            },
        };

        *latest.lock() = Some(frame.clone());
        output.deliver(frame);
    }
    Ok(())
}

fn open_device(index: u32) -> Result<Device> {
    Device::new(index as usize).map_err(|error| {
        warn!(index, %error, "could not open device node");
        CaptureError::InvalidDevice
    })
}

/// Capture session handle over shared pipeline state.
#[derive(Clone, Default)]
pub struct V4l2Session {
    shared: Arc<V4l2SessionShared>,
}

impl V4l2Session {
    /// The selected quality preset, if any.
    #[must_use]
    pub fn preset(&self) -> Option<SessionPreset> {
        self.shared.state.lock().preset
    }
}

impl CaptureSession for V4l2Session {
    type Input = V4l2Input;
    type PhotoOutput = V4l2PhotoOutput;
    type VideoOutput = V4l2VideoOutput;

    fn begin_configuration(&self) {
        self.shared.state.lock().depth += 1;
    }

    fn commit_configuration(&self) {
        let mut state = self.shared.state.lock();
        state.depth = state.depth.saturating_sub(1);
    }

    fn set_preset(&self, preset: SessionPreset) {
        self.shared.state.lock().preset = Some(preset);
    }

    fn can_add_input(&self, _input: &V4l2Input) -> bool {
        self.shared.state.lock().input.is_none()
    }

    fn add_input(&self, input: V4l2Input) -> std::result::Result<(), V4l2Input> {
        let mut state = self.shared.state.lock();
        if state.input.is_some() {
            return Err(input);
        }
        if let Some(photo) = &state.photo_output {
            photo.set_source(Some(input.camera.index));
        }
        state.input = Some(input);
        // Restore streaming after an input swap while running.
        if state.intended_running && state.worker.is_none() {
            spawn_worker(&mut state);
        }
        Ok(())
    }

    fn remove_input(&self) -> Option<V4l2Input> {
        let mut state = self.shared.state.lock();
        halt_worker(&mut state);
        if let Some(photo) = &state.photo_output {
            photo.set_source(None);
        }
        state.input.take()
    }

    fn current_input(&self) -> Option<V4l2Input> {
        self.shared.state.lock().input.clone()
    }

    fn can_add_photo_output(&self, _output: &V4l2PhotoOutput) -> bool {
        self.shared.state.lock().photo_output.is_none()
    }

    fn add_photo_output(&self, output: V4l2PhotoOutput) {
        let mut state = self.shared.state.lock();
        output.set_attached();
        output.set_source(state.input.as_ref().map(|input| input.camera.index));
        state.photo_output = Some(output);
    }

    fn can_add_video_output(&self, _output: &V4l2VideoOutput) -> bool {
        self.shared.state.lock().video_output.is_none()
    }

    fn add_video_output(&self, output: V4l2VideoOutput) {
        self.shared.state.lock().video_output = Some(output);
    }

    fn start_running(&self) {
        let mut state = self.shared.state.lock();
        state.intended_running = true;
        if state.worker.is_none() {
            spawn_worker(&mut state);
        }
    }

    fn stop_running(&self) {
        let mut state = self.shared.state.lock();
        state.intended_running = false;
        halt_worker(&mut state);
    }

    fn is_running(&self) -> bool {
        self.shared.state.lock().worker.is_some()
    }
}

/// V4L2 camera backend.
#[derive(Clone)]
pub struct V4l2System {
    config: Arc<V4l2Config>,
}

impl V4l2System {
    /// Create a backend over the given facing map.
    #[must_use]
    pub fn new(config: V4l2Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

fn probe(candidate: &V4l2Candidate) -> Option<V4l2Camera> {
    let device = match Device::new(candidate.index as usize) {
        Ok(device) => device,
        Err(error) => {
            debug!(index = candidate.index, %error, "skipping unopenable node");
            return None;
        }
    };
    let caps = match device.query_caps() {
        Ok(caps) => caps,
        Err(error) => {
            debug!(index = candidate.index, %error, "skipping node without capabilities");
            return None;
        }
    };

    let flags = caps.capabilities;
    if !(flags.contains(v4l::capability::Flags::VIDEO_CAPTURE)
        && flags.contains(v4l::capability::Flags::STREAMING))
    {
        debug!(index = candidate.index, "node lacks capture/streaming capability");
        return None;
    }

    debug!(index = candidate.index, card = %caps.card, "discovered camera");
    Some(V4l2Camera {
        index: candidate.index,
        facing: candidate.facing,
        kind: candidate.kind,
        card: caps.card,
        config: Arc::default(),
    })
}

fn node_accessible(index: u32) -> bool {
    std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(format!("/dev/video{index}"))
        .is_ok()
}

impl CameraSystem for V4l2System {
    type Device = V4l2Camera;
    type Input = V4l2Input;
    type Session = V4l2Session;
    type PhotoOutput = V4l2PhotoOutput;
    type VideoOutput = V4l2VideoOutput;

    fn discover(&self, spec: &DiscoverySpec) -> Vec<V4l2Camera> {
        self.config
            .candidates
            .iter()
            .filter(|candidate| {
                candidate.facing == spec.facing && spec.kinds.contains(&candidate.kind)
            })
            .filter_map(probe)
            .collect()
    }

    fn make_session(&self) -> V4l2Session {
        V4l2Session::default()
    }

    fn make_input(&self, device: &V4l2Camera) -> Result<V4l2Input> {
        open_device(device.index)?;
        Ok(V4l2Input {
            camera: device.clone(),
        })
    }

    fn make_photo_output(&self) -> V4l2PhotoOutput {
        V4l2PhotoOutput::default()
    }

    fn make_video_output(&self) -> V4l2VideoOutput {
        V4l2VideoOutput::default()
    }

    fn authorization(&self) -> AuthorizationStatus {
        // No interactive permission model on this platform: a node we
        // can open is authorized, anything else is denied.
        let accessible = self
            .config
            .candidates
            .iter()
            .any(|candidate| node_accessible(candidate.index));
        if accessible {
            AuthorizationStatus::Authorized
        } else {
            AuthorizationStatus::Denied
        }
    }

    fn request_access(&self, completion: Box<dyn FnOnce(bool) + Send>) {
        completion(matches!(
            self.authorization(),
            AuthorizationStatus::Authorized
        ));
    }
}
