//! Scriptable capture backend for testing without hardware.
//!
//! `MockSystem` implements the capability traits with recorded state
//! so tests can observe configuration brackets, input swaps, and
//! permission prompts, and script failures at each seam. Frame data
//! comes from the same test patterns the validation helpers check.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::queue::SerialQueue;
use crate::traits::{
    AuthorizationStatus, CameraDevice, CameraSystem, CaptureDelegate, CaptureError,
    CapturedPhoto, CaptureSession, Connection, DeviceInput, DeviceKind, DiscoverySpec, Facing,
    Format, FourCC, Frame, FrameMetadata, FrameSink, PhotoCompletion, PhotoOutput, PhotoSettings,
    PreviewSurface, Result, SessionPreset, VideoGravity, VideoOutput,
};

/// Scripted outcome for the next still capture.
#[derive(Debug, Clone)]
pub enum PhotoPlan {
    /// Capture succeeds with this payload.
    Payload(Vec<u8>),
    /// Capture succeeds but the payload is zero bytes.
    Empty,
    /// Capture succeeds with no extractable payload at all.
    NoData,
    /// Capture fails outright.
    Fail(CaptureError),
}

// ---------------------------------------------------------------------
// Devices and inputs

#[derive(Debug, Default)]
struct DeviceState {
    locked: bool,
    monitoring: bool,
}

/// Mock camera device.
#[derive(Clone)]
pub struct MockDevice {
    facing: Facing,
    kind: DeviceKind,
    lock_fails: bool,
    state: Arc<Mutex<DeviceState>>,
}

impl MockDevice {
    fn new(facing: Facing, kind: DeviceKind, lock_fails: bool) -> Self {
        Self {
            facing,
            kind,
            lock_fails,
            state: Arc::new(Mutex::new(DeviceState::default())),
        }
    }

    /// Whether the configuration lock is currently held.
    #[must_use]
    pub fn locked(&self) -> bool {
        self.state.lock().locked
    }

    /// Whether subject-area monitoring was enabled.
    #[must_use]
    pub fn monitoring(&self) -> bool {
        self.state.lock().monitoring
    }
}

impl CameraDevice for MockDevice {
    fn facing(&self) -> Facing {
        self.facing
    }

    fn kind(&self) -> DeviceKind {
        self.kind
    }

    fn lock_for_configuration(&self) -> Result<()> {
        if self.lock_fails {
            return Err(CaptureError::InvalidDevice);
        }
        self.state.lock().locked = true;
        Ok(())
    }

    fn set_subject_area_monitoring(&self, enabled: bool) {
        self.state.lock().monitoring = enabled;
    }

    fn unlock_for_configuration(&self) {
        self.state.lock().locked = false;
    }
}

/// Mock input node wrapping one device.
#[derive(Clone)]
pub struct MockInput {
    device: MockDevice,
}

impl DeviceInput for MockInput {
    fn facing(&self) -> Facing {
        self.device.facing
    }
}

// ---------------------------------------------------------------------
// Photo output

/// Mock photo result.
pub struct MockPhoto {
    data: Option<Vec<u8>>,
}

impl CapturedPhoto for MockPhoto {
    fn image_data(&self) -> Option<Vec<u8>> {
        self.data.clone()
    }
}

#[derive(Default)]
struct PhotoState {
    connection: Option<Connection>,
    formats: Option<Vec<FourCC>>,
    plans: VecDeque<PhotoPlan>,
    capture_count: usize,
    last_settings: Option<PhotoSettings>,
}

/// Mock still-photo output.
#[derive(Clone, Default)]
pub struct MockPhotoOutput {
    state: Arc<Mutex<PhotoState>>,
}

impl MockPhotoOutput {
    fn attach(&self) {
        let mut state = self.state.lock();
        if state.connection.is_none() {
            state.connection = Some(Connection {
                enabled: true,
                active: true,
            });
        }
    }

    /// Override the connection reported to the coordinator.
    pub fn set_connection(&self, connection: Option<Connection>) {
        self.state.lock().connection = connection;
    }

    /// Override the advertised preview pixel formats.
    pub fn set_available_formats(&self, formats: Vec<FourCC>) {
        self.state.lock().formats = Some(formats);
    }

    /// Queue the outcome for the next capture.
    pub fn script_photo(&self, plan: PhotoPlan) {
        self.state.lock().plans.push_back(plan);
    }

    /// How many captures were actually issued.
    #[must_use]
    pub fn capture_count(&self) -> usize {
        self.state.lock().capture_count
    }

    /// Settings of the most recent capture.
    #[must_use]
    pub fn last_settings(&self) -> Option<PhotoSettings> {
        self.state.lock().last_settings.clone()
    }
}

impl PhotoOutput for MockPhotoOutput {
    type Photo = MockPhoto;

    fn connection(&self) -> Option<Connection> {
        self.state.lock().connection
    }

    fn available_preview_pixel_formats(&self) -> Vec<FourCC> {
        self.state
            .lock()
            .formats
            .clone()
            .unwrap_or_else(|| vec![FourCC::YUYV])
    }

    fn capture(&self, settings: PhotoSettings, completion: PhotoCompletion<MockPhoto>) {
        let plan = {
            let mut state = self.state.lock();
            state.capture_count += 1;
            state.last_settings = Some(settings);
            state
                .plans
                .pop_front()
                .unwrap_or(PhotoPlan::Payload(vec![0xA5; 16]))
        };

        let outcome = match plan {
            PhotoPlan::Payload(data) => Ok(MockPhoto { data: Some(data) }),
            PhotoPlan::Empty => Ok(MockPhoto {
                data: Some(Vec::new()),
            }),
            PhotoPlan::NoData => Ok(MockPhoto { data: None }),
            PhotoPlan::Fail(error) => Err(error),
        };
        completion(outcome);
    }
}

// ---------------------------------------------------------------------
// Video output

struct SinkRoute {
    queue: SerialQueue,
    sink: Arc<Mutex<FrameSink>>,
}

#[derive(Default)]
struct VideoState {
    discards_late: bool,
    route: Option<SinkRoute>,
}

/// Mock live-video output.
#[derive(Clone, Default)]
pub struct MockVideoOutput {
    state: Arc<Mutex<VideoState>>,
}

impl MockVideoOutput {
    /// Whether late-frame discarding was enabled.
    #[must_use]
    pub fn discards_late(&self) -> bool {
        self.state.lock().discards_late
    }

    /// Whether a frame sink was installed.
    #[must_use]
    pub fn has_sink(&self) -> bool {
        self.state.lock().route.is_some()
    }

    /// Simulate the backend delivering a frame on its delivery queue.
    pub fn deliver(&self, frame: Frame) {
        let route = {
            let state = self.state.lock();
            state
                .route
                .as_ref()
                .map(|route| (route.queue.clone(), Arc::clone(&route.sink)))
        };
        if let Some((queue, sink)) = route {
            queue.dispatch(move || {
                let mut sink = sink.lock();
                (*sink)(frame);
            });
        }
    }
}

impl VideoOutput for MockVideoOutput {
    fn set_discards_late_frames(&self, discard: bool) {
        self.state.lock().discards_late = discard;
    }

    fn set_frame_sink(&self, queue: SerialQueue, sink: FrameSink) {
        self.state.lock().route = Some(SinkRoute {
            queue,
            sink: Arc::new(Mutex::new(sink)),
        });
    }
}

// ---------------------------------------------------------------------
// Session

#[derive(Default)]
struct SessionState {
    preset: Option<SessionPreset>,
    depth: u32,
    begin_count: u32,
    commit_count: u32,
    input: Option<MockInput>,
    photo_output: Option<MockPhotoOutput>,
    video_output: Option<MockVideoOutput>,
    running: bool,
    start_count: u32,
    stop_count: u32,
    reject_all_inputs: bool,
    reject_facing: Option<Facing>,
    mutated_outside_bracket: bool,
    commit_input_counts: Vec<usize>,
}

impl SessionState {
    fn note_mutation(&mut self) {
        if self.depth == 0 {
            self.mutated_outside_bracket = true;
        }
    }
}

/// Mock capture session handle.
#[derive(Clone, Default)]
pub struct MockSession {
    state: Arc<Mutex<SessionState>>,
}

impl MockSession {
    fn with_input_rejection(reject: bool) -> Self {
        let session = Self::default();
        session.state.lock().reject_all_inputs = reject;
        session
    }

    /// Reject future inputs whose device faces `facing`.
    pub fn reject_inputs_facing(&self, facing: Facing) {
        self.state.lock().reject_facing = Some(facing);
    }

    /// The selected preset, if any.
    #[must_use]
    pub fn preset(&self) -> Option<SessionPreset> {
        self.state.lock().preset
    }

    /// Number of `begin_configuration` calls.
    #[must_use]
    pub fn begin_count(&self) -> u32 {
        self.state.lock().begin_count
    }

    /// Number of `commit_configuration` calls.
    #[must_use]
    pub fn commit_count(&self) -> u32 {
        self.state.lock().commit_count
    }

    /// Whether a photo output was attached.
    #[must_use]
    pub fn has_photo_output(&self) -> bool {
        self.state.lock().photo_output.is_some()
    }

    /// Whether a video output was attached.
    #[must_use]
    pub fn has_video_output(&self) -> bool {
        self.state.lock().video_output.is_some()
    }

    /// Number of `start_running` calls.
    #[must_use]
    pub fn start_count(&self) -> u32 {
        self.state.lock().start_count
    }

    /// Number of `stop_running` calls.
    #[must_use]
    pub fn stop_count(&self) -> u32 {
        self.state.lock().stop_count
    }

    /// Whether any input/output mutation happened outside a bracket.
    #[must_use]
    pub fn mutated_outside_bracket(&self) -> bool {
        self.state.lock().mutated_outside_bracket
    }

    /// Attached input count observed at each commit.
    #[must_use]
    pub fn commit_input_counts(&self) -> Vec<usize> {
        self.state.lock().commit_input_counts.clone()
    }
}

impl CaptureSession for MockSession {
    type Input = MockInput;
    type PhotoOutput = MockPhotoOutput;
    type VideoOutput = MockVideoOutput;

    fn begin_configuration(&self) {
        let mut state = self.state.lock();
        state.depth += 1;
        state.begin_count += 1;
    }

    fn commit_configuration(&self) {
        let mut state = self.state.lock();
        state.depth = state.depth.saturating_sub(1);
        state.commit_count += 1;
        let attached = usize::from(state.input.is_some());
        state.commit_input_counts.push(attached);
    }

    fn set_preset(&self, preset: SessionPreset) {
        let mut state = self.state.lock();
        state.note_mutation();
        state.preset = Some(preset);
    }

    fn can_add_input(&self, input: &MockInput) -> bool {
        let state = self.state.lock();
        if state.input.is_some() || state.reject_all_inputs {
            return false;
        }
        state.reject_facing != Some(input.facing())
    }

    fn add_input(&self, input: MockInput) -> std::result::Result<(), MockInput> {
        if !self.can_add_input(&input) {
            return Err(input);
        }
        let mut state = self.state.lock();
        state.note_mutation();
        state.input = Some(input);
        Ok(())
    }

    fn remove_input(&self) -> Option<MockInput> {
        let mut state = self.state.lock();
        if state.input.is_some() {
            state.note_mutation();
        }
        state.input.take()
    }

    fn current_input(&self) -> Option<MockInput> {
        self.state.lock().input.clone()
    }

    fn can_add_photo_output(&self, _output: &MockPhotoOutput) -> bool {
        self.state.lock().photo_output.is_none()
    }

    fn add_photo_output(&self, output: MockPhotoOutput) {
        output.attach();
        let mut state = self.state.lock();
        state.note_mutation();
        state.photo_output = Some(output);
    }

    fn can_add_video_output(&self, _output: &MockVideoOutput) -> bool {
        self.state.lock().video_output.is_none()
    }

    fn add_video_output(&self, output: MockVideoOutput) {
        let mut state = self.state.lock();
        state.note_mutation();
        state.video_output = Some(output);
    }

    fn start_running(&self) {
        let mut state = self.state.lock();
        state.running = true;
        state.start_count += 1;
    }

    fn stop_running(&self) {
        let mut state = self.state.lock();
        state.running = false;
        state.stop_count += 1;
    }

    fn is_running(&self) -> bool {
        self.state.lock().running
    }
}

// ---------------------------------------------------------------------
// Preview

#[derive(Default)]
struct PreviewState {
    bound: bool,
    gravity: Option<VideoGravity>,
}

/// Mock preview surface recording its binding.
#[derive(Default)]
pub struct MockPreview {
    state: Mutex<PreviewState>,
}

impl MockPreview {
    /// Whether a session was bound.
    #[must_use]
    pub fn bound(&self) -> bool {
        self.state.lock().bound
    }

    /// The selected gravity, if any.
    #[must_use]
    pub fn gravity(&self) -> Option<VideoGravity> {
        self.state.lock().gravity
    }
}

impl PreviewSurface for MockPreview {
    type Session = MockSession;

    fn bind_session(&self, _session: &MockSession) {
        self.state.lock().bound = true;
    }

    fn set_video_gravity(&self, gravity: VideoGravity) {
        self.state.lock().gravity = Some(gravity);
    }
}

// ---------------------------------------------------------------------
// System

type AccessCompletion = Box<dyn FnOnce(bool) + Send>;

#[derive(Default)]
struct SystemState {
    devices: Mutex<Vec<MockDevice>>,
    authorization: Mutex<Option<AuthorizationStatus>>,
    manual_prompt: Mutex<bool>,
    pending_access: Mutex<Vec<AccessCompletion>>,
    access_requests: Mutex<usize>,
    fail_next_input: Mutex<bool>,
    reject_all_inputs: Mutex<bool>,
    sessions: Mutex<Vec<MockSession>>,
    photo_outputs: Mutex<Vec<MockPhotoOutput>>,
    video_outputs: Mutex<Vec<MockVideoOutput>>,
}

/// Mock camera backend.
#[derive(Clone, Default)]
pub struct MockSystem {
    state: Arc<SystemState>,
}

impl MockSystem {
    /// Create an authorized backend with no devices.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device.
    #[must_use]
    pub fn with_device(self, facing: Facing, kind: DeviceKind) -> Self {
        self.state
            .devices
            .lock()
            .push(MockDevice::new(facing, kind, false));
        self
    }

    /// Add a device whose configuration lock fails.
    #[must_use]
    pub fn with_device_failing_lock(self, facing: Facing, kind: DeviceKind) -> Self {
        self.state
            .devices
            .lock()
            .push(MockDevice::new(facing, kind, true));
        self
    }

    /// Override the reported authorization status.
    #[must_use]
    pub fn with_authorization(self, status: AuthorizationStatus) -> Self {
        *self.state.authorization.lock() = Some(status);
        self
    }

    /// Hold access prompts open until [`resolve_access`](Self::resolve_access).
    #[must_use]
    pub fn with_manual_access_prompt(self) -> Self {
        *self.state.manual_prompt.lock() = true;
        self
    }

    /// Make every future session reject all inputs.
    #[must_use]
    pub fn with_input_rejection(self) -> Self {
        *self.state.reject_all_inputs.lock() = true;
        self
    }

    /// Make the next `make_input` call fail.
    pub fn fail_next_input(&self) {
        *self.state.fail_next_input.lock() = true;
    }

    /// Resolve all held access prompts with `granted`, updating the
    /// reported authorization status accordingly.
    pub fn resolve_access(&self, granted: bool) {
        *self.state.authorization.lock() = Some(if granted {
            AuthorizationStatus::Authorized
        } else {
            AuthorizationStatus::Denied
        });
        let pending: Vec<_> = self.state.pending_access.lock().drain(..).collect();
        for completion in pending {
            completion(granted);
        }
    }

    /// Number of access prompts requested.
    #[must_use]
    pub fn access_requests(&self) -> usize {
        *self.state.access_requests.lock()
    }

    /// The most recently created session.
    #[must_use]
    pub fn session(&self) -> MockSession {
        self.state
            .sessions
            .lock()
            .last()
            .cloned()
            .expect("no session created")
    }

    /// The most recently created photo output.
    #[must_use]
    pub fn photo_output(&self) -> MockPhotoOutput {
        self.state
            .photo_outputs
            .lock()
            .last()
            .cloned()
            .expect("no photo output created")
    }

    /// The most recently created video output.
    #[must_use]
    pub fn video_output(&self) -> MockVideoOutput {
        self.state
            .video_outputs
            .lock()
            .last()
            .cloned()
            .expect("no video output created")
    }
}

impl CameraSystem for MockSystem {
    type Device = MockDevice;
    type Input = MockInput;
    type Session = MockSession;
    type PhotoOutput = MockPhotoOutput;
    type VideoOutput = MockVideoOutput;

    fn discover(&self, spec: &DiscoverySpec) -> Vec<MockDevice> {
        self.state
            .devices
            .lock()
            .iter()
            .filter(|device| device.facing == spec.facing && spec.kinds.contains(&device.kind))
            .cloned()
            .collect()
    }

    fn make_session(&self) -> MockSession {
        let session = MockSession::with_input_rejection(*self.state.reject_all_inputs.lock());
        self.state.sessions.lock().push(session.clone());
        session
    }

    fn make_input(&self, device: &MockDevice) -> Result<MockInput> {
        let mut fail = self.state.fail_next_input.lock();
        if *fail {
            *fail = false;
            return Err(CaptureError::InvalidDevice);
        }
        Ok(MockInput {
            device: device.clone(),
        })
    }

    fn make_photo_output(&self) -> MockPhotoOutput {
        let output = MockPhotoOutput::default();
        self.state.photo_outputs.lock().push(output.clone());
        output
    }

    fn make_video_output(&self) -> MockVideoOutput {
        let output = MockVideoOutput::default();
        self.state.video_outputs.lock().push(output.clone());
        output
    }

    fn authorization(&self) -> AuthorizationStatus {
        self.state
            .authorization
            .lock()
            .unwrap_or(AuthorizationStatus::Authorized)
    }

    fn request_access(&self, completion: Box<dyn FnOnce(bool) + Send>) {
        *self.state.access_requests.lock() += 1;
        if *self.state.manual_prompt.lock() {
            self.state.pending_access.lock().push(completion);
        } else {
            *self.state.authorization.lock() = Some(AuthorizationStatus::Authorized);
            completion(true);
        }
    }
}

// ---------------------------------------------------------------------
// Delegate and frames

#[derive(Default)]
struct Recorded {
    photos: Vec<Vec<u8>>,
    frames: Vec<Frame>,
    errors: Vec<CaptureError>,
}

/// Delegate that records every callback for later assertions.
#[derive(Default)]
pub struct RecordingDelegate {
    recorded: Mutex<Recorded>,
}

impl RecordingDelegate {
    /// Payloads of captured photos, in arrival order.
    #[must_use]
    pub fn photos(&self) -> Vec<Vec<u8>> {
        self.recorded.lock().photos.clone()
    }

    /// Number of frames received.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.recorded.lock().frames.len()
    }

    /// Frames received, in arrival order.
    #[must_use]
    pub fn frames(&self) -> Vec<Frame> {
        self.recorded.lock().frames.clone()
    }

    /// Errors received, in arrival order.
    #[must_use]
    pub fn errors(&self) -> Vec<CaptureError> {
        self.recorded.lock().errors.clone()
    }
}

impl CaptureDelegate for RecordingDelegate {
    fn on_photo_captured(&self, data: Vec<u8>) {
        self.recorded.lock().photos.push(data);
    }

    fn on_frame_received(&self, frame: Frame) {
        self.recorded.lock().frames.push(frame);
    }

    fn on_error(&self, error: CaptureError) {
        self.recorded.lock().errors.push(error);
    }
}

/// Test pattern types for mock frame generation.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// SMPTE color bars pattern.
    ColorBars,
    /// Horizontal gradient from dark to light.
    Gradient,
    /// Solid color with specified Y, U, V values.
    Solid(u8, u8, u8),
}

/// Generate a YUYV frame of `format` filled with `pattern`.
#[must_use]
pub fn test_frame(format: &Format, pattern: TestPattern, sequence: u32) -> Frame {
    let size = format.frame_size() as usize;
    let mut data = vec![0u8; size];

    match pattern {
        TestPattern::ColorBars => fill_color_bars(&mut data, format.width, format.height),
        TestPattern::Gradient => fill_gradient(&mut data, format.width, format.height),
        TestPattern::Solid(y, u, v) => fill_solid(&mut data, y, u, v),
    }

    Frame {
        data,
        metadata: FrameMetadata {
            sequence,
            timestamp: Duration::from_millis(u64::from(sequence) * 33), // ~30fps
            bytes_used: format.frame_size(),
        },
    }
}

/// YUYV values for the 8 SMPTE bars: White, Yellow, Cyan, Green,
/// Magenta, Red, Blue, Black.
const COLOR_BARS_YUV: [(u8, u8, u8); 8] = [
    (235, 128, 128),
    (210, 16, 146),
    (170, 166, 16),
    (145, 54, 34),
    (106, 202, 222),
    (81, 90, 240),
    (41, 240, 110),
    (16, 128, 128),
];

fn fill_color_bars(data: &mut [u8], width: u32, height: u32) {
    let bar_width = (width / 8).max(1);

    for row in 0..height {
        for x in (0..width).step_by(2) {
            let bar = ((x / bar_width).min(7)) as usize;
            let (y_val, u_val, v_val) = COLOR_BARS_YUV[bar];
            write_pair(data, row, x, width, y_val, u_val, v_val);
        }
    }
}

fn fill_gradient(data: &mut [u8], width: u32, height: u32) {
    for row in 0..height {
        for x in (0..width).step_by(2) {
            #[allow(clippy::cast_possible_truncation)]
            let y_val = ((x * 255) / width) as u8;
            write_pair(data, row, x, width, y_val, 128, 128);
        }
    }
}

fn fill_solid(data: &mut [u8], y: u8, u: u8, v: u8) {
    for chunk in data.chunks_exact_mut(4) {
        chunk[0] = y;
        chunk[1] = u;
        chunk[2] = y;
        chunk[3] = v;
    }
}

fn write_pair(data: &mut [u8], row: u32, x: u32, width: u32, y: u8, u: u8, v: u8) {
    let offset = ((row * width + x) * 2) as usize;
    if let Some(pair) = data.get_mut(offset..offset + 4) {
        pair[0] = y;
        pair[1] = u;
        pair[2] = y;
        pair[3] = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_filters_by_facing_and_kind() {
        let system = MockSystem::new()
            .with_device(Facing::Front, DeviceKind::TrueDepth)
            .with_device(Facing::Back, DeviceKind::WideAngle)
            .with_device(Facing::Back, DeviceKind::Dual);

        let back = system.discover(&DiscoverySpec::back());
        assert_eq!(back.len(), 2);
        assert!(back.iter().all(|device| device.facing() == Facing::Back));

        let front = system.discover(&DiscoverySpec::front());
        assert_eq!(front.len(), 1);
        assert_eq!(front[0].kind(), DeviceKind::TrueDepth);

        let none = MockSystem::new().discover(&DiscoverySpec::front());
        assert!(none.is_empty());
    }

    #[test]
    fn test_device_lock_cycle() {
        let device = MockDevice::new(Facing::Back, DeviceKind::WideAngle, false);
        assert!(!device.locked());

        device
            .lock_for_configuration()
            .expect("lock should succeed");
        device.set_subject_area_monitoring(true);
        assert!(device.locked());
        assert!(device.monitoring());

        device.unlock_for_configuration();
        assert!(!device.locked());
    }

    #[test]
    fn test_session_tracks_bracket_balance() {
        let session = MockSession::default();
        let system = MockSystem::new().with_device(Facing::Front, DeviceKind::WideAngle);
        let device = &system.discover(&DiscoverySpec::front())[0];
        let input = system.make_input(device).expect("input should build");

        session.begin_configuration();
        session
            .add_input(input)
            .ok()
            .expect("input should attach");
        session.commit_configuration();

        assert!(!session.mutated_outside_bracket());
        assert_eq!(session.commit_input_counts(), vec![1]);

        let _detached = session.remove_input();
        assert!(session.mutated_outside_bracket());
    }

    #[test]
    fn test_session_rejects_second_input() {
        let session = MockSession::default();
        let system = MockSystem::new()
            .with_device(Facing::Front, DeviceKind::WideAngle)
            .with_device(Facing::Back, DeviceKind::WideAngle);

        let front = &system.discover(&DiscoverySpec::front())[0];
        let back = &system.discover(&DiscoverySpec::back())[0];

        session.begin_configuration();
        assert!(session
            .add_input(system.make_input(front).expect("input"))
            .is_ok());
        let second = system.make_input(back).expect("input");
        assert!(!session.can_add_input(&second));
        assert!(session.add_input(second).is_err());
        session.commit_configuration();

        assert_eq!(
            session.current_input().map(|input| input.facing()),
            Some(Facing::Front)
        );
    }

    #[test]
    fn test_color_bars_frame() {
        let format = Format::new(640, 480, FourCC::YUYV);
        let frame = test_frame(&format, TestPattern::ColorBars, 3);

        assert_eq!(frame.data.len(), (640 * 480 * 2) as usize);
        assert_eq!(frame.metadata.sequence, 3);
        // First bar is white (Y=235).
        assert_eq!(frame.data[0], 235);
    }

    #[test]
    fn test_gradient_frame() {
        let format = Format::new(640, 480, FourCC::YUYV);
        let frame = test_frame(&format, TestPattern::Gradient, 0);

        // Dark on the left, bright on the right.
        assert!(frame.data[0] < 10);
        let last_row = (479 * 640 * 2) as usize;
        assert!(frame.data[last_row + 638 * 2] > 200);
    }

    #[test]
    fn test_solid_frame() {
        let format = Format::new(64, 64, FourCC::YUYV);
        let frame = test_frame(&format, TestPattern::Solid(128, 64, 192), 0);

        assert_eq!(frame.data[0], 128);
        assert_eq!(frame.data[1], 64);
        assert_eq!(frame.data[2], 128);
        assert_eq!(frame.data[3], 192);
    }
}
