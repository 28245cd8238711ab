//! Core traits and types for the capture pipeline.
//!
//! The platform camera subsystem is reached exclusively through the
//! capability traits below. `crate::device` implements them over V4L2;
//! `crate::mock` provides a scriptable double for tests.

use std::marker::PhantomData;
use std::time::Duration;

use tracing::debug;

use crate::queue::SerialQueue;

/// Which physical side of the device a camera points toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    /// Facing not reported by the platform.
    Unspecified,
    /// User-facing camera.
    Front,
    /// World-facing camera.
    Back,
}

impl Facing {
    /// The facing a camera switch moves to from `self`.
    ///
    /// `Unspecified` switches toward the back camera, same as `Front`.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Unspecified | Self::Front => Self::Back,
            Self::Back => Self::Front,
        }
    }
}

/// Capability tag identifying a camera module class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Single wide-angle module.
    WideAngle,
    /// Depth-sensing front module.
    TrueDepth,
    /// Wide + telephoto pair.
    Dual,
    /// Wide + ultra-wide pair.
    DualWide,
}

/// Explicit device discovery request: a facing plus the module kinds
/// acceptable for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverySpec {
    /// Requested facing.
    pub facing: Facing,
    /// Acceptable module kinds, in preference order.
    pub kinds: Vec<DeviceKind>,
}

impl DiscoverySpec {
    /// Discovery list for the front camera.
    #[must_use]
    pub fn front() -> Self {
        Self {
            facing: Facing::Front,
            kinds: vec![DeviceKind::TrueDepth, DeviceKind::WideAngle],
        }
    }

    /// Discovery list for the back camera.
    #[must_use]
    pub fn back() -> Self {
        Self {
            facing: Facing::Back,
            kinds: vec![DeviceKind::Dual, DeviceKind::DualWide, DeviceKind::WideAngle],
        }
    }

    /// Discovery list for `facing`; `Unspecified` resolves to back.
    #[must_use]
    pub fn for_facing(facing: Facing) -> Self {
        match facing {
            Facing::Front => Self::front(),
            Facing::Back | Facing::Unspecified => Self::back(),
        }
    }
}

/// Camera permission state as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    /// The user has not been asked yet.
    NotDetermined,
    /// Access granted.
    Authorized,
    /// Access denied by the user.
    Denied,
    /// Access blocked by policy.
    Restricted,
}

/// Session quality preset. The coordinator only ever selects photo
/// quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPreset {
    /// Still-photo quality.
    Photo,
}

/// Display mode for the preview surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoGravity {
    /// Fill the surface, cropping as needed.
    ResizeAspectFill,
}

/// Pixel format representation (e.g., YUYV, MJPG, RGB3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
    /// MJPEG pixel format (Motion JPEG).
    pub const MJPG: Self = Self::new(b"MJPG");
    /// RGB3 pixel format (24-bit RGB).
    pub const RGB3: Self = Self::new(b"RGB3");
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

/// Video format specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub fourcc: FourCC,
}

impl Format {
    /// Create a new format specification.
    #[must_use]
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        Self {
            width,
            height,
            fourcc,
        }
    }

    /// Expected frame size in bytes, assuming 2 bytes per pixel (YUYV).
    #[must_use]
    pub const fn frame_size(&self) -> u32 {
        self.width * self.height * 2
    }
}

/// Preview image format attached to a still-capture request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewFormat {
    /// Preview pixel format.
    pub fourcc: FourCC,
    /// Preview width in pixels.
    pub width: u32,
    /// Preview height in pixels.
    pub height: u32,
}

/// Settings for a single still capture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhotoSettings {
    /// Requested preview format, if the output advertises any preview
    /// pixel formats.
    pub preview: Option<PreviewFormat>,
}

/// Status of an output's video connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    /// Connection is enabled.
    pub enabled: bool,
    /// Connection is live.
    pub active: bool,
}

impl Connection {
    /// Whether the connection can service a capture request.
    #[must_use]
    pub const fn usable(self) -> bool {
        self.enabled && self.active
    }
}

/// Metadata for a delivered video frame.
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    /// Frame sequence number.
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
    /// Actual bytes used in the frame buffer.
    pub bytes_used: u32,
}

/// A delivered video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw frame data.
    pub data: Vec<u8>,
    /// Frame metadata.
    pub metadata: FrameMetadata,
}

impl Frame {
    /// Get RGB values for the pixel at (`x`, `y`) in a YUYV frame of
    /// the given `width`.
    ///
    /// YUYV packs pixel pairs as `[Y0 U Y1 V]`; odd x coordinates reuse
    /// the pair's shared chroma. Returns `None` when the coordinates
    /// fall outside the buffer.
    #[must_use]
    pub fn pixel_at(&self, x: u32, y: u32, width: u32) -> Option<(u8, u8, u8)> {
        let pair_x = x & !1;
        let offset = ((y * width + pair_x) * 2) as usize;

        let luma_offset = if x % 2 == 0 { offset } else { offset + 2 };
        let luma = *self.data.get(luma_offset)?;
        let u = *self.data.get(offset + 1)?;
        let v = *self.data.get(offset + 3)?;

        Some(yuv_to_rgb(luma, u, v))
    }
}

/// Convert YUV values to RGB using the ITU-R BT.601 formula, clamped
/// to the 0-255 range.
#[must_use]
#[allow(clippy::many_single_char_names)]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y_f = f32::from(y);
    let u_f = f32::from(u) - 128.0;
    let v_f = f32::from(v) - 128.0;

    let r = 1.402f32.mul_add(v_f, y_f);
    let g = 0.714_14f32.mul_add(-v_f, 0.344_14f32.mul_add(-u_f, y_f));
    let b = 1.772f32.mul_add(u_f, y_f);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let clamp = |val: f32| -> u8 { val.clamp(0.0, 255.0) as u8 };

    (clamp(r), clamp(g), clamp(b))
}

/// Error type for capture operations.
///
/// All failures surface as one of these two cases; backends log the
/// underlying platform cause before erasing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// No matching camera was found, device configuration failed, or a
    /// required connection is missing or inactive.
    #[error("no usable capture device")]
    InvalidDevice,
    /// A capture completed without an extractable image payload.
    #[error("capture produced no image data")]
    InvalidData,
}

/// Result type for capture operations.
pub type Result<T> = std::result::Result<T, CaptureError>;

/// A physical camera advertised by a [`CameraSystem`].
///
/// Implementations are cheap cloneable handles, mirroring platform
/// object-reference semantics.
pub trait CameraDevice: Clone + Send + 'static {
    /// Which side of the device this camera points toward.
    fn facing(&self) -> Facing;

    /// The module class this camera was discovered as.
    fn kind(&self) -> DeviceKind;

    /// Acquire exclusive configuration access to the device.
    fn lock_for_configuration(&self) -> Result<()>;

    /// Enable or disable subject-area change monitoring. Only valid
    /// while the configuration lock is held.
    fn set_subject_area_monitoring(&self, enabled: bool);

    /// Release the configuration lock.
    fn unlock_for_configuration(&self);
}

/// An input node feeding a session from one device.
pub trait DeviceInput: Clone + Send + 'static {
    /// Facing of the device behind this input.
    fn facing(&self) -> Facing;
}

/// A completed still capture.
pub trait CapturedPhoto: Send + 'static {
    /// Encoded image payload; `None` when the platform produced
    /// nothing extractable.
    fn image_data(&self) -> Option<Vec<u8>>;
}

/// Completion callback for a still capture.
pub type PhotoCompletion<P> = Box<dyn FnOnce(Result<P>) + Send>;

/// Still-photo output node.
pub trait PhotoOutput: Clone + Send + 'static {
    /// Photo type produced by this output.
    type Photo: CapturedPhoto;

    /// The output's video connection, once attached to a session.
    fn connection(&self) -> Option<Connection>;

    /// Preview pixel formats this output can embed in a capture.
    fn available_preview_pixel_formats(&self) -> Vec<FourCC>;

    /// Issue a still capture. The completion fires asynchronously,
    /// exactly once.
    fn capture(&self, settings: PhotoSettings, completion: PhotoCompletion<Self::Photo>);
}

/// Sink invoked, on the configured queue, for every delivered frame.
pub type FrameSink = Box<dyn FnMut(Frame) + Send>;

/// Live video output node.
pub trait VideoOutput: Clone + Send + 'static {
    /// When enabled, frames arriving while one is still being processed
    /// are dropped rather than queued.
    fn set_discards_late_frames(&self, discard: bool);

    /// Route frame delivery onto `queue`, invoking `sink` per frame.
    fn set_frame_sink(&self, queue: SerialQueue, sink: FrameSink);
}

/// Capture session: a cloneable handle onto the platform pipeline.
///
/// Input/output mutations are only valid between
/// [`begin_configuration`](Self::begin_configuration) and
/// [`commit_configuration`](Self::commit_configuration).
pub trait CaptureSession: Clone + Send + 'static {
    /// Input node type.
    type Input: DeviceInput;
    /// Photo output node type.
    type PhotoOutput;
    /// Video output node type.
    type VideoOutput;

    /// Open a configuration bracket.
    fn begin_configuration(&self);

    /// Close the current configuration bracket, applying changes
    /// atomically.
    fn commit_configuration(&self);

    /// Select the session quality preset.
    fn set_preset(&self, preset: SessionPreset);

    /// Whether `input` could be attached right now.
    fn can_add_input(&self, input: &Self::Input) -> bool;

    /// Attach `input`. Returns it unconsumed if the session rejects it.
    fn add_input(&self, input: Self::Input) -> std::result::Result<(), Self::Input>;

    /// Detach and return the currently attached input, if any.
    fn remove_input(&self) -> Option<Self::Input>;

    /// Handle to the currently attached input, if any.
    fn current_input(&self) -> Option<Self::Input>;

    /// Whether `output` could be attached right now.
    fn can_add_photo_output(&self, output: &Self::PhotoOutput) -> bool;

    /// Attach the photo output.
    fn add_photo_output(&self, output: Self::PhotoOutput);

    /// Whether `output` could be attached right now.
    fn can_add_video_output(&self, output: &Self::VideoOutput) -> bool;

    /// Attach the video output.
    fn add_video_output(&self, output: Self::VideoOutput);

    /// Begin running the pipeline.
    fn start_running(&self);

    /// Stop the pipeline. Idempotent; takes effect at the pipeline's
    /// next scheduling opportunity.
    fn stop_running(&self);

    /// Whether the pipeline is currently running.
    fn is_running(&self) -> bool;
}

/// Surface that displays the session's live preview. Opaque to the
/// coordinator beyond binding.
pub trait PreviewSurface {
    /// Session handle type this surface accepts.
    type Session;

    /// Bind the session to this surface.
    fn bind_session(&self, session: &Self::Session);

    /// Select how preview content fills the surface.
    fn set_video_gravity(&self, gravity: VideoGravity);
}

/// Entry point to a camera backend.
pub trait CameraSystem: Send + Sync + 'static {
    /// Device type enumerated by discovery.
    type Device: CameraDevice;
    /// Input node type.
    type Input: DeviceInput;
    /// Session type.
    type Session: CaptureSession<
        Input = Self::Input,
        PhotoOutput = Self::PhotoOutput,
        VideoOutput = Self::VideoOutput,
    >;
    /// Photo output type.
    type PhotoOutput: PhotoOutput;
    /// Video output type.
    type VideoOutput: VideoOutput;

    /// Enumerate devices matching `spec`, best match first.
    fn discover(&self, spec: &DiscoverySpec) -> Vec<Self::Device>;

    /// Create an empty session.
    fn make_session(&self) -> Self::Session;

    /// Create an input node for `device`.
    fn make_input(&self, device: &Self::Device) -> Result<Self::Input>;

    /// Create a photo output node.
    fn make_photo_output(&self) -> Self::PhotoOutput;

    /// Create a video output node.
    fn make_video_output(&self) -> Self::VideoOutput;

    /// Current camera permission state.
    fn authorization(&self) -> AuthorizationStatus;

    /// Request camera access. The completion fires exactly once with
    /// the grant decision; it may fire before this call returns.
    fn request_access(&self, completion: Box<dyn FnOnce(bool) + Send>);
}

/// Consumer callbacks. All notifications are fire-and-forget; the
/// coordinator holds the delegate weakly and silently drops callbacks
/// once it is gone.
pub trait CaptureDelegate: Send + Sync {
    /// A still capture produced `data`.
    fn on_photo_captured(&self, data: Vec<u8>);

    /// A live video frame arrived.
    fn on_frame_received(&self, frame: Frame);

    /// An operation failed.
    fn on_error(&self, error: CaptureError);
}

/// Preview target for consumers with no rendering surface.
///
/// Accepts the binding and logs it; preview rendering stays the host
/// application's concern.
#[derive(Debug)]
pub struct HeadlessPreview<S> {
    _session: PhantomData<fn(S)>,
}

impl<S> Default for HeadlessPreview<S> {
    fn default() -> Self {
        Self {
            _session: PhantomData,
        }
    }
}

impl<S> PreviewSurface for HeadlessPreview<S> {
    type Session = S;

    fn bind_session(&self, _session: &S) {
        debug!("preview bound to headless surface");
    }

    fn set_video_gravity(&self, gravity: VideoGravity) {
        debug!(?gravity, "preview gravity set");
    }
}
