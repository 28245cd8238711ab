//! Capture-Session: camera capture session coordination over a
//! pluggable backend.
//!
//! This library wires a device camera into a capture pipeline — device
//! discovery, input/output configuration, still-photo capture, live
//! frame delivery, and front/back camera switching — and forwards
//! results to a consumer delegate. The platform camera stack sits
//! behind trait-based abstractions, enabling production use with real
//! hardware (V4L2) and testing with mock devices.

pub mod coordinator;
pub mod device;
pub mod queue;
pub mod traits;
pub mod validation;

#[cfg(test)]
pub mod mock;

pub use coordinator::CaptureSessionCoordinator;
pub use queue::SerialQueue;
pub use traits::{
    AuthorizationStatus, CameraDevice, CameraSystem, CaptureDelegate, CaptureError,
    CaptureSession, Connection, DeviceInput, DeviceKind, DiscoverySpec, Facing, Format, FourCC,
    Frame, FrameMetadata, HeadlessPreview, PhotoOutput, PhotoSettings, PreviewFormat,
    PreviewSurface, SessionPreset, VideoGravity, VideoOutput,
};
