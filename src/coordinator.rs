//! The capture session coordinator.
//!
//! Owns the session, photo output, and current device input, and
//! mediates between a consumer delegate and a [`CameraSystem`] backend:
//! construct, `start`/`stop`, `capture_photo`, `change_camera`, and
//! relay the three delegate callbacks.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::queue::SerialQueue;
use crate::traits::{
    AuthorizationStatus, CameraDevice, CameraSystem, CaptureDelegate, CaptureError,
    CaptureSession, DeviceInput, DiscoverySpec, Facing, FrameSink, PhotoOutput, PhotoSettings,
    PreviewFormat, PreviewSurface, Result, SessionPreset, VideoGravity, VideoOutput,
};

/// Fixed preview image width for still captures.
const PREVIEW_WIDTH: u32 = 480;
/// Fixed preview image height for still captures.
const PREVIEW_HEIGHT: u32 = 640;

/// Shared, non-owning route to the consumer delegate.
struct DelegateRef {
    slot: Arc<RwLock<Weak<dyn CaptureDelegate>>>,
}

impl Clone for DelegateRef {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl DelegateRef {
    fn new(delegate: Weak<dyn CaptureDelegate>) -> Self {
        Self {
            slot: Arc::new(RwLock::new(delegate)),
        }
    }

    fn set(&self, delegate: Weak<dyn CaptureDelegate>) {
        *self.slot.write() = delegate;
    }

    /// Run `f` against the delegate if it is still alive.
    fn with(&self, f: impl FnOnce(&dyn CaptureDelegate)) {
        let delegate = self.slot.read().upgrade();
        if let Some(delegate) = delegate {
            f(delegate.as_ref());
        }
    }

    /// Report `error` on `queue`; dropped silently if the delegate is
    /// gone by delivery time.
    fn error_on(&self, queue: &SerialQueue, error: CaptureError) {
        let this = self.clone();
        queue.dispatch(move || this.with(|delegate| delegate.on_error(error)));
    }
}

/// Commits the session configuration when dropped, so every exit path
/// out of a mutation closes the bracket.
struct ConfigurationBracket<'a, T: CaptureSession> {
    session: &'a T,
}

impl<'a, T: CaptureSession> ConfigurationBracket<'a, T> {
    fn enter(session: &'a T) -> Self {
        session.begin_configuration();
        Self { session }
    }
}

impl<T: CaptureSession> Drop for ConfigurationBracket<'_, T> {
    fn drop(&mut self) {
        self.session.commit_configuration();
    }
}

/// Unlocks the device when dropped.
struct DeviceConfigurationLock<'a, D: CameraDevice> {
    device: &'a D,
}

impl<'a, D: CameraDevice> DeviceConfigurationLock<'a, D> {
    fn acquire(device: &'a D) -> Result<Self> {
        device.lock_for_configuration()?;
        Ok(Self { device })
    }
}

impl<D: CameraDevice> Drop for DeviceConfigurationLock<'_, D> {
    fn drop(&mut self) {
        self.device.unlock_for_configuration();
    }
}

/// Coordinates a capture session over a [`CameraSystem`] backend.
///
/// Cheap to clone; clones are handles onto the same session. Camera I/O
/// and session reconfiguration serialize on an internal queue, and all
/// delegate callbacks are delivered on a second queue so consumers may
/// touch UI-bound state from within them.
pub struct CaptureSessionCoordinator<S: CameraSystem> {
    system: Arc<S>,
    session: S::Session,
    photo_output: S::PhotoOutput,
    session_queue: SerialQueue,
    callback_queue: SerialQueue,
    delegate: DelegateRef,
}

impl<S: CameraSystem> Clone for CaptureSessionCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            system: Arc::clone(&self.system),
            session: self.session.clone(),
            photo_output: self.photo_output.clone(),
            session_queue: self.session_queue.clone(),
            callback_queue: self.callback_queue.clone(),
            delegate: self.delegate.clone(),
        }
    }
}

impl<S: CameraSystem> CaptureSessionCoordinator<S> {
    /// Build a coordinator around a freshly configured session.
    ///
    /// Discovers a device for `facing`, wires input and outputs inside
    /// a single configuration bracket, and binds the preview surface.
    /// On failure the delegate (if present) receives
    /// [`CaptureError::InvalidDevice`] and no coordinator is returned.
    pub fn new<P>(
        system: S,
        preview: &P,
        facing: Facing,
        delegate: Weak<dyn CaptureDelegate>,
    ) -> Result<Self>
    where
        P: PreviewSurface<Session = S::Session>,
    {
        let delegate = DelegateRef::new(delegate);
        let session_queue = SerialQueue::new("capture-session.io");
        let callback_queue = SerialQueue::new("capture-session.callback");

        match Self::configure(&system, preview, facing, &delegate, &session_queue, &callback_queue)
        {
            Ok((session, photo_output)) => Ok(Self {
                system: Arc::new(system),
                session,
                photo_output,
                session_queue,
                callback_queue,
                delegate,
            }),
            Err(error) => {
                // Construction is single-threaded; the failure is
                // reported in place rather than through the callback
                // queue, which is torn down on this path.
                delegate.with(|d| d.on_error(error));
                Err(error)
            }
        }
    }

    fn configure<P>(
        system: &S,
        preview: &P,
        facing: Facing,
        delegate: &DelegateRef,
        session_queue: &SerialQueue,
        callback_queue: &SerialQueue,
    ) -> Result<(S::Session, S::PhotoOutput)>
    where
        P: PreviewSurface<Session = S::Session>,
    {
        let spec = DiscoverySpec::for_facing(facing);
        let device = system
            .discover(&spec)
            .into_iter()
            .next()
            .ok_or(CaptureError::InvalidDevice)?;
        info!(?facing, kind = ?device.kind(), "selected capture device");

        let session = system.make_session();
        let bracket = ConfigurationBracket::enter(&session);
        session.set_preset(SessionPreset::Photo);

        let video_output = system.make_video_output();
        video_output.set_discards_late_frames(true);
        let photo_output = system.make_photo_output();

        let input = system.make_input(&device)?;
        if !(session.can_add_input(&input)
            && session.can_add_photo_output(&photo_output)
            && session.can_add_video_output(&video_output))
        {
            return Err(CaptureError::InvalidDevice);
        }

        let lock = DeviceConfigurationLock::acquire(&device)?;
        device.set_subject_area_monitoring(true);

        if session.add_input(input).is_err() {
            return Err(CaptureError::InvalidDevice);
        }
        session.add_photo_output(photo_output.clone());
        session.add_video_output(video_output.clone());

        preview.bind_session(&session);
        preview.set_video_gravity(VideoGravity::ResizeAspectFill);

        video_output.set_frame_sink(
            session_queue.clone(),
            Self::frame_sink(delegate.clone(), callback_queue.clone()),
        );

        drop(lock);
        drop(bracket);
        Ok((session, photo_output))
    }

    fn frame_sink(delegate: DelegateRef, callback_queue: SerialQueue) -> FrameSink {
        Box::new(move |frame| {
            let delegate = delegate.clone();
            callback_queue.dispatch(move || delegate.with(|d| d.on_frame_received(frame)));
        })
    }

    /// Replace the delegate. The coordinator never owns it; dropping
    /// the consumer-side `Arc` silences all callbacks.
    pub fn set_delegate(&self, delegate: Weak<dyn CaptureDelegate>) {
        self.delegate.set(delegate);
    }

    /// Begin running the session, gated on camera permission.
    ///
    /// When permission is still undetermined, camera I/O is held while
    /// access is requested; the session then starts if and only if the
    /// request is granted, and I/O resumes exactly once either way.
    /// Denied or restricted permission is a no-op.
    pub fn start(&self) {
        match self.system.authorization() {
            AuthorizationStatus::Authorized => self.start_running(),
            AuthorizationStatus::NotDetermined => {
                self.session_queue.suspend();
                let this = self.clone();
                self.system.request_access(Box::new(move |granted| {
                    if granted {
                        this.start_running();
                    } else {
                        debug!("camera access denied by user");
                    }
                    this.session_queue.resume();
                }));
            }
            AuthorizationStatus::Denied | AuthorizationStatus::Restricted => {}
        }
    }

    // Session start touches UI-bound resources; keep it off the
    // caller's immediate call stack.
    fn start_running(&self) {
        let session = self.session.clone();
        self.callback_queue.dispatch(move || session.start_running());
    }

    /// Stop the running session. Safe to call repeatedly or while
    /// stopped.
    pub fn stop(&self) {
        self.session.stop_running();
    }

    /// Whether the session pipeline is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    /// Facing of the currently attached input, if any.
    #[must_use]
    pub fn current_facing(&self) -> Option<Facing> {
        self.session.current_input().map(|input| input.facing())
    }

    /// Issue a still capture.
    ///
    /// Requires an enabled, active photo connection; otherwise the
    /// delegate receives [`CaptureError::InvalidDevice`] and the
    /// completion path is never entered. The result arrives through
    /// `on_photo_captured` or `on_error`.
    pub fn capture_photo(&self) {
        let usable = self
            .photo_output
            .connection()
            .is_some_and(|connection| connection.usable());
        if !usable {
            warn!("photo capture requested without an active connection");
            self.delegate
                .error_on(&self.callback_queue, CaptureError::InvalidDevice);
            return;
        }

        let preview = self
            .photo_output
            .available_preview_pixel_formats()
            .into_iter()
            .next()
            .map(|fourcc| PreviewFormat {
                fourcc,
                width: PREVIEW_WIDTH,
                height: PREVIEW_HEIGHT,
            });
        let settings = PhotoSettings { preview };

        let delegate = self.delegate.clone();
        let callback_queue = self.callback_queue.clone();
        self.photo_output.capture(
            settings,
            Box::new(move |outcome| {
                callback_queue.dispatch(move || match outcome {
                    Err(error) => delegate.with(|d| d.on_error(error)),
                    Ok(photo) => match photo.image_data() {
                        Some(data) if !data.is_empty() => {
                            delegate.with(|d| d.on_photo_captured(data));
                        }
                        _ => delegate.with(|d| d.on_error(CaptureError::InvalidData)),
                    },
                });
            }),
        );
    }

    /// Switch between front and back cameras.
    ///
    /// Runs on the session queue so switches serialize against frame
    /// delivery and against each other. No-op when no input is
    /// attached. A failed switch leaves the original input attached
    /// and reports [`CaptureError::InvalidDevice`].
    pub fn change_camera(&self) {
        let Some(current) = self.session.current_input() else {
            return;
        };
        let target = current.facing().opposite();
        let this = self.clone();
        self.session_queue.dispatch(move || this.switch_to(target));
    }

    fn switch_to(&self, target: Facing) {
        let spec = DiscoverySpec::for_facing(target);
        let Some(device) = self.system.discover(&spec).into_iter().next() else {
            warn!(?target, "no capture device for requested facing");
            self.delegate
                .error_on(&self.callback_queue, CaptureError::InvalidDevice);
            return;
        };

        let Ok(input) = self.system.make_input(&device) else {
            warn!(?target, "could not create input for replacement device");
            self.delegate
                .error_on(&self.callback_queue, CaptureError::InvalidDevice);
            return;
        };

        let session = &self.session;
        let bracket = ConfigurationBracket::enter(session);
        let previous = session.remove_input();
        let attached = match session.add_input(input) {
            Ok(()) => {
                debug!(?target, "camera switched");
                true
            }
            Err(_rejected) => {
                // The session must never be left without an input.
                if let Some(previous) = previous {
                    if session.add_input(previous).is_err() {
                        warn!("could not restore previous camera input");
                    }
                }
                false
            }
        };
        drop(bracket);

        if !attached {
            self.delegate
                .error_on(&self.callback_queue, CaptureError::InvalidDevice);
        }
    }

    /// Run all pending work on both internal queues, for deterministic
    /// assertions in tests.
    #[cfg(test)]
    pub(crate) fn flush(&self) {
        self.session_queue.dispatch_sync(|| {});
        self.callback_queue.dispatch_sync(|| {});
    }
}
