//! Capture-session demo binary driving the V4L2 backend.
//!
//! Usage: `capture-session [back-index] [front-index]`. Streams from
//! the back node for a couple of seconds, grabs a still, and, when a
//! front node is configured, switches cameras before stopping.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use capture_session::device::{V4l2Config, V4l2System};
use capture_session::{
    CaptureDelegate, CaptureError, CaptureSessionCoordinator, DeviceKind, Facing, Frame,
    HeadlessPreview,
};

struct PrintDelegate {
    frames: AtomicUsize,
}

impl CaptureDelegate for PrintDelegate {
    fn on_photo_captured(&self, data: Vec<u8>) {
        println!("Photo captured: {} bytes", data.len());
    }

    fn on_frame_received(&self, frame: Frame) {
        let count = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        if count % 30 == 0 {
            println!(
                "Frame {}: {} bytes, timestamp: {:?}",
                frame.metadata.sequence,
                frame.data.len(),
                frame.metadata.timestamp
            );
        }
    }

    fn on_error(&self, error: CaptureError) {
        eprintln!("Capture error: {error}");
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let back_index = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(0);
    let front_index: Option<u32> = std::env::args().nth(2).and_then(|arg| arg.parse().ok());

    let mut config =
        V4l2Config::default().with_candidate(back_index, Facing::Back, DeviceKind::WideAngle);
    if let Some(front_index) = front_index {
        config = config.with_candidate(front_index, Facing::Front, DeviceKind::WideAngle);
    }

    let delegate = Arc::new(PrintDelegate {
        frames: AtomicUsize::new(0),
    });
    let weak: Weak<dyn CaptureDelegate> = Arc::downgrade(&delegate);
    let preview = HeadlessPreview::default();

    let coordinator =
        match CaptureSessionCoordinator::new(V4l2System::new(config), &preview, Facing::Back, weak)
        {
            Ok(coordinator) => coordinator,
            Err(error) => {
                eprintln!("Error: {error}");
                std::process::exit(1);
            }
        };

    coordinator.start();
    thread::sleep(Duration::from_secs(2));

    coordinator.capture_photo();
    thread::sleep(Duration::from_secs(1));

    if front_index.is_some() {
        coordinator.change_camera();
        thread::sleep(Duration::from_secs(2));
        println!("Facing now: {:?}", coordinator.current_facing());
    }

    coordinator.stop();
}
