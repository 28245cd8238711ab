//! Frame and photo validation helpers for tests.
//!
//! Used by the unit tests against mock-generated patterns and by the
//! vivid integration tests to check what the delegate actually
//! received.

use crate::traits::{Format, Frame};

/// Why a frame or photo failed validation.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(String);

/// Result type for validation checks.
pub type ValidationResult = std::result::Result<(), ValidationError>;

/// Expected RGB values for the 8 SMPTE color bars, after YUV->RGB
/// conversion: White, Yellow, Cyan, Green, Magenta, Red, Blue, Black.
const SMPTE_COLOR_BARS_RGB: [(u8, u8, u8); 8] = [
    (235, 235, 235),
    (235, 235, 11),
    (12, 236, 237),
    (13, 237, 13),
    (237, 13, 237),
    (238, 14, 13),
    (15, 15, 239),
    (16, 16, 16),
];

/// Per-channel tolerance for color matching, covering YUV->RGB
/// rounding.
const COLOR_TOLERANCE: u32 = 15;

/// Check that `frame` contains the SMPTE color bar pattern by sampling
/// the center of each of the 8 vertical stripes.
pub fn validate_color_bars(frame: &Frame, format: &Format) -> ValidationResult {
    let bar_width = format.width / 8;
    let center_y = format.height / 2;

    for (bar, expected) in SMPTE_COLOR_BARS_RGB.iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let sample_x = (bar as u32 * bar_width) + (bar_width / 2);

        let actual = frame.pixel_at(sample_x, center_y, format.width).ok_or_else(|| {
            ValidationError(format!("no pixel at ({sample_x}, {center_y})"))
        })?;

        if !colors_match(actual, *expected, COLOR_TOLERANCE) {
            return Err(ValidationError(format!(
                "color bar {bar} mismatch at ({sample_x}, {center_y}): \
                 expected RGB{expected:?}, got RGB{actual:?}"
            )));
        }
    }

    Ok(())
}

/// Check that `frame` contains a left-to-right luminance gradient:
/// monotonically non-decreasing along the center row, with a
/// significant overall rise.
pub fn validate_gradient(frame: &Frame, format: &Format) -> ValidationResult {
    let center_y = format.height / 2;
    let sample_step = 10usize;

    let mut first = None;
    let mut prev: Option<f32> = None;
    let mut last = None;

    for x in (0..format.width).step_by(sample_step) {
        let (r, g, b) = frame.pixel_at(x, center_y, format.width).ok_or_else(|| {
            ValidationError(format!("no pixel at ({x}, {center_y})"))
        })?;

        // Rec. 601 luma.
        let luminance = 0.114f32.mul_add(
            f32::from(b),
            0.587f32.mul_add(f32::from(g), 0.299 * f32::from(r)),
        );

        if first.is_none() {
            first = Some(luminance);
        }
        if let Some(prev) = prev {
            // Allow small decreases due to rounding.
            if luminance < prev - 1.0 {
                return Err(ValidationError(format!(
                    "gradient not monotonic at x={x}: {luminance} < {prev}"
                )));
            }
        }
        prev = Some(luminance);
        last = Some(luminance);
    }

    match (first, last) {
        (Some(first), Some(last)) if last - first >= 50.0 => Ok(()),
        (Some(first), Some(last)) => Err(ValidationError(format!(
            "luminance rise too small for a gradient: {}",
            last - first
        ))),
        _ => Err(ValidationError("frame too narrow to sample".to_owned())),
    }
}

/// Check that frame sequence numbers increment by 1 with no gaps.
pub fn validate_frame_sequence(frames: &[Frame]) -> ValidationResult {
    let mut sequences = frames.iter().map(|frame| frame.metadata.sequence);
    let Some(mut prev) = sequences.next() else {
        return Err(ValidationError(
            "cannot validate an empty frame sequence".to_owned(),
        ));
    };

    for (offset, sequence) in sequences.enumerate() {
        if sequence != prev + 1 {
            return Err(ValidationError(format!(
                "sequence gap at index {}: expected {}, got {sequence}",
                offset + 1,
                prev + 1
            )));
        }
        prev = sequence;
    }

    Ok(())
}

/// Check that a photo payload is plausible for `format`: non-empty and
/// at least one full frame of data.
pub fn validate_photo_payload(data: &[u8], format: &Format) -> ValidationResult {
    if data.is_empty() {
        return Err(ValidationError("photo payload is empty".to_owned()));
    }
    let expected = format.frame_size() as usize;
    if data.len() < expected {
        return Err(ValidationError(format!(
            "photo payload too small: {} < {expected}",
            data.len()
        )));
    }
    Ok(())
}

fn colors_match(actual: (u8, u8, u8), expected: (u8, u8, u8), tolerance: u32) -> bool {
    let channels = [
        (actual.0, expected.0),
        (actual.1, expected.1),
        (actual.2, expected.2),
    ];
    channels
        .iter()
        .all(|&(a, e)| u32::from(a).abs_diff(u32::from(e)) <= tolerance)
}
