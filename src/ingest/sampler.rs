//! Fixed-interval frame sampling.

use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::frame::SampledFrame;

/// Frame rate assumed when a source does not report a usable one.
pub const FALLBACK_FPS: f64 = 25.0;

/// Sequential decoder interface the sampler reads from.
pub trait FrameStream {
    /// Native frame rate as reported by the container, if any.
    fn native_fps(&self) -> Option<f64>;

    /// Decode the next frame; `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;

    /// Advance past one frame without keeping it. Returns `false` at the end.
    fn skip_frame(&mut self) -> Result<bool> {
        Ok(self.next_frame()?.is_some())
    }
}

/// Usable frame rate for a stream: the native one if it is positive and finite.
pub fn effective_fps(native: Option<f64>) -> f64 {
    match native {
        Some(fps) if fps.is_finite() && fps > 0.0 => fps,
        _ => FALLBACK_FPS,
    }
}

/// Source frames between two samples.
pub fn frame_step(fps: f64, interval_sec: f64) -> u64 {
    let step = (fps * interval_sec).round();
    if step.is_finite() && step >= 1.0 {
        step as u64
    } else {
        1
    }
}

/// Take one frame every `interval_sec` seconds of source time, up to
/// `max_frames` samples.
pub fn sample<S: FrameStream + ?Sized>(
    stream: &mut S,
    interval_sec: f64,
    max_frames: usize,
) -> Result<Vec<SampledFrame>> {
    if !interval_sec.is_finite() || interval_sec <= 0.0 {
        return Err(anyhow!(
            "sampling interval must be positive, got {}",
            interval_sec
        ));
    }

    let fps = effective_fps(stream.native_fps());
    let step = frame_step(fps, interval_sec);
    log::debug!(
        "sampling every {} source frames ({:.3} fps, interval {}s, max {})",
        step,
        fps,
        interval_sec,
        max_frames
    );

    let mut samples = Vec::new();
    let mut position: u64 = 0;
    while samples.len() < max_frames {
        if position % step == 0 {
            let Some(image) = stream.next_frame()? else {
                break;
            };
            let frame_index = samples.len();
            samples.push(SampledFrame::new(image, frame_index, position as f64 / fps));
        } else if !stream.skip_frame()? {
            break;
        }
        position += 1;
    }

    Ok(samples)
}
