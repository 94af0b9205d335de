mod loopback;
mod png_sequence;

pub use loopback::V4L2Output;
pub use png_sequence::PngSequenceOutput;

use anyhow::Result;
use image::{imageops, RgbImage};
use std::borrow::Cow;

/// Trait for output destinations
pub trait OutputSink {
    /// Write a frame to the output
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// Get the expected output resolution
    fn resolution(&self) -> (u32, u32);
}

impl<S: OutputSink + ?Sized> OutputSink for Box<S> {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        (**self).write_frame(frame)
    }

    fn resolution(&self) -> (u32, u32) {
        (**self).resolution()
    }
}

/// Resize to the sink's resolution only when the frame doesn't already match
fn fit_to(frame: &RgbImage, width: u32, height: u32) -> Cow<'_, RgbImage> {
    if frame.dimensions() == (width, height) {
        Cow::Borrowed(frame)
    } else {
        Cow::Owned(imageops::resize(
            frame,
            width,
            height,
            imageops::FilterType::Lanczos3,
        ))
    }
}
