mod image_dir;
mod webcam;

pub use image_dir::ImageDirSource;
pub use webcam::WebcamCapture;

use anyhow::Result;
use clap::ValueEnum;
use image::{imageops, RgbImage};
use thiserror::Error;

/// Trait for camera capture sources
pub trait CaptureSource {
    /// Capture a single frame, `None` once the feed has ended
    fn capture_frame(&mut self) -> Result<Option<RgbImage>>;

    /// Get the resolution of captured frames
    fn resolution(&self) -> (u32, u32);
}

impl<S: CaptureSource + ?Sized> CaptureSource for Box<S> {
    fn capture_frame(&mut self) -> Result<Option<RgbImage>> {
        (**self).capture_frame()
    }

    fn resolution(&self) -> (u32, u32) {
        (**self).resolution()
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no video devices available")]
    NoDevices,
    #[error("camera device {0} not found")]
    DeviceNotFound(u32),
    #[error("failed to open camera: {0}")]
    Open(#[source] nokhwa::NokhwaError),
    #[error("no image files in {0}")]
    EmptyDirectory(String),
    #[error("failed to read frame directory {path}")]
    ReadDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read frame {path}")]
    UnreadableFrame {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

/// Which way the camera should face
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Facing {
    /// Towards the user
    #[default]
    Front,
    /// Away from the user
    Back,
}

#[derive(Clone, Debug, Default)]
pub struct WebcamConfig {
    pub debug: bool,
    pub facing: Facing,
    /// Crop to the target aspect ratio and scale, instead of passing native frames
    pub crop: bool,
    /// Target width, 0 for the device's native width
    pub width: u32,
    /// Target height, 0 for the device's native height
    pub height: u32,
    /// Explicit device index, overrides facing
    pub device: Option<u32>,
}

impl WebcamConfig {
    pub fn target(&self) -> Option<(u32, u32)> {
        (self.width > 0 && self.height > 0).then_some((self.width, self.height))
    }
}

const BACK_LABELS: [&str; 3] = ["back", "rear", "environment"];

/// Pick a device position from the available labels
///
/// Returns `None` only when `labels` is empty.
pub fn select_device(labels: &[String], facing: Facing) -> Option<usize> {
    let is_back = |label: &String| {
        let label = label.to_lowercase();
        BACK_LABELS.iter().any(|k| label.contains(k))
    };
    let preferred = match facing {
        Facing::Back => labels.iter().position(is_back),
        Facing::Front => labels.iter().position(|l| !is_back(l)),
    };
    preferred.or(if labels.is_empty() { None } else { Some(0) })
}

/// Centre-crop to the target aspect ratio, then scale to the target size
pub fn crop_and_scale(frame: &RgbImage, width: u32, height: u32) -> RgbImage {
    let (src_w, src_h) = frame.dimensions();
    if (src_w, src_h) == (width, height) {
        return frame.clone();
    }

    // compare aspect ratios without floating point: src_w/src_h vs width/height
    let (crop_w, crop_h) = if src_w as u64 * height as u64 > width as u64 * src_h as u64 {
        ((src_h as u64 * width as u64 / height as u64) as u32, src_h)
    } else {
        (src_w, (src_w as u64 * height as u64 / width as u64) as u32)
    };
    let x = (src_w - crop_w) / 2;
    let y = (src_h - crop_h) / 2;

    let cropped = imageops::crop_imm(frame, x, y, crop_w, crop_h).to_image();
    imageops::resize(&cropped, width, height, imageops::FilterType::Triangle)
}
