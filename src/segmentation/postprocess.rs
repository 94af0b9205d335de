//! Conversion of raw model tensors into drawable RGBA buffers.

use image::{imageops, Rgba, RgbaImage};
use ndarray::ArrayView4;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatteError {
    #[error("either a foreground or an alpha tensor is required")]
    NothingToRender,
    #[error("expected {expected} channel(s) in {name} tensor, got shape {shape:?}")]
    ChannelCount {
        name: &'static str,
        expected: usize,
        shape: Vec<usize>,
    },
    #[error("foreground is {fgr:?} but alpha is {pha:?}")]
    SizeMismatch { fgr: (usize, usize), pha: (usize, usize) },
    #[error("state tensor {shape:?} cannot be split into 4 equal bands")]
    UnevenSplit { shape: Vec<usize> },
    #[error("recurrent state index {0} is out of range 1..=4")]
    StateIndex(usize),
}

/// Scale a 0..1 model value to a byte, truncating like an int32 cast
fn to_byte(value: f32) -> u8 {
    ((value * 255.0).trunc()).clamp(0.0, 255.0) as u8
}

fn check_channels(
    tensor: &ArrayView4<f32>,
    name: &'static str,
    expected: usize,
) -> Result<(usize, usize), MatteError> {
    let shape = tensor.shape();
    if shape[0] != 1 || shape[1] != expected {
        return Err(MatteError::ChannelCount {
            name,
            expected,
            shape: shape.to_vec(),
        });
    }
    Ok((shape[2], shape[3]))
}

/// Combine foreground `[1,3,H,W]` and alpha `[1,1,H,W]` into an RGBA image.
///
/// A missing foreground renders white, a missing alpha renders fully opaque.
pub fn rgba_from_outputs(
    fgr: Option<ArrayView4<f32>>,
    pha: Option<ArrayView4<f32>>,
) -> Result<RgbaImage, MatteError> {
    let _span = tracing::debug_span!("postprocess").entered();

    let fgr_size = fgr
        .as_ref()
        .map(|t| check_channels(t, "foreground", 3))
        .transpose()?;
    let pha_size = pha
        .as_ref()
        .map(|t| check_channels(t, "alpha", 1))
        .transpose()?;

    let (height, width) = match (fgr_size, pha_size) {
        (Some(f), Some(p)) if f != p => return Err(MatteError::SizeMismatch { fgr: f, pha: p }),
        (Some(size), _) | (None, Some(size)) => size,
        (None, None) => return Err(MatteError::NothingToRender),
    };

    Ok(RgbaImage::from_fn(width as u32, height as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let [r, g, b] = match &fgr {
            Some(f) => [
                to_byte(f[[0, 0, y, x]]),
                to_byte(f[[0, 1, y, x]]),
                to_byte(f[[0, 2, y, x]]),
            ],
            None => [255; 3],
        };
        let a = match &pha {
            Some(p) => to_byte(p[[0, 0, y, x]]),
            None => 255,
        };
        Rgba([r, g, b, a])
    }))
}

/// Render a recurrent state tensor `[1,C,H,W]` as a grayscale tile.
///
/// Channel planes are stacked top to bottom into a `C*H x W` column, the
/// column is cut into four equal bands and the bands are laid side by side.
/// Values in -1..1 map to 0..255.
pub fn visualize_state(state: ArrayView4<f32>) -> Result<RgbaImage, MatteError> {
    let shape = state.shape();
    let (channels, height, width) = (shape[1], shape[2], shape[3]);
    let rows = channels * height;
    if shape[0] != 1 || rows == 0 || rows % 4 != 0 {
        return Err(MatteError::UnevenSplit {
            shape: shape.to_vec(),
        });
    }
    let band = rows / 4;

    Ok(RgbaImage::from_fn((width * 4) as u32, band as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let row = (x / width) * band + y;
        let value = state[[0, row / height, row % height, x % width]];
        let v = ((value + 1.0) * 127.5).trunc().clamp(0.0, 255.0) as u8;
        Rgba([v, v, v, 255])
    }))
}

/// Scale an RGBA buffer to the given size, returning it untouched if it already fits
pub fn resize_rgba(image: RgbaImage, width: u32, height: u32) -> RgbaImage {
    if image.dimensions() == (width, height) {
        image
    } else {
        imageops::resize(&image, width, height, imageops::FilterType::Triangle)
    }
}
