use super::{fit_to, OutputSink};
use anyhow::{Context, Result};
use image::RgbImage;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, Format, FourCC};

pub struct V4L2Output {
    file: File,
    width: u32,
    height: u32,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        // Announce the frame layout before any writer opens the device
        let device = Device::with_path(path)
            .with_context(|| format!("Failed to open v4l2 device at {}", path.display()))?;
        let format = Format::new(width, height, FourCC::new(b"YUYV"));
        let applied = Output::set_format(&device, &format)
            .context("Failed to set YUYV output format")?;
        if (applied.width, applied.height) != (width, height) {
            tracing::warn!(
                "Device accepted {}x{} instead of {}x{}",
                applied.width,
                applied.height,
                width,
                height
            );
        }

        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        tracing::info!("v4l2loopback device opened successfully");

        Ok(Self {
            file,
            width: applied.width,
            height: applied.height,
        })
    }
}

/// Full-range BT.601 luma in 8.8 fixed point
fn luma([r, g, b]: [u8; 3]) -> u8 {
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32 + 128) >> 8).min(255) as u8
}

/// Cb and Cr of the mean colour of a pixel pair
fn pair_chroma(a: [u8; 3], b: [u8; 3]) -> (u8, u8) {
    let [r, g, bl] = [0, 1, 2].map(|i| a[i] as i32 + b[i] as i32);
    // channel sums are twice the mean, hence the 9-bit shift
    let cb = 128 + ((-43 * r - 85 * g + 128 * bl + 256) >> 9);
    let cr = 128 + ((128 * r - 107 * g - 21 * bl + 256) >> 9);
    (cb.clamp(0, 255) as u8, cr.clamp(0, 255) as u8)
}

/// Convert an RGB frame to packed YUV 4:2:2 (YUYV)
///
/// An odd last column is paired with itself.
pub fn rgb_to_yuyv(rgb_image: &RgbImage) -> Vec<u8> {
    let (width, height) = rgb_image.dimensions();
    let pairs_per_row = width.div_ceil(2) as usize;
    let mut yuyv = Vec::with_capacity(pairs_per_row * height as usize * 4);
    if width == 0 {
        return yuyv;
    }

    for row in rgb_image.as_raw().chunks_exact(width as usize * 3) {
        for pair in row.chunks(6) {
            let left = [pair[0], pair[1], pair[2]];
            let right = match pair {
                [_, _, _, r, g, b] => [*r, *g, *b],
                _ => left,
            };
            let (cb, cr) = pair_chroma(left, right);
            yuyv.extend_from_slice(&[luma(left), cb, luma(right), cr]);
        }
    }

    yuyv
}

impl OutputSink for V4L2Output {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        let frame = fit_to(frame, self.width, self.height);
        let yuyv_data = rgb_to_yuyv(&frame);

        self.file
            .write_all(&yuyv_data)
            .context("Failed to write frame to v4l2loopback device")?;

        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn yuyv_packs_pixel_pairs() {
        let frame = RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });

        let data = rgb_to_yuyv(&frame);

        assert_eq!(data.len(), 4);
        assert!(data[0] >= 254);
        assert_eq!(data[2], 0);
        // neutral chroma for greys
        assert!((127..=128).contains(&data[1]));
        assert!((127..=128).contains(&data[3]));
    }

    #[test]
    fn odd_width_repeats_last_pixel() {
        let frame = RgbImage::from_fn(3, 2, |x, _| {
            if x == 2 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 0])
            }
        });

        let data = rgb_to_yuyv(&frame);

        assert_eq!(data.len(), 2 * 2 * 4);
        // second macropixel of each row holds the red pixel twice
        assert_eq!(data[4], data[6]);
        assert_eq!(data[4], luma([255, 0, 0]));
        assert_eq!(&data[4..8], &data[12..16]);
    }

    #[test]
    fn chroma_follows_pair_mean() {
        let (cb, cr) = pair_chroma([255, 0, 0], [255, 0, 0]);
        assert!(cr > 200 && cb < 128);

        let (cb, cr) = pair_chroma([0, 0, 255], [0, 0, 0]);
        assert_eq!(cr, 128 - 10);
        assert_eq!(cb, 128 + 64);
    }
}
