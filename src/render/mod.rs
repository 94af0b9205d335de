mod compositor;

pub use compositor::{composite, CompositeOp};

use image::{Rgb, RgbImage, RgbaImage};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid background '{0}', expected frame, black, white, green or #rrggbb")]
pub struct ParseBackdropError(String);

/// What the matte is drawn over
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backdrop {
    /// The captured camera frame
    Frame,
    Color(Rgb<u8>),
}

impl Default for Backdrop {
    fn default() -> Self {
        Backdrop::Color(Rgb([0, 0, 0]))
    }
}

impl std::str::FromStr for Backdrop {
    type Err = ParseBackdropError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let color = |r, g, b| Ok(Backdrop::Color(Rgb([r, g, b])));
        match s.to_ascii_lowercase().as_str() {
            "frame" => Ok(Backdrop::Frame),
            "black" => color(0, 0, 0),
            "white" => color(255, 255, 255),
            "green" => color(120, 255, 155),
            hex => {
                let digits = hex
                    .strip_prefix('#')
                    .filter(|d| d.len() == 6 && d.is_ascii())
                    .ok_or_else(|| ParseBackdropError(s.to_string()))?;
                let channel = |i: usize| {
                    u8::from_str_radix(&digits[i..i + 2], 16)
                        .map_err(|_| ParseBackdropError(s.to_string()))
                };
                color(channel(0)?, channel(2)?, channel(4)?)
            }
        }
    }
}

/// Drawing surface the rendered matte lands on before output
#[derive(Clone, Copy, Debug, Default)]
pub struct Canvas {
    pub backdrop: Backdrop,
    pub op: CompositeOp,
}

impl Canvas {
    pub fn new(backdrop: Backdrop, op: CompositeOp) -> Self {
        Self { backdrop, op }
    }

    /// Fill the backdrop, compose `rgba` onto it and flatten to opaque RGB over black
    ///
    /// A `Frame` backdrop falls back to black when `rgba` isn't at the frame's size.
    pub fn draw(&self, frame: &RgbImage, rgba: &RgbaImage) -> RgbImage {
        let (width, height) = rgba.dimensions();
        let mut surface = match self.backdrop {
            Backdrop::Frame if frame.dimensions() == (width, height) => {
                RgbaImage::from_fn(width, height, |x, y| {
                    let [r, g, b] = frame.get_pixel(x, y).0;
                    image::Rgba([r, g, b, 255])
                })
            }
            // state tiles never match the frame geometry
            Backdrop::Frame => RgbaImage::from_pixel(width, height, image::Rgba([0, 0, 0, 255])),
            Backdrop::Color(Rgb([r, g, b])) => {
                RgbaImage::from_pixel(width, height, image::Rgba([r, g, b, 255]))
            }
        };

        composite(&mut surface, rgba, self.op);
        flatten(&surface)
    }
}

/// Drop alpha by composing over black
fn flatten(surface: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(surface.width(), surface.height(), |x, y| {
        let [r, g, b, a] = surface.get_pixel(x, y).0;
        let scale = |c: u8| ((c as u16 * a as u16 + 127) / 255) as u8;
        Rgb([scale(r), scale(g), scale(b)])
    })
}
