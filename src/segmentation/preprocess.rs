use image::{imageops, RgbImage};
use ndarray::Array4;

/// Preprocessor for converting RGB frames to model input tensors
#[derive(Clone, Copy, Debug, Default)]
pub struct Preprocessor {
    /// Resize target; `None` keeps the frame's own resolution
    target: Option<(u32, u32)>,
}

impl Preprocessor {
    pub fn new(target: Option<(u32, u32)>) -> Self {
        Self { target }
    }

    /// Dimensions the tensor will have for a frame of the given size
    pub fn output_size(&self, frame_size: (u32, u32)) -> (u32, u32) {
        self.target.unwrap_or(frame_size)
    }

    /// Preprocess an RGB image into a normalized NCHW tensor
    ///
    /// Steps:
    /// 1. Resize to the target dimensions, if any
    /// 2. Convert to float and normalize to [0, 1]
    /// 3. Transpose from HWC to NCHW format
    ///
    /// Returns: Array4<f32> with shape [1, 3, height, width]
    pub fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized;
        let source = match self.target {
            Some((width, height)) if image.dimensions() != (width, height) => {
                resized = imageops::resize(image, width, height, imageops::FilterType::Lanczos3);
                &resized
            }
            _ => image,
        };

        let (width, height) = source.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
        for (x, y, pixel) in source.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                tensor[[0, c, y, x]] = pixel[c] as f32 / 255.0;
            }
        }

        tensor
    }
}
