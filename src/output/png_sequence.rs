use super::{fit_to, OutputSink};
use anyhow::{Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};

/// Writes every frame as `frame_NNNNNN.png` into a directory
pub struct PngSequenceOutput {
    dir: PathBuf,
    /// Fixed output size; `None` keeps each frame's own size
    size: Option<(u32, u32)>,
    last_size: (u32, u32),
    written: u64,
}

impl PngSequenceOutput {
    pub fn new<P: AsRef<Path>>(dir: P, size: Option<(u32, u32)>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

        tracing::info!("Writing PNG frames to {}", dir.display());

        Ok(Self {
            dir,
            size,
            last_size: size.unwrap_or((0, 0)),
            written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }
}

impl OutputSink for PngSequenceOutput {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        let (width, height) = self.size.unwrap_or(frame.dimensions());
        let frame = fit_to(frame, width, height);

        let path = self.dir.join(format!("frame_{:06}.png", self.written));
        frame
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        self.last_size = (width, height);
        self.written += 1;
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        self.last_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn frames_are_numbered_and_resized() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("out");
        let mut sink = PngSequenceOutput::new(&out_dir, Some((4, 2))).unwrap();

        let frame = RgbImage::from_pixel(8, 4, Rgb([0, 128, 255]));
        sink.write_frame(&frame).unwrap();
        sink.write_frame(&frame).unwrap();

        assert_eq!(sink.frames_written(), 2);
        let second = image::open(out_dir.join("frame_000001.png")).unwrap().to_rgb8();
        assert_eq!(second.dimensions(), (4, 2));
        assert_eq!(sink.resolution(), (4, 2));
    }

    #[test]
    fn native_size_is_kept_without_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = PngSequenceOutput::new(dir.path(), None).unwrap();

        sink.write_frame(&RgbImage::new(3, 5)).unwrap();

        let first = image::open(dir.path().join("frame_000000.png")).unwrap();
        assert_eq!((first.width(), first.height()), (3, 5));
        assert_eq!(sink.resolution(), (3, 5));
    }
}
