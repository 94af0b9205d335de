use super::{CaptureError, CaptureSource};
use anyhow::{Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};

const EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Pre-recorded feed read from the image files of a directory, in name order
pub struct ImageDirSource {
    files: Vec<PathBuf>,
    next: usize,
    looping: bool,
    resolution: (u32, u32),
}

impl ImageDirSource {
    pub fn new<P: AsRef<Path>>(dir: P, looping: bool) -> Result<Self, CaptureError> {
        let dir = dir.as_ref();
        let read_err = |source| CaptureError::ReadDirectory {
            path: dir.display().to_string(),
            source,
        };

        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(read_err)? {
            let path = entry.map_err(read_err)?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if is_image {
                files.push(path);
            }
        }
        files.sort();

        let first = files
            .first()
            .ok_or_else(|| CaptureError::EmptyDirectory(dir.display().to_string()))?;
        let resolution =
            image::image_dimensions(first).map_err(|source| CaptureError::UnreadableFrame {
                path: first.display().to_string(),
                source,
            })?;

        tracing::info!(
            "Reading {} frames from {} ({}x{})",
            files.len(),
            dir.display(),
            resolution.0,
            resolution.1
        );

        Ok(Self {
            files,
            next: 0,
            looping,
            resolution,
        })
    }
}

impl CaptureSource for ImageDirSource {
    fn capture_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.next == self.files.len() {
            if !self.looping {
                return Ok(None);
            }
            self.next = 0;
        }

        let path = &self.files[self.next];
        self.next += 1;
        let frame = image::open(path)
            .with_context(|| format!("Failed to read frame {}", path.display()))?
            .to_rgb8();
        self.resolution = frame.dimensions();

        Ok(Some(frame))
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn write_frames(dir: &Path, names: &[&str]) {
        for (i, name) in names.iter().enumerate() {
            RgbImage::from_pixel(3, 2, Rgb([i as u8, 0, 0]))
                .save(dir.join(name))
                .unwrap();
        }
    }

    #[test]
    fn frames_come_in_name_order_then_end() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), &["b.png", "a.png"]);
        std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let mut source = ImageDirSource::new(dir.path(), false).unwrap();

        assert_eq!(source.resolution(), (3, 2));
        let first = source.capture_frame().unwrap().unwrap();
        let second = source.capture_frame().unwrap().unwrap();
        // a.png was written second
        assert_eq!(first.get_pixel(0, 0)[0], 1);
        assert_eq!(second.get_pixel(0, 0)[0], 0);
        assert!(source.capture_frame().unwrap().is_none());
    }

    #[test]
    fn looping_restarts() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), &["only.png"]);

        let mut source = ImageDirSource::new(dir.path(), true).unwrap();

        for _ in 0..3 {
            assert!(source.capture_frame().unwrap().is_some());
        }
    }

    #[test]
    fn corrupt_first_frame_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("0001.png"), "not a png").unwrap();
        write_frames(dir.path(), &["0002.png"]);

        match ImageDirSource::new(dir.path(), false) {
            Err(CaptureError::UnreadableFrame { path, .. }) => assert!(path.ends_with("0001.png")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("corrupt frame was accepted"),
        }
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ImageDirSource::new(dir.path(), false),
            Err(CaptureError::EmptyDirectory(_))
        ));
    }
}
