use anyhow::Result;
use clap::ValueEnum;
use ndarray::Array4;
use std::path::PathBuf;

/// What `MattingSession::predict` renders from the model outputs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum SegmentationMode {
    /// Foreground RGB with the alpha matte as the alpha channel
    #[default]
    Default,
    /// Alpha matte only, on white
    Alpha,
    /// Foreground estimate only, fully opaque
    Foreground,
    /// One recurrent state tensor, tiled into a grayscale image
    State,
}

/// Downsample ratio handed to the model alongside each frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DownsampleRatio {
    Fixed(f32),
    /// Derived from the frame size, see [`auto_downsample_ratio`]
    Auto,
}

impl DownsampleRatio {
    pub fn resolve(self, width: u32, height: u32) -> f32 {
        match self {
            DownsampleRatio::Fixed(ratio) => ratio,
            DownsampleRatio::Auto => auto_downsample_ratio(width, height),
        }
    }
}

impl std::str::FromStr for DownsampleRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(DownsampleRatio::Auto);
        }
        let ratio: f32 = s
            .parse()
            .map_err(|_| format!("invalid downsample ratio '{s}'"))?;
        if !ratio.is_finite() {
            Err(format!("downsample ratio {ratio} must be finite"))
        } else if ratio <= 0.0 {
            Ok(DownsampleRatio::Auto)
        } else if ratio > 1.0 {
            Err(format!("downsample ratio {ratio} must be at most 1"))
        } else {
            Ok(DownsampleRatio::Fixed(ratio))
        }
    }
}

impl std::fmt::Display for DownsampleRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownsampleRatio::Fixed(ratio) => write!(f, "{ratio}"),
            DownsampleRatio::Auto => f.write_str("auto"),
        }
    }
}

/// Pick a ratio that keeps the recurrent computation near 512px on the long side
pub fn auto_downsample_ratio(width: u32, height: u32) -> f32 {
    let longest = width.max(height).max(1) as f32;
    (512.0 / longest).min(1.0)
}

/// RVM segmentation configuration, mutable mid-session through control commands
#[derive(Clone, Debug)]
pub struct SegmentationConfig {
    pub model_path: Option<PathBuf>,
    pub ratio: DownsampleRatio,
    pub mode: SegmentationMode,
    /// Which of r1..r4 to show in `State` mode (1-based)
    pub state_index: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            ratio: DownsampleRatio::Fixed(0.5),
            mode: SegmentationMode::Default,
            state_index: 1,
        }
    }
}

/// Recurrent hidden states carried from one inference call to the next
#[derive(Clone, Debug, PartialEq)]
pub struct RecurrentState {
    pub r1: Array4<f32>,
    pub r2: Array4<f32>,
    pub r3: Array4<f32>,
    pub r4: Array4<f32>,
}

impl RecurrentState {
    /// Zero baseline meaning "no history"; RVM accepts 1x1x1x1 zeros here
    pub fn zeros() -> Self {
        Self {
            r1: Array4::zeros((1, 1, 1, 1)),
            r2: Array4::zeros((1, 1, 1, 1)),
            r3: Array4::zeros((1, 1, 1, 1)),
            r4: Array4::zeros((1, 1, 1, 1)),
        }
    }

    pub fn is_baseline(&self) -> bool {
        [&self.r1, &self.r2, &self.r3, &self.r4]
            .iter()
            .all(|r| r.shape() == [1, 1, 1, 1] && r.iter().all(|v| *v == 0.0))
    }

    /// 1-based access, matching the r1..r4 naming
    pub fn get(&self, index: usize) -> Option<&Array4<f32>> {
        match index {
            1 => Some(&self.r1),
            2 => Some(&self.r2),
            3 => Some(&self.r3),
            4 => Some(&self.r4),
            _ => None,
        }
    }
}

impl Default for RecurrentState {
    fn default() -> Self {
        Self::zeros()
    }
}

/// Raw outputs of one forward pass
#[derive(Debug)]
pub struct ModelOutputs {
    /// Foreground estimate, [1, 3, H, W] in 0..1
    pub fgr: Array4<f32>,
    /// Alpha matte, [1, 1, H, W] in 0..1
    pub pha: Array4<f32>,
    pub state: RecurrentState,
}

/// Inference engine seam
///
/// Implementations run one forward pass of a recurrent matting graph. The
/// previous state is taken by value so it is released before its successor
/// is stored.
pub trait MattingBackend {
    fn infer(
        &mut self,
        src: Array4<f32>,
        state: RecurrentState,
        downsample_ratio: f32,
    ) -> Result<ModelOutputs>;
}

impl<B: MattingBackend + ?Sized> MattingBackend for Box<B> {
    fn infer(
        &mut self,
        src: Array4<f32>,
        state: RecurrentState,
        downsample_ratio: f32,
    ) -> Result<ModelOutputs> {
        (**self).infer(src, state, downsample_ratio)
    }
}
