use super::postprocess::{self, MatteError};
use super::preprocess::Preprocessor;
use super::types::{MattingBackend, RecurrentState, SegmentationConfig, SegmentationMode};
use anyhow::Result;
use image::{RgbImage, RgbaImage};

/// A running matting session
///
/// Owns the inference backend together with the recurrent state it feeds
/// back from frame to frame and the downsample ratio that state belongs to.
pub struct MattingSession<B> {
    backend: B,
    preprocessor: Preprocessor,
    state: RecurrentState,
    ratio: Option<f32>,
    generation: u64,
}

impl<B: MattingBackend> MattingSession<B> {
    pub fn new(backend: B, preprocessor: Preprocessor) -> Self {
        Self {
            backend,
            preprocessor,
            state: RecurrentState::zeros(),
            ratio: None,
            generation: 0,
        }
    }

    /// Current recurrent state, the baseline until the first successful predict
    pub fn state(&self) -> &RecurrentState {
        &self.state
    }

    /// Downsample ratio the current state was produced under
    pub fn ratio(&self) -> Option<f32> {
        self.ratio
    }

    /// Number of inference calls since the last reset
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn reset_state(&mut self) {
        tracing::debug!("Resetting RVM hidden states");
        self.state = RecurrentState::zeros();
        self.generation = 0;
    }

    /// Run one forward pass and render the result according to `config.mode`
    ///
    /// The stored recurrent state is replaced by the model's successor state.
    /// It goes back to the zero baseline first if the requested ratio differs
    /// from the one the state was produced under.
    pub fn predict(&mut self, frame: &RgbImage, config: &SegmentationConfig) -> Result<RgbaImage> {
        let _span = tracing::debug_span!("rvm_predict").entered();

        let (width, height) = self.preprocessor.output_size(frame.dimensions());
        let ratio = config.ratio.resolve(width, height);
        if self.ratio != Some(ratio) {
            if let Some(previous) = self.ratio {
                tracing::debug!("Downsample ratio changed from {} to {}", previous, ratio);
            }
            self.reset_state();
            self.ratio = Some(ratio);
        }

        let src = self.preprocessor.preprocess(frame);
        let previous = std::mem::take(&mut self.state);
        let outputs = match self.backend.infer(src, previous, ratio) {
            Ok(outputs) => outputs,
            Err(err) => {
                // the previous generation was consumed by the failed call
                self.reset_state();
                return Err(err);
            }
        };

        let rgba = match config.mode {
            SegmentationMode::Default => {
                postprocess::rgba_from_outputs(Some(outputs.fgr.view()), Some(outputs.pha.view()))
            }
            SegmentationMode::Alpha => postprocess::rgba_from_outputs(None, Some(outputs.pha.view())),
            SegmentationMode::Foreground => {
                postprocess::rgba_from_outputs(Some(outputs.fgr.view()), None)
            }
            SegmentationMode::State => outputs
                .state
                .get(config.state_index)
                .ok_or(MatteError::StateIndex(config.state_index))
                .and_then(|r| postprocess::visualize_state(r.view())),
        };

        self.state = outputs.state;
        self.generation += 1;

        Ok(rgba?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::types::{DownsampleRatio, ModelOutputs};
    use anyhow::bail;
    use image::Rgb;
    use ndarray::Array4;

    /// Echoes a constant matte and numbers each state generation
    #[derive(Default)]
    struct FakeBackend {
        calls: Vec<(RecurrentState, f32)>,
        fail: bool,
    }

    impl MattingBackend for FakeBackend {
        fn infer(
            &mut self,
            src: Array4<f32>,
            state: RecurrentState,
            downsample_ratio: f32,
        ) -> Result<ModelOutputs> {
            if self.fail {
                bail!("inference failed");
            }
            let (h, w) = (src.shape()[2], src.shape()[3]);
            self.calls.push((state, downsample_ratio));
            let marker = self.calls.len() as f32 / 10.0;
            Ok(ModelOutputs {
                fgr: src,
                pha: Array4::from_elem((1, 1, h, w), 0.5),
                state: RecurrentState {
                    r1: Array4::from_elem((1, 4, h, w), marker),
                    r2: Array4::from_elem((1, 4, h, w), marker),
                    r3: Array4::from_elem((1, 4, h, w), marker),
                    r4: Array4::from_elem((1, 4, h, w), -marker),
                },
            })
        }
    }

    fn frame() -> RgbImage {
        RgbImage::from_pixel(4, 2, Rgb([255, 0, 255]))
    }

    fn config(ratio: f32, mode: SegmentationMode) -> SegmentationConfig {
        SegmentationConfig {
            ratio: DownsampleRatio::Fixed(ratio),
            mode,
            ..SegmentationConfig::default()
        }
    }

    #[test]
    fn successor_state_replaces_previous_generation() {
        let mut session = MattingSession::new(FakeBackend::default(), Preprocessor::default());
        let cfg = config(0.5, SegmentationMode::Default);

        session.predict(&frame(), &cfg).unwrap();
        session.predict(&frame(), &cfg).unwrap();

        assert_eq!(session.generation(), 2);
        assert_eq!(session.state().r1[[0, 0, 0, 0]], 0.2);
        assert_eq!(session.state().r4[[0, 0, 0, 0]], -0.2);

        let calls = &session.backend.calls;
        assert!(calls[0].0.is_baseline());
        assert_eq!(calls[1].0.r1[[0, 0, 0, 0]], 0.1);
        assert_eq!(calls[1].1, 0.5);
    }

    #[test]
    fn ratio_change_feeds_baseline_state() {
        let mut session = MattingSession::new(FakeBackend::default(), Preprocessor::default());

        session.predict(&frame(), &config(0.5, SegmentationMode::Default)).unwrap();
        session.predict(&frame(), &config(0.5, SegmentationMode::Default)).unwrap();
        session.predict(&frame(), &config(0.25, SegmentationMode::Default)).unwrap();

        let calls = &session.backend.calls;
        assert!(!calls[1].0.is_baseline());
        assert!(calls[2].0.is_baseline());
        assert_eq!(calls[2].1, 0.25);
        assert_eq!(session.ratio(), Some(0.25));
        assert_eq!(session.generation(), 1);
    }

    #[test]
    fn modes_select_channels() {
        let mut session = MattingSession::new(FakeBackend::default(), Preprocessor::default());

        let rgba = session.predict(&frame(), &config(0.5, SegmentationMode::Default)).unwrap();
        assert_eq!(rgba.get_pixel(0, 0).0, [255, 0, 255, 127]);

        let rgba = session.predict(&frame(), &config(0.5, SegmentationMode::Alpha)).unwrap();
        assert_eq!(rgba.get_pixel(0, 0).0, [255, 255, 255, 127]);

        let rgba = session.predict(&frame(), &config(0.5, SegmentationMode::Foreground)).unwrap();
        assert_eq!(rgba.get_pixel(0, 0).0, [255, 0, 255, 255]);

        let rgba = session.predict(&frame(), &config(0.5, SegmentationMode::State)).unwrap();
        // 4 channels x 2 rows split into 4 bands of 2 rows, each 4 wide
        assert_eq!(rgba.dimensions(), (16, 2));
        // (0.4 + 1) * 127.5 = 178.5
        assert_eq!(rgba.get_pixel(0, 0).0, [178, 178, 178, 255]);
    }

    #[test]
    fn state_mode_rejects_bad_index() {
        let mut session = MattingSession::new(FakeBackend::default(), Preprocessor::default());
        let mut cfg = config(0.5, SegmentationMode::State);
        cfg.state_index = 7;

        let err = session.predict(&frame(), &cfg).unwrap_err();
        assert_eq!(
            err.downcast_ref::<MatteError>(),
            Some(&MatteError::StateIndex(7))
        );
        // the successor state is still kept
        assert_eq!(session.generation(), 1);
    }

    #[test]
    fn failed_inference_leaves_baseline() {
        let mut session = MattingSession::new(FakeBackend::default(), Preprocessor::default());
        let cfg = config(0.5, SegmentationMode::Default);

        session.predict(&frame(), &cfg).unwrap();
        assert_eq!(session.generation(), 1);

        session.backend.fail = true;
        assert!(session.predict(&frame(), &cfg).is_err());
        assert!(session.state().is_baseline());
        assert_eq!(session.generation(), 0);
        assert_eq!(session.ratio(), Some(0.5));
    }

    #[test]
    fn auto_ratio_resets_when_frame_size_changes() {
        let mut session = MattingSession::new(FakeBackend::default(), Preprocessor::default());
        let cfg = SegmentationConfig {
            ratio: DownsampleRatio::Auto,
            ..SegmentationConfig::default()
        };

        session.predict(&RgbImage::new(1024, 768), &cfg).unwrap();
        session.predict(&RgbImage::new(1024, 768), &cfg).unwrap();
        session.predict(&RgbImage::new(2048, 1080), &cfg).unwrap();

        let calls = &session.backend.calls;
        assert_eq!(calls[0].1, 0.5);
        assert!(!calls[1].0.is_baseline());
        assert_eq!(calls[1].1, 0.5);
        assert!(calls[2].0.is_baseline());
        assert_eq!(calls[2].1, 0.25);
        assert_eq!(session.generation(), 1);
    }
}
