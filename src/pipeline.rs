use crate::capture::CaptureSource;
use crate::control::ControlCommand;
use crate::output::OutputSink;
use crate::render::Canvas;
use crate::segmentation::{
    resize_rgba, MattingBackend, MattingSession, SegmentationConfig, SegmentationMode,
};
use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use std::time::{Duration, Instant};

/// Playing/paused state of the source feed
#[derive(Clone, Copy, Debug, Default)]
pub struct Playback {
    paused: bool,
    debug: bool,
}

impl Playback {
    pub fn new(debug: bool) -> Self {
        Self {
            paused: false,
            debug,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        if !self.paused && self.debug {
            tracing::debug!("pause");
        }
        self.paused = true;
    }

    pub fn play(&mut self) {
        if self.paused && self.debug {
            tracing::debug!("play");
        }
        self.paused = false;
    }

    pub fn toggle(&mut self) {
        if self.paused {
            self.play();
        } else {
            self.pause();
        }
    }
}

/// Outcome of one loop iteration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    /// Nothing captured or predicted
    Paused,
    Rendered,
    /// The source has no more frames
    Ended,
}

/// Rolling timings, logged every `LOG_INTERVAL` rendered frames
#[derive(Debug, Default)]
struct FrameStats {
    frame_count: u64,
    total_capture_time: Duration,
    total_segment_time: Duration,
    total_output_time: Duration,
}

impl FrameStats {
    const LOG_INTERVAL: u64 = 30;

    fn record(&mut self, capture: Duration, segment: Duration, output: Duration, segmenting: bool) {
        self.total_capture_time += capture;
        self.total_segment_time += segment;
        self.total_output_time += output;
        self.frame_count += 1;

        if self.frame_count % Self::LOG_INTERVAL == 0 {
            self.log(segmenting);
        }
    }

    fn log(&self, segmenting: bool) {
        let frames = self.frame_count as f64;
        let avg_capture_ms = self.total_capture_time.as_secs_f64() * 1000.0 / frames;
        let avg_segment_ms = self.total_segment_time.as_secs_f64() * 1000.0 / frames;
        let avg_output_ms = self.total_output_time.as_secs_f64() * 1000.0 / frames;
        let total_ms = avg_capture_ms + avg_segment_ms + avg_output_ms;
        let actual_fps = if total_ms > 0.0 { 1000.0 / total_ms } else { 0.0 };

        if segmenting {
            tracing::info!(
                "Frame {}: capture={:.1}ms, segment={:.1}ms, output={:.1}ms, total={:.1}ms, fps={:.1}",
                self.frame_count,
                avg_capture_ms,
                avg_segment_ms,
                avg_output_ms,
                total_ms,
                actual_fps
            );
        } else {
            tracing::info!(
                "Frame {}: capture={:.1}ms, output={:.1}ms, total={:.1}ms, fps={:.1}",
                self.frame_count,
                avg_capture_ms,
                avg_output_ms,
                total_ms,
                actual_fps
            );
        }
    }
}

/// Capture → predict → draw → write, one frame at a time
pub struct Pipeline<'a, C, O, B> {
    capture: &'a mut C,
    output: &'a mut O,
    /// `None` runs in passthrough mode
    session: Option<MattingSession<B>>,
    pub config: SegmentationConfig,
    pub canvas: Canvas,
    pub playback: Playback,
    stats: FrameStats,
}

impl<'a, C, O, B> Pipeline<'a, C, O, B>
where
    C: CaptureSource,
    O: OutputSink,
    B: MattingBackend,
{
    pub fn new(
        capture: &'a mut C,
        output: &'a mut O,
        session: Option<MattingSession<B>>,
        config: SegmentationConfig,
        canvas: Canvas,
        playback: Playback,
    ) -> Self {
        Self {
            capture,
            output,
            session,
            config,
            canvas,
            playback,
            stats: FrameStats::default(),
        }
    }

    pub fn frames_rendered(&self) -> u64 {
        self.stats.frame_count
    }

    /// Apply a control command; returns `false` when the loop should stop
    pub fn apply(&mut self, command: ControlCommand) -> bool {
        match command {
            ControlCommand::Toggle => self.playback.toggle(),
            ControlCommand::Pause => self.playback.pause(),
            ControlCommand::Play => self.playback.play(),
            ControlCommand::Mode(mode) => {
                tracing::info!("Mode set to {:?}", mode);
                self.config.mode = mode;
            }
            ControlCommand::Ratio(ratio) => {
                tracing::info!("Downsample ratio set to {}", ratio);
                self.config.ratio = ratio;
            }
            ControlCommand::StateIndex(index) => {
                tracing::info!("Showing recurrent state r{}", index);
                self.config.state_index = index;
            }
            ControlCommand::Composite(op) => {
                tracing::info!("Composite operation set to {:?}", op);
                self.canvas.op = op;
            }
            ControlCommand::Background(backdrop) => {
                tracing::info!("Background set to {:?}", backdrop);
                self.canvas.backdrop = backdrop;
            }
            ControlCommand::Quit => return false,
        }
        true
    }

    /// Run a single iteration unless paused
    pub fn tick(&mut self) -> Result<Tick> {
        if self.playback.is_paused() {
            return Ok(Tick::Paused);
        }

        let capture_start = Instant::now();
        let Some(frame) = self
            .capture
            .capture_frame()
            .context("Failed to capture frame")?
        else {
            return Ok(Tick::Ended);
        };
        let capture_time = capture_start.elapsed();

        let segment_start = Instant::now();
        let output_frame = match self.session.as_mut() {
            Some(session) => {
                let rgba = session
                    .predict(&frame, &self.config)
                    .context("Failed to segment frame")?;
                // state tiles keep their own geometry
                let rgba = if self.config.mode == SegmentationMode::State {
                    rgba
                } else {
                    let (width, height) = frame.dimensions();
                    resize_rgba(rgba, width, height)
                };
                self.canvas.draw(&frame, &rgba)
            }
            None => frame,
        };
        let segment_time = segment_start.elapsed();

        let output_start = Instant::now();
        self.output
            .write_frame(&output_frame)
            .context("Failed to write frame")?;
        let output_time = output_start.elapsed();

        self.stats
            .record(capture_time, segment_time, output_time, self.session.is_some());

        Ok(Tick::Rendered)
    }

    /// Loop until quit, end of feed, `max_frames` or the first error
    pub fn run(
        &mut self,
        commands: &Receiver<ControlCommand>,
        target_fps: u32,
        max_frames: Option<u64>,
    ) -> Result<()> {
        let frame_duration = Duration::from_secs_f32(1.0 / target_fps.max(1) as f32);

        tracing::info!("Starting main pipeline loop");
        if self.session.is_some() {
            tracing::info!(
                "Segmentation enabled, mode={:?}, ratio={}",
                self.config.mode,
                self.config.ratio
            );
        } else {
            tracing::info!("Running in passthrough mode (no segmentation)");
        }

        loop {
            let loop_start = Instant::now();

            for command in commands.try_iter() {
                if !self.apply(command) {
                    tracing::info!("Quit requested");
                    return Ok(());
                }
            }

            match self.tick()? {
                Tick::Ended => {
                    tracing::info!("Source ended after {} frames", self.frames_rendered());
                    return Ok(());
                }
                Tick::Rendered if max_frames.is_some_and(|max| self.frames_rendered() >= max) => {
                    tracing::info!("Rendered {} frames, stopping", self.frames_rendered());
                    return Ok(());
                }
                Tick::Rendered | Tick::Paused => {}
            }

            // Frame rate limiting
            let elapsed = loop_start.elapsed();
            if elapsed < frame_duration {
                std::thread::sleep(frame_duration - elapsed);
            }
        }
    }
}
