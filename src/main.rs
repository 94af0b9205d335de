mod capture;
mod control;
mod output;
mod pipeline;
mod render;
mod segmentation;

use anyhow::{Context, Result};
use capture::{CaptureSource, Facing, ImageDirSource, WebcamCapture, WebcamConfig};
use clap::Parser;
use output::{OutputSink, PngSequenceOutput, V4L2Output};
use pipeline::{Pipeline, Playback};
use render::{Backdrop, Canvas, CompositeOp};
use segmentation::{
    BackendOptions, DefaultSession, DownsampleRatio, Preprocessor, SegmentationConfig,
    SegmentationMode,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the RVM segmentation model (ONNX file)
    /// If not provided, runs in passthrough mode without segmentation
    #[arg(long)]
    model: Option<PathBuf>,

    /// What to render from the model outputs
    #[arg(long, value_enum, default_value_t = SegmentationMode::Default)]
    mode: SegmentationMode,

    /// Downsample ratio for the recurrent computation (0-1, or "auto")
    #[arg(long, default_value = "0.5")]
    ratio: DownsampleRatio,

    /// Recurrent state shown in state mode
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=4))]
    state_index: u8,

    /// Model input width, native frame size if unset
    #[arg(long, requires = "model_height")]
    model_width: Option<u32>,

    /// Model input height, native frame size if unset
    #[arg(long, requires = "model_width")]
    model_height: Option<u32>,

    /// Intra-op threads for ONNX Runtime
    #[arg(long, default_value_t = 4)]
    threads: usize,

    /// Request the CUDA execution provider
    #[arg(long)]
    cuda: bool,

    /// Input webcam device index, overrides --facing
    #[arg(short, long)]
    device: Option<u32>,

    /// Preferred camera when no device index is given
    #[arg(long, value_enum, default_value_t = Facing::Front)]
    facing: Facing,

    /// Crop and scale frames to exactly --width x --height
    #[arg(long)]
    crop: bool,

    /// Requested capture width, 0 for the device default
    #[arg(long, default_value_t = 0)]
    width: u32,

    /// Requested capture height, 0 for the device default
    #[arg(long, default_value_t = 0)]
    height: u32,

    /// Read frames from a directory of images instead of a webcam
    #[arg(long, conflicts_with = "device")]
    input_dir: Option<PathBuf>,

    /// Restart the input directory when it runs out
    #[arg(long, requires = "input_dir")]
    loop_input: bool,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = "/dev/video10")]
    output_device: PathBuf,

    /// Write PNG frames to this directory instead of a v4l2loopback device
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Output resolution width
    #[arg(long, default_value_t = 1280)]
    output_width: u32,

    /// Output resolution height
    #[arg(long, default_value_t = 720)]
    output_height: u32,

    /// What the matte is drawn over: frame, black, white, green or #rrggbb
    #[arg(long, default_value = "black")]
    background: Backdrop,

    /// How the matte is combined with the background
    #[arg(long, value_enum, default_value_t = CompositeOp::SourceOver)]
    composite: CompositeOp,

    /// Target frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Stop after this many rendered frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Don't read control commands from stdin
    #[arg(long)]
    no_control: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn webcam_config(&self) -> WebcamConfig {
        WebcamConfig {
            debug: self.debug,
            facing: self.facing,
            crop: self.crop,
            width: self.width,
            height: self.height,
            device: self.device,
        }
    }

    fn segmentation_config(&self) -> SegmentationConfig {
        SegmentationConfig {
            model_path: self.model.clone(),
            ratio: self.ratio,
            mode: self.mode,
            state_index: self.state_index as usize,
        }
    }

    fn preprocessor(&self) -> Preprocessor {
        Preprocessor::new(self.model_width.zip(self.model_height))
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("mattecam starting");
    tracing::info!("Target FPS: {}", args.fps);

    // Load the model before touching the camera so a bad path fails fast
    let config = args.segmentation_config();
    let session: Option<DefaultSession> = match &config.model_path {
        Some(model_path) => {
            let options = BackendOptions {
                intra_threads: args.threads,
                cuda: args.cuda,
            };
            let session =
                segmentation::create_default_session(model_path, options, args.preprocessor())
                    .context("Failed to load segmentation model")?;
            Some(session)
        }
        None => None,
    };

    let mut capture: Box<dyn CaptureSource> = match &args.input_dir {
        Some(dir) => Box::new(
            ImageDirSource::new(dir, args.loop_input).context("Failed to open input directory")?,
        ),
        None => match WebcamCapture::start(args.webcam_config()) {
            Ok(webcam) => Box::new(webcam),
            Err(err) => {
                tracing::error!("Webcam unavailable, not starting playback: {}", err);
                return Ok(());
            }
        },
    };
    let (width, height) = capture.resolution();
    tracing::info!("Capture: {}x{}", width, height);

    let mut output: Box<dyn OutputSink> = match &args.output_dir {
        Some(dir) => Box::new(PngSequenceOutput::new(
            dir,
            Some((args.output_width, args.output_height)),
        )?),
        None => Box::new(
            V4L2Output::new(&args.output_device, args.output_width, args.output_height)
                .context("Failed to initialize v4l2loopback output")?,
        ),
    };
    let (width, height) = output.resolution();
    tracing::info!("Output: {}x{}", width, height);

    let (command_tx, command_rx) = crossbeam_channel::unbounded();
    if !args.no_control {
        tracing::info!(
            "Commands: <enter> pause/resume, mode <m>, ratio <r>, state <n>, \
             composite <op>, background <b>, quit"
        );
        control::spawn_stdin_reader(command_tx);
    } else {
        drop(command_tx);
    }

    let mut pipeline = Pipeline::new(
        &mut capture,
        &mut output,
        session,
        config,
        Canvas::new(args.background, args.composite),
        Playback::new(args.debug),
    );
    pipeline.run(&command_rx, args.fps, args.max_frames)?;

    Ok(())
}
