use super::{crop_and_scale, select_device, CaptureError, CaptureSource, WebcamConfig};
use anyhow::{Context, Result};
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::Camera;

pub struct WebcamCapture {
    camera: Camera,
    config: WebcamConfig,
    constraints: RequestedFormatType,
}

/// Format request derived from the configured target size
fn format_constraints(config: &WebcamConfig) -> RequestedFormatType {
    match config.target() {
        Some((width, height)) => RequestedFormatType::Closest(CameraFormat::new(
            Resolution::new(width, height),
            FrameFormat::MJPEG,
            30,
        )),
        None => RequestedFormatType::AbsoluteHighestResolution,
    }
}

impl WebcamCapture {
    /// Find a camera matching `config`, negotiate a format and start streaming
    pub fn start(config: WebcamConfig) -> Result<Self, CaptureError> {
        let devices = match nokhwa::query(ApiBackend::Auto) {
            Ok(devices) => devices,
            Err(err) => {
                tracing::warn!("Failed to query video devices: {}", err);
                Vec::new()
            }
        };
        if devices.is_empty() {
            tracing::error!("No video devices");
            return Err(CaptureError::NoDevices);
        }

        let index = match config.device {
            Some(device) => CameraIndex::Index(device),
            None => {
                let labels: Vec<String> = devices.iter().map(|d| d.human_name()).collect();
                let position = select_device(&labels, config.facing).ok_or(CaptureError::NoDevices)?;
                devices[position].index().clone()
            }
        };

        let constraints = format_constraints(&config);
        let requested = RequestedFormat::new::<RgbFormat>(constraints);

        tracing::info!("Initializing webcam {} facing {:?}", index, config.facing);

        let mut camera = Camera::new(index.clone(), requested).map_err(|err| {
            tracing::error!("Failed to open camera {}: {}", index, err);
            match index {
                CameraIndex::Index(i) if config.device.is_some() => CaptureError::DeviceNotFound(i),
                _ => CaptureError::Open(err),
            }
        })?;

        camera.open_stream().map_err(|err| {
            tracing::error!("Failed to open camera stream: {}", err);
            CaptureError::Open(err)
        })?;

        let mut webcam = Self {
            camera,
            config,
            constraints,
        };
        tracing::info!(
            "Webcam initialized: {} at {}x{}",
            webcam.label(),
            webcam.width(),
            webcam.height()
        );
        if webcam.config.debug {
            tracing::debug!("Constraints: {:?}", webcam.constraints());
            tracing::debug!("Settings: {}", webcam.settings());
            match webcam.capabilities() {
                Ok(formats) => tracing::debug!("Capabilities: {:?}", formats),
                Err(err) => tracing::debug!("Capabilities unavailable: {}", err),
            }
        }

        Ok(webcam)
    }

    pub fn label(&self) -> String {
        self.camera.info().human_name()
    }

    /// The format that was asked for when the camera was opened
    pub fn constraints(&self) -> RequestedFormatType {
        self.constraints
    }

    /// The format negotiated with the device
    pub fn settings(&self) -> CameraFormat {
        self.camera.camera_format()
    }

    /// Every format the device reports it can deliver
    pub fn capabilities(&mut self) -> Result<Vec<CameraFormat>> {
        self.camera
            .compatible_camera_formats()
            .context("Failed to query camera formats")
    }

    /// Width of delivered frames, after cropping
    pub fn width(&self) -> u32 {
        self.resolution().0
    }

    pub fn height(&self) -> u32 {
        self.resolution().1
    }

    pub fn is_streaming(&self) -> bool {
        self.camera.is_stream_open()
    }

    pub fn stop(&mut self) -> Result<()> {
        if self.is_streaming() {
            if self.config.debug {
                tracing::debug!("Stopping webcam");
            }
            self.camera
                .stop_stream()
                .context("Failed to stop camera stream")?;
        }
        Ok(())
    }
}

impl Drop for WebcamCapture {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::warn!("{:#}", err);
        }
    }
}

impl CaptureSource for WebcamCapture {
    fn capture_frame(&mut self) -> Result<Option<RgbImage>> {
        let frame = self
            .camera
            .frame()
            .context("Failed to capture frame")?;

        let decoded = frame
            .decode_image::<RgbFormat>()
            .context("Failed to decode frame")?;

        let frame = match (self.config.crop, self.config.target()) {
            (true, Some((width, height))) => crop_and_scale(&decoded, width, height),
            _ => decoded,
        };

        Ok(Some(frame))
    }

    fn resolution(&self) -> (u32, u32) {
        match (self.config.crop, self.config.target()) {
            (true, Some(target)) => target,
            _ => {
                let resolution = self.camera.resolution();
                (resolution.width(), resolution.height())
            }
        }
    }
}
