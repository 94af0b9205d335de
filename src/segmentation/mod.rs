mod postprocess;
mod preprocess;
mod rvm;
mod session;
pub mod types;

pub use postprocess::resize_rgba;
pub use preprocess::Preprocessor;
pub use rvm::{BackendOptions, RobustVideoMatting};
pub use session::MattingSession;
pub use types::{DownsampleRatio, MattingBackend, SegmentationConfig, SegmentationMode};

use anyhow::Result;
use std::path::Path;

/// Session over the RVM ONNX backend, boxed so the pipeline can run without one
pub type DefaultSession = MattingSession<Box<dyn MattingBackend>>;

/// Load an RVM model and wrap it in a fresh session
pub fn create_default_session(
    model_path: &Path,
    options: BackendOptions,
    preprocessor: Preprocessor,
) -> Result<DefaultSession> {
    let model = RobustVideoMatting::new(model_path, options)?;
    let backend: Box<dyn MattingBackend> = Box::new(model);
    Ok(MattingSession::new(backend, preprocessor))
}
