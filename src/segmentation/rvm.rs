use super::types::{MattingBackend, ModelOutputs, RecurrentState};
use anyhow::{Context, Result};
use ndarray::{arr1, Array4, Ix4};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

/// Output nodes of the RVM graph, in the order the model declares them
const OUTPUT_NODES: [&str; 6] = ["fgr", "pha", "r1o", "r2o", "r3o", "r4o"];

/// Options for building the ONNX Runtime session
#[derive(Clone, Copy, Debug)]
pub struct BackendOptions {
    pub intra_threads: usize,
    pub cuda: bool,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            intra_threads: 4,
            cuda: false,
        }
    }
}

/// RobustVideoMatting graph executed by ONNX Runtime
///
/// Inputs are `src` [1,3,H,W] in 0..1, the four recurrent states
/// `r1i..r4i` and a one-element `downsample_ratio`.
pub struct RobustVideoMatting {
    session: Session,
}

impl RobustVideoMatting {
    /// Load an RVM model from an ONNX file
    pub fn new<P: AsRef<Path>>(model_path: P, options: BackendOptions) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading RVM model from {}", path.display());

        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(options.intra_threads)?;
        if options.cuda {
            tracing::info!("Requesting CUDA execution provider");
            builder = builder.with_execution_providers([CUDAExecutionProvider::default().build()])?;
        }
        let session = builder
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("RVM model loaded successfully");
        tracing::debug!(
            "Model inputs: {:?}",
            session.inputs.iter().map(|i| i.name.as_str()).collect::<Vec<_>>()
        );

        Ok(Self { session })
    }
}

impl MattingBackend for RobustVideoMatting {
    fn infer(
        &mut self,
        src: Array4<f32>,
        state: RecurrentState,
        downsample_ratio: f32,
    ) -> Result<ModelOutputs> {
        let _span = tracing::debug_span!("inference").entered();

        let RecurrentState { r1, r2, r3, r4 } = state;
        let outputs = self
            .session
            .run(ort::inputs! {
                "src" => Tensor::from_array(src)?,
                "r1i" => Tensor::from_array(r1)?,
                "r2i" => Tensor::from_array(r2)?,
                "r3i" => Tensor::from_array(r3)?,
                "r4i" => Tensor::from_array(r4)?,
                "downsample_ratio" => Tensor::from_array(arr1(&[downsample_ratio]))?
            })
            .context("Failed to run inference")?;

        let extract = |name: &str| -> Result<Array4<f32>> {
            let tensor = outputs[name]
                .try_extract_array::<f32>()
                .with_context(|| format!("Output {name} is not an f32 tensor"))?
                .into_dimensionality::<Ix4>()
                .with_context(|| format!("Output {name} is not 4-dimensional"))?
                .to_owned();
            Ok(tensor)
        };

        let [fgr, pha, r1o, r2o, r3o, r4o] = OUTPUT_NODES;
        Ok(ModelOutputs {
            fgr: extract(fgr)?,
            pha: extract(pha)?,
            state: RecurrentState {
                r1: extract(r1o)?,
                r2: extract(r2o)?,
                r3: extract(r3o)?,
                r4: extract(r4o)?,
            },
        })
    }
}
