use anyhow::{Context, Result};
use ndarray::{Array4, ArrayView4};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;

use super::MaskPredictor;

/// ONNX Runtime backend for the mask model.
///
/// Device selection and thread configuration live entirely here; the
/// separation core only ever sees host arrays. The border `offset` is a
/// property of the exported network and must match it.
pub struct OnnxMaskModel {
    session: Session,
    offset: usize,
}

impl OnnxMaskModel {
    /// Load an exported mask model.
    ///
    /// `device` selects the execution provider:
    /// - `"cuda"` or `"auto"` → register CUDA, fall back to CPU
    /// - `"cpu"` → CPU only
    pub fn load(
        model_path: impl AsRef<Path>,
        offset: usize,
        device: &str,
        num_threads: usize,
    ) -> Result<Self> {
        let path = model_path.as_ref();
        log::info!("Loading mask model from {}", path.display());

        let mut builder =
            Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

        let use_cuda = matches!(device.to_lowercase().as_str(), "auto" | "cuda" | "gpu");
        if use_cuda {
            log::info!("Registering CUDA execution provider...");
            builder =
                builder.with_execution_providers([CUDAExecutionProvider::default().build()])?;
        }

        let threads = if num_threads == 0 { 4 } else { num_threads };
        let session = builder
            .with_intra_threads(threads)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load ONNX model from {}", path.display()))?;

        log::info!("Mask model loaded (device={}, offset={})", device, offset);
        Ok(Self { session, offset })
    }
}

impl MaskPredictor for OnnxMaskModel {
    fn offset(&self) -> usize {
        self.offset
    }

    fn predict_mask(&mut self, batch: ArrayView4<f32>) -> Result<Array4<f32>> {
        let (n, c, f, t) = batch.dim();
        let data: Vec<f32> = batch.iter().copied().collect();
        let input = Tensor::from_array(([n, c, f, t], data))?;

        let outputs = self.session.run(ort::inputs!["input" => input])?;

        let (shape, data) = outputs["output"].try_extract_tensor::<f32>()?;
        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        anyhow::ensure!(
            dims.len() == 4,
            "mask output has {} dimensions, expected 4",
            dims.len()
        );

        Array4::from_shape_vec((dims[0], dims[1], dims[2], dims[3]), data.to_vec())
            .context("mask output does not match its reported shape")
    }
}
