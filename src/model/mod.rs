pub mod fetch;
pub mod onnx;

use anyhow::Result;
use ndarray::{Array4, ArrayView4};

pub use onnx::OnnxMaskModel;

/// Mask-prediction backend.
///
/// Implementations own all device placement; the separation core hands in
/// host-resident arrays and gets host-resident arrays back. Weights are
/// immutable across calls within one separation.
pub trait MaskPredictor {
    /// Border frames on each side of the model's output that are unreliable
    /// and already cropped out of `predict_mask` results.
    fn offset(&self) -> usize;

    /// Predict a soft instrumental mask for a batch of normalized magnitude
    /// patches.
    ///
    /// Input is `[batch, channel, bin, cropsize]`; output is
    /// `[batch, channel, bin, cropsize - 2 * offset]`.
    fn predict_mask(&mut self, batch: ArrayView4<f32>) -> Result<Array4<f32>>;
}
