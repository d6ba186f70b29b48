mod error;
mod padding;

use ndarray::{prelude::*, Zip};
use num_complex::Complex32;

use crate::model::MaskPredictor;
use crate::spec::mask::merge_artifacts;

pub use error::SeparateError;
pub use padding::{make_padding, Padding};

/// Observational progress hook, called once per dispatched batch with the
/// fraction of batches completed. Never affects control flow.
pub type ProgressFn = Box<dyn Fn(f32) + Send + Sync>;

/// Patch-based spectrogram separation engine.
///
/// Splits a full-length magnitude spectrogram into overlapping fixed-size
/// patches, runs the mask model over batches of them, reassembles the
/// per-patch outputs into one mask and applies it to the complex spectrogram.
/// All arrays are transient per call; the only long-lived state is the model.
pub struct Separator<M> {
    model: M,
    batch_size: usize,
    cropsize: usize,
    postprocess: bool,
    progress: Option<ProgressFn>,
}

impl<M: MaskPredictor> Separator<M> {
    pub fn new(model: M, batch_size: usize, cropsize: usize, postprocess: bool) -> Self {
        Self {
            model,
            batch_size,
            cropsize,
            postprocess,
            progress: None,
        }
    }

    pub fn on_progress(&mut self, f: impl Fn(f32) + Send + Sync + 'static) {
        self.progress = Some(Box::new(f));
    }

    /// Single-pass separation into (instrumental, vocal) spectrograms.
    pub fn separate(
        &mut self,
        spec: ArrayView3<Complex32>,
    ) -> Result<(Array3<Complex32>, Array3<Complex32>), SeparateError> {
        let (mag, phase) = decompose(spec);
        let n_frames = mag.shape()[2];

        let pad = make_padding(n_frames, self.cropsize, self.model.offset())?;
        self.check_length(n_frames, pad.roi_size)?;

        let mag_pad = pad_and_normalize(&mag, pad.left, pad.right);
        let mask = self.infer_mask(mag_pad.view(), pad.roi_size)?;
        let mask = mask.slice(s![.., .., ..n_frames]).to_owned();

        Ok(self.apply_mask(mask, &mag, &phase))
    }

    /// Two-pass separation: a second inference run with the tiling shifted by
    /// half a stride is averaged with the first, washing out the patch-boundary
    /// artifacts a single fixed tiling bakes in at every stride multiple.
    pub fn separate_tta(
        &mut self,
        spec: ArrayView3<Complex32>,
    ) -> Result<(Array3<Complex32>, Array3<Complex32>), SeparateError> {
        let (mag, phase) = decompose(spec);
        let n_frames = mag.shape()[2];

        let pad = make_padding(n_frames, self.cropsize, self.model.offset())?;
        self.check_length(n_frames, pad.roi_size)?;

        let mag_pad = pad_and_normalize(&mag, pad.left, pad.right);
        let mask_a = self.infer_mask(mag_pad.view(), pad.roi_size)?;

        // Second pass, shifted left by half a stride. The shift is roi_size/2
        // with floor division; shipped model weights depend on this exact
        // alignment, odd strides included.
        let shift = pad.roi_size / 2;
        let mag_pad = pad_and_normalize(&mag, pad.left + shift, pad.right + shift);
        let mask_b = self.infer_mask(mag_pad.view(), pad.roi_size)?;

        if mask_b.shape()[2] < shift + n_frames {
            // Only reachable with an odd roi_size near an exact stride
            // multiple: the shifted tiling loses a partial region on the
            // right and cannot cover the input after the shift is removed.
            return Err(SeparateError::InvalidConfiguration(format!(
                "shifted pass covers {} frames, needs {} (roi_size {})",
                mask_b.shape()[2],
                shift + n_frames,
                pad.roi_size
            )));
        }

        let mask = (&mask_a.slice(s![.., .., ..n_frames])
            + &mask_b.slice(s![.., .., shift..shift + n_frames]))
            * 0.5;

        Ok(self.apply_mask(mask, &mag, &phase))
    }

    /// Tile the padded magnitude into `cropsize`-wide patches at `roi_size`
    /// stride, run the model over batches in patch order, and concatenate the
    /// per-patch outputs into one mask aligned to the padded array.
    fn infer_mask(
        &mut self,
        mag_pad: ArrayView3<f32>,
        roi_size: usize,
    ) -> Result<Array3<f32>, SeparateError> {
        if self.batch_size == 0 {
            return Err(SeparateError::InvalidConfiguration(
                "batch size must be at least 1".into(),
            ));
        }

        let (channels, bins, padded) = mag_pad.dim();
        let offset = self.model.offset();

        let patches = padded
            .checked_sub(2 * offset)
            .map(|usable| usable / roi_size)
            .unwrap_or(0);
        if patches == 0 {
            return Err(SeparateError::InvalidConfiguration(format!(
                "input too short for a single patch ({padded} padded frames, cropsize {})",
                self.cropsize
            )));
        }

        let mut dataset = Array4::<f32>::zeros((patches, channels, bins, self.cropsize));
        for i in 0..patches {
            let start = i * roi_size;
            dataset
                .index_axis_mut(Axis(0), i)
                .assign(&mag_pad.slice(s![.., .., start..start + self.cropsize]));
        }

        let total_batches = patches.div_ceil(self.batch_size);
        log::debug!(
            "Inferring mask: {} patches in {} batches of up to {}",
            patches,
            total_batches,
            self.batch_size
        );

        let mut mask = Array3::<f32>::zeros((channels, bins, patches * roi_size));
        let mut filled = 0usize;

        for (batch_idx, batch) in dataset
            .axis_chunks_iter(Axis(0), self.batch_size)
            .enumerate()
        {
            let pred = self
                .model
                .predict_mask(batch)
                .map_err(SeparateError::Inference)?;

            if pred.shape()[0] != batch.shape()[0]
                || pred.shape()[1] != channels
                || pred.shape()[2] != bins
                || pred.shape()[3] != roi_size
            {
                return Err(SeparateError::Inference(anyhow::anyhow!(
                    "model returned shape {:?}, expected [{}, {}, {}, {}]",
                    pred.shape(),
                    batch.shape()[0],
                    channels,
                    bins,
                    roi_size
                )));
            }

            for patch in pred.axis_iter(Axis(0)) {
                mask.slice_mut(s![.., .., filled * roi_size..(filled + 1) * roi_size])
                    .assign(&patch);
                filled += 1;
            }

            if let Some(report) = &self.progress {
                report((batch_idx + 1) as f32 / total_batches as f32);
            }
        }

        Ok(mask)
    }

    fn apply_mask(
        &self,
        mask: Array3<f32>,
        mag: &Array3<f32>,
        phase: &Array3<f32>,
    ) -> (Array3<Complex32>, Array3<Complex32>) {
        let mask = if self.postprocess {
            merge_artifacts(mask)
        } else {
            mask
        };

        let mut instrumental = Array3::<Complex32>::zeros(mag.dim());
        let mut vocal = Array3::<Complex32>::zeros(mag.dim());
        Zip::from(&mut instrumental)
            .and(&mut vocal)
            .and(&mask)
            .and(mag)
            .and(phase)
            .for_each(|y, v, &m, &a, &p| {
                let bin = Complex32::from_polar(a, p);
                *y = bin * m;
                *v = bin * (1.0 - m);
            });

        (instrumental, vocal)
    }

    fn check_length(&self, n_frames: usize, roi_size: usize) -> Result<(), SeparateError> {
        if n_frames < roi_size {
            return Err(SeparateError::InvalidConfiguration(format!(
                "input of {n_frames} frames is shorter than one inference region ({roi_size})"
            )));
        }
        Ok(())
    }
}

/// Split a complex spectrogram into magnitude and phase.
pub fn decompose(spec: ArrayView3<Complex32>) -> (Array3<f32>, Array3<f32>) {
    (spec.mapv(|z| z.norm()), spec.mapv(|z| z.arg()))
}

/// Zero-pad the magnitude along the time axis and peak-normalize the result
/// for the model. A silent input (all-zero maximum) is left as-is rather than
/// divided by zero.
fn pad_and_normalize(mag: &Array3<f32>, left: usize, right: usize) -> Array3<f32> {
    let (channels, bins, n_frames) = mag.dim();
    let mut padded = Array3::<f32>::zeros((channels, bins, left + n_frames + right));
    padded.slice_mut(s![.., .., left..left + n_frames]).assign(mag);

    let max = padded.fold(0.0f32, |acc, &v| acc.max(v));
    if max > 0.0 {
        padded.mapv_inplace(|v| v / max);
    }
    padded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MaskPredictor;
    use approx::assert_abs_diff_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct ConstMask {
        offset: usize,
        value: f32,
    }

    impl MaskPredictor for ConstMask {
        fn offset(&self) -> usize {
            self.offset
        }

        fn predict_mask(&mut self, batch: ArrayView4<f32>) -> anyhow::Result<Array4<f32>> {
            let (n, c, f, t) = batch.dim();
            Ok(Array4::from_elem((n, c, f, t - 2 * self.offset), self.value))
        }
    }

    /// Returns the center of its input, so the assembled mask must reproduce
    /// the normalized magnitude exactly; any tiling misalignment shows up.
    struct EchoMask {
        offset: usize,
    }

    impl MaskPredictor for EchoMask {
        fn offset(&self) -> usize {
            self.offset
        }

        fn predict_mask(&mut self, batch: ArrayView4<f32>) -> anyhow::Result<Array4<f32>> {
            let t = batch.shape()[3];
            Ok(batch
                .slice(s![.., .., .., self.offset..t - self.offset])
                .to_owned())
        }
    }

    struct FailingMask;

    impl MaskPredictor for FailingMask {
        fn offset(&self) -> usize {
            64
        }

        fn predict_mask(&mut self, _batch: ArrayView4<f32>) -> anyhow::Result<Array4<f32>> {
            anyhow::bail!("device out of memory")
        }
    }

    fn test_spec(bins: usize, frames: usize) -> Array3<Complex32> {
        Array3::from_shape_fn((2, bins, frames), |(c, f, t)| {
            let re = (c as f32 * 0.7 + f as f32 * 0.13 + t as f32 * 0.031).sin();
            let im = (f as f32 * 0.09 - t as f32 * 0.017 + c as f32).cos();
            Complex32::new(re, im)
        })
    }

    #[test]
    fn decompose_round_trips() {
        let spec = test_spec(17, 50);
        let (mag, phase) = decompose(spec.view());
        for ((c, f, t), z) in spec.indexed_iter() {
            let back = Complex32::from_polar(mag[[c, f, t]], phase[[c, f, t]]);
            assert_abs_diff_eq!(back.re, z.re, epsilon = 1e-5);
            assert_abs_diff_eq!(back.im, z.im, epsilon = 1e-5);
        }
    }

    #[test]
    fn energy_is_conserved_without_postprocess() {
        let spec = test_spec(9, 333);
        let mut sep = Separator::new(ConstMask { offset: 64, value: 0.3 }, 4, 256, false);
        let (instrumental, vocal) = sep.separate(spec.view()).unwrap();
        for ((c, f, t), z) in spec.indexed_iter() {
            let sum = instrumental[[c, f, t]] + vocal[[c, f, t]];
            assert_abs_diff_eq!(sum.re, z.re, epsilon = 1e-4);
            assert_abs_diff_eq!(sum.im, z.im, epsilon = 1e-4);
        }
    }

    #[test]
    fn outputs_match_input_length() {
        for frames in [333usize, 1000, 128] {
            let spec = test_spec(9, frames);
            let mut sep = Separator::new(ConstMask { offset: 64, value: 0.5 }, 4, 256, false);
            let (instrumental, vocal) = sep.separate(spec.view()).unwrap();
            assert_eq!(instrumental.dim(), (2, 9, frames));
            assert_eq!(vocal.dim(), (2, 9, frames));

            let mut sep = Separator::new(ConstMask { offset: 64, value: 0.5 }, 4, 256, false);
            let (instrumental, _) = sep.separate_tta(spec.view()).unwrap();
            assert_eq!(instrumental.dim(), (2, 9, frames));
        }
    }

    #[test]
    fn tiling_preserves_temporal_alignment() {
        let spec = test_spec(9, 500);
        let (mag, _) = decompose(spec.view());
        let max = mag.fold(0.0f32, |acc, &v| acc.max(v));

        let mut sep = Separator::new(EchoMask { offset: 64 }, 3, 256, false);
        let (instrumental, _) = sep.separate(spec.view()).unwrap();

        // With an echo model the mask equals the normalized magnitude, so the
        // instrumental output must be mag^2/max * e^(i*phase).
        for ((c, f, t), z) in spec.indexed_iter() {
            let m = mag[[c, f, t]] / max;
            let expected = *z * m;
            assert_abs_diff_eq!(instrumental[[c, f, t]].re, expected.re, epsilon = 1e-4);
            assert_abs_diff_eq!(instrumental[[c, f, t]].im, expected.im, epsilon = 1e-4);
        }
    }

    #[test]
    fn output_is_invariant_to_batch_size() {
        let spec = test_spec(9, 777);
        let mut reference = None;
        for batch_size in [1usize, 3, 4, 64] {
            let mut sep = Separator::new(EchoMask { offset: 64 }, batch_size, 256, false);
            let (instrumental, vocal) = sep.separate(spec.view()).unwrap();
            match &reference {
                None => reference = Some((instrumental, vocal)),
                Some((ri, rv)) => {
                    assert_eq!(&instrumental, ri);
                    assert_eq!(&vocal, rv);
                }
            }
        }
    }

    #[test]
    fn tta_of_constant_mask_is_constant() {
        let spec = test_spec(9, 1000);
        let mut sep = Separator::new(ConstMask { offset: 64, value: 0.7 }, 4, 256, false);
        let (instrumental, _) = sep.separate_tta(spec.view()).unwrap();
        for ((c, f, t), z) in spec.indexed_iter() {
            let expected = *z * 0.7;
            assert_abs_diff_eq!(instrumental[[c, f, t]].re, expected.re, epsilon = 1e-4);
            assert_abs_diff_eq!(instrumental[[c, f, t]].im, expected.im, epsilon = 1e-4);
        }
    }

    #[test]
    fn rejects_degenerate_length() {
        let spec = test_spec(9, 10);
        let mut sep = Separator::new(ConstMask { offset: 64, value: 0.5 }, 4, 256, false);
        assert!(matches!(
            sep.separate(spec.view()),
            Err(SeparateError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            sep.separate_tta(spec.view()),
            Err(SeparateError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn silence_stays_finite() {
        let spec = Array3::<Complex32>::zeros((2, 9, 400));
        let mut sep = Separator::new(EchoMask { offset: 64 }, 4, 256, false);
        let (instrumental, vocal) = sep.separate(spec.view()).unwrap();
        assert!(instrumental.iter().all(|z| z.re.is_finite() && z.im.is_finite()));
        assert!(vocal.iter().all(|z| z.re.is_finite() && z.im.is_finite()));
    }

    #[test]
    fn model_errors_pass_through() {
        let spec = test_spec(9, 400);
        let mut sep = Separator::new(FailingMask, 4, 256, false);
        match sep.separate(spec.view()) {
            Err(SeparateError::Inference(e)) => {
                assert!(e.to_string().contains("out of memory"));
            }
            other => panic!("expected inference failure, got {other:?}"),
        }
    }

    #[test]
    fn progress_reports_once_per_batch() {
        let spec = test_spec(9, 1000); // 8 patches at roi 128
        let calls = Arc::new(AtomicUsize::new(0));
        let fractions = Arc::new(Mutex::new(Vec::new()));

        let mut sep = Separator::new(ConstMask { offset: 64, value: 0.5 }, 4, 256, false);
        let (calls_in, fractions_in) = (calls.clone(), fractions.clone());
        sep.on_progress(move |fraction| {
            calls_in.fetch_add(1, Ordering::SeqCst);
            fractions_in.lock().unwrap().push(fraction);
        });

        sep.separate(spec.view()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let fractions = fractions.lock().unwrap();
        assert_abs_diff_eq!(fractions[0], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(fractions[1], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn rejects_zero_batch_size() {
        let spec = test_spec(9, 400);
        let mut sep = Separator::new(ConstMask { offset: 64, value: 0.5 }, 0, 256, false);
        assert!(matches!(
            sep.separate(spec.view()),
            Err(SeparateError::InvalidConfiguration(_))
        ));
    }
}
