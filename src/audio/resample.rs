use anyhow::{Context, Result};
use ndarray::prelude::*;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

/// Resample a `[2, n]` stereo buffer from `from_rate` to `to_rate`.
pub fn resample(samples: ArrayView2<f32>, from_rate: u32, to_rate: u32) -> Result<Array2<f32>> {
    if from_rate == to_rate {
        return Ok(samples.to_owned());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let n_samples = samples.shape()[1];
    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(
        ratio,
        2.0, // max relative ratio
        params,
        n_samples,
        2,
    )
    .context("Failed to create resampler")?;

    let input = vec![samples.row(0).to_vec(), samples.row(1).to_vec()];
    let output = resampler
        .process(&input, None)
        .context("Resampling failed")?;

    let out_len = output[0].len().min(output[1].len());
    let mut resampled = Array2::<f32>::zeros((2, out_len));
    for ch in 0..2 {
        for (i, &v) in output[ch][..out_len].iter().enumerate() {
            resampled[[ch, i]] = v;
        }
    }

    log::info!(
        "Resampled {}Hz -> {}Hz ({} -> {} samples/channel)",
        from_rate,
        to_rate,
        n_samples,
        out_len
    );

    Ok(resampled)
}
