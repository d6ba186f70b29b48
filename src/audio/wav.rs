use anyhow::{Context, Result};
use ndarray::prelude::*;
use std::path::Path;

/// Write a `[2, n]` stereo buffer as a 16-bit PCM WAV file.
pub fn write_wav(path: &Path, samples: ArrayView2<f32>, sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let n_samples = samples.shape()[1];
    for i in 0..n_samples {
        for ch in 0..2 {
            let clamped = samples[[ch, i]].clamp(-1.0, 1.0);
            writer.write_sample((clamped * i16::MAX as f32) as i16)?;
        }
    }

    writer
        .finalize()
        .with_context(|| format!("Failed to finalize {}", path.display()))?;

    log::info!("Wrote {}", path.display());
    Ok(())
}
