use ndarray::prelude::*;
use num_complex::Complex32;
use rayon::prelude::*;
use rustfft::FftPlanner;

/// Short-time Fourier transform of a `[channels, samples]` buffer into a
/// `[channels, n_fft/2 + 1, frames]` complex spectrogram.
///
/// Frames are centered: the signal is reflect-padded by half a window on each
/// side, so frame `t` is centered on sample `t * hop_length`.
pub fn wave_to_spectrogram(
    wave: ArrayView2<f32>,
    n_fft: usize,
    hop_length: usize,
) -> Array3<Complex32> {
    let (channels, n_samples) = wave.dim();
    let bins = n_fft / 2 + 1;
    let pad = n_fft / 2;
    let padded_len = n_samples + 2 * pad;
    let n_frames = if padded_len >= n_fft {
        (padded_len - n_fft) / hop_length + 1
    } else {
        0
    };

    let window = hann_window(n_fft);
    let mut spec = Array3::<Complex32>::zeros((channels, bins, n_frames));

    for ch in 0..channels {
        let samples: Vec<f32> = wave.row(ch).to_vec();

        let columns: Vec<Vec<Complex32>> = (0..n_frames)
            .into_par_iter()
            .map(|frame| {
                let start = frame * hop_length;
                let mut buffer: Vec<Complex32> = (0..n_fft)
                    .map(|i| {
                        let idx = start + i;
                        let sample = if idx < pad || idx >= pad + n_samples {
                            reflect_sample(&samples, idx as isize - pad as isize)
                        } else {
                            samples[idx - pad]
                        };
                        Complex32::new(sample * window[i], 0.0)
                    })
                    .collect();

                // Per-thread planner (rayon-safe)
                let mut planner = FftPlanner::<f32>::new();
                let fft = planner.plan_fft_forward(n_fft);
                fft.process(&mut buffer);

                buffer.truncate(bins);
                buffer
            })
            .collect();

        for (frame, column) in columns.into_iter().enumerate() {
            for (bin, value) in column.into_iter().enumerate() {
                spec[[ch, bin, frame]] = value;
            }
        }
    }

    spec
}

/// Inverse STFT via weighted overlap-add, trimmed to `length` samples.
pub fn spectrogram_to_wave(
    spec: ArrayView3<Complex32>,
    n_fft: usize,
    hop_length: usize,
    length: usize,
) -> Array2<f32> {
    let (channels, bins, n_frames) = spec.dim();
    let pad = n_fft / 2;
    let window = hann_window(n_fft);

    let mut wave = Array2::<f32>::zeros((channels, length));
    if n_frames == 0 {
        return wave;
    }

    let mut planner = FftPlanner::<f32>::new();
    let ifft = planner.plan_fft_inverse(n_fft);
    let inv_n = 1.0 / n_fft as f32;

    let total_len = (n_frames - 1) * hop_length + n_fft;

    for ch in 0..channels {
        let mut output = vec![0.0f32; total_len];
        let mut norm = vec![0.0f32; total_len];

        let mut buffer = vec![Complex32::new(0.0, 0.0); n_fft];
        for frame in 0..n_frames {
            for bin in 0..bins {
                buffer[bin] = spec[[ch, bin, frame]];
            }
            // Mirror conjugate for the negative frequencies
            for bin in 1..n_fft - bins + 1 {
                buffer[n_fft - bin] = spec[[ch, bin, frame]].conj();
            }

            ifft.process(&mut buffer);

            let start = frame * hop_length;
            for i in 0..n_fft {
                output[start + i] += buffer[i].re * inv_n * window[i];
                norm[start + i] += window[i] * window[i];
            }
        }

        for (sample, &w) in output.iter_mut().zip(&norm) {
            if w > 1e-8 {
                *sample /= w;
            }
        }

        for i in 0..length {
            let idx = i + pad;
            if idx < total_len {
                wave[[ch, i]] = output[idx];
            }
        }
    }

    wave
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / size as f32).cos()))
        .collect()
}

/// Mirror a signal index across its edges (reflection without edge repeat).
fn reflect_sample(samples: &[f32], idx: isize) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let len = samples.len() as isize;
    let mut i = idx;
    if i < 0 {
        i = -i;
    }
    if i >= len {
        i = 2 * (len - 1) - i;
    }
    samples[i.clamp(0, len - 1) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn stereo_tone(n_samples: usize) -> Array2<f32> {
        Array2::from_shape_fn((2, n_samples), |(ch, i)| {
            let t = i as f32 / 44100.0;
            let freq = if ch == 0 { 440.0 } else { 523.25 };
            (2.0 * std::f32::consts::PI * freq * t).sin() * 0.5
        })
    }

    #[test]
    fn spectrogram_shape_is_centered() {
        let wave = stereo_tone(4096);
        let spec = wave_to_spectrogram(wave.view(), 512, 128);
        assert_eq!(spec.dim(), (2, 257, 4096 / 128 + 1));
    }

    #[test]
    fn round_trip_reconstructs_signal() {
        let n = 8192;
        let wave = stereo_tone(n);
        let spec = wave_to_spectrogram(wave.view(), 512, 128);
        let back = spectrogram_to_wave(spec.view(), 512, 128, n);

        assert_eq!(back.dim(), (2, n));
        // Compare away from the boundaries, where reflection padding and the
        // overlap-add taper dominate.
        for ch in 0..2 {
            for i in 512..n - 512 {
                assert_abs_diff_eq!(back[[ch, i]], wave[[ch, i]], epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn istft_pads_missing_tail_with_silence() {
        let wave = stereo_tone(1000);
        let spec = wave_to_spectrogram(wave.view(), 512, 128);
        let back = spectrogram_to_wave(spec.view(), 512, 128, 2000);
        assert_eq!(back.dim(), (2, 2000));
        assert_abs_diff_eq!(back[[0, 1999]], 0.0, epsilon = 1e-6);
    }
}
