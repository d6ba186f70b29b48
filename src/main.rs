mod audio;
mod cli;
mod config;
mod model;
mod separate;
mod spec;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use cli::Cli;
use model::OnnxMaskModel;
use separate::Separator;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    // Load config: explicit --config path, or auto-detect unmix.toml / global config
    let config_path = cli.config.clone().or_else(|| {
        let local = std::path::PathBuf::from("unmix.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(home) = dirs::home_dir() {
            let xdg = home.join(".config").join("unmix").join("config.toml");
            if xdg.exists() {
                return Some(xdg);
            }
        }
        if let Some(config_dir) = dirs::config_dir() {
            let platform = config_dir.join("unmix").join("config.toml");
            if platform.exists() {
                return Some(platform);
            }
        }
        None
    });
    if let Some(ref path) = config_path {
        if let Some(cfg) = config::load_config(path) {
            log::info!("Loaded config from {}", path.display());
            // Merge: config values apply only when CLI is at its default
            if cli.model == "baseline" { cli.model = cfg.model.name; }
            if cli.batchsize == 4 { cli.batchsize = cfg.model.batchsize; }
            if cli.cropsize == 256 { cli.cropsize = cfg.model.cropsize; }
            if cli.offset == 64 { cli.offset = cfg.model.offset; }
            if cli.device == "cpu" { cli.device = cfg.model.device; }
            if cli.threads == 0 { cli.threads = cfg.model.threads; }
            if cli.sr == 44100 { cli.sr = cfg.stft.sr; }
            if cli.n_fft == 2048 { cli.n_fft = cfg.stft.n_fft; }
            if cli.hop_length == 1024 { cli.hop_length = cfg.stft.hop_length; }
            if cli.output_dir.as_path() == std::path::Path::new(".") {
                cli.output_dir = cfg.output.dir;
            }
            if !cli.output_vocals {
                cli.output_vocals = cfg.output.vocals;
            }
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }

    let input = cli.input.as_ref().context("Input audio file is required")?;
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }

    log::info!("unmix - neural vocal/instrumental separation");
    log::info!("Input: {}", input.display());
    log::info!("Model: {} (cropsize {}, offset {})", cli.model, cli.cropsize, cli.offset);

    // 1. Decode audio
    log::info!("Decoding audio...");
    let audio_data = audio::decode::decode_audio(input)?;

    // 2. Resample to the processing rate
    let samples = if audio_data.sample_rate != cli.sr {
        audio::resample::resample(audio_data.samples.view(), audio_data.sample_rate, cli.sr)?
    } else {
        audio_data.samples
    };
    let n_samples = samples.shape()[1];

    // 3. Forward STFT
    log::info!("Computing spectrogram (n_fft {}, hop {})...", cli.n_fft, cli.hop_length);
    let x_spec = spec::stft::wave_to_spectrogram(samples.view(), cli.n_fft, cli.hop_length);
    log::info!(
        "Spectrogram: {} bins x {} frames",
        x_spec.shape()[1],
        x_spec.shape()[2]
    );

    // 4. Load the mask model
    let model_path = model::fetch::resolve_model_path(&cli.model)?;
    let mask_model = OnnxMaskModel::load(&model_path, cli.offset, &cli.device, cli.threads)?;

    // 5. Separate
    let mut separator = Separator::new(mask_model, cli.batchsize, cli.cropsize, cli.postprocess);

    let pb = ProgressBar::new(1000);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {percent}% ({eta} remaining)")
            .unwrap()
            .progress_chars("=>-"),
    );
    let bar = pb.clone();
    separator.on_progress(move |fraction| {
        bar.set_position((fraction * 1000.0).round() as u64);
    });

    log::info!("Separating{}...", if cli.tta { " (TTA)" } else { "" });
    let (y_spec, v_spec) = if cli.tta {
        separator.separate_tta(x_spec.view())?
    } else {
        separator.separate(x_spec.view())?
    };
    pb.finish_with_message("Separation complete");

    // 6. Inverse STFT and write stems
    std::fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("Failed to create output dir: {}", cli.output_dir.display()))?;
    let basename = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string();

    log::info!("Inverse STFT of instruments...");
    let instruments = spec::stft::spectrogram_to_wave(y_spec.view(), cli.n_fft, cli.hop_length, n_samples);
    let out_path = cli.output_dir.join(format!("{basename}_Instruments.wav"));
    audio::wav::write_wav(&out_path, instruments.view(), cli.sr)?;

    if cli.output_vocals {
        log::info!("Inverse STFT of vocals...");
        let vocals = spec::stft::spectrogram_to_wave(v_spec.view(), cli.n_fft, cli.hop_length, n_samples);
        let out_path = cli.output_dir.join(format!("{basename}_Vocals.wav"));
        audio::wav::write_wav(&out_path, vocals.view(), cli.sr)?;
    }

    log::info!("Done! Output: {}", cli.output_dir.display());
    Ok(())
}
