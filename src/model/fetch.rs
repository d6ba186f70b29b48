use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Known pretrained models and their distribution filenames.
const KNOWN_MODELS: &[(&str, &str)] = &[
    ("baseline", "baseline.onnx"),
    ("baseline-hq", "baseline_hq.onnx"),
];

/// Resolve a model input string to an actual file path.
///
/// - If `input` is an existing file path, return it directly.
/// - If `input` is a known model name, check the cache directory and
///   download from HuggingFace if missing (requires the `download` feature).
pub fn resolve_model_path(input: &str) -> Result<PathBuf> {
    let as_path = Path::new(input);
    if as_path.exists() {
        log::info!("Using mask model from path: {}", as_path.display());
        return Ok(as_path.to_path_buf());
    }

    let (model_name, filename) = KNOWN_MODELS
        .iter()
        .find(|(name, _)| *name == input)
        .copied()
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown model '{}'. Valid names: {}. Or provide a path to an ONNX file.",
                input,
                KNOWN_MODELS
                    .iter()
                    .map(|(n, _)| *n)
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        })?;

    let cache_dir = model_cache_dir()?;
    let cached_path = cache_dir.join(filename);

    if cached_path.exists() {
        log::info!(
            "Using cached model '{}': {}",
            model_name,
            cached_path.display()
        );
        return Ok(cached_path);
    }

    download_model(model_name, filename, &cached_path)?;
    Ok(cached_path)
}

fn model_cache_dir() -> Result<PathBuf> {
    let base = dirs::cache_dir()
        .or_else(dirs::home_dir)
        .context("Cannot determine cache directory")?;
    let dir = base.join("unmix").join("models");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create model cache dir: {}", dir.display()))?;
    Ok(dir)
}

#[cfg(feature = "download")]
fn download_model(model_name: &str, filename: &str, dest: &Path) -> Result<()> {
    use hf_hub::api::sync::Api;

    const HF_REPO: &str = "unmix-audio/vocal-remover-onnx";

    log::info!("Downloading model '{}' from HuggingFace...", model_name);

    let api = Api::new().context("Failed to initialize HuggingFace Hub API")?;
    let repo = api.model(HF_REPO.to_string());
    let downloaded = repo
        .get(filename)
        .with_context(|| format!("Failed to download model file '{}' from HuggingFace", filename))?;

    // hf-hub downloads to its own cache; copy to our cache location
    if downloaded != dest {
        std::fs::copy(&downloaded, dest).with_context(|| {
            format!(
                "Failed to copy model from {} to {}",
                downloaded.display(),
                dest.display()
            )
        })?;
    }

    log::info!("Model saved to {}", dest.display());
    Ok(())
}

#[cfg(not(feature = "download"))]
fn download_model(model_name: &str, _filename: &str, dest: &Path) -> Result<()> {
    anyhow::bail!(
        "Model '{}' is not cached at {} and downloading requires the 'download' feature. \
         Rebuild with: cargo build --features download, or pass a path to an ONNX file.",
        model_name,
        dest.display()
    )
}
