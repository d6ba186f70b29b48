use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub stft: StftConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub name: String,
    #[serde(default = "default_batchsize")]
    pub batchsize: usize,
    #[serde(default = "default_cropsize")]
    pub cropsize: usize,
    #[serde(default = "default_offset")]
    pub offset: usize,
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default)]
    pub threads: usize,
}

#[derive(Debug, Deserialize)]
pub struct StftConfig {
    #[serde(default = "default_sr")]
    pub sr: u32,
    #[serde(default = "default_n_fft")]
    pub n_fft: usize,
    #[serde(default = "default_hop_length")]
    pub hop_length: usize,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub vocals: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            batchsize: default_batchsize(),
            cropsize: default_cropsize(),
            offset: default_offset(),
            device: default_device(),
            threads: 0,
        }
    }
}

impl Default for StftConfig {
    fn default() -> Self {
        Self {
            sr: default_sr(),
            n_fft: default_n_fft(),
            hop_length: default_hop_length(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            vocals: false,
        }
    }
}

fn default_model() -> String { "baseline".into() }
fn default_batchsize() -> usize { 4 }
fn default_cropsize() -> usize { 256 }
fn default_offset() -> usize { 64 }
fn default_device() -> String { "cpu".into() }
fn default_sr() -> u32 { 44100 }
fn default_n_fft() -> usize { 2048 }
fn default_hop_length() -> usize { 1024 }
fn default_output_dir() -> PathBuf { ".".into() }

pub fn load_config(path: &PathBuf) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}
