use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "unmix", about = "Neural vocal/instrumental separation for stereo audio")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: Option<PathBuf>,

    /// Output directory for the separated stems
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Pretrained model name, or path to an exported ONNX file
    #[arg(short = 'P', long, default_value = "baseline")]
    pub model: String,

    /// Processing sample rate
    #[arg(short = 'r', long, default_value_t = 44100)]
    pub sr: u32,

    /// FFT size
    #[arg(short = 'f', long, default_value_t = 2048)]
    pub n_fft: usize,

    /// Hop length between analysis frames
    #[arg(short = 'H', long, default_value_t = 1024)]
    pub hop_length: usize,

    /// Spectrogram patches per model call
    #[arg(short = 'B', long, default_value_t = 4)]
    pub batchsize: usize,

    /// Model input width in spectrogram frames
    #[arg(short = 'c', long, default_value_t = 256)]
    pub cropsize: usize,

    /// Border frames the model crops from each side of its output
    #[arg(long, default_value_t = 64)]
    pub offset: usize,

    /// Merge fragmentary mask artifacts before reconstruction
    #[arg(short = 'p', long)]
    pub postprocess: bool,

    /// Run a second, half-window-shifted pass and average the masks
    #[arg(short = 't', long)]
    pub tta: bool,

    /// Also write the vocal stem
    #[arg(long)]
    pub output_vocals: bool,

    /// Inference device (cpu, cuda, auto)
    #[arg(long, default_value = "cpu")]
    pub device: String,

    /// Intra-op inference threads (0 = runtime default)
    #[arg(long, default_value_t = 0)]
    pub threads: usize,

    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,
}
