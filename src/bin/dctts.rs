//! DCTTS command-line synthesis.
//!
//! Synthesizes one utterance from Text2Mel and PostNet safetensors
//! checkpoints and writes a mono 16-bit WAV file.
//!
//! # Output
//!
//! Prints a one-line JSON summary to stdout on success:
//!
//! ```json
//! {"path":"/tmp/speech.wav","duration_s":2.1,"sample_rate":22050,"mel_frames":42}
//! ```

use std::path::PathBuf;

use clap::Parser;
use dctts_rs::audio::{peak_normalize, write_wav_mono};
use dctts_rs::config::Config;
use dctts_rs::synthesis::Synthesizer;

#[derive(Parser, Debug)]
#[command(
    name = "dctts",
    about = "DCTTS text-to-speech synthesis",
    long_about = "Synthesize speech from text with a Text2Mel + PostNet model pair.\n\
                  The output is written to --output; a JSON summary line is printed to stdout."
)]
struct Args {
    /// Text to speak.
    #[arg(long, short = 't')]
    text: String,

    /// Text2Mel checkpoint (safetensors).
    #[arg(long)]
    text2mel: PathBuf,

    /// PostNet checkpoint (safetensors).
    #[arg(long)]
    postnet: PathBuf,

    /// JSON hyperparameter file. Defaults are used when omitted.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Output WAV path.
    #[arg(long, short = 'o')]
    output: PathBuf,

    /// Override the maximum number of coarse mel frames.
    #[arg(long)]
    max_frames: Option<usize>,

    /// Disable forced monotonic attention.
    #[arg(long)]
    no_monotonic: bool,

    /// Run on CPU even when CUDA is available.
    #[arg(long)]
    cpu: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_json_file(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {e}", path.display()))?,
        None => Config::default(),
    };
    if let Some(max_frames) = args.max_frames {
        if max_frames == 0 {
            anyhow::bail!("--max-frames must be positive");
        }
        config.synthesis.max_mel_frames = max_frames;
    }
    if args.no_monotonic {
        config.synthesis.monotonic_attention = false;
    }

    if let Some(parent) = args.output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let device = if args.cpu {
        candle_core::Device::Cpu
    } else {
        candle_core::Device::cuda_if_available(0)?
    };
    let dtype = candle_core::DType::F32;
    tracing::info!("Using device: {:?}", device);

    let synthesizer = Synthesizer::load(&args.text2mel, &args.postnet, config, &device, dtype)
        .map_err(|e| anyhow::anyhow!("failed to load model: {e}"))?;

    let mut output = synthesizer
        .synthesize(&args.text)
        .map_err(|e| anyhow::anyhow!("synthesis failed: {e}"))?;
    peak_normalize(&mut output.samples, 0.95);

    write_wav_mono(&args.output, &output.samples, output.sample_rate)
        .map_err(|e| anyhow::anyhow!("failed to write audio: {e}"))?;

    let duration_s = output.samples.len() as f64 / output.sample_rate as f64;
    let summary = serde_json::json!({
        "path": args.output.display().to_string(),
        "duration_s": (duration_s * 100.0).round() / 100.0,
        "sample_rate": output.sample_rate,
        "mel_frames": output.mel_frames,
    });
    println!("{summary}");

    Ok(())
}
