//! End-to-end inference.
//!
//! 1. Normalise and encode text
//! 2. Encode text once into attention keys/values
//! 3. Decode mel frames autoregressively, one frame per step, starting from
//!    a zero frame (optionally forcing monotonic attention)
//! 4. Upsample to linear magnitudes (PostNet)
//! 5. Griffin-Lim → waveform

use std::path::Path;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;

use crate::audio::SpectrogramProcessor;
use crate::config::{Config, SynthesisConfig};
use crate::model::{PostNet, Text2Mel};
use crate::text::{END_ID, TextProcessor, pad_batch};
use crate::{Error, Result};

/// Output of the Text2Mel decoding loop.
#[derive(Debug, Clone)]
pub struct MelOutput {
    /// `[N, n_mels, T]`
    pub mel: Tensor,
    /// `[N, Tx, T]`, as used for decoding (after any monotonic correction)
    pub alignments: Tensor,
    /// Number of decoded frames `T`.
    pub frames: usize,
}

/// Synthesised audio.
#[derive(Debug, Clone)]
pub struct SynthesisOutput {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub mel_frames: usize,
}

/// Tracks the attended text position of every batch item between steps.
#[derive(Debug, Clone)]
struct AttentionCursor {
    /// `-1` before the first frame, so frame 0 may attend to `0..=forward - 1`.
    positions: Vec<isize>,
    text_lengths: Vec<usize>,
}

impl AttentionCursor {
    fn new(text_lengths: Vec<usize>) -> Self {
        Self {
            positions: vec![-1; text_lengths.len()],
            text_lengths,
        }
    }

    /// Update positions from the newest alignment column `[N][Tx]`, forcing
    /// the argmax into the allowed window when `monotonic` is set.
    ///
    /// Returns `true` when some column was replaced by a one-hot vector.
    fn advance(&mut self, column: &mut [Vec<f32>], config: &SynthesisConfig) -> bool {
        let back = config.attention_back as isize;
        let forward = config.attention_forward as isize;
        let mut edited = false;
        for (b, weights) in column.iter_mut().enumerate() {
            let attended = argmax(weights) as isize;
            let prev = self.positions[b];
            let last = self.text_lengths[b].saturating_sub(1) as isize;
            let in_window = attended >= prev - back && attended <= prev + forward;
            let position = if config.monotonic_attention && !in_window {
                let forced = (prev + 1).clamp(0, last);
                weights.iter_mut().for_each(|w| *w = 0.0);
                weights[forced as usize] = 1.0;
                edited = true;
                forced
            } else {
                attended
            };
            self.positions[b] = position;
        }
        edited
    }

    fn finished(&self) -> bool {
        self.positions
            .iter()
            .zip(&self.text_lengths)
            .all(|(&pos, &len)| pos + 1 >= len as isize)
    }
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0
}

pub struct Synthesizer {
    text2mel: Text2Mel,
    postnet: PostNet,
    text: TextProcessor,
    spectrogram: SpectrogramProcessor,
    config: Config,
    device: Device,
}

impl Synthesizer {
    pub fn new(text2mel: Text2Mel, postnet: PostNet, config: Config, device: &Device) -> Result<Self> {
        config.validate()?;
        Self::assemble(text2mel, postnet, config, device)
    }

    /// Build from parts with an already validated `config`.
    fn assemble(text2mel: Text2Mel, postnet: PostNet, config: Config, device: &Device) -> Result<Self> {
        Ok(Self {
            text2mel,
            postnet,
            text: TextProcessor::from_config(&config),
            spectrogram: SpectrogramProcessor::new(config.audio.clone())?,
            config,
            device: device.clone(),
        })
    }

    /// Load both networks from safetensors checkpoints.
    pub fn load(
        text2mel_path: &Path,
        postnet_path: &Path,
        config: Config,
        device: &Device,
        dtype: DType,
    ) -> Result<Self> {
        config.validate()?;
        let model = &config.model;

        tracing::info!("Loading Text2Mel weights from {:?}", text2mel_path);
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[text2mel_path], dtype, device)
                .map_err(|e| Error::WeightLoad(format!("Text2Mel weights: {e}")))?
        };
        let text2mel = Text2Mel::load(vb, model)
            .map_err(|e| Error::WeightLoad(format!("Text2Mel model init: {e}")))?;

        tracing::info!("Loading PostNet weights from {:?}", postnet_path);
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[postnet_path], dtype, device)
                .map_err(|e| Error::WeightLoad(format!("PostNet weights: {e}")))?
        };
        let postnet = PostNet::load(vb, model.n_mels, model.n_mags, model.postnet_dim)
            .map_err(|e| Error::WeightLoad(format!("PostNet model init: {e}")))?;

        tracing::info!("Synthesizer loaded successfully");
        Self::assemble(text2mel, postnet, config, device)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn text_processor(&self) -> &TextProcessor {
        &self.text
    }

    /// Encode a batch of texts into padded ids `[N, Tx]`.
    pub fn encode_batch(&self, texts: &[&str]) -> Result<Tensor> {
        let sequences = texts
            .iter()
            .map(|t| self.text.encode(t))
            .collect::<Result<Vec<_>>>()?;
        let (flat, width) = pad_batch(&sequences);
        Ok(Tensor::from_vec(flat, (sequences.len(), width), &self.device)?)
    }

    /// Autoregressive mel decoding for ids `[N, Tx]`.
    pub fn text_to_mel(&self, ids: &Tensor) -> Result<MelOutput> {
        let (batch, _text_len) = ids.dims2()?;
        let synthesis = &self.config.synthesis;
        let n_mels = self.config.model.n_mels;

        let text_lengths = ids
            .to_vec2::<u32>()?
            .iter()
            .map(|row| row.iter().position(|&id| id == END_ID).map_or(row.len(), |p| p + 1))
            .collect();
        let mut cursor = AttentionCursor::new(text_lengths);

        let memory = self.text2mel.encode_text(ids)?;
        let dtype = memory.keys.dtype();

        // Inputs: a zero frame followed by every frame decoded so far.
        let mut inputs = Tensor::zeros((batch, n_mels, 1), dtype, &self.device)?;
        let mut alignments: Option<Tensor> = None;
        let mut frames = 0;

        let started = Instant::now();
        for step in 0..synthesis.max_mel_frames {
            let queries = self.text2mel.encode_audio(&inputs)?;
            let fresh = self.text2mel.align(&memory, &queries)?;

            // Replace all but the newest column with the ones used before.
            let newest = fresh.narrow(2, step, 1)?;
            let mut column: Vec<Vec<f32>> = newest.squeeze(2)?.to_dtype(DType::F32)?.to_vec2()?;
            let edited = cursor.advance(&mut column, synthesis);
            let newest = if edited {
                let flat: Vec<f32> = column.into_iter().flatten().collect();
                let width = newest.dim(1)?;
                Tensor::from_vec(flat, (batch, width, 1), &self.device)?.to_dtype(fresh.dtype())?
            } else {
                newest
            };
            let current = match &alignments {
                Some(previous) => Tensor::cat(&[previous, &newest], 2)?,
                None => newest,
            };

            let mel = self.text2mel.decode(&memory, &queries, &current)?;
            let next_frame = mel.narrow(2, step, 1)?;
            inputs = Tensor::cat(&[&inputs, &next_frame], 2)?;
            alignments = Some(current);
            frames = step + 1;

            tracing::debug!(step, positions = ?cursor.positions, edited, "decoded mel frame");
            if cursor.finished() {
                break;
            }
        }

        let alignments = alignments.ok_or_else(|| Error::Config("max_mel_frames must be positive".into()))?;
        tracing::info!(
            "Decoded {frames} mel frames in {:.2}s",
            started.elapsed().as_secs_f64()
        );

        Ok(MelOutput {
            mel: inputs.narrow(2, 1, frames)?,
            alignments,
            frames,
        })
    }

    /// PostNet: `[N, n_mels, T]` → `[N, n_mags, 4T]`.
    pub fn mel_to_magnitude(&self, mel: &Tensor) -> Result<Tensor> {
        self.postnet.forward(mel)
    }

    /// Full pipeline for a single utterance.
    pub fn synthesize(&self, text: &str) -> Result<SynthesisOutput> {
        let ids = self.encode_batch(&[text])?;
        tracing::info!("Synthesizing {:?} ({} symbols)", self.text.normalize(text), ids.dim(1)?);

        let mel = self.text_to_mel(&ids)?;
        let magnitude = self.mel_to_magnitude(&mel.mel)?;
        let magnitude: Vec<Vec<f32>> = magnitude.squeeze(0)?.to_dtype(DType::F32)?.to_vec2()?;

        let started = Instant::now();
        let samples = self.spectrogram.magnitude_to_wav(&magnitude)?;
        tracing::info!("Griffin-Lim: {:.2}s", started.elapsed().as_secs_f64());

        Ok(SynthesisOutput {
            samples,
            sample_rate: self.config.audio.sample_rate,
            mel_frames: mel.frames,
        })
    }
}
