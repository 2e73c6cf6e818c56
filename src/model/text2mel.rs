//! Text2Mel: character ids + previous mel frames → next mel frames.
//!
//! Checkpoint layout:
//!
//! ```text
//! embed.weight                     [vocab, e]
//! text_encoder.hc_blocks.{0..13}   weight-normalised
//! audio_encoder.hc_blocks.{0..12}  weight-normalised
//! attention.linear_{q,k,v}         plain k=1 convolutions
//! audio_decoder.hc_blocks.{0..10}  weight-normalised
//! ```

use candle_core::{Module, Tensor};
use candle_nn::{Embedding, VarBuilder};

use crate::Result;
use crate::config::ModelConfig;
use crate::model::attention::DotProductAttention;
use crate::model::decoder::AudioDecoder;
use crate::model::encoder::{AudioEncoder, TextEncoder};

/// Encoded text, computed once per utterance.
#[derive(Debug, Clone)]
pub struct TextMemory {
    /// `[N, d, Tx]`
    pub keys: Tensor,
    /// `[N, d, Tx]`
    pub values: Tensor,
}

pub struct Text2Mel {
    embed: Embedding,
    text_encoder: TextEncoder,
    audio_encoder: AudioEncoder,
    attention: DotProductAttention,
    audio_decoder: AudioDecoder,
    config: ModelConfig,
}

impl Text2Mel {
    pub fn load(vb: VarBuilder, config: &ModelConfig) -> Result<Self> {
        let d = config.hidden_dim;
        let embed = candle_nn::embedding(config.vocab_size(), config.embedding_dim, vb.pp("embed"))?;
        let text_encoder = TextEncoder::load(vb.pp("text_encoder"), config.embedding_dim, 2 * d)?;
        let audio_encoder = AudioEncoder::load(vb.pp("audio_encoder"), config.n_mels, d)?;
        let attention = DotProductAttention::load(vb.pp("attention"), d)?;
        let audio_decoder = AudioDecoder::load(vb.pp("audio_decoder"), 2 * d, config.n_mels, d)?;
        Ok(Self {
            embed,
            text_encoder,
            audio_encoder,
            attention,
            audio_decoder,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Encode ids `[N, Tx]` (u32) into attention keys and values.
    pub fn encode_text(&self, ids: &Tensor) -> Result<TextMemory> {
        // [N, Tx, e] → [N, e, Tx]
        let embedded = self.embed.forward(ids)?.transpose(1, 2)?.contiguous()?;
        let (keys, values) = self.text_encoder.forward(&embedded)?;
        Ok(TextMemory { keys, values })
    }

    /// Attention queries `[N, d, T]` for previous mel frames `[N, n_mels, T]`.
    pub fn encode_audio(&self, prev_mel: &Tensor) -> Result<Tensor> {
        self.audio_encoder.forward(prev_mel)
    }

    /// Alignments `[N, Tx, T]` of the queries against the text.
    pub fn align(&self, memory: &TextMemory, queries: &Tensor) -> Result<Tensor> {
        self.attention.align(queries, &memory.keys)
    }

    /// Decode mel frames `[N, n_mels, T]` from queries and (possibly edited) alignments.
    pub fn decode(&self, memory: &TextMemory, queries: &Tensor, alignments: &Tensor) -> Result<Tensor> {
        let read = self.attention.read(&memory.values, alignments)?;
        let input = Tensor::cat(&[&read, queries], 1)?;
        self.audio_decoder.forward(&input)
    }

    /// Parallel pass over known mel frames. Returns `(mel, alignments)`.
    ///
    /// Output frame `t` is the prediction that follows input frame `t`.
    pub fn forward(&self, ids: &Tensor, prev_mel: &Tensor) -> Result<(Tensor, Tensor)> {
        let memory = self.encode_text(ids)?;
        let queries = self.encode_audio(prev_mel)?;
        let alignments = self.align(&memory, &queries)?;
        let mel = self.decode(&memory, &queries, &alignments)?;
        Ok((mel, alignments))
    }
}
