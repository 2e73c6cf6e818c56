//! Hyperparameters for the Text2Mel / PostNet model pair.
//!
//! Defaults follow the published DCTTS setup (LJSpeech, 22.05 kHz).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Character vocabulary. `P` pads, `E` marks the end of the text.
pub const DEFAULT_VOCAB: &str = "PE abcdefghijklmnopqrstuvwxyz'.?";

/// Network dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub vocab: String,
    /// Character embedding size.
    pub embedding_dim: usize,
    /// Hidden size of the Text2Mel networks. The text encoder runs at `2 * hidden_dim`.
    pub hidden_dim: usize,
    /// Hidden size of the PostNet.
    pub postnet_dim: usize,
    pub n_mels: usize,
    /// Linear spectrogram bins (`n_fft / 2 + 1`).
    pub n_mags: usize,
    /// Time reduction factor between coarse mel frames and full STFT frames.
    pub reduction_factor: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            vocab: DEFAULT_VOCAB.to_string(),
            embedding_dim: 128,
            hidden_dim: 256,
            postnet_dim: 512,
            n_mels: 80,
            n_mags: 1025,
            reduction_factor: 4,
        }
    }
}

impl ModelConfig {
    pub fn vocab_size(&self) -> usize {
        self.vocab.chars().count()
    }
}

/// Signal processing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub win_length: usize,
    pub n_mels: usize,
    pub preemphasis: f64,
    pub ref_db: f64,
    pub max_db: f64,
    /// Exponent applied to magnitudes before Griffin-Lim.
    pub power: f64,
    pub griffin_lim_iters: usize,
    /// Leading and trailing audio quieter than this many dB below the
    /// loudest frame is cut after reconstruction. `None` keeps everything.
    pub trim_db: Option<f64>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            n_fft: 2048,
            hop_length: 275,
            win_length: 1100,
            n_mels: 80,
            preemphasis: 0.97,
            ref_db: 20.0,
            max_db: 100.0,
            power: 1.5,
            griffin_lim_iters: 50,
            trim_db: Some(60.0),
        }
    }
}

impl AudioConfig {
    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_fft == 0
            || self.hop_length == 0
            || self.win_length == 0
            || self.win_length > self.n_fft
        {
            return Err(Error::Config(format!(
                "invalid STFT geometry: n_fft={} win={} hop={}",
                self.n_fft, self.win_length, self.hop_length
            )));
        }
        if self.n_mels == 0 || self.sample_rate == 0 {
            return Err(Error::Config("n_mels and sample_rate must be non-zero".into()));
        }
        if let Some(top_db) = self.trim_db
            && (top_db.is_nan() || top_db <= 0.0)
        {
            return Err(Error::Config(format!("trim_db must be positive, got {top_db}")));
        }
        Ok(())
    }
}

/// Inference-time decoding options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Maximum number of characters, end-of-text marker included.
    pub max_text_len: usize,
    /// Maximum number of coarse mel frames to decode.
    pub max_mel_frames: usize,
    /// Force the attention argmax to move forward monotonically.
    pub monotonic_attention: bool,
    /// Allowed attention moves per frame, relative to the previous position.
    pub attention_back: usize,
    pub attention_forward: usize,
    /// Width of the guided attention penalty (`loss::guided_attention_weights_for`).
    pub guided_attention_g: f64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_text_len: 180,
            max_mel_frames: 210,
            monotonic_attention: true,
            attention_back: 1,
            attention_forward: 3,
            guided_attention_g: 0.2,
        }
    }
}

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub audio: AudioConfig,
    pub synthesis: SynthesisConfig,
}

impl Config {
    /// Load from JSON. Missing fields fall back to the defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let model = &self.model;
        let audio = &self.audio;
        audio.validate()?;
        if model.embedding_dim == 0 || model.hidden_dim == 0 || model.postnet_dim == 0 {
            return Err(Error::Config("network dimensions must be non-zero".into()));
        }
        let vocab: Vec<char> = model.vocab.chars().collect();
        if vocab.len() < 3 || vocab[0] != 'P' || vocab[1] != 'E' {
            return Err(Error::Config(format!(
                "vocab must start with 'P' (pad) and 'E' (end), got {:?}",
                model.vocab
            )));
        }
        // PostNet upsamples twice by 2.
        if model.reduction_factor != 4 {
            return Err(Error::Config(format!(
                "reduction_factor is {}, PostNet requires 4",
                model.reduction_factor
            )));
        }
        if model.n_mels != audio.n_mels {
            return Err(Error::Config(format!(
                "model n_mels {} differs from audio n_mels {}",
                model.n_mels, audio.n_mels
            )));
        }
        if model.n_mags != audio.n_bins() {
            return Err(Error::Config(format!(
                "n_mags is {}, expected n_fft/2+1 = {}",
                model.n_mags,
                audio.n_bins()
            )));
        }
        if self.synthesis.max_text_len < 2 || self.synthesis.max_mel_frames == 0 {
            return Err(Error::Config("synthesis limits must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.model.vocab_size(), 32);
        assert_eq!(cfg.audio.n_bins(), cfg.model.n_mags);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"model": {"hidden_dim": 64}, "synthesis": {"max_mel_frames": 50}}"#)
            .unwrap();
        let cfg = Config::from_json_file(&path).unwrap();
        assert_eq!(cfg.model.hidden_dim, 64);
        assert_eq!(cfg.model.embedding_dim, 128);
        assert_eq!(cfg.synthesis.max_mel_frames, 50);
        assert!(cfg.synthesis.monotonic_attention);
    }

    #[test]
    fn reduction_factor_must_match_postnet() {
        let mut cfg = Config::default();
        cfg.model.reduction_factor = 2;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn mismatched_bins_rejected() {
        let mut cfg = Config::default();
        cfg.audio.n_fft = 1024;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn audio_geometry_checked_on_its_own() {
        let audio = AudioConfig {
            hop_length: 0,
            ..Default::default()
        };
        assert!(audio.validate().is_err());
        let audio = AudioConfig {
            win_length: 4096,
            ..Default::default()
        };
        assert!(audio.validate().is_err());
        let audio = AudioConfig {
            trim_db: Some(0.0),
            ..Default::default()
        };
        assert!(audio.validate().is_err());
        assert!(AudioConfig { trim_db: None, ..Default::default() }.validate().is_ok());
    }

    #[test]
    fn vocab_needs_pad_and_end() {
        let mut cfg = Config::default();
        cfg.model.vocab = "abc".into();
        assert!(cfg.validate().is_err());
    }
}
