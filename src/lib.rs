//! Deep Convolutional TTS in pure Rust.
//!
//! A candle-based implementation of the DCTTS text-to-speech model: a fully
//! convolutional Text2Mel network with dot-product attention, followed by a
//! PostNet that upsamples coarse mel frames into linear magnitudes. Loads
//! safetensors weights directly.
//!
//! ## Architecture
//!
//! ```text
//! text → vocab ids → Embedding → TextEncoder ──→ K, V
//!                                                  │
//! previous mel → AudioEncoder (causal) → Q ──→ DotProductAttention → R
//!                                                  │
//!                          cat(R, Q) → AudioDecoder (causal) → mel  [n_mels, T]
//!                                                  ↓
//!                                  PostNet (×4 in time) → mag  [n_mags, 4T]
//!                                                  ↓
//!                                         Griffin-Lim → waveform
//! ```
//!
//! ## Modules
//!
//! - [`model`]: layers, encoders, attention, decoder, PostNet
//! - [`synthesis`]: autoregressive decoding and the end-to-end pipeline
//! - [`text`]: character normalisation and vocabulary
//! - [`audio`]: STFT, spectrograms, Griffin-Lim, WAV I/O
//! - [`loss`]: guided attention and reconstruction losses
//! - [`config`]: hyperparameters

pub mod audio;
pub mod config;
pub mod loss;
pub mod model;
pub mod synthesis;
pub mod text;

mod error;

pub use error::{Error, Result};
