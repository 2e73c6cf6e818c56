//! Encoders for the Text2Mel network.
//!
//! - [`text`]: non-causal text encoder producing attention keys and values
//! - [`audio`]: causal audio encoder producing attention queries

pub mod audio;
pub mod text;

pub use audio::AudioEncoder;
pub use text::TextEncoder;
