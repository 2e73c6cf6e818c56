//! Model components for DCTTS.
//!
//! ## Components
//!
//! - [`layers`]: padded / causal / highway 1-D convolutions with weight norm
//! - [`encoder`]: text encoder (keys, values) and causal audio encoder (queries)
//! - [`attention`]: dot-product attention aligning text and audio frames
//! - [`decoder`]: causal audio decoder producing coarse mel frames
//! - [`text2mel`]: the four networks above plus the character embedding
//! - [`postnet`]: mel → linear magnitude upsampling network

pub mod attention;
pub mod decoder;
pub mod encoder;
pub mod layers;
pub mod postnet;
pub mod text2mel;

pub use attention::DotProductAttention;
pub use decoder::AudioDecoder;
pub use encoder::{AudioEncoder, TextEncoder};
pub use postnet::PostNet;
pub use text2mel::{Text2Mel, TextMemory};
