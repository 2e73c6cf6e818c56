//! Causal audio decoder: attention read-out + queries → mel frames.
//!
//! ```text
//! cat(R, Q) [N, 2d, T]
//!   → Conv1d(2d → d, k=1) + ReLU
//!   → HC(d, k=3, dil=1), HC(dil=3), HC(dil=9), HC(dil=27)
//!   → 2 × HC(d, k=3, dil=1)
//!   → 3 × Conv1d(d → d, k=1) + ReLU
//!   → Conv1d(d → n_mels, k=1)
//!   → sigmoid → [N, n_mels, T]
//! ```

use candle_core::{Module, Tensor};
use candle_nn::VarBuilder;

use crate::Result;
use crate::model::layers::{BlockSpec, ConvSpec, ConvStack};

pub struct AudioDecoder {
    blocks: ConvStack,
}

impl AudioDecoder {
    pub fn block_specs(in_dim: usize, n_mels: usize, hidden_dim: usize) -> Vec<BlockSpec> {
        let mut specs = vec![BlockSpec::Conv(
            ConvSpec::new(in_dim, hidden_dim, 1).causal().relu(),
        )];
        for i in 0..4 {
            specs.push(BlockSpec::Highway(
                ConvSpec::new(hidden_dim, hidden_dim, 3)
                    .dilation(3usize.pow(i))
                    .causal(),
            ));
        }
        for _ in 0..2 {
            specs.push(BlockSpec::Highway(
                ConvSpec::new(hidden_dim, hidden_dim, 3).causal(),
            ));
        }
        for _ in 0..3 {
            specs.push(BlockSpec::Conv(
                ConvSpec::new(hidden_dim, hidden_dim, 1).causal().relu(),
            ));
        }
        specs.push(BlockSpec::Conv(ConvSpec::new(hidden_dim, n_mels, 1).causal()));
        specs
    }

    pub fn load(vb: VarBuilder, in_dim: usize, n_mels: usize, hidden_dim: usize) -> Result<Self> {
        let blocks = ConvStack::load(vb, &Self::block_specs(in_dim, n_mels, hidden_dim))?;
        Ok(Self { blocks })
    }

    /// Decode `cat(R, Q)` into mel frames in `(0, 1)`.
    pub fn forward(&self, read_and_queries: &Tensor) -> Result<Tensor> {
        let logits = self.blocks.forward(read_and_queries)?;
        Ok(candle_nn::ops::sigmoid(&logits)?)
    }
}
