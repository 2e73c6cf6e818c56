//! Causal audio encoder: previous mel frames → attention queries.
//!
//! ```text
//! [N, n_mels, T]
//!   → Conv1d(n_mels → d, k=1) + ReLU
//!   → 2 × Conv1d(d → d, k=1) + ReLU
//!   → 2 × [HC(d, k=3, dil=1), HC(dil=3), HC(dil=9), HC(dil=27)]
//!   → 2 × HC(d, k=3, dil=3)
//!   → Q [N, d, T]
//! ```

use candle_core::{Module, Tensor};
use candle_nn::VarBuilder;

use crate::Result;
use crate::model::layers::{BlockSpec, ConvSpec, ConvStack};

pub struct AudioEncoder {
    blocks: ConvStack,
}

impl AudioEncoder {
    pub fn block_specs(n_mels: usize, hidden_dim: usize) -> Vec<BlockSpec> {
        let mut specs = vec![BlockSpec::Conv(
            ConvSpec::new(n_mels, hidden_dim, 1).causal().relu(),
        )];
        for _ in 0..2 {
            specs.push(BlockSpec::Conv(
                ConvSpec::new(hidden_dim, hidden_dim, 1).causal().relu(),
            ));
        }
        for _ in 0..2 {
            for i in 0..4 {
                specs.push(BlockSpec::Highway(
                    ConvSpec::new(hidden_dim, hidden_dim, 3)
                        .dilation(3usize.pow(i))
                        .causal(),
                ));
            }
        }
        for _ in 0..2 {
            specs.push(BlockSpec::Highway(
                ConvSpec::new(hidden_dim, hidden_dim, 3).dilation(3).causal(),
            ));
        }
        specs
    }

    pub fn load(vb: VarBuilder, n_mels: usize, hidden_dim: usize) -> Result<Self> {
        let blocks = ConvStack::load(vb, &Self::block_specs(n_mels, hidden_dim))?;
        Ok(Self { blocks })
    }

    pub fn forward(&self, mel: &Tensor) -> Result<Tensor> {
        Ok(self.blocks.forward(mel)?)
    }
}
