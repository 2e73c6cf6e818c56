//! Text encoder: character embeddings → (keys, values).
//!
//! ```text
//! [N, e, Tx]
//!   → Conv1d(e → 2d, k=1) + ReLU
//!   → Conv1d(2d → 2d, k=1)
//!   → 2 × [HC(2d, k=3, dil=1), HC(dil=3), HC(dil=9), HC(dil=27)]
//!   → 2 × HC(2d, k=3, dil=1)
//!   → 2 × HC(2d, k=1, dil=1)
//!   → split channels → K [N, d, Tx], V [N, d, Tx]
//! ```
//!
//! All layers are weight-normalised and non-causal.

use candle_core::{Module, Tensor};
use candle_nn::VarBuilder;

use crate::Result;
use crate::model::layers::{BlockSpec, ConvSpec, ConvStack};

pub struct TextEncoder {
    blocks: ConvStack,
}

impl TextEncoder {
    /// Block layout for an `in_dim` embedding and a `hidden_dim = 2d` stack.
    pub fn block_specs(in_dim: usize, hidden_dim: usize) -> Vec<BlockSpec> {
        let mut specs = vec![
            BlockSpec::Conv(ConvSpec::new(in_dim, hidden_dim, 1).relu()),
            BlockSpec::Conv(ConvSpec::new(hidden_dim, hidden_dim, 1)),
        ];
        for _ in 0..2 {
            for i in 0..4 {
                specs.push(BlockSpec::Highway(
                    ConvSpec::new(hidden_dim, hidden_dim, 3).dilation(3usize.pow(i)),
                ));
            }
        }
        for _ in 0..2 {
            specs.push(BlockSpec::Highway(ConvSpec::new(hidden_dim, hidden_dim, 3)));
        }
        for _ in 0..2 {
            specs.push(BlockSpec::Highway(ConvSpec::new(hidden_dim, hidden_dim, 1)));
        }
        specs
    }

    pub fn load(vb: VarBuilder, in_dim: usize, hidden_dim: usize) -> Result<Self> {
        if hidden_dim % 2 != 0 {
            return Err(crate::Error::Config(format!(
                "text encoder hidden size must be even to split into keys and values, got {hidden_dim}"
            )));
        }
        let blocks = ConvStack::load(vb, &Self::block_specs(in_dim, hidden_dim))?;
        Ok(Self { blocks })
    }

    /// Encode embedded text `[N, e, Tx]` into `(keys, values)`, each `[N, d, Tx]`.
    pub fn forward(&self, embedded: &Tensor) -> Result<(Tensor, Tensor)> {
        let y = self.blocks.forward(embedded)?;
        let mut halves = y.chunk(2, 1)?.into_iter();
        match (halves.next(), halves.next()) {
            (Some(keys), Some(values)) => Ok((keys, values)),
            _ => Err(crate::Error::Config(
                "text encoder output could not be split in two".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn block_layout() {
        let specs = TextEncoder::block_specs(128, 512);
        assert_eq!(specs.len(), 14);
        let dilations: Vec<usize> = specs[2..10]
            .iter()
            .map(|s| match s {
                BlockSpec::Highway(c) => c.dilation,
                BlockSpec::Conv(_) => panic!("expected highway block"),
            })
            .collect();
        assert_eq!(dilations, vec![1, 3, 9, 27, 1, 3, 9, 27]);
        assert!(matches!(specs[13], BlockSpec::Highway(c) if c.kernel_size == 1));
    }

    #[test]
    fn keys_and_values_split_channels() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let encoder = TextEncoder::load(vb, 8, 32).unwrap();
        let x = Tensor::randn(0.0_f32, 1.0, (2, 8, 11), &device).unwrap();
        let (k, v) = encoder.forward(&x).unwrap();
        assert_eq!(k.dims(), &[2, 16, 11]);
        assert_eq!(v.dims(), &[2, 16, 11]);
    }

    #[test]
    fn odd_hidden_size_rejected() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        assert!(TextEncoder::load(vb, 8, 31).is_err());
    }
}
