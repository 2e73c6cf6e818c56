//! Scaled dot-product attention between text and audio frames.
//!
//! ```text
//! Q' = tanh(linear_q(Q))      [N, d, T]
//! K' = tanh(linear_k(K))      [N, d, Tx]
//! V' = tanh(linear_v(V))      [N, d, Tx]
//! A  = softmax_Tx(K'^T Q' / sqrt(d))   [N, Tx, T]
//! R  = V' A                   [N, d, T]
//! ```
//!
//! The projections are plain `k=1` convolutions (no weight norm). Alignment
//! and read-out are exposed separately so the decoder loop can edit `A`
//! before reading.

use candle_core::{Module, Tensor};
use candle_nn::VarBuilder;

use crate::Result;
use crate::model::layers::{ConvSpec, PaddedConv1d};

pub struct DotProductAttention {
    linear_q: PaddedConv1d,
    linear_k: PaddedConv1d,
    linear_v: PaddedConv1d,
    scale: f64,
}

impl DotProductAttention {
    pub fn load(vb: VarBuilder, hidden_dim: usize) -> Result<Self> {
        let spec = ConvSpec::new(hidden_dim, hidden_dim, 1);
        Ok(Self {
            linear_q: PaddedConv1d::load(vb.pp("linear_q"), spec)?,
            linear_k: PaddedConv1d::load(vb.pp("linear_k"), spec)?,
            linear_v: PaddedConv1d::load(vb.pp("linear_v"), spec)?,
            scale: (hidden_dim as f64).sqrt(),
        })
    }

    /// Alignments `[N, Tx, T]` of queries `[N, d, T]` against keys `[N, d, Tx]`.
    ///
    /// Every column `A[b, :, t]` sums to 1.
    pub fn align(&self, queries: &Tensor, keys: &Tensor) -> Result<Tensor> {
        let q = self.linear_q.forward(queries)?.tanh()?;
        let k = self.linear_k.forward(keys)?.tanh()?;
        let scores = (k.transpose(1, 2)?.contiguous()?.matmul(&q.contiguous()?)? / self.scale)?;
        Ok(candle_nn::ops::softmax(&scores, 1)?)
    }

    /// Read values `[N, d, Tx]` through alignments `[N, Tx, T]` → `[N, d, T]`.
    pub fn read(&self, values: &Tensor, alignments: &Tensor) -> Result<Tensor> {
        let v = self.linear_v.forward(values)?.tanh()?;
        let alignments = alignments.to_dtype(v.dtype())?.contiguous()?;
        Ok(v.contiguous()?.matmul(&alignments)?)
    }

    /// Returns `(R, A)`.
    pub fn forward(&self, queries: &Tensor, keys: &Tensor, values: &Tensor) -> Result<(Tensor, Tensor)> {
        let alignments = self.align(queries, keys)?;
        let read = self.read(values, &alignments)?;
        Ok((read, alignments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn make_attention(device: &Device, dim: usize) -> DotProductAttention {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        DotProductAttention::load(vb, dim).unwrap()
    }

    #[test]
    fn output_shapes() {
        let device = Device::Cpu;
        let attention = make_attention(&device, 16);
        let q = Tensor::randn(0.0_f32, 1.0, (2, 16, 7), &device).unwrap();
        let k = Tensor::randn(0.0_f32, 1.0, (2, 16, 5), &device).unwrap();
        let v = Tensor::randn(0.0_f32, 1.0, (2, 16, 5), &device).unwrap();
        let (r, a) = attention.forward(&q, &k, &v).unwrap();
        assert_eq!(r.dims(), &[2, 16, 7]);
        assert_eq!(a.dims(), &[2, 5, 7]);
    }

    #[test]
    fn alignment_columns_sum_to_one() {
        let device = Device::Cpu;
        let attention = make_attention(&device, 8);
        let q = Tensor::randn(0.0_f32, 1.0, (3, 8, 6), &device).unwrap();
        let k = Tensor::randn(0.0_f32, 1.0, (3, 8, 4), &device).unwrap();
        let a = attention.align(&q, &k).unwrap();
        let sums: Vec<Vec<f32>> = a.sum(1).unwrap().to_vec2().unwrap();
        for row in sums {
            for s in row {
                assert!((s - 1.0).abs() < 1e-5, "column sum {s}");
            }
        }
    }

    #[test]
    fn one_hot_alignment_selects_text_position() {
        let device = Device::Cpu;
        let attention = make_attention(&device, 4);
        let v = Tensor::randn(0.0_f32, 1.0, (1, 4, 3), &device).unwrap();
        // Every frame attends to text position 2.
        let a = Tensor::from_vec(vec![0f32, 0., 0., 0., 1., 1.], (1, 3, 2), &device).unwrap();
        let r = attention.read(&v, &a).unwrap();
        let projected = attention.linear_v.forward(&v).unwrap().tanh().unwrap();
        let expected = projected.narrow(2, 2, 1).unwrap();
        for t in 0..2 {
            let diff: f32 = (r.narrow(2, t, 1).unwrap() - &expected)
                .unwrap()
                .abs()
                .unwrap()
                .max_all()
                .unwrap()
                .to_scalar()
                .unwrap();
            assert!(diff < 1e-6);
        }
    }
}
