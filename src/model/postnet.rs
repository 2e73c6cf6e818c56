//! PostNet: coarse mel frames → full-resolution linear magnitudes.
//!
//! ```text
//! [N, n_mels, T]
//!   → upsample ×2 (nearest) → ResidualBlock1d(n_mels → c, k=5)
//!   → upsample ×2 (nearest) → ResidualBlock1d(c → c, k=5)
//!   → ResidualBlock1d(c → n_mags, k=5)
//!   → sigmoid → [N, n_mags, 4T]
//! ```
//!
//! Weights live under `nets.{1,3,4}` (indices 0 and 2 are the parameterless
//! upsampling stages).

use candle_core::{Module, Tensor};
use candle_nn::{BatchNorm, Conv1d, Conv1dConfig, VarBuilder};

use crate::Result;

/// Time upsampling factor of the whole network.
pub const UPSAMPLE_FACTOR: usize = 4;

/// Conv → BN → ReLU → Conv → BN, plus shortcut, then ReLU.
///
/// The shortcut is a `k=1` convolution when the channel count changes.
struct ResidualBlock1d {
    conv1: Conv1d,
    bn1: BatchNorm,
    conv2: Conv1d,
    bn2: BatchNorm,
    shortcut: Option<Conv1d>,
}

impl ResidualBlock1d {
    fn load(vb: VarBuilder, in_channels: usize, out_channels: usize, kernel_size: usize) -> Result<Self> {
        let cfg = Conv1dConfig {
            padding: kernel_size / 2,
            ..Default::default()
        };
        let conv1 = candle_nn::conv1d(in_channels, out_channels, kernel_size, cfg, vb.pp("conv1"))?;
        let bn1 = candle_nn::batch_norm(out_channels, 1e-5, vb.pp("bn1"))?;
        let conv2 = candle_nn::conv1d(out_channels, out_channels, kernel_size, cfg, vb.pp("conv2"))?;
        let bn2 = candle_nn::batch_norm(out_channels, 1e-5, vb.pp("bn2"))?;
        let shortcut = if in_channels != out_channels {
            Some(candle_nn::conv1d(
                in_channels,
                out_channels,
                1,
                Conv1dConfig::default(),
                vb.pp("shortcut"),
            )?)
        } else {
            None
        };
        Ok(Self {
            conv1,
            bn1,
            conv2,
            bn2,
            shortcut,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let y = self.conv1.forward(x)?.apply_t(&self.bn1, false)?.relu()?;
        let y = self.conv2.forward(&y)?.apply_t(&self.bn2, false)?;
        let residual = match &self.shortcut {
            Some(conv) => conv.forward(x)?,
            None => x.clone(),
        };
        Ok((y + residual)?.relu()?)
    }
}

pub struct PostNet {
    block1: ResidualBlock1d,
    block2: ResidualBlock1d,
    block3: ResidualBlock1d,
}

impl PostNet {
    pub fn load(vb: VarBuilder, n_mels: usize, n_mags: usize, hidden_dim: usize) -> Result<Self> {
        let vb = vb.pp("nets");
        Ok(Self {
            block1: ResidualBlock1d::load(vb.pp("1"), n_mels, hidden_dim, 5)?,
            block2: ResidualBlock1d::load(vb.pp("3"), hidden_dim, hidden_dim, 5)?,
            block3: ResidualBlock1d::load(vb.pp("4"), hidden_dim, n_mags, 5)?,
        })
    }

    /// `[N, n_mels, T]` → `[N, n_mags, 4T]` with values in `(0, 1)`.
    pub fn forward(&self, mel: &Tensor) -> Result<Tensor> {
        let frames = mel.dim(2)?;
        let x = mel.upsample_nearest1d(frames * 2)?;
        let x = self.block1.forward(&x)?;
        let x = x.upsample_nearest1d(frames * 4)?;
        let x = self.block2.forward(&x)?;
        let x = self.block3.forward(&x)?;
        Ok(candle_nn::ops::sigmoid(&x)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn upsamples_time_by_four() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let postnet = PostNet::load(vb, 6, 9, 12).unwrap();
        let mel = Tensor::rand(0.0_f32, 1.0, (2, 6, 5), &device).unwrap();
        let mag = postnet.forward(&mel).unwrap();
        assert_eq!(mag.dims(), &[2, 9, 5 * UPSAMPLE_FACTOR]);
        let min: f32 = mag.min_all().unwrap().to_scalar().unwrap();
        let max: f32 = mag.max_all().unwrap().to_scalar().unwrap();
        assert!(min >= 0.0 && max <= 1.0);
    }

    #[test]
    fn shortcut_only_when_channels_change() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let _postnet = PostNet::load(vb, 6, 9, 12).unwrap();
        let data = varmap.data().lock().unwrap();
        assert!(data.contains_key("nets.1.shortcut.weight"));
        assert!(!data.contains_key("nets.3.shortcut.weight"));
        assert!(data.contains_key("nets.4.shortcut.weight"));
        assert!(data.contains_key("nets.3.bn2.running_var"));
    }

    #[test]
    fn residual_block_keeps_length() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let block = ResidualBlock1d::load(vb, 4, 4, 5).unwrap();
        let x = Tensor::randn(0.0_f32, 1.0, (1, 4, 13), &device).unwrap();
        assert_eq!(block.forward(&x).unwrap().dims(), &[1, 4, 13]);
    }
}
