//! 1-D convolution primitives shared by the Text2Mel networks.
//!
//! ```text
//! PaddedConv1d:   pad(x) → Conv1d → [ReLU]
//! HighwayConv1d:  pad(x) → Conv1d(c → 2c) → (h1, h2)
//!                 σ(h1) * h2 + (1 - σ(h1)) * x
//! ```
//!
//! Padding is applied explicitly before the convolution so that causal
//! layers only see the past: `Causal` pads `dilation * (k - 1)` frames on the
//! left and none on the right.
//!
//! Weight-normalised layers store `weight_g [out, 1, 1]` and
//! `weight_v [out, in, k]`; the effective kernel is `g * v / ||v||` with the
//! norm taken per output channel.

use candle_core::{D, Module, Tensor};
use candle_nn::{Conv1d, Conv1dConfig, Init, VarBuilder};

use crate::{Error, Result};

/// Where the receptive field of a convolution sits in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    /// Centred: output length equals input length.
    Same,
    /// Left-only: output frame `t` depends on input frames `<= t`.
    Causal,
}

impl Padding {
    /// `(left, right)` zero padding for a kernel with the given dilation.
    pub fn amounts(self, kernel_size: usize, dilation: usize) -> (usize, usize) {
        let total = dilation * kernel_size.saturating_sub(1);
        match self {
            Padding::Same => (total / 2, total - total / 2),
            Padding::Causal => (total, 0),
        }
    }
}

/// Shape and behaviour of a single convolution layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvSpec {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub dilation: usize,
    pub padding: Padding,
    pub relu: bool,
}

impl ConvSpec {
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel_size,
            dilation: 1,
            padding: Padding::Same,
            relu: false,
        }
    }

    pub fn dilation(mut self, dilation: usize) -> Self {
        self.dilation = dilation;
        self
    }

    pub fn causal(mut self) -> Self {
        self.padding = Padding::Causal;
        self
    }

    pub fn relu(mut self) -> Self {
        self.relu = true;
        self
    }
}

/// Effective kernel of a weight-normalised convolution.
fn weight_norm_kernel(
    vb: &VarBuilder,
    out_channels: usize,
    in_channels: usize,
    kernel_size: usize,
) -> Result<Tensor> {
    let weight_g = vb.get_with_hints((out_channels, 1, 1), "weight_g", Init::Const(1.0))?;
    let weight_v = vb.get_with_hints(
        (out_channels, in_channels, kernel_size),
        "weight_v",
        candle_nn::init::DEFAULT_KAIMING_NORMAL,
    )?;
    let norm_v = weight_v.sqr()?.sum_keepdim((1, 2))?.sqrt()?;
    Ok(weight_v.broadcast_mul(&weight_g)?.broadcast_div(&norm_v)?)
}

/// Convolution with explicit (same or causal) padding and optional ReLU.
#[derive(Debug, Clone)]
pub struct PaddedConv1d {
    conv: Conv1d,
    left_pad: usize,
    right_pad: usize,
    relu: bool,
}

impl PaddedConv1d {
    fn from_conv(conv: Conv1d, spec: ConvSpec) -> Self {
        let (left_pad, right_pad) = spec.padding.amounts(spec.kernel_size, spec.dilation);
        Self {
            conv,
            left_pad,
            right_pad,
            relu: spec.relu,
        }
    }

    fn conv_config(spec: ConvSpec) -> Conv1dConfig {
        Conv1dConfig {
            padding: 0,
            dilation: spec.dilation,
            ..Default::default()
        }
    }

    /// Load a weight-normalised layer (`weight_g`, `weight_v`, `bias`).
    pub fn load_weight_norm(vb: VarBuilder, spec: ConvSpec) -> Result<Self> {
        let weight = weight_norm_kernel(&vb, spec.out_channels, spec.in_channels, spec.kernel_size)?;
        let bias = vb.get_with_hints(spec.out_channels, "bias", Init::Const(0.0))?;
        let conv = Conv1d::new(weight, Some(bias), Self::conv_config(spec));
        Ok(Self::from_conv(conv, spec))
    }

    /// Load a plain layer (`weight`, `bias`).
    pub fn load(vb: VarBuilder, spec: ConvSpec) -> Result<Self> {
        let conv = candle_nn::conv1d(
            spec.in_channels,
            spec.out_channels,
            spec.kernel_size,
            Self::conv_config(spec),
            vb,
        )?;
        Ok(Self::from_conv(conv, spec))
    }
}

impl Module for PaddedConv1d {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let ys = if self.left_pad + self.right_pad > 0 {
            let padded = xs.pad_with_zeros(D::Minus1, self.left_pad, self.right_pad)?;
            self.conv.forward(&padded)?
        } else {
            self.conv.forward(xs)?
        };
        if self.relu { ys.relu() } else { Ok(ys) }
    }
}

/// Gated residual convolution (highway network over time).
#[derive(Debug, Clone)]
pub struct HighwayConv1d {
    conv: PaddedConv1d,
}

impl HighwayConv1d {
    /// Load a weight-normalised highway layer. `spec.out_channels` is the
    /// channel count of the output, the underlying convolution doubles it.
    pub fn load_weight_norm(vb: VarBuilder, spec: ConvSpec) -> Result<Self> {
        if spec.in_channels != spec.out_channels {
            return Err(Error::Config(format!(
                "highway layer needs equal in/out channels, got {} → {}",
                spec.in_channels, spec.out_channels
            )));
        }
        let inner = ConvSpec {
            out_channels: 2 * spec.out_channels,
            relu: false,
            ..spec
        };
        let conv = PaddedConv1d::load_weight_norm(vb, inner)?;
        Ok(Self { conv })
    }
}

impl Module for HighwayConv1d {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let h = self.conv.forward(xs)?;
        let chunks = h.chunk(2, 1)?;
        let gate = candle_nn::ops::sigmoid(&chunks[0])?;
        let carry = gate.affine(-1.0, 1.0)?;
        (gate * &chunks[1])? + (carry * xs)?
    }
}

/// One entry of a convolution stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSpec {
    Conv(ConvSpec),
    Highway(ConvSpec),
}

#[derive(Debug, Clone)]
enum ConvBlock {
    Conv(PaddedConv1d),
    Highway(HighwayConv1d),
}

impl Module for ConvBlock {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            ConvBlock::Conv(conv) => conv.forward(xs),
            ConvBlock::Highway(highway) => highway.forward(xs),
        }
    }
}

/// Sequence of weight-normalised blocks stored as `hc_blocks.{i}`.
#[derive(Debug, Clone)]
pub struct ConvStack {
    blocks: Vec<ConvBlock>,
}

impl ConvStack {
    pub fn load(vb: VarBuilder, specs: &[BlockSpec]) -> Result<Self> {
        let vb = vb.pp("hc_blocks");
        let mut blocks = Vec::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            let block = match *spec {
                BlockSpec::Conv(spec) => {
                    ConvBlock::Conv(PaddedConv1d::load_weight_norm(vb.pp(i.to_string()), spec)?)
                }
                BlockSpec::Highway(spec) => {
                    ConvBlock::Highway(HighwayConv1d::load_weight_norm(vb.pp(i.to_string()), spec)?)
                }
            };
            blocks.push(block);
        }
        Ok(Self { blocks })
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl Module for ConvStack {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let mut ys = xs.clone();
        for block in &self.blocks {
            ys = block.forward(&ys)?;
        }
        Ok(ys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn make_vb(device: &Device) -> (VarMap, VarBuilder<'static>) {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        (varmap, vb)
    }

    fn max_abs_diff(a: &Tensor, b: &Tensor) -> f32 {
        (a - b)
            .unwrap()
            .abs()
            .unwrap()
            .max_all()
            .unwrap()
            .to_scalar()
            .unwrap()
    }

    #[test]
    fn padding_amounts() {
        assert_eq!(Padding::Same.amounts(3, 1), (1, 1));
        assert_eq!(Padding::Same.amounts(3, 9), (9, 9));
        assert_eq!(Padding::Same.amounts(1, 27), (0, 0));
        assert_eq!(Padding::Causal.amounts(3, 3), (6, 0));
        assert_eq!(Padding::Causal.amounts(1, 1), (0, 0));
    }

    #[test]
    fn weight_norm_rows_have_gain_norm() {
        let device = Device::Cpu;
        let (_vm, vb) = make_vb(&device);
        let kernel = weight_norm_kernel(&vb, 4, 3, 5).unwrap();
        let norms: Vec<f32> = kernel
            .sqr()
            .unwrap()
            .sum((1, 2))
            .unwrap()
            .sqrt()
            .unwrap()
            .to_vec1()
            .unwrap();
        for n in norms {
            assert!((n - 1.0).abs() < 1e-4, "row norm {n}");
        }
    }

    #[test]
    fn same_conv_preserves_length() {
        let device = Device::Cpu;
        let (_vm, vb) = make_vb(&device);
        let conv = PaddedConv1d::load_weight_norm(vb, ConvSpec::new(6, 10, 3).dilation(3)).unwrap();
        let x = Tensor::randn(0.0_f32, 1.0, (2, 6, 17), &device).unwrap();
        assert_eq!(conv.forward(&x).unwrap().dims(), &[2, 10, 17]);
    }

    #[test]
    fn relu_output_is_non_negative() {
        let device = Device::Cpu;
        let (_vm, vb) = make_vb(&device);
        let conv = PaddedConv1d::load(vb, ConvSpec::new(4, 4, 1).relu()).unwrap();
        let x = Tensor::randn(0.0_f32, 1.0, (1, 4, 9), &device).unwrap();
        let min: f32 = conv.forward(&x).unwrap().min_all().unwrap().to_scalar().unwrap();
        assert!(min >= 0.0);
    }

    #[test]
    fn causal_conv_ignores_future() {
        let device = Device::Cpu;
        let (_vm, vb) = make_vb(&device);
        let conv =
            PaddedConv1d::load_weight_norm(vb, ConvSpec::new(3, 5, 3).dilation(9).causal()).unwrap();
        let x = Tensor::randn(0.0_f32, 1.0, (1, 3, 30), &device).unwrap();
        let tail = Tensor::randn(0.0_f32, 1.0, (1, 3, 10), &device).unwrap();
        let x2 = Tensor::cat(&[&x.narrow(2, 0, 20).unwrap(), &tail], 2).unwrap();
        let y = conv.forward(&x).unwrap().narrow(2, 0, 20).unwrap();
        let y2 = conv.forward(&x2).unwrap().narrow(2, 0, 20).unwrap();
        assert!(max_abs_diff(&y, &y2) < 1e-5);
    }

    #[test]
    fn highway_rejects_channel_change() {
        let device = Device::Cpu;
        let (_vm, vb) = make_vb(&device);
        assert!(HighwayConv1d::load_weight_norm(vb, ConvSpec::new(4, 8, 3)).is_err());
    }

    #[test]
    fn highway_with_zero_kernel_halves_input() {
        // h1 = 0 → σ = 0.5, h2 = 0 → output = 0.5 * x.
        let device = Device::Cpu;
        let weight = Tensor::zeros((8, 4, 3), DType::F32, &device).unwrap();
        let bias = Tensor::zeros(8, DType::F32, &device).unwrap();
        let spec = ConvSpec::new(4, 8, 3);
        let conv = PaddedConv1d::from_conv(
            Conv1d::new(weight, Some(bias), PaddedConv1d::conv_config(spec)),
            spec,
        );
        let highway = HighwayConv1d { conv };
        let x = Tensor::randn(0.0_f32, 1.0, (1, 4, 7), &device).unwrap();
        let y = highway.forward(&x).unwrap();
        let expected = (&x * 0.5).unwrap();
        assert!(max_abs_diff(&y, &expected) < 1e-6);
    }

    #[test]
    fn stack_names_blocks_sequentially() {
        let device = Device::Cpu;
        let (varmap, vb) = make_vb(&device);
        let specs = [
            BlockSpec::Conv(ConvSpec::new(3, 8, 1).relu()),
            BlockSpec::Highway(ConvSpec::new(8, 8, 3).dilation(3)),
        ];
        let stack = ConvStack::load(vb, &specs).unwrap();
        assert_eq!(stack.len(), 2);
        let data = varmap.data().lock().unwrap();
        assert!(data.contains_key("hc_blocks.0.weight_v"));
        assert!(data.contains_key("hc_blocks.1.weight_g"));
        assert_eq!(data["hc_blocks.1.weight_v"].dims(), &[16, 8, 3]);
    }
}
