//! Evaluation losses for Text2Mel and PostNet outputs.
//!
//! Forward computation only. The guided attention penalty pushes alignments
//! towards the diagonal:
//!
//! ```text
//! W[n, t] = 1 - exp(-(n/Tx - t/Ty)² / (2g²))
//! loss    = mean(A ⊙ W)
//! ```

use candle_core::{DType, Device, Tensor};

use crate::Result;
use crate::config::SynthesisConfig;

/// Penalty matrix `[Tx, Ty]` for guided attention.
pub fn guided_attention_weights(text_len: usize, mel_len: usize, g: f64, device: &Device) -> Result<Tensor> {
    let mut weights = Vec::with_capacity(text_len * mel_len);
    for n in 0..text_len {
        for t in 0..mel_len {
            let offset = n as f64 / text_len as f64 - t as f64 / mel_len as f64;
            weights.push((1.0 - (-(offset * offset) / (2.0 * g * g)).exp()) as f32);
        }
    }
    Ok(Tensor::from_vec(weights, (text_len, mel_len), device)?)
}

/// [`guided_attention_weights`] with the width from `config.guided_attention_g`.
pub fn guided_attention_weights_for(
    config: &SynthesisConfig,
    text_len: usize,
    mel_len: usize,
    device: &Device,
) -> Result<Tensor> {
    guided_attention_weights(text_len, mel_len, config.guided_attention_g, device)
}

/// Mean of alignments `[N, Tx, Ty]` weighted by `[Tx, Ty]` penalties.
pub fn guided_attention_loss(alignments: &Tensor, weights: &Tensor) -> Result<Tensor> {
    let weights = weights.to_dtype(alignments.dtype())?;
    Ok(alignments.broadcast_mul(&weights)?.mean_all()?)
}

pub fn l1_loss(prediction: &Tensor, target: &Tensor) -> Result<Tensor> {
    Ok((prediction - target)?.abs()?.mean_all()?)
}

/// Mean binary cross-entropy between probabilities in `(0, 1)`.
pub fn binary_divergence(prediction: &Tensor, target: &Tensor) -> Result<Tensor> {
    let eps = 1e-7;
    let p = prediction.to_dtype(DType::F32)?.clamp(eps, 1.0 - eps)?;
    let target = target.to_dtype(DType::F32)?;
    let positive = (&target * p.log()?)?;
    let negative = (target.affine(-1.0, 1.0)? * p.affine(-1.0, 1.0)?.log()?)?;
    Ok((positive + negative)?.neg()?.mean_all()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(t: Tensor) -> f32 {
        t.to_scalar().unwrap()
    }

    #[test]
    fn diagonal_is_free() {
        let w = guided_attention_weights(4, 4, 0.2, &Device::Cpu).unwrap();
        let w: Vec<Vec<f32>> = w.to_vec2().unwrap();
        for i in 0..4 {
            assert!(w[i][i].abs() < 1e-7);
        }
        assert!(w[0][3] > 0.9);
        assert!(w[3][0] > 0.9);
    }

    #[test]
    fn diagonal_alignment_has_lower_loss() {
        let device = Device::Cpu;
        let w = guided_attention_weights(3, 3, 0.2, &device).unwrap();
        let diagonal = Tensor::eye(3, DType::F32, &device).unwrap().unsqueeze(0).unwrap();
        let reversed = Tensor::from_vec(
            vec![0f32, 0., 1., 0., 1., 0., 1., 0., 0.],
            (1, 3, 3),
            &device,
        )
        .unwrap();
        let low = scalar(guided_attention_loss(&diagonal, &w).unwrap());
        let high = scalar(guided_attention_loss(&reversed, &w).unwrap());
        assert!(low < 1e-7);
        assert!(high > low);
    }

    #[test]
    fn configured_width_controls_penalty() {
        let device = Device::Cpu;
        let narrow = SynthesisConfig {
            guided_attention_g: 0.1,
            ..Default::default()
        };
        let wide = SynthesisConfig {
            guided_attention_g: 0.5,
            ..Default::default()
        };
        let off_diagonal = |config: &SynthesisConfig| -> f32 {
            let w: Vec<Vec<f32>> = guided_attention_weights_for(config, 10, 10, &device)
                .unwrap()
                .to_vec2()
                .unwrap();
            w[0][2]
        };
        assert!(off_diagonal(&narrow) > off_diagonal(&wide));

        let default = guided_attention_weights_for(&SynthesisConfig::default(), 6, 8, &device).unwrap();
        let explicit = guided_attention_weights(6, 8, 0.2, &device).unwrap();
        let diff: f32 = (default - explicit).unwrap().abs().unwrap().max_all().unwrap().to_scalar().unwrap();
        assert_eq!(diff, 0.0);
    }

    #[test]
    fn l1_matches_manual() {
        let device = Device::Cpu;
        let a = Tensor::new(&[0.0f32, 1.0, 2.0], &device).unwrap();
        let b = Tensor::new(&[1.0f32, 1.0, 0.0], &device).unwrap();
        assert!((scalar(l1_loss(&a, &b).unwrap()) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn binary_divergence_is_small_for_match() {
        let device = Device::Cpu;
        let target = Tensor::new(&[0.0f32, 1.0, 1.0, 0.0], &device).unwrap();
        let good = Tensor::new(&[0.01f32, 0.99, 0.98, 0.02], &device).unwrap();
        let bad = Tensor::new(&[0.9f32, 0.1, 0.2, 0.8], &device).unwrap();
        let good_loss = scalar(binary_divergence(&good, &target).unwrap());
        let bad_loss = scalar(binary_divergence(&bad, &target).unwrap());
        assert!(good_loss < 0.05);
        assert!(bad_loss > good_loss);
    }
}
