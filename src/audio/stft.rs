//! Centred short-time Fourier transform and its overlap-add inverse.
//!
//! - Window: periodic Hann of `win_length`, zero-padded to `n_fft` at the centre
//! - Padding: reflect, `n_fft / 2` on both sides (frame `t` is centred on sample `t * hop`)
//! - Frames: `1 + len / hop`
//! - Inverse: windowed overlap-add divided by the summed squared window

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::{Error, Result};

pub struct Stft {
    n_fft: usize,
    hop_length: usize,
    window: Vec<f64>,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl Stft {
    /// Requires `0 < win_length <= n_fft` and a non-zero hop.
    pub fn new(n_fft: usize, hop_length: usize, win_length: usize) -> Result<Self> {
        if hop_length == 0 || win_length == 0 || win_length > n_fft {
            return Err(Error::Audio(format!(
                "invalid STFT geometry: n_fft={n_fft} win={win_length} hop={hop_length}"
            )));
        }
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(n_fft);
        let inverse = planner.plan_fft_inverse(n_fft);
        Ok(Self {
            n_fft,
            hop_length,
            window: centred_hann_window(win_length, n_fft),
            forward,
            inverse,
        })
    }

    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Number of frames produced for a signal of `len` samples.
    pub fn num_frames(&self, len: usize) -> usize {
        1 + len / self.hop_length
    }

    /// One-sided spectrum per frame: `[frames][n_fft / 2 + 1]`.
    pub fn forward(&self, signal: &[f64]) -> Vec<Vec<Complex<f64>>> {
        if signal.is_empty() {
            return Vec::new();
        }
        let n_fft = self.n_fft;
        let pad = n_fft / 2;
        let num_frames = self.num_frames(signal.len());
        let mut frames = Vec::with_capacity(num_frames);

        let mut buffer = vec![Complex::new(0.0, 0.0); n_fft];
        for frame_idx in 0..num_frames {
            let start = (frame_idx * self.hop_length) as isize - pad as isize;
            for (i, slot) in buffer.iter_mut().enumerate() {
                let sample = signal[reflect_index(start + i as isize, signal.len())];
                *slot = Complex::new(sample * self.window[i], 0.0);
            }
            self.forward.process(&mut buffer);
            frames.push(buffer[..self.n_bins()].to_vec());
        }
        frames
    }

    /// Overlap-add inverse of [`Stft::forward`], trimmed to `length` samples.
    pub fn inverse(&self, frames: &[Vec<Complex<f64>>], length: usize) -> Vec<f64> {
        let n_fft = self.n_fft;
        let hop = self.hop_length;
        let pad = n_fft / 2;
        let total = n_fft + hop * frames.len().saturating_sub(1);
        let mut signal = vec![0.0; total];
        let mut window_sum = vec![0.0; total];

        let mut buffer = vec![Complex::new(0.0, 0.0); n_fft];
        for (frame_idx, spectrum) in frames.iter().enumerate() {
            // Rebuild the Hermitian full spectrum.
            for (k, slot) in buffer.iter_mut().enumerate() {
                let mirrored = if k <= n_fft / 2 { k } else { n_fft - k };
                let value = spectrum.get(mirrored).copied().unwrap_or_default();
                *slot = if k <= n_fft / 2 { value } else { value.conj() };
            }
            self.inverse.process(&mut buffer);

            let offset = frame_idx * hop;
            for i in 0..n_fft {
                let w = self.window[i];
                signal[offset + i] += buffer[i].re / n_fft as f64 * w;
                window_sum[offset + i] += w * w;
            }
        }

        for (s, &w) in signal.iter_mut().zip(&window_sum) {
            if w > 1e-10 {
                *s /= w;
            }
        }

        let mut out: Vec<f64> = signal.into_iter().skip(pad).take(length).collect();
        out.resize(length, 0.0);
        out
    }
}

/// Periodic Hann window of `win_length`, centred inside `n_fft` zeros.
fn centred_hann_window(win_length: usize, n_fft: usize) -> Vec<f64> {
    let mut window = vec![0.0; n_fft];
    let offset = (n_fft - win_length) / 2;
    for i in 0..win_length {
        let phase = 2.0 * std::f64::consts::PI * i as f64 / win_length as f64;
        window[offset + i] = 0.5 * (1.0 - phase.cos());
    }
    window
}

/// Mirror an out-of-range index back into `[0, len)` without repeating the edge.
fn reflect_index(mut idx: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    loop {
        if idx < 0 {
            idx = -idx;
        } else if idx > last {
            idx = 2 * last - idx;
        } else {
            return idx as usize;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflect_index_mirrors() {
        assert_eq!(reflect_index(-1, 5), 1);
        assert_eq!(reflect_index(-2, 5), 2);
        assert_eq!(reflect_index(5, 5), 3);
        assert_eq!(reflect_index(6, 5), 2);
        assert_eq!(reflect_index(-7, 3), 1);
        assert_eq!(reflect_index(4, 1), 0);
    }

    #[test]
    fn window_is_centred() {
        let w = centred_hann_window(6, 10);
        assert_eq!(w.len(), 10);
        assert_eq!(w[0], 0.0);
        assert_eq!(w[1], 0.0);
        assert!(w[2].abs() < 1e-12);
        assert!((w[5] - 1.0).abs() < 1e-12);
        assert_eq!(w[9], 0.0);
    }

    #[test]
    fn frame_count() {
        let stft = Stft::new(64, 16, 64).unwrap();
        let frames = stft.forward(&vec![0.1; 160]);
        assert_eq!(frames.len(), 11);
        assert_eq!(frames[0].len(), 33);
    }

    #[test]
    fn inverse_reconstructs_signal() {
        let stft = Stft::new(64, 16, 64).unwrap();
        let signal: Vec<f64> = (0..400)
            .map(|i| (2.0 * std::f64::consts::PI * 5.0 * i as f64 / 64.0).sin())
            .collect();
        let frames = stft.forward(&signal);
        let rebuilt = stft.inverse(&frames, signal.len());
        assert_eq!(rebuilt.len(), signal.len());
        for (a, b) in signal.iter().zip(&rebuilt).skip(32).take(300) {
            assert!((a - b).abs() < 1e-6, "{a} vs {b}");
        }
    }

    #[test]
    fn degenerate_geometry_rejected() {
        assert!(Stft::new(64, 0, 64).is_err());
        assert!(Stft::new(64, 16, 128).is_err());
        assert!(Stft::new(64, 16, 0).is_err());
    }

    #[test]
    fn empty_signal_has_no_frames() {
        let stft = Stft::new(64, 16, 32).unwrap();
        assert!(stft.forward(&[]).is_empty());
    }
}
