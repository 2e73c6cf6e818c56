//! Normalised log spectrograms and Griffin-Lim reconstruction.
//!
//! Analysis (training targets):
//!
//! ```text
//! wav → pre-emphasis → |STFT| ─────────────→ dB → normalise → mag  [n_bins][T]
//!                             └→ mel filterbank → dB → normalise → mel  [n_mels][T]
//! dB        = 20 * log10(max(1e-5, x))
//! normalise = clamp((dB - ref_db + max_db) / max_db, 1e-8, 1)
//! ```
//!
//! Synthesis inverts the normalisation, sharpens by `power`, runs
//! Griffin-Lim starting from zero phase and trims silence at both ends.

use rustfft::num_complex::Complex;

use super::stft::Stft;
use crate::config::AudioConfig;
use crate::{Error, Result};

/// Mel and linear spectrograms of one utterance, `[bins][frames]`.
#[derive(Debug, Clone)]
pub struct Spectrograms {
    pub mel: Vec<Vec<f32>>,
    pub mag: Vec<Vec<f32>>,
}

pub struct SpectrogramProcessor {
    config: AudioConfig,
    stft: Stft,
    filterbank: Vec<Vec<f64>>,
}

impl SpectrogramProcessor {
    pub fn new(config: AudioConfig) -> Result<Self> {
        config.validate()?;
        let stft = Stft::new(config.n_fft, config.hop_length, config.win_length)?;
        let filterbank = mel_filterbank(
            config.n_fft,
            config.n_mels,
            config.sample_rate,
            0.0,
            config.sample_rate as f64 / 2.0,
        );
        Ok(Self {
            config,
            stft,
            filterbank,
        })
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    pub fn analyze(&self, samples: &[f32]) -> Spectrograms {
        let emphasized = preemphasis(samples, self.config.preemphasis);
        let frames = self.stft.forward(&emphasized);
        let num_frames = frames.len();
        let n_bins = self.stft.n_bins();

        let mut mag = vec![vec![0.0f32; num_frames]; n_bins];
        let mut mel = vec![vec![0.0f32; num_frames]; self.config.n_mels];
        for (t, spectrum) in frames.iter().enumerate() {
            let magnitudes: Vec<f64> = spectrum.iter().map(|c| c.norm()).collect();
            for (bin, &m) in magnitudes.iter().enumerate() {
                mag[bin][t] = self.normalize_db(amplitude_to_db(m));
            }
            for (mel_idx, filter) in self.filterbank.iter().enumerate() {
                let energy: f64 = filter
                    .iter()
                    .zip(&magnitudes)
                    .filter(|(w, _)| **w > 0.0)
                    .map(|(w, m)| w * m)
                    .sum();
                mel[mel_idx][t] = self.normalize_db(amplitude_to_db(energy));
            }
        }

        Spectrograms { mel, mag }
    }

    fn normalize_db(&self, db: f64) -> f32 {
        let max_db = self.config.max_db;
        ((db - self.config.ref_db + max_db) / max_db).clamp(1e-8, 1.0) as f32
    }

    fn denormalize(&self, value: f32) -> f64 {
        let max_db = self.config.max_db;
        let db = (value as f64).clamp(0.0, 1.0) * max_db - max_db + self.config.ref_db;
        10f64.powf(db * 0.05)
    }

    /// Reconstruct a waveform from a normalised magnitude spectrogram `[n_bins][T]`.
    pub fn magnitude_to_wav(&self, mag: &[Vec<f32>]) -> Result<Vec<f32>> {
        let n_bins = self.stft.n_bins();
        if mag.len() != n_bins {
            return Err(Error::Audio(format!(
                "magnitude spectrogram has {} bins, expected {n_bins}",
                mag.len()
            )));
        }
        let num_frames = mag[0].len();
        if num_frames == 0 || mag.iter().any(|row| row.len() != num_frames) {
            return Err(Error::Audio("magnitude spectrogram is empty or ragged".into()));
        }

        // [bins][T] → [T][bins], linear amplitude raised to `power`.
        let amplitudes: Vec<Vec<f64>> = (0..num_frames)
            .map(|t| {
                (0..n_bins)
                    .map(|bin| self.denormalize(mag[bin][t]).powf(self.config.power))
                    .collect()
            })
            .collect();

        let wav = self.griffin_lim(&amplitudes);
        let wav: Vec<f32> = inverse_preemphasis(&wav, self.config.preemphasis)
            .into_iter()
            .map(|s| s as f32)
            .collect();
        Ok(match self.config.trim_db {
            Some(top_db) => {
                trim_silence(&wav, top_db, self.config.n_fft, self.config.hop_length).to_vec()
            }
            None => wav,
        })
    }

    fn griffin_lim(&self, amplitudes: &[Vec<f64>]) -> Vec<f64> {
        let length = self.config.hop_length * (amplitudes.len() - 1);
        let mut estimate: Vec<Vec<Complex<f64>>> = amplitudes
            .iter()
            .map(|frame| frame.iter().map(|&a| Complex::new(a, 0.0)).collect())
            .collect();

        for _ in 0..self.config.griffin_lim_iters {
            let signal = self.stft.inverse(&estimate, length);
            let rebuilt = self.stft.forward(&signal);
            for (t, frame) in estimate.iter_mut().enumerate() {
                for (bin, value) in frame.iter_mut().enumerate() {
                    let phase = rebuilt
                        .get(t)
                        .and_then(|f| f.get(bin))
                        .map(|c| *c / c.norm().max(1e-8))
                        .unwrap_or(Complex::new(1.0, 0.0));
                    *value = phase * amplitudes[t][bin];
                }
            }
        }

        self.stft.inverse(&estimate, length)
    }
}

/// Keep every `r`-th frame of a `[bins][T]` spectrogram.
pub fn reduce_frames(spec: &[Vec<f32>], r: usize) -> Vec<Vec<f32>> {
    spec.iter()
        .map(|row| row.iter().step_by(r.max(1)).copied().collect())
        .collect()
}

/// Cut leading and trailing frames whose power is more than `top_db` below
/// the loudest frame.
///
/// Frames are `frame_length` wide, centred every `hop_length` samples and
/// zero-padded at the edges. The kept range runs from the first loud frame's
/// centre to the centre after the last loud frame.
pub fn trim_silence(samples: &[f32], top_db: f64, frame_length: usize, hop_length: usize) -> &[f32] {
    if samples.is_empty() || hop_length == 0 {
        return samples;
    }
    let half = frame_length / 2;
    let num_frames = 1 + samples.len() / hop_length;
    let powers: Vec<f64> = (0..num_frames)
        .map(|i| {
            let centre = i * hop_length;
            let start = centre.saturating_sub(half);
            let end = (centre + frame_length - half).min(samples.len());
            let energy: f64 = samples
                .get(start..end)
                .map_or(0.0, |frame| frame.iter().map(|&x| (x as f64).powi(2)).sum());
            energy / frame_length.max(1) as f64
        })
        .collect();

    let power_db = |p: f64| 10.0 * p.max(1e-10).log10();
    let peak_db = power_db(powers.iter().copied().fold(0.0, f64::max));
    let loud = |p: &f64| power_db(*p) - peak_db > -top_db;
    match (powers.iter().position(loud), powers.iter().rposition(loud)) {
        (Some(first), Some(last)) => {
            let start = first * hop_length;
            let end = ((last + 1) * hop_length).min(samples.len());
            &samples[start..end]
        }
        _ => &samples[..0],
    }
}

fn amplitude_to_db(x: f64) -> f64 {
    20.0 * x.max(1e-5).log10()
}

fn preemphasis(samples: &[f32], coef: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(samples.len());
    let mut prev = 0.0;
    for &s in samples {
        let s = s as f64;
        out.push(s - coef * prev);
        prev = s;
    }
    out
}

fn inverse_preemphasis(samples: &[f64], coef: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(samples.len());
    let mut prev = 0.0;
    for &s in samples {
        prev = s + coef * prev;
        out.push(prev);
    }
    out
}

/// Slaney-normalised triangular filters, `n_mels` rows of `n_fft / 2 + 1` weights.
fn mel_filterbank(n_fft: usize, n_mels: usize, sample_rate: u32, f_min: f64, f_max: f64) -> Vec<Vec<f64>> {
    let num_bins = n_fft / 2 + 1;
    let sr = sample_rate as f64;
    let mel_min = hz_to_mel(f_min);
    let mel_max = hz_to_mel(f_max);
    let edges: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f64 / (n_mels + 1) as f64))
        .collect();
    let bin_freqs: Vec<f64> = (0..num_bins).map(|i| sr * i as f64 / n_fft as f64).collect();

    edges
        .windows(3)
        .map(|w| {
            let (left, centre, right) = (w[0], w[1], w[2]);
            let norm = 2.0 / (right - left);
            bin_freqs
                .iter()
                .map(|&f| {
                    let rising = (f - left) / (centre - left);
                    let falling = (right - f) / (right - centre);
                    norm * rising.min(falling).max(0.0)
                })
                .collect()
        })
        .collect()
}

/// Slaney mel scale: linear below 1 kHz, logarithmic above.
fn hz_to_mel(hz: f64) -> f64 {
    if hz < 1000.0 {
        3.0 * hz / 200.0
    } else {
        15.0 + 27.0 * (hz / 1000.0).ln() / 6.4_f64.ln()
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    if mel < 15.0 {
        200.0 * mel / 3.0
    } else {
        1000.0 * ((mel - 15.0) * 6.4_f64.ln() / 27.0).exp()
    }
}
