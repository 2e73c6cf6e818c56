//! Audio utilities.
//!
//! - [`stft`]: centred STFT / overlap-add inverse (rustfft)
//! - [`spectrogram`]: normalised mel / linear spectrograms and Griffin-Lim
//! - WAV read/write (mono, 16-bit PCM output)

pub mod spectrogram;
pub mod stft;
mod wav;

pub use spectrogram::{SpectrogramProcessor, Spectrograms, reduce_frames, trim_silence};
pub use stft::Stft;
pub use wav::{peak_normalize, read_wav_mono, to_mono, write_wav_mono};
