//! Character-level text front end.
//!
//! Text is lowercased, `!` becomes `.`, anything else outside the vocabulary
//! turns into a space, and runs of spaces collapse. The encoded sequence
//! always ends with the end-of-text symbol `E`.

use std::collections::HashMap;

use crate::config::Config;
use crate::{Error, Result};

pub const PAD_ID: u32 = 0;
pub const END_ID: u32 = 1;

/// Maps text to vocabulary ids and back.
#[derive(Debug, Clone)]
pub struct TextProcessor {
    symbols: Vec<char>,
    ids: HashMap<char, u32>,
    max_len: usize,
}

impl TextProcessor {
    /// `vocab[0]` must be the pad symbol and `vocab[1]` the end symbol.
    pub fn new(vocab: &str, max_len: usize) -> Self {
        let symbols: Vec<char> = vocab.chars().collect();
        let ids = symbols
            .iter()
            .enumerate()
            .map(|(i, &c)| (c, i as u32))
            .collect();
        Self {
            symbols,
            ids,
            max_len,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.model.vocab, config.synthesis.max_text_len)
    }

    /// Characters that may appear in normalised text (pad and end excluded).
    fn is_speakable(&self, c: char) -> bool {
        match self.ids.get(&c) {
            Some(&id) => id != PAD_ID && id != END_ID,
            None => false,
        }
    }

    pub fn normalize(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars().flat_map(char::to_lowercase) {
            let c = if c == '!' { '.' } else { c };
            let c = if self.is_speakable(c) { c } else { ' ' };
            if c == ' ' && (out.is_empty() || out.ends_with(' ')) {
                continue;
            }
            out.push(c);
        }
        out.truncate(out.trim_end().len());
        out
    }

    /// Normalise and encode, appending the end symbol.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let normalized = self.normalize(text);
        if normalized.is_empty() {
            return Err(Error::Text(format!("nothing to say in {text:?}")));
        }
        let mut ids: Vec<u32> = normalized
            .chars()
            .filter_map(|c| self.ids.get(&c).copied())
            .collect();
        ids.push(END_ID);
        if ids.len() > self.max_len {
            return Err(Error::Text(format!(
                "text is {} symbols long, limit is {}",
                ids.len(),
                self.max_len
            )));
        }
        Ok(ids)
    }

    /// Map ids back to text, stopping at the end symbol and skipping padding.
    pub fn decode(&self, ids: &[u32]) -> String {
        ids.iter()
            .take_while(|&&id| id != END_ID)
            .filter(|&&id| id != PAD_ID)
            .filter_map(|&id| self.symbols.get(id as usize))
            .collect()
    }
}

/// Right-pad sequences with [`PAD_ID`] to a common length.
///
/// Returns the flattened `[N * Tx]` ids and `Tx`.
pub fn pad_batch(sequences: &[Vec<u32>]) -> (Vec<u32>, usize) {
    let width = sequences.iter().map(Vec::len).max().unwrap_or(0);
    let mut flat = Vec::with_capacity(sequences.len() * width);
    for seq in sequences {
        flat.extend_from_slice(seq);
        flat.extend(std::iter::repeat_n(PAD_ID, width - seq.len()));
    }
    (flat, width)
}
