//! Tokenizer adapter over tiktoken
//!
//! The engine never inspects tokens; it only needs an ordered sequence of
//! token substrings (whose concatenation is the input text) so the chunker
//! can pack them against the upstream token budget.

use tiktoken_rs::{r50k_base, CoreBPE};

use crate::error::ReviewError;

/// Source of token substrings and counts
///
/// Seam between the engine and the concrete encoding, mirroring the
/// dispatch backend trait; `Tokenizer` is the production implementation.
pub trait TokenSource: Send + Sync {
    /// Split `text` into token substrings whose concatenation reproduces
    /// `text` exactly
    fn token_strings(&self, text: &str) -> Result<Vec<String>, ReviewError>;

    /// Number of tokens in `text`
    fn count(&self, text: &str) -> usize;
}

/// Thin wrapper around the r50k (GPT-2 family) byte-pair encoding
pub struct Tokenizer {
    bpe: CoreBPE,
}

impl Tokenizer {
    pub fn new() -> Result<Self, ReviewError> {
        let bpe = r50k_base().map_err(|e| ReviewError::Tokenization(e.to_string()))?;
        Ok(Self { bpe })
    }
}

impl TokenSource for Tokenizer {
    fn token_strings(&self, text: &str) -> Result<Vec<String>, ReviewError> {
        self.bpe
            .split_by_token(text, true)
            .map_err(|e| ReviewError::Tokenization(e.to_string()))
    }

    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_strings_reconstruct_input() {
        let tokenizer = Tokenizer::new().unwrap();
        let text = "diff --git a/src/main.rs b/src/main.rs\n+fn main() {}\n";
        let tokens = tokenizer.token_strings(text).unwrap();
        assert!(!tokens.is_empty());
        assert_eq!(tokens.concat(), text);
    }

    #[test]
    fn test_count_matches_token_strings_len() {
        let tokenizer = Tokenizer::new().unwrap();
        let text = "fn add(a: u32, b: u32) -> u32 { a + b }";
        let tokens = tokenizer.token_strings(text).unwrap();
        assert_eq!(tokenizer.count(text), tokens.len());
    }

    #[test]
    fn test_empty_text_has_no_tokens() {
        let tokenizer = Tokenizer::new().unwrap();
        assert_eq!(tokenizer.count(""), 0);
        assert!(tokenizer.token_strings("").unwrap().is_empty());
    }
}
