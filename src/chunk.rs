//! Token-bounded chunking of a unit's text
//!
//! Greedy left-to-right packing: tokens accumulate into the current chunk
//! until the running count reaches the maximum, then a new chunk starts.
//! The final partial chunk is emitted as-is. No rebalancing, so identical
//! input always produces identical boundaries.

use crate::error::ReviewError;
use crate::tokenizer::TokenSource;

/// A contiguous token-bounded slice of one unit's text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Ordinal position within the unit
    pub index: usize,
    pub text: String,
    pub token_count: usize,
}

/// Split `text` into chunks of at most `max_tokens` tokens each
///
/// Concatenating the chunk texts in order reconstructs `text` exactly. A
/// unit always yields at least one chunk; the chunk is empty only when the
/// unit's text is empty.
pub fn chunk_unit(
    tokens: &dyn TokenSource,
    text: &str,
    max_tokens: usize,
) -> Result<Vec<Chunk>, ReviewError> {
    debug_assert!(max_tokens > 0, "chunk size must be validated upstream");

    if text.is_empty() {
        return Ok(vec![Chunk {
            index: 0,
            text: String::new(),
            token_count: 0,
        }]);
    }

    let tokens = tokens.token_strings(text)?;

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0usize;
    for token in tokens {
        current.push_str(&token);
        count += 1;
        if count >= max_tokens {
            chunks.push(Chunk {
                index: chunks.len(),
                text: std::mem::take(&mut current),
                token_count: count,
            });
            count = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(Chunk {
            index: chunks.len(),
            text: current,
            token_count: count,
        });
    }

    Ok(chunks)
}
