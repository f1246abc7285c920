//! Typed errors for the review engine
//!
//! Provides structured error types so callers can distinguish failures that
//! abort a single unit from failures that abort the whole run, without
//! string matching.

use thiserror::Error;

/// Review engine errors with typed variants
///
/// Throttling (HTTP 429) is deliberately absent: it is a routine signal
/// handled inside the dispatcher's retry loop and never surfaces here.
#[derive(Debug, Error)]
pub enum ReviewError {
    /// The tokenizer rejected a unit's text
    ///
    /// Unit-level: the unit is marked failed, the run continues.
    #[error("tokenization failed: {0}")]
    Tokenization(String),

    /// Non-throttle failure status from the completion service
    ///
    /// Unit-level: the unit's remaining chunks are abandoned, any partial
    /// review text is preserved, and the run continues.
    #[error("remote service error ({status}): {message}")]
    RemoteService { status: u16, message: String },

    /// Admission blocked repeatedly with no authoritative budget data
    ///
    /// Run-level: raised only after several consecutive blind waits with no
    /// successful admission in between, to avoid an infinite silent hang.
    #[error("request budget exhausted after {blind_waits} blind waits with no progress")]
    BudgetExhausted { blind_waits: u32 },

    /// The whole diff exceeds the configured review ceiling
    #[error("diff is too large to review: {tokens} tokens (limit {limit})")]
    DiffTooLarge { tokens: usize, limit: usize },

    /// Every unit was excluded, or the document was empty
    #[error("nothing to review: no processable units in the diff")]
    NothingToReview,

    /// Invalid or missing configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection, timeout, or protocol failure talking to a remote service
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl ReviewError {
    /// True when the error aborts one unit but not the run
    pub fn is_unit_level(&self) -> bool {
        matches!(
            self,
            ReviewError::Tokenization(_)
                | ReviewError::RemoteService { .. }
                | ReviewError::Network(_)
        )
    }
}
