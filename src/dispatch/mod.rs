//! Chunk dispatch and retry-on-throttle
//!
//! One chunk at a time: admit against the budget, send, classify. Throttle
//! outcomes are retried in place with the tracker's reset knowledge (or
//! exponential backoff when the service gave no hint) and never escape this
//! module; only completion and fatal failure do.

mod openai;

pub use openai::OpenAiBackend;

use std::time::Duration;

use async_trait::async_trait;

use crate::budget::{BudgetFeedback, BudgetState};
use crate::error::ReviewError;

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(60);

/// One chunk request to the completion service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub model: String,
    /// Fixed instruction preamble, sent as the system message
    pub system: String,
    /// The chunk text, sent as the user message
    pub user: String,
    pub max_tokens: usize,
}

/// Outcome of a single dispatch attempt
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Completed {
        text: String,
        feedback: BudgetFeedback,
    },
    Throttled {
        feedback: BudgetFeedback,
    },
    Failed {
        status: u16,
        message: String,
    },
}

/// Transport seam to the completion service
///
/// Implementations classify the raw response into a `DispatchOutcome` and
/// surface only transport-level failures as errors.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<DispatchOutcome, ReviewError>;
}

/// Terminal result of dispatching one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkReview {
    Completed(String),
    /// Non-throttle failure; the message is surfaced in the unit report
    Failed(String),
    /// Cancellation observed between attempts
    Cancelled,
}

/// Drives the retry loop for one chunk at a time against the shared budget
pub struct Dispatcher {
    backend: Box<dyn CompletionBackend>,
    budget: BudgetState,
}

impl Dispatcher {
    pub fn new(backend: Box<dyn CompletionBackend>, budget: BudgetState) -> Self {
        Self { backend, budget }
    }

    /// Send one chunk, retrying the same chunk on throttle until it
    /// completes or fails
    ///
    /// Nothing is appended to any result until `Completed`, so a retried
    /// chunk loses no state. There is deliberately no retry cap: throttling
    /// is expected, and only fatal statuses stop the loop.
    pub async fn dispatch_chunk(
        &mut self,
        request: &CompletionRequest,
        cancelled: &(dyn Fn() -> bool + Sync),
    ) -> Result<ChunkReview, ReviewError> {
        let mut backoff = BACKOFF_BASE;
        loop {
            if cancelled() {
                return Ok(ChunkReview::Cancelled);
            }

            self.budget.admit().await?;

            match self.backend.complete(request).await? {
                DispatchOutcome::Completed { text, feedback } => {
                    self.budget.apply_success(&feedback);
                    return Ok(ChunkReview::Completed(text));
                }
                DispatchOutcome::Throttled { feedback } => {
                    let has_hint = feedback.has_reset_hint();
                    self.budget.apply_throttle(&feedback);
                    tracing::warn!(has_reset_hint = has_hint, "throttled, will retry same chunk");
                    if !has_hint {
                        // admit() has nothing to wait on without a hint
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(BACKOFF_CAP);
                    }
                }
                DispatchOutcome::Failed { status, message } => {
                    tracing::error!(status, %message, "completion request failed");
                    return Ok(ChunkReview::Failed(format!("{status}: {message}")));
                }
            }
        }
    }
}
