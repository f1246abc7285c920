//! Review engine: segment, chunk, dispatch, aggregate
//!
//! Strictly sequential by design: unit N+1 never starts before unit N
//! settles, and chunk N+1 never starts before chunk N, so the budget state
//! always reflects the latest authoritative feedback and output order
//! matches input order with no reordering buffer.

use serde::Serialize;

use crate::chunk::chunk_unit;
use crate::config::Config;
use crate::dispatch::{ChunkReview, CompletionBackend, CompletionRequest, Dispatcher};
use crate::error::ReviewError;
use crate::segment::{split_units, ExclusionPolicy, ExclusionReason, Unit};
use crate::tokenizer::{TokenSource, Tokenizer};

/// Separator between per-unit sections in the joined report
const UNIT_SEPARATOR: &str = "\n\n----------------------------------------\n\n";

/// Engine knobs, resolved once from configuration
#[derive(Debug, Clone)]
pub struct ReviewOptions {
    pub model: String,
    /// Fixed instruction preamble sent with every chunk
    pub preamble: String,
    pub max_chunk_tokens: usize,
    pub max_response_tokens: usize,
    /// Whole-diff token ceiling past which review is skipped entirely
    pub max_diff_tokens: usize,
    pub exclude_patterns: Vec<String>,
}

impl ReviewOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.openai.model.clone(),
            preamble: config.review.preamble.clone(),
            max_chunk_tokens: config.review.max_chunk_tokens,
            max_response_tokens: config.openai.max_response_tokens,
            max_diff_tokens: config.review.max_diff_tokens,
            exclude_patterns: config.review.exclude_patterns.clone(),
        }
    }

    fn validate(&self) -> Result<(), ReviewError> {
        if self.max_chunk_tokens == 0 {
            return Err(ReviewError::Config(
                "max_chunk_tokens must be positive".into(),
            ));
        }
        if self.max_response_tokens == 0 {
            return Err(ReviewError::Config(
                "max_response_tokens must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Terminal state of one unit in the final report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitStatus {
    /// All chunks completed; `text` is their output concatenated in order
    Reviewed { text: String },
    Excluded { reason: ExclusionReason },
    /// A chunk failed; output from earlier chunks is preserved
    Failed { error: String, partial: String },
    /// Cancellation interrupted the run before this unit finished
    Skipped,
}

/// One line item of the final report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitReport {
    pub index: usize,
    pub path: Option<String>,
    #[serde(flatten)]
    pub status: UnitStatus,
}

impl UnitReport {
    fn label(&self) -> String {
        match &self.path {
            Some(path) => path.clone(),
            None => format!("unit {}", self.index),
        }
    }
}

/// Ordered per-unit outcomes plus the joined report text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewResult {
    pub units: Vec<UnitReport>,
    pub cancelled: bool,
}

impl ReviewResult {
    /// Join unit sections in ordinal order into one report
    ///
    /// Every unit contributes a line item: its review text, its exclusion
    /// reason, or its failure message. Partial success stays legible.
    pub fn joined(&self) -> String {
        let sections: Vec<String> = self
            .units
            .iter()
            .map(|unit| {
                let body = match &unit.status {
                    UnitStatus::Reviewed { text } => text.clone(),
                    UnitStatus::Excluded { reason } => {
                        format!("[skipped: {reason}]")
                    }
                    UnitStatus::Failed { error, partial } => {
                        if partial.is_empty() {
                            format!("[review failed: {error}]")
                        } else {
                            format!("[partially reviewed, then failed: {error}]\n\n{partial}")
                        }
                    }
                    UnitStatus::Skipped => "[not reviewed: run cancelled]".to_string(),
                };
                format!("{}:\n{}", unit.label(), body)
            })
            .collect();
        sections.join(UNIT_SEPARATOR)
    }
}

/// Drives one document through segmentation, chunking, dispatch, and
/// aggregation
pub struct ReviewEngine {
    tokens: Box<dyn TokenSource>,
    dispatcher: Dispatcher,
    policy: ExclusionPolicy,
    options: ReviewOptions,
}

impl ReviewEngine {
    pub fn new(
        backend: Box<dyn CompletionBackend>,
        budget: crate::budget::BudgetState,
        options: ReviewOptions,
    ) -> Result<Self, ReviewError> {
        Self::with_token_source(Box::new(Tokenizer::new()?), backend, budget, options)
    }

    /// Build the engine over an explicit token source
    pub fn with_token_source(
        tokens: Box<dyn TokenSource>,
        backend: Box<dyn CompletionBackend>,
        budget: crate::budget::BudgetState,
        options: ReviewOptions,
    ) -> Result<Self, ReviewError> {
        options.validate()?;
        Ok(Self {
            tokens,
            dispatcher: Dispatcher::new(backend, budget),
            policy: ExclusionPolicy::new(&options.exclude_patterns)?,
            options,
        })
    }

    /// Review a full diff document
    ///
    /// `cancelled` is polled at every unit and chunk boundary; when it
    /// returns true, the in-flight unit is recorded as skipped, prior units
    /// keep their results, and the run returns with `cancelled` set.
    pub async fn review_document(
        &mut self,
        document: &str,
        cancelled: &(dyn Fn() -> bool + Sync),
    ) -> Result<ReviewResult, ReviewError> {
        let total_tokens = self.tokens.count(document);
        if total_tokens > self.options.max_diff_tokens {
            return Err(ReviewError::DiffTooLarge {
                tokens: total_tokens,
                limit: self.options.max_diff_tokens,
            });
        }

        let units = split_units(document, &self.policy);
        if units.iter().all(|u| u.excluded.is_some()) {
            // Covers the empty document (zero units) as well.
            return Err(ReviewError::NothingToReview);
        }

        tracing::info!(
            units = units.len(),
            total_tokens,
            "starting review"
        );

        let mut reports = Vec::with_capacity(units.len());
        let mut was_cancelled = false;

        for unit in &units {
            if was_cancelled || cancelled() {
                was_cancelled = true;
                // Exclusion is known without any dispatch, so the reason is
                // still reported even after cancellation.
                let status = match unit.excluded {
                    Some(reason) => UnitStatus::Excluded { reason },
                    None => UnitStatus::Skipped,
                };
                reports.push(UnitReport {
                    index: unit.index,
                    path: unit.path.clone(),
                    status,
                });
                continue;
            }

            let status = match unit.excluded {
                Some(reason) => {
                    tracing::debug!(unit = unit.index, %reason, "unit excluded");
                    UnitStatus::Excluded { reason }
                }
                None => match self.review_unit(unit, cancelled).await? {
                    UnitOutcome::Done(status) => status,
                    UnitOutcome::Cancelled => {
                        was_cancelled = true;
                        UnitStatus::Skipped
                    }
                },
            };

            reports.push(UnitReport {
                index: unit.index,
                path: unit.path.clone(),
                status,
            });
        }

        Ok(ReviewResult {
            units: reports,
            cancelled: was_cancelled,
        })
    }

    async fn review_unit(
        &mut self,
        unit: &Unit,
        cancelled: &(dyn Fn() -> bool + Sync),
    ) -> Result<UnitOutcome, ReviewError> {
        let chunks = match chunk_unit(self.tokens.as_ref(), &unit.text, self.options.max_chunk_tokens)
        {
            Ok(chunks) => chunks,
            Err(e @ ReviewError::Tokenization(_)) => {
                tracing::warn!(unit = unit.index, error = %e, "unit failed to tokenize");
                return Ok(UnitOutcome::Done(UnitStatus::Failed {
                    error: e.to_string(),
                    partial: String::new(),
                }));
            }
            Err(e) => return Err(e),
        };

        tracing::debug!(unit = unit.index, chunks = chunks.len(), "dispatching unit");

        let mut completed = String::new();
        for chunk in &chunks {
            let request = CompletionRequest {
                model: self.options.model.clone(),
                system: self.options.preamble.clone(),
                user: chunk.text.clone(),
                max_tokens: self.options.max_response_tokens,
            };

            match self.dispatcher.dispatch_chunk(&request, cancelled).await {
                Ok(ChunkReview::Completed(text)) => completed.push_str(&text),
                Ok(ChunkReview::Failed(message)) => {
                    // Later chunks for this unit are abandoned; other units
                    // still proceed.
                    return Ok(UnitOutcome::Done(UnitStatus::Failed {
                        error: message,
                        partial: completed,
                    }));
                }
                Ok(ChunkReview::Cancelled) => return Ok(UnitOutcome::Cancelled),
                Err(e @ ReviewError::BudgetExhausted { .. }) => return Err(e),
                Err(e) if e.is_unit_level() => {
                    return Ok(UnitOutcome::Done(UnitStatus::Failed {
                        error: e.to_string(),
                        partial: completed,
                    }));
                }
                Err(e) => return Err(e),
            }
        }

        Ok(UnitOutcome::Done(UnitStatus::Reviewed { text: completed }))
    }
}

enum UnitOutcome {
    Done(UnitStatus),
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{BudgetFeedback, BudgetState};
    use crate::dispatch::DispatchOutcome;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Backend that reviews every chunk successfully, echoing a marker
    struct EchoBackend {
        requests: Arc<Mutex<Vec<CompletionRequest>>>,
    }

    impl EchoBackend {
        fn new() -> (Self, Arc<Mutex<Vec<CompletionRequest>>>) {
            let log = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    requests: Arc::clone(&log),
                },
                log,
            )
        }
    }

    #[async_trait]
    impl CompletionBackend for EchoBackend {
        async fn complete(
            &self,
            request: &CompletionRequest,
        ) -> Result<DispatchOutcome, ReviewError> {
            let mut log = self.requests.lock().unwrap();
            log.push(request.clone());
            Ok(DispatchOutcome::Completed {
                text: format!("<review {}>", log.len()),
                feedback: BudgetFeedback::default(),
            })
        }
    }

    fn options() -> ReviewOptions {
        ReviewOptions {
            model: "gpt-4".into(),
            preamble: "You are a code reviewer.".into(),
            max_chunk_tokens: 5120,
            max_response_tokens: 2048,
            max_diff_tokens: 30000,
            exclude_patterns: Vec::new(),
        }
    }

    fn engine_with(backend: Box<dyn CompletionBackend>) -> ReviewEngine {
        ReviewEngine::new(backend, BudgetState::new(3, 10000), options()).unwrap()
    }

    fn not_cancelled() -> impl Fn() -> bool + Sync {
        || false
    }

    #[tokio::test]
    async fn test_excluded_unit_is_reported_but_never_dispatched() {
        let (backend, log) = EchoBackend::new();
        let mut engine = engine_with(Box::new(backend));

        let doc = "diff --git a/src/lib.rs b/src/lib.rs\n+fn a() {}\n\
                   diff --git a/app.min.js b/app.min.js\n+var a=1;\n";
        let result = engine
            .review_document(doc, &not_cancelled())
            .await
            .unwrap();

        assert_eq!(result.units.len(), 2);
        assert!(matches!(result.units[0].status, UnitStatus::Reviewed { .. }));
        assert_eq!(
            result.units[1].status,
            UnitStatus::Excluded {
                reason: ExclusionReason::GeneratedArtifact
            }
        );

        // Exactly one request, and only for the reviewable unit.
        let sent = log.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].user.contains("src/lib.rs"));
    }

    #[tokio::test]
    async fn test_empty_document_is_nothing_to_review() {
        let (backend, _) = EchoBackend::new();
        let mut engine = engine_with(Box::new(backend));
        let err = engine
            .review_document("", &not_cancelled())
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::NothingToReview));
    }

    #[tokio::test]
    async fn test_all_excluded_units_are_nothing_to_review() {
        let (backend, log) = EchoBackend::new();
        let mut engine = engine_with(Box::new(backend));
        let doc = "diff --git a/a.min.js b/a.min.js\n+x\n";
        let err = engine
            .review_document(doc, &not_cancelled())
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::NothingToReview));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_diff_is_rejected_up_front() {
        let (backend, log) = EchoBackend::new();
        let mut engine = ReviewEngine::new(
            Box::new(backend),
            BudgetState::new(3, 10000),
            ReviewOptions {
                max_diff_tokens: 10,
                ..options()
            },
        )
        .unwrap();

        let doc = format!("diff --git a/x b/x\n{}", "+some added line\n".repeat(20));
        let err = engine
            .review_document(&doc, &not_cancelled())
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::DiffTooLarge { limit: 10, .. }));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chunk_outputs_concatenate_in_order() {
        let (backend, log) = EchoBackend::new();
        let mut engine = ReviewEngine::new(
            Box::new(backend),
            BudgetState::new(100, 1_000_000),
            ReviewOptions {
                max_chunk_tokens: 20,
                ..options()
            },
        )
        .unwrap();

        let doc = format!("diff --git a/x b/x\n{}", "+line of change\n".repeat(40));
        let result = engine
            .review_document(&doc, &not_cancelled())
            .await
            .unwrap();

        let sent = log.lock().unwrap();
        assert!(sent.len() >= 3, "expected several chunks, got {}", sent.len());

        // Requests carried the chunks in document order.
        let rebuilt: String = sent.iter().map(|r| r.user.as_str()).collect();
        assert_eq!(rebuilt, doc);

        let expected: String = (1..=sent.len()).map(|i| format!("<review {i}>")).collect();
        assert_eq!(
            result.units[0].status,
            UnitStatus::Reviewed { text: expected }
        );
    }

    #[tokio::test]
    async fn test_failed_chunk_preserves_partial_and_later_units_proceed() {
        struct FailSecond {
            calls: Mutex<usize>,
        }

        #[async_trait]
        impl CompletionBackend for FailSecond {
            async fn complete(
                &self,
                _request: &CompletionRequest,
            ) -> Result<DispatchOutcome, ReviewError> {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                match *calls {
                    2 => Ok(DispatchOutcome::Failed {
                        status: 500,
                        message: "server error".into(),
                    }),
                    n => Ok(DispatchOutcome::Completed {
                        text: format!("<r{n}>"),
                        feedback: BudgetFeedback::default(),
                    }),
                }
            }
        }

        let mut engine = ReviewEngine::new(
            Box::new(FailSecond {
                calls: Mutex::new(0),
            }),
            BudgetState::new(100, 1_000_000),
            ReviewOptions {
                max_chunk_tokens: 20,
                ..options()
            },
        )
        .unwrap();

        let doc = format!(
            "diff --git a/big b/big\n{}diff --git a/small b/small\n+tiny\n",
            "+line of change\n".repeat(40)
        );
        let result = engine
            .review_document(&doc, &not_cancelled())
            .await
            .unwrap();

        assert_eq!(result.units.len(), 2);
        match &result.units[0].status {
            UnitStatus::Failed { error, partial } => {
                assert!(error.contains("server error"));
                assert_eq!(partial, "<r1>");
            }
            other => panic!("expected failure, got {other:?}"),
        }
        // The failure was unit-local.
        assert!(matches!(result.units[1].status, UnitStatus::Reviewed { .. }));
        assert!(!result.cancelled);
    }

    #[tokio::test]
    async fn test_cancellation_preserves_finished_units() {
        let (backend, _) = EchoBackend::new();
        let mut engine = engine_with(Box::new(backend));

        // Cancel after the first unit completes.
        let state = Arc::new(Mutex::new(0u32));
        let flag = Arc::clone(&state);
        let cancelled = move || {
            let mut calls = flag.lock().unwrap();
            *calls += 1;
            // First poll happens before unit 0, second before its only
            // chunk, third before unit 1.
            *calls > 2
        };

        let doc = "diff --git a/a b/a\n+one\n\
                   diff --git a/b b/b\n+two\n\
                   diff --git a/c b/c\n+three\n";
        let result = engine.review_document(doc, &cancelled).await.unwrap();

        assert!(result.cancelled);
        assert!(matches!(result.units[0].status, UnitStatus::Reviewed { .. }));
        assert_eq!(result.units[1].status, UnitStatus::Skipped);
        assert_eq!(result.units[2].status, UnitStatus::Skipped);
    }

    #[tokio::test]
    async fn test_tokenization_failure_marks_the_unit_and_the_run_continues() {
        /// Delegates to the real encoding except for texts containing the
        /// needle, which fail to tokenize
        struct FailingOn {
            needle: &'static str,
            inner: Tokenizer,
        }

        impl TokenSource for FailingOn {
            fn token_strings(&self, text: &str) -> Result<Vec<String>, ReviewError> {
                if text.contains(self.needle) {
                    return Err(ReviewError::Tokenization(
                        "unmappable byte sequence".into(),
                    ));
                }
                self.inner.token_strings(text)
            }

            fn count(&self, text: &str) -> usize {
                self.inner.count(text)
            }
        }

        let (backend, log) = EchoBackend::new();
        let mut engine = ReviewEngine::with_token_source(
            Box::new(FailingOn {
                needle: "bad.rs",
                inner: Tokenizer::new().unwrap(),
            }),
            Box::new(backend),
            BudgetState::new(3, 10000),
            options(),
        )
        .unwrap();

        let doc = "diff --git a/bad.rs b/bad.rs\n+broken\n\
                   diff --git a/good.rs b/good.rs\n+fine\n";
        let result = engine
            .review_document(doc, &not_cancelled())
            .await
            .unwrap();

        assert_eq!(result.units.len(), 2);
        match &result.units[0].status {
            UnitStatus::Failed { error, partial } => {
                assert!(error.contains("tokenization failed"));
                assert!(partial.is_empty());
            }
            other => panic!("expected failed unit, got {other:?}"),
        }
        assert!(matches!(result.units[1].status, UnitStatus::Reviewed { .. }));

        // Only the tokenizable unit was ever dispatched.
        let sent = log.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].user.contains("good.rs"));
    }

    #[tokio::test]
    async fn test_cancellation_keeps_known_exclusions() {
        let (backend, _) = EchoBackend::new();
        let mut engine = engine_with(Box::new(backend));

        // Cancel after the first unit completes; the excluded unit behind it
        // still reports its reason, only the reviewable one is skipped.
        let state = Arc::new(Mutex::new(0u32));
        let flag = Arc::clone(&state);
        let cancelled = move || {
            let mut calls = flag.lock().unwrap();
            *calls += 1;
            *calls > 2
        };

        let doc = "diff --git a/a b/a\n+one\n\
                   diff --git a/app.min.js b/app.min.js\n+var a=1;\n\
                   diff --git a/c b/c\n+three\n";
        let result = engine.review_document(doc, &cancelled).await.unwrap();

        assert!(result.cancelled);
        assert!(matches!(result.units[0].status, UnitStatus::Reviewed { .. }));
        assert_eq!(
            result.units[1].status,
            UnitStatus::Excluded {
                reason: ExclusionReason::GeneratedArtifact
            }
        );
        assert_eq!(result.units[2].status, UnitStatus::Skipped);
    }

    #[test]
    fn test_joined_report_has_a_line_item_per_unit() {
        let result = ReviewResult {
            units: vec![
                UnitReport {
                    index: 0,
                    path: Some("src/lib.rs".into()),
                    status: UnitStatus::Reviewed {
                        text: "looks good".into(),
                    },
                },
                UnitReport {
                    index: 1,
                    path: Some("app.min.js".into()),
                    status: UnitStatus::Excluded {
                        reason: ExclusionReason::GeneratedArtifact,
                    },
                },
                UnitReport {
                    index: 2,
                    path: None,
                    status: UnitStatus::Failed {
                        error: "500: server error".into(),
                        partial: "first half".into(),
                    },
                },
            ],
            cancelled: false,
        };

        let joined = result.joined();
        assert!(joined.contains("src/lib.rs:\nlooks good"));
        assert!(joined.contains("app.min.js:\n[skipped: generated-artifact]"));
        assert!(joined.contains("unit 2:"));
        assert!(joined.contains("500: server error"));
        assert!(joined.contains("first half"));
    }

    #[test]
    fn test_zero_chunk_size_is_a_config_error() {
        let (backend, _) = EchoBackend::new();
        let err = ReviewEngine::new(
            Box::new(backend),
            BudgetState::new(3, 10000),
            ReviewOptions {
                max_chunk_tokens: 0,
                ..options()
            },
        )
        .err()
        .unwrap();
        assert!(matches!(err, ReviewError::Config(_)));
    }
}
