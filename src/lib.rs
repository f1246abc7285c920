//! revq: LLM-assisted pull-request review with token-aware chunking
//!
//! The core is a segmentation-and-dispatch engine: a diff is split into
//! per-file units, each unit into token-bounded chunks, and each chunk is
//! sent to a rate-limited completion service one at a time. Throttle
//! signals are retried transparently against the service's own budget
//! feedback, and the ordered partial outputs are reassembled into a single
//! legible report with one line item per unit.

pub mod budget;
pub mod chunk;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod github;
pub mod render;
pub mod review;
pub mod segment;
pub mod tokenizer;

pub use config::Config;
pub use error::ReviewError;
pub use review::{ReviewEngine, ReviewOptions, ReviewResult};
