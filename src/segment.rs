//! Unit segmentation of a raw diff document
//!
//! Splits a multi-file diff into per-file units on `diff --git` boundaries
//! and applies the exclusion policy (generated artifacts, pure deletions,
//! pure renames). Excluded units keep their structural record so the final
//! report can name why they were skipped; they are never chunked or sent.

use std::fmt;

use regex::RegexSet;
use serde::Serialize;

use crate::error::ReviewError;

/// Line prefix that starts a new unit
pub const UNIT_MARKER: &str = "diff --git ";

/// Why a unit was withheld from review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExclusionReason {
    /// Filename matched a generated/minified/bundled-artifact pattern
    GeneratedArtifact,
    /// Only removed lines with a `/dev/null` target
    PureDeletion,
    /// Rename markers with no content change
    PureRename,
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExclusionReason::GeneratedArtifact => "generated-artifact",
            ExclusionReason::PureDeletion => "pure-deletion",
            ExclusionReason::PureRename => "pure-rename",
        };
        f.write_str(s)
    }
}

/// One logical change block (conventionally one file) of the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    /// Ordinal position within the document
    pub index: usize,
    /// Target path parsed from the `diff --git` header, if present
    pub path: Option<String>,
    /// Raw text slice; concatenating all units in order reconstructs the
    /// document exactly
    pub text: String,
    pub excluded: Option<ExclusionReason>,
}

/// Compiled generated-artifact filename patterns
pub struct ExclusionPolicy {
    generated: RegexSet,
}

impl ExclusionPolicy {
    /// Pattern applied when the configuration lists none
    pub const DEFAULT_GENERATED_PATTERN: &'static str = r"\.(min\.js|min\.css)|bundle";

    pub fn new(patterns: &[String]) -> Result<Self, ReviewError> {
        let patterns: Vec<&str> = if patterns.is_empty() {
            vec![Self::DEFAULT_GENERATED_PATTERN]
        } else {
            patterns.iter().map(String::as_str).collect()
        };
        let generated = RegexSet::new(&patterns)
            .map_err(|e| ReviewError::Config(format!("invalid exclude pattern: {e}")))?;
        Ok(Self { generated })
    }

    fn classify(&self, text: &str) -> Option<ExclusionReason> {
        // Filename patterns are matched against the unit's header line, not
        // its body, so code that merely mentions "bundle" is still reviewed.
        let header = text.lines().next().unwrap_or_default();
        if header.starts_with(UNIT_MARKER) && self.generated.is_match(header) {
            return Some(ExclusionReason::GeneratedArtifact);
        }

        // File headers (`+++`/`---`) are not content lines. The naive
        // one-character scan would count `+++ /dev/null` itself as an
        // addition and never detect a deletion.
        let mut added = 0usize;
        let mut removed = 0usize;
        let mut dev_null_target = false;
        for line in text.lines() {
            if line.starts_with("+++") {
                if line.contains("/dev/null") {
                    dev_null_target = true;
                }
            } else if line.starts_with("---") {
                // old-file header
            } else if line.starts_with('+') {
                added += 1;
            } else if line.starts_with('-') {
                removed += 1;
            }
        }

        if removed > 0 && added == 0 && dev_null_target {
            return Some(ExclusionReason::PureDeletion);
        }

        let renamed = text.lines().any(|l| l.starts_with("rename from"))
            && text.lines().any(|l| l.starts_with("rename to"));
        if renamed && added == 0 && removed == 0 {
            return Some(ExclusionReason::PureRename);
        }

        None
    }
}

/// Split `document` into ordered units on `diff --git` line boundaries
///
/// Text before the first marker (if any) becomes unit 0. An empty document
/// yields no units; a document with no markers yields exactly one unit.
pub fn split_units(document: &str, policy: &ExclusionPolicy) -> Vec<Unit> {
    if document.is_empty() {
        return Vec::new();
    }

    let mut starts = Vec::new();
    let mut offset = 0;
    for line in document.split_inclusive('\n') {
        if line.starts_with(UNIT_MARKER) {
            starts.push(offset);
        }
        offset += line.len();
    }

    let mut slices: Vec<&str> = Vec::new();
    match starts.first() {
        None => slices.push(document),
        Some(&first) => {
            if first > 0 {
                slices.push(&document[..first]);
            }
            for (i, &start) in starts.iter().enumerate() {
                let end = starts.get(i + 1).copied().unwrap_or(document.len());
                slices.push(&document[start..end]);
            }
        }
    }

    slices
        .into_iter()
        .enumerate()
        .map(|(index, text)| Unit {
            index,
            path: header_path(text),
            excluded: policy.classify(text),
            text: text.to_string(),
        })
        .collect()
}

/// Extract the target path from a `diff --git a/... b/...` header line
///
/// Git quotes paths containing spaces (`diff --git "a/x" "b/my file"`), so
/// a quoted target is taken verbatim between its quotes; otherwise the last
/// whitespace-separated field is the target.
fn header_path(text: &str) -> Option<String> {
    let header = text.lines().next()?;
    let rest = header.strip_prefix(UNIT_MARKER)?.trim_end();
    let target = match rest.strip_suffix('"') {
        Some(trimmed) => {
            let open = trimmed.rfind('"')?;
            &trimmed[open + 1..]
        }
        None => rest.split_whitespace().last()?,
    };
    Some(target.strip_prefix("b/").unwrap_or(target).to_string())
}
