//! Rendering of the structured review result
//!
//! The engine exposes `ReviewResult` as a value; this module turns it into
//! the plain banner-framed report or JSON. Nothing here touches the network
//! or mutates the result.

use crate::github::PullRequest;
use crate::review::ReviewResult;

/// Plain-text report in the classic banner frame
pub fn plain(result: &ReviewResult, pull_request: Option<&PullRequest>) -> String {
    let mut out = String::new();
    if let Some(pr) = pull_request {
        out.push_str(&format!("Reviewing: {} (by {})\n\n", pr.title, pr.user.login));
    }
    out.push_str(&format!("CODE REVIEW START{}\n\n", "-".repeat(75)));
    out.push_str(&result.joined());
    out.push_str(&format!("\n\nCODE REVIEW END{}\n", "-".repeat(77)));
    if result.cancelled {
        out.push_str("\n(run cancelled before completion; report is partial)\n");
    }
    out
}

/// JSON rendering of the per-unit records
pub fn json(result: &ReviewResult) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::{UnitReport, UnitStatus};
    use crate::segment::ExclusionReason;

    fn sample() -> ReviewResult {
        ReviewResult {
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
            ],
            cancelled: false,
        }
    }

    #[test]
    fn test_plain_report_is_banner_framed() {
        let text = plain(&sample(), None);
        assert!(text.starts_with("CODE REVIEW START"));
        assert!(text.contains("looks good"));
        assert!(text.contains("generated-artifact"));
        assert!(text.trim_end().ends_with('-'));
    }

    #[test]
    fn test_plain_report_names_the_pull_request() {
        let pr: PullRequest = serde_json::from_str(
            r#"{"title": "Add widget", "user": {"login": "octocat"}}"#,
        )
        .unwrap();
        let text = plain(&sample(), Some(&pr));
        assert!(text.contains("Add widget"));
        assert!(text.contains("octocat"));
    }

    #[test]
    fn test_json_report_is_structured() {
        let text = json(&sample()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["cancelled"], false);
        assert_eq!(value["units"][0]["path"], "src/lib.rs");
        assert_eq!(value["units"][0]["status"], "reviewed");
        assert_eq!(value["units"][1]["status"], "excluded");
        assert_eq!(value["units"][1]["reason"], "generated-artifact");
    }
}
