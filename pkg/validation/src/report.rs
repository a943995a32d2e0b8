//! Check results and the report artifact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

use crate::error::{Result, ValidationError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Fail,
    /// A prerequisite of the check is absent.
    Skip,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckStatus::Pass => write!(f, "PASS"),
            CheckStatus::Fail => write!(f, "FAIL"),
            CheckStatus::Skip => write!(f, "SKIP"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckResult {
    /// e.g. `namespace`, `isolation`, `probe`
    pub check: String,
    /// User or service the check is about.
    pub subject: String,
    pub status: CheckStatus,
    pub detail: String,
}

impl CheckResult {
    pub fn new(check: &str, subject: &str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            subject: subject.to_string(),
            status,
            detail: detail.into(),
        }
    }

    pub fn pass(check: &str, subject: &str, detail: impl Into<String>) -> Self {
        Self::new(check, subject, CheckStatus::Pass, detail)
    }

    pub fn fail(check: &str, subject: &str, detail: impl Into<String>) -> Self {
        Self::new(check, subject, CheckStatus::Fail, detail)
    }

    pub fn skip(check: &str, subject: &str, detail: impl Into<String>) -> Self {
        Self::new(check, subject, CheckStatus::Skip, detail)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    pub generated_at: DateTime<Utc>,
    pub checks: Vec<CheckResult>,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl TestReport {
    pub fn new(checks: Vec<CheckResult>) -> Self {
        let count = |s| checks.iter().filter(|c| c.status == s).count();
        Self {
            generated_at: Utc::now(),
            passed: count(CheckStatus::Pass),
            failed: count(CheckStatus::Fail),
            skipped: count(CheckStatus::Skip),
            checks,
        }
    }

    pub fn total(&self) -> usize {
        self.checks.len()
    }

    /// Skips do not count against the run.
    pub fn succeeded(&self) -> bool {
        self.failed == 0
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ValidationError::Report {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn render_table(&self) -> String {
        let check_w = self.checks.iter().map(|c| c.check.len()).max().unwrap_or(5).max(5);
        let subject_w = self.checks.iter().map(|c| c.subject.len()).max().unwrap_or(7).max(7);
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<6} {:<check_w$} {:<subject_w$} DETAIL",
            "STATUS", "CHECK", "SUBJECT"
        );
        for c in &self.checks {
            let _ = writeln!(
                out,
                "{:<6} {:<check_w$} {:<subject_w$} {}",
                c.status.to_string(),
                c.check,
                c.subject,
                c.detail
            );
        }
        let _ = writeln!(
            out,
            "\n{} checks: {} passed, {} failed, {} skipped",
            self.total(),
            self.passed,
            self.failed,
            self.skipped
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TestReport {
        TestReport::new(vec![
            CheckResult::pass("namespace", "u1", "u1-ws exists"),
            CheckResult::fail("quota", "u1", "workshop-quota missing"),
            CheckResult::skip("workspace", "u2", "no namespace"),
        ])
    }

    #[test]
    fn counts_by_status() {
        let report = sample();
        assert_eq!((report.passed, report.failed, report.skipped), (1, 1, 1));
        assert_eq!(report.total(), 3);
        assert!(!report.succeeded());
        assert!(TestReport::new(vec![CheckResult::skip("x", "y", "")]).succeeded());
    }

    #[test]
    fn artifact_is_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        sample().write_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["failed"], 1);
        assert_eq!(value["checks"][2]["status"], "skip");
    }

    #[test]
    fn table_lists_every_check() {
        let table = sample().render_table();
        assert!(table.starts_with("STATUS"));
        assert!(table.contains("FAIL   quota"));
        assert!(table.contains("3 checks: 1 passed, 1 failed, 1 skipped"));
    }
}
