use serde::{Deserialize, Serialize};

/// What a batch run does to each user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BatchMode {
    Provision,
    Cleanup,
}

impl std::fmt::Display for BatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchMode::Provision => write!(f, "provision"),
            BatchMode::Cleanup => write!(f, "cleanup"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Outcome {
    /// Something was created (provision) or removed (cleanup).
    Created,
    /// Everything already matched; no mutating call was needed.
    Skipped,
    Failed,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Created => write!(f, "created"),
            Outcome::Skipped => write!(f, "skipped"),
            Outcome::Failed => write!(f, "failed"),
        }
    }
}

/// Result of processing a single user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResult {
    pub username: String,
    pub outcome: Outcome,
    /// Actions taken (or planned, in dry-run), in order.
    #[serde(default)]
    pub actions: Vec<String>,
    /// Category and message of the failure, if any.
    #[serde(default)]
    pub error: Option<String>,
}

impl UserResult {
    pub fn new(username: &str, outcome: Outcome) -> Self {
        Self {
            username: username.to_string(),
            outcome,
            actions: Vec::new(),
            error: None,
        }
    }

    pub fn failed(username: &str, actions: Vec<String>, error: String) -> Self {
        Self {
            username: username.to_string(),
            outcome: Outcome::Failed,
            actions,
            error: Some(error),
        }
    }
}

/// Aggregated outcome of one invocation. Never persisted.
///
/// Counts are derived from `results`, so
/// `created + skipped + failed == total` holds for every report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub mode: BatchMode,
    pub dry_run: bool,
    pub results: Vec<UserResult>,
}

impl BatchReport {
    pub fn new(mode: BatchMode, dry_run: bool) -> Self {
        Self {
            mode,
            dry_run,
            results: Vec::new(),
        }
    }

    pub fn record(&mut self, result: UserResult) {
        self.results.push(result);
    }

    fn count(&self, outcome: Outcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }

    pub fn created_count(&self) -> usize {
        self.count(Outcome::Created)
    }

    pub fn skipped_count(&self) -> usize {
        self.count(Outcome::Skipped)
    }

    pub fn failed_count(&self) -> usize {
        self.count(Outcome::Failed)
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn has_failures(&self) -> bool {
        self.failed_count() > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &UserResult> {
        self.results.iter().filter(|r| r.outcome == Outcome::Failed)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &UserResult> {
        self.results.iter().filter(|r| r.outcome != Outcome::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_always_sum_to_total() {
        let mut report = BatchReport::new(BatchMode::Provision, false);
        report.record(UserResult::new("u1", Outcome::Created));
        report.record(UserResult::new("u2", Outcome::Skipped));
        report.record(UserResult::failed("u3", vec![], "boom".to_string()));
        report.record(UserResult::new("u4", Outcome::Created));

        assert_eq!(report.created_count(), 2);
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(
            report.created_count() + report.skipped_count() + report.failed_count(),
            report.total()
        );
        assert!(report.has_failures());
        assert_eq!(report.succeeded().count(), 3);
    }
}
