//! Resolution of the target user list.

use pkg_constants::provision::MAX_USERS;
use pkg_types::snapshot::Snapshot;
use pkg_types::validate::validate_username;
use std::path::PathBuf;
use tracing::warn;

use crate::error::{ProvisionError, Result};

/// Where the batch's usernames come from. Exactly one per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserSource {
    /// `{prefix}1 ..= {prefix}N`
    Count(u32),
    List(Vec<String>),
    /// One username per line; blank lines and `#` comments are ignored.
    File(PathBuf),
    /// Every identity detection finds for the prefix.
    Existing,
}

/// `{prefix}1 ..= {prefix}{count}`, with `count` bounded to `1..=MAX_USERS`.
pub fn numbered_users(prefix: &str, count: u32) -> Result<Vec<String>> {
    if prefix.is_empty() {
        return Err(ProvisionError::usage("prefix must not be empty"));
    }
    if count == 0 || count > MAX_USERS {
        return Err(ProvisionError::usage(format!(
            "count must be between 1 and {} (got {})",
            MAX_USERS, count
        )));
    }
    Ok((1..=count).map(|i| format!("{}{}", prefix, i)).collect())
}

impl UserSource {
    /// Usernames known without asking the cluster; `None` for [`UserSource::Existing`].
    pub fn resolve_static(&self, prefix: &str, suffix: &str) -> Result<Option<Vec<String>>> {
        let names = match self {
            UserSource::Count(n) => numbered_users(prefix, *n)?,
            UserSource::List(names) => names.clone(),
            UserSource::File(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    ProvisionError::usage(format!(
                        "cannot read users file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                text.lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(str::to_string)
                    .collect()
            }
            UserSource::Existing => return Ok(None),
        };
        finish(names, suffix).map(Some)
    }

    /// The final user list, consulting the snapshot for [`UserSource::Existing`].
    pub fn resolve(&self, prefix: &str, suffix: &str, snapshot: &Snapshot) -> Result<Vec<String>> {
        match self.resolve_static(prefix, suffix)? {
            Some(names) => Ok(names),
            None => {
                let mut names = snapshot.identities.clone();
                sort_numbered(prefix, &mut names);
                if names.is_empty() {
                    return Err(ProvisionError::usage(format!(
                        "no existing users match prefix '{}'",
                        prefix
                    )));
                }
                Ok(names)
            }
        }
    }
}

/// Validate, de-duplicate (keeping first occurrence) and bound the list.
fn finish(names: Vec<String>, suffix: &str) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        validate_username(&name, suffix)
            .map_err(|e| ProvisionError::usage(format!("invalid username: {}", e)))?;
        if out.contains(&name) {
            warn!("Ignoring duplicate user {}", name);
            continue;
        }
        out.push(name);
    }
    if out.is_empty() {
        return Err(ProvisionError::usage("the user list is empty"));
    }
    if out.len() > MAX_USERS as usize {
        return Err(ProvisionError::usage(format!(
            "at most {} users per batch (got {})",
            MAX_USERS,
            out.len()
        )));
    }
    Ok(out)
}

/// Order `{prefix}N` names numerically, anything else after them by name.
pub fn sort_numbered(prefix: &str, names: &mut [String]) {
    names.sort_by_key(|n| {
        let num = n
            .strip_prefix(prefix)
            .and_then(|rest| rest.parse::<u64>().ok());
        (num.is_none(), num, n.clone())
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn count_is_bounded() {
        assert_eq!(numbered_users("u", 3).unwrap(), vec!["u1", "u2", "u3"]);
        assert!(matches!(numbered_users("u", 0), Err(ProvisionError::Usage(_))));
        assert!(matches!(
            numbered_users("u", MAX_USERS + 1),
            Err(ProvisionError::Usage(_))
        ));
        assert_eq!(numbered_users("u", MAX_USERS).unwrap().len(), MAX_USERS as usize);
    }

    #[test]
    fn list_is_validated_and_deduplicated() {
        let source = UserSource::List(vec!["a1".into(), "b2".into(), "a1".into()]);
        let names = source.resolve_static("u", "ws").unwrap().unwrap();
        assert_eq!(names, vec!["a1", "b2"]);

        let bad = UserSource::List(vec!["Not_Valid".into()]);
        assert!(bad.resolve_static("u", "ws").is_err());
        assert!(UserSource::List(vec![]).resolve_static("u", "ws").is_err());
    }

    #[test]
    fn file_skips_comments_and_blanks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# cohort 1\nalice\n\n  bob  \n").unwrap();
        let source = UserSource::File(file.path().to_path_buf());
        let names = source.resolve_static("u", "ws").unwrap().unwrap();
        assert_eq!(names, vec!["alice", "bob"]);
    }

    #[test]
    fn missing_file_is_usage_error() {
        let source = UserSource::File(PathBuf::from("/nonexistent/users.txt"));
        assert!(matches!(
            source.resolve_static("u", "ws"),
            Err(ProvisionError::Usage(_))
        ));
    }

    #[test]
    fn existing_comes_from_snapshot_in_numeric_order() {
        let snapshot = Snapshot {
            identities: vec!["u10".into(), "u2".into(), "u1".into()],
            ..Snapshot::default()
        };
        let names = UserSource::Existing.resolve("u", "ws", &snapshot).unwrap();
        assert_eq!(names, vec!["u1", "u2", "u10"]);
        assert!(
            UserSource::Existing
                .resolve("u", "ws", &Snapshot::default())
                .is_err()
        );
    }
}
