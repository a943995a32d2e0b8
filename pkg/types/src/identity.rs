use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

// --- User ---

/// Lifecycle of a workshop participant within one invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UserStatus {
    Pending,
    Provisioned,
    Ready,
    Removed,
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserStatus::Pending => write!(f, "Pending"),
            UserStatus::Provisioned => write!(f, "Provisioned"),
            UserStatus::Ready => write!(f, "Ready"),
            UserStatus::Removed => write!(f, "Removed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub namespace: String,
    pub status: UserStatus,
}

impl User {
    pub fn new(username: &str, suffix: &str) -> Self {
        Self {
            username: username.to_string(),
            namespace: namespace_for(username, suffix),
            status: UserStatus::Pending,
        }
    }
}

/// The namespace owned by `username`.
pub fn namespace_for(username: &str, suffix: &str) -> String {
    format!("{}-{}", username, suffix)
}

// --- Credential store ---

/// One `username:hash` line of the shared htpasswd file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialEntry {
    pub username: String,
    pub hash: String,
}

/// The full contents of the shared credential store.
///
/// The store is only ever written as a whole; `revision` is the value the
/// cluster reported on read and guards the replace against lost updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialSet {
    pub entries: Vec<CredentialEntry>,
    #[serde(default)]
    pub revision: Option<String>,
}

impl CredentialSet {
    /// Parse htpasswd text. Blank lines and `#` comments are dropped.
    pub fn parse_htpasswd(text: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((user, hash)) = line.split_once(':') else {
                bail!("credential line {} has no ':' separator", lineno + 1);
            };
            if user.is_empty() {
                bail!("credential line {} has an empty username", lineno + 1);
            }
            entries.push(CredentialEntry {
                username: user.to_string(),
                hash: hash.to_string(),
            });
        }
        Ok(Self {
            entries,
            revision: None,
        })
    }

    pub fn to_htpasswd(&self) -> String {
        let mut out = String::new();
        for e in &self.entries {
            out.push_str(&e.username);
            out.push(':');
            out.push_str(&e.hash);
            out.push('\n');
        }
        out
    }

    pub fn get(&self, username: &str) -> Option<&CredentialEntry> {
        self.entries.iter().find(|e| e.username == username)
    }

    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.username.as_str())
    }

    /// Insert or replace the hash for `username`, keeping file order stable.
    pub fn upsert(&mut self, username: &str, hash: String) {
        match self.entries.iter_mut().find(|e| e.username == username) {
            Some(entry) => entry.hash = hash,
            None => self.entries.push(CredentialEntry {
                username: username.to_string(),
                hash,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_renders_htpasswd() {
        let text = "# managed\nalice:{SHA}abc=\n\nbob:$apr1$x$y\n";
        let set = CredentialSet::parse_htpasswd(text).unwrap();
        assert_eq!(set.entries.len(), 2);
        assert_eq!(set.get("bob").unwrap().hash, "$apr1$x$y");
        assert_eq!(set.to_htpasswd(), "alice:{SHA}abc=\nbob:$apr1$x$y\n");
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(CredentialSet::parse_htpasswd("no-separator").is_err());
        assert!(CredentialSet::parse_htpasswd(":hash").is_err());
    }

    #[test]
    fn upsert_keeps_order() {
        let mut set = CredentialSet::parse_htpasswd("a:1\nb:2\n").unwrap();
        set.upsert("a", "9".to_string());
        set.upsert("c", "3".to_string());
        let names: Vec<&str> = set.usernames().collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(set.get("a").unwrap().hash, "9");
    }

    #[test]
    fn user_namespace_follows_convention() {
        let user = User::new("u1", "ws");
        assert_eq!(user.namespace, "u1-ws");
        assert_eq!(user.status, UserStatus::Pending);
    }
}
