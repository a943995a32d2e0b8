use anyhow::{Result, bail};

const MAX_NAME_LEN: usize = 63;

/// Check a namespace, user or workspace name: `[a-z0-9-]`, at most 63
/// characters, hyphens only inside.
pub fn validate_name(name: &str) -> Result<()> {
    match name.len() {
        0 => bail!("name must not be empty"),
        n if n > MAX_NAME_LEN => {
            bail!("name '{}' is {} characters, the limit is {}", name, n, MAX_NAME_LEN)
        }
        _ => {}
    }
    if let Some((pos, c)) = name
        .char_indices()
        .find(|(_, c)| !matches!(c, 'a'..='z' | '0'..='9' | '-'))
    {
        bail!(
            "name '{}' has '{}' at position {}; only [a-z0-9-] is allowed",
            name,
            c,
            pos
        );
    }
    if name.starts_with('-') || name.ends_with('-') {
        bail!("name '{}' must begin and end with a letter or digit", name);
    }
    Ok(())
}

/// Validate a username; the derived `{username}-{suffix}` must also be a
/// valid namespace name.
pub fn validate_username(username: &str, suffix: &str) -> Result<()> {
    if username.contains(':') {
        bail!("username '{}' must not contain ':'", username);
    }
    validate_name(username)?;
    validate_name(&crate::identity::namespace_for(username, suffix))
}

/// A username prefix is a name fragment: same alphabet, must not end in a
/// digit or the numbering would become ambiguous (`u1` + `1` vs `u` + `11`).
pub fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        bail!("prefix must not be empty");
    }
    if prefix.ends_with(|c: char| c.is_ascii_digit()) {
        bail!("prefix '{}' must not end with a digit", prefix);
    }
    validate_name(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(validate_name("u1-ws").is_ok());
        assert!(validate_name("student-12").is_ok());
        assert!(validate_name("a").is_ok());
        assert!(validate_name("a-b-c-d").is_ok());
    }

    #[test]
    fn invalid_names() {
        assert!(validate_name("").is_err());
        assert!(validate_name("User1").is_err());
        assert!(validate_name("user_1").is_err());
        assert!(validate_name("-leading").is_err());
        assert!(validate_name("trailing-").is_err());
        assert!(validate_name("special!char").is_err());
        assert!(validate_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn usernames_must_leave_room_for_suffix() {
        assert!(validate_username("u1", "ws").is_ok());
        assert!(validate_username(&"a".repeat(62), "ws").is_err());
        assert!(validate_username("bad:name", "ws").is_err());
    }

    #[test]
    fn prefixes() {
        assert!(validate_prefix("user").is_ok());
        assert!(validate_prefix("").is_err());
        assert!(validate_prefix("team2").is_err());
        assert!(validate_prefix("Team").is_err());
    }
}
