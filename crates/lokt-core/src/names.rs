//! Lock name validation — §6.1.

use crate::error::{LoktError, Result};

/// Validate a lock/freeze name: non-empty, `[A-Za-z0-9._-]+`, not `.` or `..`,
/// no path separators (implied by the character class above).
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(LoktError::Usage("lock name must not be empty".into()));
    }
    if name == "." || name == ".." {
        return Err(LoktError::Usage(format!("lock name must not be '{name}'")));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-') {
        return Err(LoktError::Usage(format!(
            "lock name '{name}' must match [A-Za-z0-9._-]+"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_names() {
        for n in ["build", "build-1", "build.v2", "Build_Name123"] {
            assert!(validate_name(n).is_ok(), "{n} should be valid");
        }
    }

    #[test]
    fn rejects_empty() {
        assert!(validate_name("").is_err());
    }

    #[test]
    fn rejects_dot_and_dotdot() {
        assert!(validate_name(".").is_err());
        assert!(validate_name("..").is_err());
    }

    #[test]
    fn rejects_path_separators_and_other_chars() {
        for n in ["a/b", "a\\b", "a b", "a:b", "a*b", "../etc"] {
            assert!(validate_name(n).is_err(), "{n} should be rejected");
        }
    }
}
