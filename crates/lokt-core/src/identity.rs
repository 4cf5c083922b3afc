//! Identity resolution — §4.2.
//!
//! Computed fresh on every call (no caching) so tests can override by
//! environment, mirroring the teacher's `ATM_HOME`-style env-first
//! resolution in `home.rs`.

/// The identity triple `(owner, host, pid)` attributed to the calling process.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub owner: String,
    pub host: String,
    pub pid: u32,
}

impl Identity {
    pub fn current() -> Self {
        Self {
            owner: resolve_owner(),
            host: resolve_host(),
            pid: std::process::id(),
        }
    }

    pub fn matches(&self, owner: &str, host: &str, pid: u32) -> bool {
        self.owner == owner && self.host == host && self.pid == pid
    }
}

fn resolve_owner() -> String {
    if let Ok(v) = std::env::var("LOKT_OWNER") {
        if !v.is_empty() {
            return v;
        }
    }
    os_username().unwrap_or_else(|| "unknown".to_string())
}

#[cfg(unix)]
fn os_username() -> Option<String> {
    std::env::var("USER").ok().filter(|s| !s.is_empty()).or_else(|| {
        std::env::var("LOGNAME").ok().filter(|s| !s.is_empty())
    })
}

#[cfg(not(unix))]
fn os_username() -> Option<String> {
    std::env::var("USERNAME").ok().filter(|s| !s.is_empty())
}

fn resolve_host() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn lokt_owner_env_wins() {
        unsafe { std::env::set_var("LOKT_OWNER", "alice") };
        let id = Identity::current();
        assert_eq!(id.owner, "alice");
        unsafe { std::env::remove_var("LOKT_OWNER") };
    }

    #[test]
    #[serial]
    fn empty_lokt_owner_falls_through_to_os_user() {
        unsafe { std::env::set_var("LOKT_OWNER", "") };
        let id = Identity::current();
        assert_ne!(id.owner, "");
        unsafe { std::env::remove_var("LOKT_OWNER") };
    }

    #[test]
    fn pid_is_current_process() {
        let id = Identity::current();
        assert_eq!(id.pid, std::process::id());
    }

    #[test]
    fn matches_checks_all_three_fields() {
        let id = Identity { owner: "a".into(), host: "h".into(), pid: 1 };
        assert!(id.matches("a", "h", 1));
        assert!(!id.matches("b", "h", 1));
        assert!(!id.matches("a", "h2", 1));
        assert!(!id.matches("a", "h", 2));
    }
}
