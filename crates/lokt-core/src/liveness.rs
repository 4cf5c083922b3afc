//! Process liveness probing — §4.3.
//!
//! Grounded directly on the teacher's `atm-agent-mcp/src/lock.rs::is_pid_alive`
//! (`kill(pid, 0)`), extended to the three-state `{Alive, Dead, Unknown}`
//! result and the local-host-only rule spec.md requires.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Dead,
    Unknown,
}

/// `is-alive(pid, host)` — §4.3. `local_host` is the caller's own hostname,
/// injected so tests don't depend on the real machine's hostname.
pub fn is_alive(pid: u32, host: &str, local_host: &str) -> Liveness {
    if host != local_host {
        return Liveness::Unknown;
    }
    probe_local(pid)
}

#[cfg(unix)]
fn probe_local(pid: u32) -> Liveness {
    // kill(pid, 0): success or EPERM means the process exists; ESRCH means
    // it doesn't. A permission error still counts as "alive" — the process
    // exists, it's just not ours — per spec.md §4.3.
    let result = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if result == 0 {
        return Liveness::Alive;
    }
    match std::io::Error::last_os_error().raw_os_error() {
        Some(libc::EPERM) => Liveness::Alive,
        Some(libc::ESRCH) => Liveness::Dead,
        _ => Liveness::Unknown,
    }
}

#[cfg(not(unix))]
fn probe_local(_pid: u32) -> Liveness {
    Liveness::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_host_is_always_unknown() {
        assert_eq!(is_alive(1, "other-host", "this-host"), Liveness::Unknown);
    }

    #[test]
    fn current_process_is_alive_on_local_host() {
        let pid = std::process::id();
        assert_eq!(is_alive(pid, "h", "h"), Liveness::Alive);
    }

    #[cfg(unix)]
    #[test]
    fn bogus_pid_is_dead_on_local_host() {
        // Reserved/unlikely-to-exist PID, same convention the corpus uses
        // for "guaranteed dead" in tests.
        let bogus = 4_194_304u32;
        assert_eq!(is_alive(bogus, "h", "h"), Liveness::Dead);
    }
}
