/// Convert an OS process status into shell-style exit code semantics.
///
/// A process killed by a signal records exit code `-1` rather than a
/// `128 + signal` value — the shell's own convention, not the usual
/// interactive-shell one.
pub fn exit_code(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if status.signal().is_some() {
            return -1;
        }
    }

    1
}

/// How a raw `waitpid` status (already known not to be `WIFSTOPPED`)
/// resolved. `Signaled` keeps the terminating signal number around only for
/// the "exited due to signal N" message the waiter prints — the exit code
/// the shell records for a signaled child is always `-1`, never
/// `128 + signal`.
#[cfg(unix)]
pub enum WaitStatus {
    Exited(i32),
    Signaled(i32),
}

#[cfg(unix)]
pub fn classify_wait_status(raw_status: libc::c_int) -> Option<WaitStatus> {
    if unsafe { libc::WIFEXITED(raw_status) } {
        return Some(WaitStatus::Exited(unsafe { libc::WEXITSTATUS(raw_status) }));
    }

    if unsafe { libc::WIFSIGNALED(raw_status) } {
        return Some(WaitStatus::Signaled(unsafe { libc::WTERMSIG(raw_status) }));
    }

    None
}
