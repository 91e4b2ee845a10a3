#[cfg(unix)]
use std::io;

#[cfg(unix)]
pub(crate) enum WaitOutcome {
    Exited(i32),
    /// Carries the terminating signal number for the "exited due to signal
    /// N" message; the recorded exit code is always -1 (spec's waiter).
    Signaled(i32),
    Stopped,
}

#[cfg(unix)]
pub(crate) fn set_process_group(pid: libc::pid_t, pgid: libc::pid_t) -> io::Result<()> {
    loop {
        let rc = unsafe { libc::setpgid(pid, pgid) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(code) if code == libc::EINTR => continue,
            // Already exec'd or gone; caller can proceed with best-effort behavior.
            Some(code) if code == libc::EACCES || code == libc::ESRCH => return Ok(()),
            _ => return Err(err),
        }
    }
}

#[cfg(unix)]
pub(crate) fn process_group_id(pid: libc::pid_t) -> io::Result<libc::pid_t> {
    loop {
        let rc = unsafe { libc::getpgid(pid) };
        if rc >= 0 {
            return Ok(rc);
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

#[cfg(unix)]
pub(crate) fn send_continue_to_group(pgid: libc::pid_t) -> io::Result<()> {
    send_signal_to_group(pgid, libc::SIGCONT)
}

/// `killpg(pgid, signal)`, treating `ESRCH` (group already gone) as success —
/// spec §4.J's shutdown sequence explicitly ignores `ESRCH` on the final
/// `SIGKILL` pass.
#[cfg(unix)]
pub(crate) fn send_signal_to_group(pgid: libc::pid_t, signal: libc::c_int) -> io::Result<()> {
    if pgid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid process group id",
        ));
    }

    loop {
        let rc = unsafe { libc::kill(-pgid, signal) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(code) if code == libc::EINTR => continue,
            Some(code) if code == libc::ESRCH => return Ok(()),
            _ => return Err(err),
        }
    }
}

/// `kill(pid, signal)` — used by the `kill` builtin to signal a single pid
/// (e.g. `kill -INT $$`, `kill -TSTP $pid`) rather than a whole group.
#[cfg(unix)]
pub(crate) fn send_signal_to_pid(pid: libc::pid_t, signal: libc::c_int) -> io::Result<()> {
    loop {
        let rc = unsafe { libc::kill(pid, signal) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

#[cfg(unix)]
pub(crate) struct ForegroundTerminalGuard {
    tty_fd: Option<libc::c_int>,
    shell_pgid: libc::pid_t,
}

#[cfg(unix)]
impl ForegroundTerminalGuard {
    pub(crate) fn new(target_pgid: libc::pid_t) -> io::Result<Self> {
        let tty_fd = if unsafe { libc::isatty(libc::STDIN_FILENO) } == 1 {
            Some(libc::STDIN_FILENO)
        } else {
            None
        };

        let shell_pgid = unsafe { libc::getpgrp() };
        let guard = Self { tty_fd, shell_pgid };

        if let Some(fd) = guard.tty_fd {
            set_terminal_foreground(fd, target_pgid)?;
        }

        Ok(guard)
    }
}

#[cfg(unix)]
impl Drop for ForegroundTerminalGuard {
    fn drop(&mut self) {
        if let Some(fd) = self.tty_fd {
            let _ = set_terminal_foreground(fd, self.shell_pgid);
        }
    }
}

#[cfg(unix)]
pub(crate) fn wait_for_pid(pid: libc::pid_t) -> io::Result<WaitOutcome> {
    let mut raw_status: libc::c_int = 0;

    loop {
        let rc = unsafe { libc::waitpid(pid, &mut raw_status, libc::WUNTRACED) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(err);
        }

        if unsafe { libc::WIFSTOPPED(raw_status) } {
            return Ok(WaitOutcome::Stopped);
        }

        match crate::status::classify_wait_status(raw_status) {
            Some(crate::status::WaitStatus::Exited(code)) => return Ok(WaitOutcome::Exited(code)),
            Some(crate::status::WaitStatus::Signaled(signal)) => {
                return Ok(WaitOutcome::Signaled(signal));
            }
            None => continue,
        }
    }
}

#[cfg(unix)]
struct SignalIgnoreGuard {
    signal: libc::c_int,
    previous: libc::sighandler_t,
}

#[cfg(unix)]
impl SignalIgnoreGuard {
    fn ignore(signal: libc::c_int) -> io::Result<Self> {
        let previous = unsafe { libc::signal(signal, libc::SIG_IGN) };
        if previous == libc::SIG_ERR {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { signal, previous })
    }
}

#[cfg(unix)]
impl Drop for SignalIgnoreGuard {
    fn drop(&mut self) {
        unsafe {
            libc::signal(self.signal, self.previous);
        }
    }
}

// ── Terminal Controller: termios save/restore (spec §4.G) ──

/// Capture the terminal's current `termios` settings, if stdin is a tty.
/// Returns `None` on a non-tty stdin (tests piping stdin, `-c` mode) so
/// callers can skip the restore step entirely rather than erroring.
#[cfg(unix)]
pub(crate) fn capture_termios() -> Option<libc::termios> {
    if unsafe { libc::isatty(libc::STDIN_FILENO) } != 1 {
        return None;
    }
    let mut term: libc::termios = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::tcgetattr(libc::STDIN_FILENO, &mut term) };
    if rc == 0 { Some(term) } else { None }
}

/// Restore previously captured `termios` settings (`tcsetattr(TCSANOW)`).
/// Spec §4.G: done after the terminal is reclaimed from a foreground
/// pipeline, so settings a crashed child left behind (e.g. echo disabled)
/// never leak into the shell's own prompt.
#[cfg(unix)]
pub(crate) fn restore_termios(term: &libc::termios) {
    unsafe {
        libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, term);
    }
}

/// Ignore the job-control signals the shell itself must never act on
/// (spec §5 "Shared resources": the shell ignores SIGTSTP/SIGQUIT/SIGPIPE;
/// SIGINT is handled separately by the line editor / `ctrlc` crate). Called
/// once at startup; children reset these back to `SIG_DFL` in `pre_exec`
/// before `execvp` (ignoring signals survives `exec()`, so without that
/// reset every spawned process would inherit the shell's ignore list).
#[cfg(unix)]
pub(crate) fn ignore_job_control_signals() {
    for &sig in &[libc::SIGTSTP, libc::SIGQUIT, libc::SIGPIPE, libc::SIGTTOU, libc::SIGTTIN] {
        unsafe {
            libc::signal(sig, libc::SIG_IGN);
        }
    }
}

/// Shutdown sequence for `exit` with jobs still outstanding (spec §4.J):
/// SIGCONT (wake anything stopped) so the following signals aren't ignored
/// by a stopped process, then SIGHUP, then SIGTERM, a short grace period,
/// and finally SIGKILL to anything still alive. `ESRCH` on every step is
/// treated as success — the group is simply already gone.
#[cfg(unix)]
pub(crate) fn shutdown_all_jobs(job_table: &mut crate::jobs::JobTable) {
    let pgids: Vec<libc::pid_t> = job_table
        .iter_in_order()
        .iter()
        .map(|job| job.pgid as libc::pid_t)
        .collect();

    for &pgid in &pgids {
        let _ = send_signal_to_group(pgid, libc::SIGCONT);
        let _ = send_signal_to_group(pgid, libc::SIGHUP);
        let _ = send_signal_to_group(pgid, libc::SIGTERM);
    }

    if !pgids.is_empty() {
        std::thread::sleep(std::time::Duration::from_millis(10));
    }

    for &pgid in &pgids {
        let _ = send_signal_to_group(pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
pub(crate) fn shutdown_all_jobs(_job_table: &mut crate::jobs::JobTable) {}

#[cfg(unix)]
fn set_terminal_foreground(fd: libc::c_int, pgid: libc::pid_t) -> io::Result<()> {
    if pgid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid process group id",
        ));
    }

    let _sigttou = SignalIgnoreGuard::ignore(libc::SIGTTOU)?;
    loop {
        let rc = unsafe { libc::tcsetpgrp(fd, pgid) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}
