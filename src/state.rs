//! Process-wide shell state (spec §3 "Shell State").
//!
//! Everything here is mutated only from the main loop: the Runner between
//! commands, the job-control builtins, and `cd`/`export`/`unset`. No thread
//! other than the main one ever touches it (spec §5).

use crate::jobs::JobTable;

/// Process-wide shell state threaded through the Runner and builtins.
pub struct ShellState {
    pub job_table: JobTable,
    /// Exit status of the final subcommand of the most recently completed
    /// command (spec §3 invariant 4); 0 on empty input or at startup.
    pub last_exit_code: i32,
    /// Set by the first `exit` with jobs still running; cleared by any
    /// non-`exit` command (spec §4.H).
    pub pending_exit: bool,
    /// `true` when stdin is a tty — gates raw-mode line editing and the
    /// job-control status lines (`[1] + running ...`) that only make sense
    /// at an interactive prompt.
    pub interactive: bool,
    /// The shell's own process group id, captured at startup, restored as
    /// the terminal's foreground pgid after every foreground pipeline.
    #[cfg(unix)]
    pub shell_pgid: libc::pid_t,
    /// `termios` captured once at startup (spec §3's `default_termios`);
    /// per-command snapshots are taken fresh in the Runner (spec §9).
    #[cfg(unix)]
    pub default_termios: Option<libc::termios>,
}

impl ShellState {
    pub fn new() -> Self {
        #[cfg(unix)]
        let interactive = unsafe { libc::isatty(libc::STDIN_FILENO) } == 1;
        #[cfg(not(unix))]
        let interactive = true;

        ShellState {
            job_table: JobTable::new(),
            last_exit_code: 0,
            pending_exit: false,
            interactive,
            #[cfg(unix)]
            shell_pgid: unsafe { libc::getpgrp() },
            #[cfg(unix)]
            default_termios: crate::job_control::capture_termios(),
        }
    }
}

impl Default for ShellState {
    fn default() -> Self {
        Self::new()
    }
}
