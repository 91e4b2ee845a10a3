//! Module I — Runner (spec §4.I).
//!
//! Drives one logical line's `Vec<Command>` through the Pipeline Planner and
//! Waiter, applying the `&&`/`;`/`&` attribute semantics the parser already
//! attached to each command, and restoring the terminal around every
//! foreground command (spec §9).

use crate::ast::{Attribute, Command};
use crate::executor::{self, ExecutionAction};
use crate::state::ShellState;

/// What the outer read loop should do after one line has run.
pub enum RunOutcome {
    Continue,
    Exit(i32),
}

/// Run every command in `commands` in order, honoring `ShortCircuitOnFailure`
/// (spec §4.I: a command marked by a preceding `&&` is skipped once the prior
/// command's exit code is non-zero) and updating `state.last_exit_code` after
/// each one that actually runs.
pub fn run_line(commands: &[Command], raw_line: &str, state: &mut ShellState) -> RunOutcome {
    let mut skip_next = false;

    for cmd in commands {
        // A non-`exit` command clears the two-step exit warning (spec §4.H).
        // Checked against the raw (unexpanded) leading token, matching the
        // way the builtin dispatch itself never expands the program name.
        if !is_literally_exit(cmd) {
            state.pending_exit = false;
        }

        if skip_next {
            skip_next = false;
            continue;
        }

        #[cfg(unix)]
        let pre_command_termios = crate::job_control::capture_termios();

        let action = executor::execute_command(cmd, state, raw_line);

        #[cfg(unix)]
        if let Some(term) = pre_command_termios {
            crate::job_control::restore_termios(&term);
        }

        match action {
            ExecutionAction::Continue(code) => {
                state.last_exit_code = code;
                if code != 0 && cmd.has(Attribute::ShortCircuitOnFailure) {
                    skip_next = true;
                }
            }
            ExecutionAction::Exit(code) => return RunOutcome::Exit(code),
        }
    }

    RunOutcome::Continue
}

/// Whether `cmd` is a bare `exit` invocation, checked against the raw token
/// text so the pending-exit warning (spec §4.H) isn't cleared by a command
/// that merely expands to something containing "exit".
fn is_literally_exit(cmd: &Command) -> bool {
    cmd.subcommands
        .first()
        .and_then(|sub| sub.args.first())
        .is_some_and(|tok| tok.text == "exit")
}
