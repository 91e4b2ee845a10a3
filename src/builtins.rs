//! Built-in commands. `cd`/`pwd`/`echo`/`export`/`unset`/`type` never touch
//! a child process; they're kept in this module anyway rather than split out,
//! since all builtins dispatch through one table. `jobs`/`fg`/`bg`/`disown`/
//! `exit` are the job-control builtins; `wait`/`kill`/`time` round out the
//! set, matching what `job_control_regressions.rs`/`signal_handling.rs`
//! already assume exists.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::jobs::ExitState;
use crate::state::ShellState;
use crate::status;

/// The list of all builtin command names.
const BUILTINS: &[&str] = &[
    "cd", "pwd", "exit", "echo", "export", "unset", "type", "jobs", "fg", "bg", "disown", "wait",
    "kill", "time",
];

/// Returns true if the command name is a shell builtin.
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

#[derive(Debug)]
pub enum BuiltinAction {
    Continue(i32),
    Exit(i32),
}

/// Execute a builtin command, writing output to the provided streams and
/// mutating shell state (job registry, pending-exit flag) as needed.
pub fn execute(
    program: &str,
    args: &[String],
    stdin: &mut dyn Read,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
    state: &mut ShellState,
) -> BuiltinAction {
    let code = match program {
        "cd" => builtin_cd(args, stderr),
        "pwd" => builtin_pwd(stdout, stderr),
        "echo" => builtin_echo(args, stdout),
        "export" => builtin_export(args, stderr),
        "unset" => builtin_unset(args),
        "type" => builtin_type(args, stdout, stderr),
        "jobs" => builtin_jobs(args, stdout, state),
        "fg" => return builtin_fg(args, stderr, state),
        "bg" => builtin_bg(args, stdout, stderr, state),
        "disown" => builtin_disown(args, stderr, state),
        "wait" => builtin_wait(args, stderr, state),
        "kill" => builtin_kill(args, stderr, state),
        "time" => builtin_time(args, stdin, stdout, stderr),
        "exit" => return builtin_exit(args, stdout, stderr, state),
        _ => {
            let _ = writeln!(stderr, "jsh: unknown builtin: {program}");
            1
        }
    };
    BuiltinAction::Continue(code)
}

fn builtin_cd(args: &[String], stderr: &mut dyn Write) -> i32 {
    let target = match args.first() {
        Some(dir) if dir == "-" => match std::env::var("OLDPWD") {
            Ok(prev) => prev,
            Err(_) => {
                let _ = writeln!(stderr, "cd: OLDPWD not set");
                return 1;
            }
        },
        Some(dir) => dir.clone(),
        None => std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    };

    // SAFETY: env mutation only ever happens on the main thread.
    if let Ok(cwd) = std::env::current_dir() {
        unsafe { std::env::set_var("OLDPWD", cwd) };
    }

    if let Err(e) = std::env::set_current_dir(&target) {
        let _ = writeln!(stderr, "cd: {target}: {e}");
        return 1;
    }

    0
}

fn builtin_pwd(stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    match std::env::current_dir() {
        Ok(path) => {
            let _ = writeln!(stdout, "{}", path.display());
            0
        }
        Err(e) => {
            let _ = writeln!(stderr, "pwd: {e}");
            1
        }
    }
}

fn builtin_echo(args: &[String], stdout: &mut dyn Write) -> i32 {
    let _ = writeln!(stdout, "{}", args.join(" "));
    0
}

fn builtin_export(args: &[String], stderr: &mut dyn Write) -> i32 {
    for arg in args {
        if let Some((key, value)) = arg.split_once('=') {
            unsafe { std::env::set_var(key, value) };
        } else {
            let _ = writeln!(stderr, "export: usage: export VAR=value");
        }
    }
    0
}

fn builtin_unset(args: &[String]) -> i32 {
    for arg in args {
        unsafe { std::env::remove_var(arg) };
    }
    0
}

fn builtin_type(args: &[String], stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    let mut exit_code = 0;
    for arg in args {
        if is_builtin(arg) {
            let _ = writeln!(stdout, "{arg} is a shell builtin");
        } else {
            match find_in_path(arg) {
                Some(path) => {
                    let _ = writeln!(stdout, "{arg} is {}", path.display());
                }
                None => {
                    let _ = writeln!(stderr, "{arg}: not found");
                    exit_code = 1;
                }
            }
        }
    }
    exit_code
}

fn is_executable(path: &Path) -> bool {
    let Ok(meta) = path.metadata() else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        return meta.permissions().mode() & 0o111 != 0;
    }

    #[cfg(not(unix))]
    {
        let extension = match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) => ext.to_ascii_lowercase(),
            None => return false,
        };
        let pathext =
            std::env::var("PATHEXT").unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".to_string());
        pathext
            .split(';')
            .any(|ext| extension == ext.trim_start_matches('.').to_ascii_lowercase())
    }
}

fn find_in_path(cmd: &str) -> Option<PathBuf> {
    let path_var = std::env::var("PATH").ok()?;
    let separator = if cfg!(windows) { ';' } else { ':' };

    for dir in path_var.split(separator) {
        let full_path = Path::new(dir).join(cmd);
        if is_executable(&full_path) {
            return Some(full_path);
        }
        if cfg!(windows) {
            for ext in &["exe", "cmd", "bat", "com"] {
                let with_ext = full_path.with_extension(ext);
                if is_executable(&with_ext) {
                    return Some(with_ext);
                }
            }
        }
    }
    None
}

// ── Job-control builtins ──

fn parse_job_id(arg: &str, builtin: &str, stderr: &mut dyn Write) -> Option<usize> {
    let digits = arg.strip_prefix('%').unwrap_or(arg);
    match digits.parse::<usize>() {
        Ok(id) => Some(id),
        Err(_) => {
            let _ = writeln!(stderr, "jsh: {builtin}: {arg}: not a valid job id");
            None
        }
    }
}

fn format_exit_state(state: &ExitState) -> &'static str {
    match state {
        ExitState::Running => "running",
        ExitState::Exited(_) => "exited",
        ExitState::Signaled(_) => "signaled",
        ExitState::Stopped(_) => "stopped",
    }
}

/// `jobs [-l|-p]`.
fn builtin_jobs(args: &[String], stdout: &mut dyn Write, state: &mut ShellState) -> i32 {
    let show_pid = args.iter().any(|a| a == "-p" || a == "-l");
    let show_pgid = args.iter().any(|a| a == "-l");

    state.job_table.reap();

    for job in state.job_table.iter_in_order() {
        let marker = if job.background { '+' } else { '-' };
        let status_word = format_exit_state(&job.exit_state);
        let mut line = format!("[{}] {} {}", job.job_id, marker, status_word);
        if show_pid {
            line.push_str(&format!(" {}", job.pid));
        }
        if show_pgid {
            line.push_str(&format!(" (pgid {})", job.pgid));
        }
        line.push_str(&format!(" {}", job.command));
        let _ = writeln!(stdout, "{line}");
    }
    0
}

#[cfg(unix)]
fn foreground_wait_job(job_id: usize, state: &mut ShellState) -> i32 {
    let Some(job) = state.job_table.get_mut(job_id) else {
        return -1;
    };
    job.background = false;
    let pgid = job.pgid as libc::pid_t;
    let pid = job.pid as libc::pid_t;

    let _ = crate::job_control::send_signal_to_group(pgid, libc::SIGCONT);

    let guard = crate::job_control::ForegroundTerminalGuard::new(pgid).ok();
    let outcome = crate::job_control::wait_for_pid(pid);
    drop(guard);

    match outcome {
        Ok(crate::job_control::WaitOutcome::Exited(code)) => {
            state.job_table.remove(job_id);
            code
        }
        Ok(crate::job_control::WaitOutcome::Signaled(signal)) => {
            eprintln!("jsh: exited due to signal {signal}");
            state.job_table.remove(job_id);
            -1
        }
        Ok(crate::job_control::WaitOutcome::Stopped) => {
            if let Some(job) = state.job_table.get_mut(job_id) {
                job.exit_state = ExitState::Stopped(0);
            }
            0
        }
        Err(_) => {
            state.job_table.remove(job_id);
            1
        }
    }
}

/// `fg [job_id]`. Defaults to the highest job id when none is given (the
/// resolved Open Question).
fn builtin_fg(args: &[String], stderr: &mut dyn Write, state: &mut ShellState) -> BuiltinAction {
    let job_id = match args.first() {
        Some(arg) => match parse_job_id(arg, "fg", stderr) {
            Some(id) => id,
            None => return BuiltinAction::Continue(1),
        },
        None => match state.job_table.most_recent_id() {
            Some(id) => id,
            None => {
                let _ = writeln!(stderr, "jsh: fg: no current job");
                return BuiltinAction::Continue(1);
            }
        },
    };

    if state.job_table.lookup_by_job_id(job_id).is_none() {
        let _ = writeln!(stderr, "{}", crate::errors::BuiltinError::NoSuchJob { builtin: "fg", job_id: job_id.to_string() });
        return BuiltinAction::Continue(1);
    }

    #[cfg(unix)]
    {
        BuiltinAction::Continue(foreground_wait_job(job_id, state))
    }
    #[cfg(not(unix))]
    {
        let _ = (job_id, state);
        let _ = writeln!(stderr, "jsh: fg: not supported on this platform");
        BuiltinAction::Continue(1)
    }
}

/// `bg [job_id]`. Defaults to the most recently stopped job.
fn builtin_bg(
    args: &[String],
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
    state: &mut ShellState,
) -> i32 {
    let job_id = match args.first() {
        Some(arg) => match parse_job_id(arg, "bg", stderr) {
            Some(id) => id,
            None => return 1,
        },
        None => match state.job_table.most_recent_stopped_id() {
            Some(id) => id,
            None => {
                let _ = writeln!(stderr, "jsh: bg: no current job");
                return 1;
            }
        },
    };

    let Some(job) = state.job_table.get_mut(job_id) else {
        let _ = writeln!(stderr, "{}", crate::errors::BuiltinError::NoSuchJob { builtin: "bg", job_id: job_id.to_string() });
        return 1;
    };
    job.background = true;
    job.exit_state = ExitState::Running;
    #[cfg(unix)]
    {
        let pgid = job.pgid as libc::pid_t;
        let cmd = job.command.clone();
        let _ = crate::job_control::send_signal_to_group(pgid, libc::SIGCONT);
        let _ = writeln!(stdout, "[{job_id}] {cmd} &");
    }
    0
}

/// `disown [job_ids...]`. With no arguments, disowns the most recently
/// added job — the same most-recent-job default `fg`/`bg` fall back to.
fn builtin_disown(args: &[String], stderr: &mut dyn Write, state: &mut ShellState) -> i32 {
    let ids: Vec<usize> = if args.is_empty() {
        state.job_table.most_recent_id().into_iter().collect()
    } else {
        args.iter()
            .filter_map(|a| parse_job_id(a, "disown", stderr))
            .collect()
    };

    if ids.is_empty() && args.is_empty() {
        let _ = writeln!(stderr, "jsh: disown: no jobs");
        return 1;
    }

    let mut code = 0;
    for id in ids {
        if let Err(warning) = state.job_table.disown(id) {
            let _ = writeln!(stderr, "{warning}");
            code = 1;
        }
    }
    code
}

/// `wait [%job_id]` — block until the named job (or, with no argument, every
/// running background job) finishes.
fn builtin_wait(args: &[String], stderr: &mut dyn Write, state: &mut ShellState) -> i32 {
    if let Some(arg) = args.first() {
        let Some(job_id) = parse_job_id(arg, "wait", stderr) else {
            return 1;
        };
        let Some(job) = state.job_table.get_mut(job_id) else {
            let _ = writeln!(stderr, "{}", crate::errors::BuiltinError::NoSuchJob { builtin: "wait", job_id: job_id.to_string() });
            return 1;
        };
        let code = match job.child.wait() {
            Ok(status) => status::exit_code(status),
            Err(_) => 1,
        };
        state.job_table.remove(job_id);
        return code;
    }

    let mut last_code = 0;
    let mut ids = state.job_table.running_ids();
    ids.sort_unstable();
    for job_id in ids {
        if let Some(job) = state.job_table.get_mut(job_id) {
            last_code = match job.child.wait() {
                Ok(status) => status::exit_code(status),
                Err(_) => 1,
            };
            state.job_table.remove(job_id);
        }
    }
    last_code
}

#[cfg(unix)]
fn signal_from_name(name: &str) -> Option<libc::c_int> {
    let upper = name.trim_start_matches('-').to_ascii_uppercase();
    let upper = upper.strip_prefix("SIG").unwrap_or(&upper);
    Some(match upper {
        "HUP" => libc::SIGHUP,
        "INT" => libc::SIGINT,
        "QUIT" => libc::SIGQUIT,
        "KILL" => libc::SIGKILL,
        "TERM" => libc::SIGTERM,
        "CONT" => libc::SIGCONT,
        "STOP" => libc::SIGSTOP,
        "TSTP" => libc::SIGTSTP,
        "USR1" => libc::SIGUSR1,
        "USR2" => libc::SIGUSR2,
        "PIPE" => libc::SIGPIPE,
        numeric => return numeric.parse().ok(),
    })
}

/// `kill [-SIG] pid|%job_id` — send a signal to a pid or a job's process
/// group.
fn builtin_kill(args: &[String], stderr: &mut dyn Write, state: &mut ShellState) -> i32 {
    #[cfg(not(unix))]
    {
        let _ = (args, state);
        let _ = writeln!(stderr, "jsh: kill: not supported on this platform");
        return 1;
    }

    #[cfg(unix)]
    {
        let mut signal = libc::SIGTERM;
        let mut rest = args;
        if let Some(first) = args.first() {
            if first.starts_with('-') {
                match signal_from_name(first) {
                    Some(sig) => signal = sig,
                    None => {
                        let _ = writeln!(stderr, "jsh: kill: {first}: invalid signal");
                        return 1;
                    }
                }
                rest = &args[1..];
            }
        }

        if rest.is_empty() {
            let _ = writeln!(stderr, "jsh: kill: usage: kill [-SIG] pid|%job_id");
            return 1;
        }

        let mut code = 0;
        for target in rest {
            if let Some(job_id_str) = target.strip_prefix('%') {
                let Some(job_id) = parse_job_id(job_id_str, "kill", stderr) else {
                    code = 1;
                    continue;
                };
                match state.job_table.lookup_by_job_id(job_id) {
                    Some(job) => {
                        let pgid = job.pgid as libc::pid_t;
                        if crate::job_control::send_signal_to_group(pgid, signal).is_err() {
                            code = 1;
                        }
                    }
                    None => {
                        let _ = writeln!(stderr, "{}", crate::errors::BuiltinError::NoSuchJob { builtin: "kill", job_id: job_id.to_string() });
                        code = 1;
                    }
                }
            } else {
                match target.parse::<libc::pid_t>() {
                    Ok(pid) => {
                        if crate::job_control::send_signal_to_pid(pid, signal).is_err() {
                            code = 1;
                        }
                    }
                    Err(_) => {
                        let _ = writeln!(stderr, "jsh: kill: {target}: arguments must be process or job IDs");
                        code = 1;
                    }
                }
            }
        }
        code
    }
}

/// `time cmd...`. Runs `cmd` as a direct child
/// inheriting this process's stdio — simpler than routing back through the
/// full Pipeline Planner, since `time` wraps exactly one program with no
/// redirections or pipes of its own.
fn builtin_time(
    args: &[String],
    _stdin: &mut dyn Read,
    _stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    let Some((program, rest)) = args.split_first() else {
        let _ = writeln!(stderr, "jsh: time: usage: time cmd...");
        return 1;
    };

    let start = std::time::Instant::now();
    let mut command = std::process::Command::new(program);
    command.args(rest);
    let code = match command.status() {
        Ok(status) => status::exit_code(status),
        Err(e) => {
            let _ = writeln!(stderr, "jsh: time: {program}: {e}");
            127
        }
    };
    let elapsed_ms = start.elapsed().as_millis();
    let _ = writeln!(stderr, "real\t{elapsed_ms}ms");
    code
}

/// `exit [code]`. Two-step when jobs are running: the first
/// invocation warns and sets `pending_exit`; the second actually shuts down.
fn builtin_exit(
    args: &[String],
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
    state: &mut ShellState,
) -> BuiltinAction {
    let requested_code: Option<i32> = match args.first() {
        None => None,
        Some(s) => match s.parse::<i32>() {
            Ok(code) => Some(code),
            Err(_) => {
                let _ = writeln!(stderr, "exit: {s}: numeric argument required");
                return BuiltinAction::Exit(2);
            }
        },
    };

    if !state.job_table.is_empty() && !state.pending_exit {
        state.pending_exit = true;
        let _ = writeln!(
            stdout,
            "jsh: there are running jobs; run `exit` again to kill them and quit"
        );
        for job in state.job_table.iter_in_order() {
            let _ = writeln!(stdout, "[{}]  {}", job.job_id, job.command);
        }
        return BuiltinAction::Continue(1);
    }

    crate::job_control::shutdown_all_jobs(&mut state.job_table);
    BuiltinAction::Exit(requested_code.unwrap_or(0))
}
